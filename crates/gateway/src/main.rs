use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use wp_domain::config::{Config, ConfigSeverity, KnowledgeBackend};
use wp_gateway::api;
use wp_gateway::cli::{load_config, Cli, Command, ConfigCommand};
use wp_gateway::runtime::session_lock::SessionLockMap;
use wp_gateway::state::AppState;
use wp_itinerary::ItineraryStore;
use wp_knowledge::{KnowledgeRetriever, NoopKnowledge, VectorKnowledge};
use wp_providers::OpenAiCompatProvider;
use wp_sessions::SessionStore;

/// Sessions idle longer than this are swept.
const SESSION_IDLE_HOURS: i64 = 24;
/// How often the sweep task wakes.
const SWEEP_INTERVAL_SECS: u64 = 3_600;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            init_tracing();
            let config = load_config(&cli.config)?;
            run_server(Arc::new(config)).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let config = load_config(&cli.config)?;
            let issues = config.validate();
            for issue in &issues {
                println!("{:?}: {issue}", issue.severity);
            }
            if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
                std::process::exit(1);
            }
            println!("config OK");
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let config = load_config(&cli.config)?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Some(Command::Version) => {
            println!("waypoint {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,wp_gateway=debug")),
        )
        .init();
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("waypoint starting");

    // ── Config validation ────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Stores ───────────────────────────────────────────────────
    let itineraries =
        Arc::new(ItineraryStore::new(&config.state_path).context("opening itinerary store")?);
    let sessions =
        Arc::new(SessionStore::new(&config.state_path).context("opening session store")?);

    // ── LLM provider ─────────────────────────────────────────────
    let llm = Arc::new(
        OpenAiCompatProvider::new(
            &config.llm,
            Duration::from_secs(config.agent.idle_timeout_seconds),
        )
        .context("building LLM provider")?,
    );
    tracing::info!(base_url = %config.llm.base_url, model = %config.llm.model, "LLM provider ready");

    // ── Knowledge backend ────────────────────────────────────────
    let knowledge: Arc<dyn KnowledgeRetriever> = match config.knowledge.backend {
        KnowledgeBackend::Vector => match VectorKnowledge::new(&config.knowledge) {
            Some(kb) => {
                tracing::info!("vector knowledge backend ready");
                Arc::new(kb)
            }
            None => {
                tracing::warn!("vector backend misconfigured, knowledge disabled");
                Arc::new(NoopKnowledge)
            }
        },
        KnowledgeBackend::None => Arc::new(NoopKnowledge),
    };

    let state = AppState {
        config: config.clone(),
        llm,
        knowledge,
        itineraries,
        sessions: sessions.clone(),
        session_locks: Arc::new(SessionLockMap::new()),
    };

    // ── Idle sweep ───────────────────────────────────────────────
    {
        let sessions = sessions.clone();
        let locks = state.session_locks.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
            loop {
                interval.tick().await;
                let swept = sessions.sweep_idle(chrono::Duration::hours(SESSION_IDLE_HOURS));
                if swept > 0 {
                    tracing::info!(swept, "idle sessions removed");
                }
                locks.prune_idle();
            }
        });
    }

    // ── Serve ────────────────────────────────────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, api::router(state))
        .await
        .context("server error")?;
    Ok(())
}

//! Session store — one JSON blob per session under the state path.
//!
//! Writes go through [`SessionStore::update`], which holds the store
//! lock across mutate+persist so appends are atomic: either the message
//! lands in both memory and the file, or in neither.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use wp_domain::chat::Message;
use wp_domain::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session records
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Preferences extracted from the conversation so far, with the
/// model's confidence in them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripProfile {
    pub profile: serde_json::Value,
    /// In [0, 1].
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub message_count: usize,
    /// Estimated, not provider-reported.
    pub total_tokens: u64,
    #[serde(rename = "costUSD")]
    pub cost_usd: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_compacted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub itinerary_id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_profile: Option<TripProfile>,
    pub metadata: SessionMetadata,
}

impl Session {
    fn new(itinerary_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            itinerary_id: itinerary_id.to_string(),
            messages: Vec::new(),
            trip_profile: None,
            metadata: SessionMetadata {
                message_count: 0,
                total_tokens: 0,
                cost_usd: 0.0,
                last_compacted_at: None,
                created_at: now,
                updated_at: now,
            },
        }
    }

    /// Number of user turns in the transcript.
    pub fn user_message_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role == wp_domain::chat::Role::User)
            .count()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SessionStore {
    dir: PathBuf,
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    /// Load or create the store at `state_path/sessions/`.
    pub fn new(state_path: &Path) -> Result<Self> {
        let dir = state_path.join("sessions");
        std::fs::create_dir_all(&dir).map_err(Error::Io)?;

        let mut sessions = HashMap::new();
        for entry in std::fs::read_dir(&dir).map_err(Error::Io)? {
            let path = entry.map_err(Error::Io)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match std::fs::read_to_string(&path)
                .map_err(Error::Io)
                .and_then(|raw| serde_json::from_str::<Session>(&raw).map_err(Error::Json))
            {
                Ok(session) => {
                    sessions.insert(session.id.clone(), session);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable session file");
                }
            }
        }

        tracing::info!(
            sessions = sessions.len(),
            path = %dir.display(),
            "session store loaded"
        );

        Ok(Self {
            dir,
            sessions: RwLock::new(sessions),
        })
    }

    pub fn create_session(&self, itinerary_id: &str) -> Result<Session> {
        let session = Session::new(itinerary_id);
        self.persist(&session)?;
        self.sessions
            .write()
            .insert(session.id.clone(), session.clone());
        tracing::info!(session_id = %session.id, itinerary_id, "session created");
        Ok(session)
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        self.sessions.read().get(id).cloned()
    }

    /// Mutate a session atomically: the closure runs under the store
    /// lock, the result is persisted before the in-memory map commits,
    /// and `updated_at` is bumped. Returns the committed session.
    pub fn update<F>(&self, id: &str, f: F) -> Result<Session>
    where
        F: FnOnce(&mut Session),
    {
        let mut sessions = self.sessions.write();
        let current = sessions
            .get(id)
            .ok_or_else(|| Error::not_found("session", id))?;

        let mut updated = current.clone();
        f(&mut updated);
        updated.metadata.message_count = updated.messages.len();
        updated.metadata.updated_at = Utc::now();

        self.persist(&updated)?;
        sessions.insert(id.to_string(), updated.clone());
        Ok(updated)
    }

    /// Append a single message (atomic: append or fail).
    pub fn append_message(&self, id: &str, message: Message) -> Result<Session> {
        self.update(id, |s| s.messages.push(message))
    }

    pub fn list_by_itinerary(&self, itinerary_id: &str) -> Vec<Session> {
        self.sessions
            .read()
            .values()
            .filter(|s| s.itinerary_id == itinerary_id)
            .cloned()
            .collect()
    }

    /// Delete by id. Idempotent.
    pub fn delete(&self, id: &str) -> bool {
        let removed = self.sessions.write().remove(id).is_some();
        if removed {
            let _ = std::fs::remove_file(self.file_path(id));
        }
        removed
    }

    /// Delete sessions idle for longer than `older_than`. Returns the
    /// number removed.
    pub fn sweep_idle(&self, older_than: Duration) -> usize {
        let cutoff = Utc::now() - older_than;
        let stale: Vec<String> = self
            .sessions
            .read()
            .values()
            .filter(|s| s.metadata.updated_at < cutoff)
            .map(|s| s.id.clone())
            .collect();

        for id in &stale {
            self.delete(id);
            tracing::info!(session_id = %id, "idle session swept");
        }
        stale.len()
    }

    fn file_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn persist(&self, session: &Session) -> Result<()> {
        let json = serde_json::to_string_pretty(session)?;
        std::fs::write(self.file_path(&session.id), json).map_err(Error::Io)
    }
}

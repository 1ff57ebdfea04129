//! OpenAI-compatible adapter.
//!
//! Works with OpenAI, Azure-style gateways, Ollama, vLLM, LM Studio,
//! Together, and any other endpoint that follows the OpenAI chat
//! completions contract.

use serde_json::Value;

use wp_domain::chat::{Message, Role, ToolCall, ToolDefinition};
use wp_domain::config::LlmConfig;
use wp_domain::error::{Error, Result};
use wp_domain::stream::{BoxStream, StreamEvent, Usage};

use crate::traits::{ChatRequest, ChatResponse, LlmProvider};
use crate::util::from_reqwest;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    api_key: Option<String>,
    default_model: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Build the adapter from the LLM config section. `idle_timeout`
    /// bounds individual reads on the streaming body.
    pub fn new(cfg: &LlmConfig, idle_timeout: std::time::Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .read_timeout(idle_timeout)
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: "openai_compat".into(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            default_model: cfg.model.clone(),
            client,
        })
    }

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }
        builder
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_chat_body(&self, req: &ChatRequest, stream: bool) -> Value {
        let messages: Vec<Value> = req.messages.iter().map(msg_to_openai).collect();
        let model = req
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());

        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": stream,
        });

        if !req.tools.is_empty() {
            let tools: Vec<Value> = req.tools.iter().map(tool_to_openai).collect();
            body["tools"] = Value::Array(tools);
        }
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(max) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
        if req.json_mode {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }
        if stream {
            body["stream_options"] = serde_json::json!({"include_usage": true});
        }
        body
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn msg_to_openai(msg: &Message) -> Value {
    match msg.role {
        Role::Tool => serde_json::json!({
            "role": "tool",
            "tool_call_id": msg.tool_call_id.as_deref().unwrap_or(""),
            "content": msg.content,
        }),
        Role::Assistant if !msg.tool_calls.is_empty() => {
            let tool_calls: Vec<Value> = msg
                .tool_calls
                .iter()
                .map(|tc| {
                    serde_json::json!({
                        "id": tc.id,
                        "type": "function",
                        "function": {
                            "name": tc.name,
                            "arguments": tc.arguments,
                        }
                    })
                })
                .collect();
            serde_json::json!({
                "role": "assistant",
                "content": if msg.content.is_empty() {
                    Value::Null
                } else {
                    Value::String(msg.content.clone())
                },
                "tool_calls": tool_calls,
            })
        }
        _ => serde_json::json!({
            "role": role_to_str(msg.role),
            "content": msg.content,
        }),
    }
}

fn tool_to_openai(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_chat_response(body: &Value) -> Result<ChatResponse> {
    let choice = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| Error::Provider {
            provider: "openai_compat".into(),
            message: "no choices in response".into(),
        })?;

    let message = choice.get("message").ok_or_else(|| Error::Provider {
        provider: "openai_compat".into(),
        message: "no message in choice".into(),
    })?;

    let content = message
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let finish_reason = choice
        .get("finish_reason")
        .and_then(|v| v.as_str())
        .map(String::from);

    let tool_calls = parse_openai_tool_calls(message);
    let usage = body.get("usage").and_then(parse_openai_usage);

    Ok(ChatResponse {
        content,
        tool_calls,
        usage,
        finish_reason,
    })
}

fn parse_openai_tool_calls(message: &Value) -> Vec<ToolCall> {
    let arr = match message.get("tool_calls").and_then(|v| v.as_array()) {
        Some(a) => a,
        None => return Vec::new(),
    };
    arr.iter()
        .filter_map(|tc| {
            let id = tc.get("id")?.as_str()?.to_string();
            let func = tc.get("function")?;
            let name = func.get("name")?.as_str()?.to_string();
            let arguments = func
                .get("arguments")
                .and_then(|v| v.as_str())
                .unwrap_or("{}")
                .to_string();
            Some(ToolCall {
                id,
                name,
                arguments,
            })
        })
        .collect()
}

fn parse_openai_usage(v: &Value) -> Option<Usage> {
    Some(Usage {
        prompt_tokens: v.get("prompt_tokens")?.as_u64()? as u32,
        completion_tokens: v.get("completion_tokens")?.as_u64()? as u32,
        total_tokens: v.get("total_tokens")?.as_u64()? as u32,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stream decoding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Incremental decoder for the chat-completions event stream.
///
/// The endpoint emits line-oriented SSE where only `data:` lines carry
/// chunks; `event:`/`id:`/comment lines and blank separators are noise.
/// Network reads split lines at arbitrary byte positions, so the
/// decoder keeps the unterminated tail between feeds and only decodes
/// complete lines. It also tracks whether a `Done` was produced, so the
/// stream can close the round even when the provider drops the
/// connection without a finish chunk.
#[derive(Default)]
struct StreamDecoder {
    partial: String,
    done_seen: bool,
}

impl StreamDecoder {
    /// Decode every complete line in `chunk`, buffering the remainder.
    fn feed(&mut self, chunk: &str, out: &mut Vec<Result<StreamEvent>>) {
        self.partial.push_str(chunk);
        while let Some(pos) = self.partial.find('\n') {
            let line: String = self.partial.drain(..=pos).collect();
            self.decode_line(line.trim(), out);
        }
    }

    /// Flush the unterminated tail (a provider may omit the final
    /// newline) and guarantee a closing `Done`.
    fn finish(&mut self, out: &mut Vec<Result<StreamEvent>>) {
        if !self.partial.trim().is_empty() {
            let line = std::mem::take(&mut self.partial);
            self.decode_line(line.trim(), out);
        }
        if !self.done_seen {
            self.done_seen = true;
            out.push(Ok(StreamEvent::Done {
                usage: None,
                finish_reason: None,
            }));
        }
    }

    fn decode_line(&mut self, line: &str, out: &mut Vec<Result<StreamEvent>>) {
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.trim();
        if data.is_empty() {
            return;
        }
        if data == "[DONE]" {
            if !self.done_seen {
                self.done_seen = true;
                out.push(Ok(StreamEvent::Done {
                    usage: None,
                    finish_reason: None,
                }));
            }
            return;
        }
        for event in parse_chunk(data) {
            if matches!(&event, Ok(StreamEvent::Done { .. })) {
                self.done_seen = true;
            }
            out.push(event);
        }
    }
}

/// Wrap a streaming HTTP response into this crate's event stream.
fn open_event_stream(response: reqwest::Response) -> BoxStream<'static, Result<StreamEvent>> {
    Box::pin(async_stream::stream! {
        let mut response = response;
        let mut decoder = StreamDecoder::default();
        let mut pending = Vec::new();

        loop {
            match response.chunk().await {
                Ok(Some(bytes)) => {
                    decoder.feed(&String::from_utf8_lossy(&bytes), &mut pending);
                }
                Ok(None) => {
                    decoder.finish(&mut pending);
                    for event in pending.drain(..) {
                        yield event;
                    }
                    break;
                }
                Err(e) => {
                    yield Err(from_reqwest(e));
                    break;
                }
            }
            for event in pending.drain(..) {
                yield event;
            }
        }
    })
}

/// Parse one chat-completion chunk into stream events.
///
/// Tool-call fragments are forwarded as-is, keyed by the chunk's
/// `index`: reassembly belongs to the agent loop, never to the adapter.
fn parse_chunk(data: &str) -> Vec<Result<StreamEvent>> {
    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return vec![Err(Error::Json(e))],
    };

    let choice = v
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first());

    // Usage-only chunk (stream_options.include_usage).
    let Some(choice) = choice else {
        if let Some(usage) = v.get("usage").and_then(parse_openai_usage) {
            return vec![Ok(StreamEvent::Done {
                usage: Some(usage),
                finish_reason: None,
            })];
        }
        return Vec::new();
    };

    let mut events = Vec::new();
    let delta = choice.get("delta").unwrap_or(&Value::Null);

    // Text content delta.
    if let Some(text) = delta.get("content").and_then(|v| v.as_str()) {
        if !text.is_empty() {
            events.push(Ok(StreamEvent::Token {
                text: text.to_string(),
            }));
        }
    }

    // Tool call fragments: id/name arrive on the first chunk for an
    // index, arguments trickle across arbitrarily many.
    if let Some(tc_arr) = delta.get("tool_calls").and_then(|v| v.as_array()) {
        for tc in tc_arr {
            let index = tc.get("index").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
            let id = tc
                .get("id")
                .and_then(|v| v.as_str())
                .map(String::from);
            let name = tc
                .get("function")
                .and_then(|f| f.get("name"))
                .and_then(|v| v.as_str())
                .map(String::from);
            let arguments = tc
                .get("function")
                .and_then(|f| f.get("arguments"))
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            events.push(Ok(StreamEvent::ToolCallDelta {
                index,
                id,
                name,
                arguments,
            }));
        }
    }

    // Finish reason (usage may ride along on the same chunk).
    if let Some(fr) = choice.get("finish_reason").and_then(|f| f.as_str()) {
        let usage = v.get("usage").and_then(parse_openai_usage);
        events.push(Ok(StreamEvent::Done {
            usage,
            finish_reason: Some(fr.to_string()),
        }));
    }

    events
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let url = self.chat_url();
        let body = self.build_chat_body(req, false);

        tracing::debug!(provider = %self.id, url = %url, "chat request");

        let resp = self
            .authed_post(&url)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        let resp_text = resp.text().await.map_err(from_reqwest)?;

        if !status.is_success() {
            return Err(Error::Provider {
                provider: self.id.clone(),
                message: format!("HTTP {} - {}", status.as_u16(), resp_text),
            });
        }

        let resp_json: Value = serde_json::from_str(&resp_text)?;
        parse_chat_response(&resp_json)
    }

    async fn chat_stream(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let url = self.chat_url();
        let body = self.build_chat_body(req, true);

        tracing::debug!(provider = %self.id, url = %url, "stream request");

        let resp = self
            .authed_post(&url)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let err_text = resp.text().await.map_err(from_reqwest)?;
            return Err(Error::Provider {
                provider: self.id.clone(),
                message: format!("HTTP {} - {}", status.as_u16(), err_text),
            });
        }

        Ok(open_event_stream(resp))
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_call_fragments_keep_index_and_pieces() {
        let first = parse_chunk(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c1","function":{"name":"get_itinerary","arguments":""}}]}}]}"#,
        );
        match &first[0] {
            Ok(StreamEvent::ToolCallDelta {
                index,
                id,
                name,
                arguments,
            }) => {
                assert_eq!(*index, 0);
                assert_eq!(id.as_deref(), Some("c1"));
                assert_eq!(name.as_deref(), Some("get_itinerary"));
                assert_eq!(arguments, "");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let second = parse_chunk(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"itinerary"}}]}}]}"#,
        );
        match &second[0] {
            Ok(StreamEvent::ToolCallDelta {
                index,
                id,
                name,
                arguments,
            }) => {
                assert_eq!(*index, 0);
                assert!(id.is_none());
                assert!(name.is_none());
                assert_eq!(arguments, "{\"itinerary");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn finish_reason_chunk_becomes_done() {
        let events =
            parse_chunk(r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#);
        match &events[0] {
            Ok(StreamEvent::Done { finish_reason, .. }) => {
                assert_eq!(finish_reason.as_deref(), Some("tool_calls"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn usage_only_chunk_becomes_done_with_usage() {
        let events = parse_chunk(
            r#"{"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#,
        );
        match &events[0] {
            Ok(StreamEvent::Done { usage, .. }) => {
                assert_eq!(usage.as_ref().unwrap().total_tokens, 15);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn content_delta_becomes_token() {
        let events = parse_chunk(r#"{"choices":[{"delta":{"content":"Hel"}}]}"#);
        match &events[0] {
            Ok(StreamEvent::Token { text }) => assert_eq!(text, "Hel"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    // ── StreamDecoder ──────────────────────────────────────────────

    fn feed_all(decoder: &mut StreamDecoder, chunks: &[&str]) -> Vec<Result<StreamEvent>> {
        let mut out = Vec::new();
        for chunk in chunks {
            decoder.feed(chunk, &mut out);
        }
        out
    }

    #[test]
    fn decoder_reassembles_lines_split_by_network_reads() {
        // One data line arriving in three reads, cut mid-JSON.
        let mut decoder = StreamDecoder::default();
        let events = feed_all(
            &mut decoder,
            &[
                "data: {\"choices\":[{\"delta\":",
                "{\"content\":\"Bonjour\"}",
                "}]}\n",
            ],
        );
        assert_eq!(events.len(), 1);
        match &events[0] {
            Ok(StreamEvent::Token { text }) => assert_eq!(text, "Bonjour"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn decoder_keeps_tool_fragments_ordered_across_reads() {
        // Two argument fragments for the same call index, each read
        // separately: the decoder must hand them over in order.
        let mut decoder = StreamDecoder::default();
        let events = feed_all(
            &mut decoder,
            &[
                "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"c1\",\"function\":{\"name\":\"add_hotel\",\"arguments\":\"\"}}]}}]}\n",
                "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{\\\"prop\"}}]}}]}\n",
                "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"erty\\\":\\\"X\\\"}\"}}]}}]}\n",
            ],
        );
        let fragments: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                Ok(StreamEvent::ToolCallDelta { arguments, .. }) => Some(arguments.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(fragments.concat(), "{\"property\":\"X\"}");
    }

    #[test]
    fn decoder_skips_noise_lines() {
        let mut decoder = StreamDecoder::default();
        let events = feed_all(
            &mut decoder,
            &[
                ": keepalive\n",
                "event: message\n",
                "id: 42\n",
                "\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n",
                "\n",
            ],
        );
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Ok(StreamEvent::Token { .. })));
    }

    #[test]
    fn decoder_done_sentinel_emits_one_done() {
        let mut decoder = StreamDecoder::default();
        let mut events = feed_all(&mut decoder, &["data: [DONE]\n", "data: [DONE]\n"]);
        decoder.finish(&mut events);
        let dones = events
            .iter()
            .filter(|e| matches!(e, Ok(StreamEvent::Done { .. })))
            .count();
        assert_eq!(dones, 1);
    }

    #[test]
    fn decoder_finish_flushes_unterminated_line() {
        // The provider dropped the final newline; finish still decodes
        // the tail.
        let mut decoder = StreamDecoder::default();
        let mut events =
            feed_all(&mut decoder, &["data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}"]);
        assert!(events.is_empty());
        decoder.finish(&mut events);
        match &events[0] {
            Ok(StreamEvent::Done { finish_reason, .. }) => {
                assert_eq!(finish_reason.as_deref(), Some("stop"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        // finish() saw that Done and adds no fallback.
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn decoder_synthesizes_done_when_stream_just_ends() {
        let mut decoder = StreamDecoder::default();
        let mut events = feed_all(
            &mut decoder,
            &["data: {\"choices\":[{\"delta\":{\"content\":\"cut off\"}}]}\n"],
        );
        decoder.finish(&mut events);
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[1],
            Ok(StreamEvent::Done {
                usage: None,
                finish_reason: None
            })
        ));
    }

    #[test]
    fn body_includes_tools_and_stream_options() {
        let provider = OpenAiCompatProvider::new(
            &LlmConfig::default(),
            std::time::Duration::from_secs(120),
        )
        .unwrap();
        let req = ChatRequest {
            messages: vec![Message::user("hi")],
            tools: vec![ToolDefinition {
                name: "get_itinerary".into(),
                description: "Read the itinerary".into(),
                parameters: serde_json::json!({"type": "object", "properties": {}}),
            }],
            temperature: Some(0.7),
            max_tokens: Some(1024),
            json_mode: false,
            model: None,
        };
        let body = provider.build_chat_body(&req, true);
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert_eq!(body["tools"][0]["function"]["name"], "get_itinerary");
        assert_eq!(body["max_tokens"], 1024);
    }

    #[test]
    fn assistant_tool_calls_serialize_with_raw_arguments() {
        let msg = Message::assistant_with_tools(
            "",
            vec![ToolCall {
                id: "c1".into(),
                name: "add_flight".into(),
                arguments: r#"{"airline":"AF"}"#.into(),
            }],
        );
        let v = msg_to_openai(&msg);
        assert_eq!(v["role"], "assistant");
        assert_eq!(v["content"], Value::Null);
        assert_eq!(v["tool_calls"][0]["function"]["arguments"], r#"{"airline":"AF"}"#);
    }

    #[test]
    fn tool_message_serializes_with_call_id() {
        let msg = Message::tool_result("c1", "{\"ok\":true}");
        let v = msg_to_openai(&msg);
        assert_eq!(v["role"], "tool");
        assert_eq!(v["tool_call_id"], "c1");
    }

    #[test]
    fn non_stream_tool_calls_keep_argument_strings() {
        let body = serde_json::json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "c9",
                        "function": {"name": "search_web", "arguments": "{\"query\":\"SXM\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        });
        let resp = parse_chat_response(&body).unwrap();
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].arguments, "{\"query\":\"SXM\"}");
        assert_eq!(resp.finish_reason.as_deref(), Some("tool_calls"));
    }
}

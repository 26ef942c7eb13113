//! Ollama LLM Provider
//!
//! Ollama exposes an OpenAI-compatible API at localhost:11434/v1; requests go
//! to `/chat/completions` and streams arrive as `data:` lines.

use super::sse::SseBuffer;
use crate::api_types::{Message, Role, StreamEvent};
use crate::llm::{CompletionParams, LlmClient};
use anyhow::{Context, Result};
use futures_util::StreamExt;
use reqwest::Client;
use reverie_core::config::LlmConfig;
use serde_json::{json, Value};
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::sync::mpsc;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434/v1";

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(cfg: &LlmConfig) -> Result<Self> {
        let base_url = cfg
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(cfg.request_timeout_secs.max(1)))
                .build()
                .context("Failed to build HTTP client")?,
            base_url,
            model: cfg.model.clone(),
        })
    }

    fn payload(&self, system: &str, messages: Vec<Message>, params: CompletionParams, stream: bool) -> Value {
        json!({
            "model": self.model,
            "messages": build_openai_messages(system, messages),
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
            "stream": stream,
        })
    }
}

/// Convert messages to OpenAI-compatible format.
fn build_openai_messages(system: &str, messages: Vec<Message>) -> Vec<Value> {
    let mut openai_messages = Vec::with_capacity(messages.len() + 1);
    if !system.is_empty() {
        openai_messages.push(json!({"role": "system", "content": system}));
    }
    for msg in messages {
        let role = match msg.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        openai_messages.push(json!({"role": role, "content": msg.text()}));
    }
    openai_messages
}

#[async_trait::async_trait]
impl LlmClient for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    #[tracing::instrument(skip(self, system, messages, params), fields(model = %self.model))]
    async fn complete(
        &self,
        system: &str,
        messages: Vec<Message>,
        params: CompletionParams,
    ) -> Result<String> {
        let payload = self.payload(system, messages, params, false);
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .context("Failed to send request to Ollama")?;

        if !response.status().is_success() {
            let status = response.status();
            let err_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama error {}: {}", status, err_text);
        }

        let resp_json: Value = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;
        parse_openai_response(&resp_json)
    }

    #[tracing::instrument(skip(self, system, messages, params), fields(model = %self.model))]
    async fn stream_complete(
        &self,
        system: &str,
        messages: Vec<Message>,
        params: CompletionParams,
    ) -> Result<mpsc::Receiver<StreamEvent>> {
        let payload = self.payload(system, messages, params, true);
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .context("Failed to send streaming request to Ollama")?;

        if !response.status().is_success() {
            let status = response.status();
            let err_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama streaming error {}: {}", status, err_text);
        }

        let (tx, rx) = mpsc::channel(64);
        let byte_stream = response.bytes_stream();

        tokio::spawn(async move {
            if let Err(e) = parse_openai_sse(byte_stream, &tx).await {
                let _ = tx.send(StreamEvent::Error(e.to_string())).await;
            }
        });

        Ok(rx)
    }
}

/// Extract the assistant text from a non-streaming OpenAI-compatible response.
pub(crate) fn parse_openai_response(resp_json: &Value) -> Result<String> {
    if let Some(err) = resp_json.get("error") {
        anyhow::bail!("Ollama returned an error: {}", err);
    }
    let choice = resp_json["choices"]
        .get(0)
        .context("Ollama response has no choices")?;
    Ok(choice["message"]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string())
}

/// Parse an OpenAI-compatible SSE byte stream into StreamEvents.
///
/// Returns early (without error) once the receiver is gone, which drops the
/// HTTP body and aborts the request.
pub(crate) async fn parse_openai_sse<S, B, E>(byte_stream: S, tx: &mpsc::Sender<StreamEvent>) -> Result<()>
where
    S: futures_util::Stream<Item = std::result::Result<B, E>> + Send,
    B: AsRef<[u8]> + Send,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut stream = std::pin::pin!(byte_stream);
    let mut buffer = SseBuffer::new();
    let mut stop_reason: Option<String> = None;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.context("Error reading SSE chunk")?;
        buffer.push_bytes(chunk.as_ref());

        for line in buffer.extract_lines() {
            if handle_openai_line(&line, &mut stop_reason, tx).await.is_break() {
                return Ok(());
            }
        }
    }

    if let Some(line) = buffer.take_residue() {
        if handle_openai_line(&line, &mut stop_reason, tx).await.is_break() {
            return Ok(());
        }
    }

    // Stream ended without [DONE], send Done anyway
    let _ = tx.send(StreamEvent::Done { stop_reason }).await;
    Ok(())
}

/// Breaks once the stream is finished or the receiver is gone.
async fn handle_openai_line(
    line: &str,
    stop_reason: &mut Option<String>,
    tx: &mpsc::Sender<StreamEvent>,
) -> ControlFlow<()> {
    let Some(data) = line.strip_prefix("data:").map(str::trim) else {
        return ControlFlow::Continue(());
    };
    if data == "[DONE]" {
        let _ = tx
            .send(StreamEvent::Done {
                stop_reason: stop_reason.take(),
            })
            .await;
        return ControlFlow::Break(());
    }
    let Ok(v) = serde_json::from_str::<Value>(data) else {
        tracing::debug!("Skipping malformed SSE line: {}", data);
        return ControlFlow::Continue(());
    };
    if let Some(err) = v.get("error") {
        let _ = tx.send(StreamEvent::Error(err.to_string())).await;
        return ControlFlow::Break(());
    }
    let choice = &v["choices"][0];
    if let Some(text) = choice["delta"]["content"].as_str() {
        if !text.is_empty() && tx.send(StreamEvent::TextDelta(text.to_string())).await.is_err() {
            tracing::debug!("Stream receiver dropped, aborting");
            return ControlFlow::Break(());
        }
    }
    if let Some(reason) = choice["finish_reason"].as_str() {
        *stop_reason = Some(reason.to_string());
    }
    ControlFlow::Continue(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: create a fake byte stream from raw SSE chunks
    fn fake_stream(
        chunks: &[&str],
    ) -> impl futures_util::Stream<Item = std::result::Result<bytes::Bytes, std::io::Error>> + Unpin + Send {
        let items: Vec<_> = chunks
            .iter()
            .map(|c| Ok(bytes::Bytes::from(c.to_string())))
            .collect();
        futures_util::stream::iter(items)
    }

    async fn collect(rx: &mut mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        events
    }

    #[test]
    fn test_client_creation() {
        let client = OllamaClient::new(&LlmConfig::thought_defaults()).unwrap();
        assert_eq!(client.model, "qwen2.5:3b");
        assert!(client.base_url.contains("11434"));
    }

    #[test]
    fn test_parse_text_response() {
        let resp = json!({
            "choices": [{
                "message": { "content": "Hello from Ollama!" },
                "finish_reason": "stop"
            }]
        });
        assert_eq!(parse_openai_response(&resp).unwrap(), "Hello from Ollama!");
    }

    #[test]
    fn test_parse_error_and_empty_responses() {
        assert!(parse_openai_response(&json!({"error": "model not found"})).is_err());
        assert!(parse_openai_response(&json!({"choices": []})).is_err());
        let empty = json!({"choices": [{"message": {"content": null}}]});
        assert_eq!(parse_openai_response(&empty).unwrap(), "");
    }

    #[test]
    fn test_build_messages() {
        let built = build_openai_messages(
            "You are thinking.",
            vec![Message::user("Hi"), Message::assistant("Hello!")],
        );
        assert_eq!(built.len(), 3);
        assert_eq!(built[0]["role"], "system");
        assert_eq!(built[1]["content"], "Hi");
        assert_eq!(built[2]["role"], "assistant");

        let no_system = build_openai_messages("", vec![Message::user("Hi")]);
        assert_eq!(no_system.len(), 1);
    }

    #[tokio::test]
    async fn test_sse_deltas_across_chunks() {
        let chunks = [
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"con",
            "tent\":\"lo\"},\"finish_reason\":\"stop\"}]}\n\ndata: [DONE]\n",
        ];
        let (tx, mut rx) = mpsc::channel(32);
        parse_openai_sse(fake_stream(&chunks), &tx).await.unwrap();
        drop(tx);

        let events = collect(&mut rx).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::TextDelta("Hel".into()),
                StreamEvent::TextDelta("lo".into()),
                StreamEvent::Done {
                    stop_reason: Some("stop".into())
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_sse_last_line_without_newline_is_kept() {
        let chunks = [
            "data: {\"choices\":[{\"delta\":{\"content\":\"almost \"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"there\"},\"finish_reason\":\"stop\"}]}",
        ];
        let (tx, mut rx) = mpsc::channel(32);
        parse_openai_sse(fake_stream(&chunks), &tx).await.unwrap();
        drop(tx);

        let events = collect(&mut rx).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::TextDelta("almost ".into()),
                StreamEvent::TextDelta("there".into()),
                StreamEvent::Done {
                    stop_reason: Some("stop".into())
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_sse_without_done_marker() {
        let chunks = ["data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n"];
        let (tx, mut rx) = mpsc::channel(32);
        parse_openai_sse(fake_stream(&chunks), &tx).await.unwrap();
        drop(tx);
        let events = collect(&mut rx).await;
        assert!(matches!(events.last(), Some(StreamEvent::Done { .. })));
    }

    #[tokio::test]
    async fn test_sse_error_payload() {
        let chunks = ["data: {\"error\":{\"message\":\"out of memory\"}}\n"];
        let (tx, mut rx) = mpsc::channel(32);
        parse_openai_sse(fake_stream(&chunks), &tx).await.unwrap();
        drop(tx);
        let events = collect(&mut rx).await;
        assert!(matches!(&events[0], StreamEvent::Error(e) if e.contains("out of memory")));
    }
}

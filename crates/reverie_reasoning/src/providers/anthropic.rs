use super::sse::{parse_event_block, SseBuffer};
use crate::api_types::{normalize_turns, Message, MessagesRequest, MessagesResponse, StreamEvent};
use crate::llm::{CompletionParams, LlmClient};
use crate::retry::{with_retry, RetryConfig};
use anyhow::{Context, Result};
use futures_util::StreamExt;
use reqwest::Client;
use reverie_core::config::LlmConfig;
use std::env;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::sync::mpsc;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    retry: RetryConfig,
}

impl AnthropicClient {
    /// Build from config; the key comes from `ANTHROPIC_API_KEY`.
    pub fn new(cfg: &LlmConfig) -> Result<Self> {
        let api_key = env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .context("ANTHROPIC_API_KEY is not set")?;
        Self::with_key(cfg, api_key)
    }

    pub fn with_key(cfg: &LlmConfig, api_key: String) -> Result<Self> {
        let base_url = cfg
            .base_url
            .clone()
            .or_else(|| env::var("ANTHROPIC_BASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(cfg.request_timeout_secs.max(1)))
                .build()
                .context("Failed to build HTTP client")?,
            api_key,
            base_url,
            model: cfg.model.clone(),
            retry: RetryConfig::default(),
        })
    }

    fn request(
        &self,
        system: &str,
        messages: Vec<Message>,
        params: CompletionParams,
        stream: bool,
    ) -> MessagesRequest {
        MessagesRequest {
            model: self.model.clone(),
            system: (!system.is_empty()).then(|| system.to_string()),
            messages: normalize_turns(messages),
            max_tokens: params.max_tokens,
            temperature: Some(params.temperature),
            stream,
        }
    }

    async fn send(&self, body: &MessagesRequest) -> Result<reqwest::Response> {
        let url = format!("{}/v1/messages", self.base_url);
        let client = &self.client;
        let api_key = &self.api_key;
        let url = &url;

        with_retry(&self.retry, "Anthropic", || async move {
            let resp = client
                .post(url)
                .header("x-api-key", api_key)
                .header("anthropic-version", API_VERSION)
                .json(body)
                .send()
                .await
                .context("Failed to send request to Anthropic")?;
            Ok(resp)
        })
        .await
    }
}

#[async_trait::async_trait]
impl LlmClient for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    #[tracing::instrument(skip(self, system, messages, params), fields(model = %self.model))]
    async fn complete(
        &self,
        system: &str,
        messages: Vec<Message>,
        params: CompletionParams,
    ) -> Result<String> {
        let body = self.request(system, messages, params, false);
        tracing::debug!(
            "LLM params: max_tokens={}, temperature={:.2}",
            params.max_tokens,
            params.temperature
        );

        let response = self.send(&body).await?;
        let resp_text = response.text().await.context("Failed to read Anthropic response")?;
        let api_response: MessagesResponse =
            serde_json::from_str(&resp_text).context("Failed to parse Anthropic response")?;
        Ok(api_response.text())
    }

    #[tracing::instrument(skip(self, system, messages, params), fields(model = %self.model))]
    async fn stream_complete(
        &self,
        system: &str,
        messages: Vec<Message>,
        params: CompletionParams,
    ) -> Result<mpsc::Receiver<StreamEvent>> {
        let body = self.request(system, messages, params, true);
        let response = self.send(&body).await?;

        let (tx, rx) = mpsc::channel(64);
        let byte_stream = response.bytes_stream();

        tokio::spawn(async move {
            if let Err(e) = parse_anthropic_sse(byte_stream, &tx).await {
                let _ = tx.send(StreamEvent::Error(e.to_string())).await;
            }
        });

        Ok(rx)
    }
}

/// Parse Anthropic SSE byte stream into StreamEvents.
///
/// - `content_block_delta` with type=text_delta → `TextDelta`
/// - `message_delta` with stop_reason → captured for `Done`
/// - `message_stop` → `Done`
/// - `error` → `Error`
pub(crate) async fn parse_anthropic_sse<S, B, E>(byte_stream: S, tx: &mpsc::Sender<StreamEvent>) -> Result<()>
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

        for block in buffer.extract_event_blocks() {
            if handle_anthropic_block(&block, &mut stop_reason, tx).await.is_break() {
                return Ok(());
            }
        }
    }

    if let Some(block) = buffer.take_residue() {
        if handle_anthropic_block(&block, &mut stop_reason, tx).await.is_break() {
            return Ok(());
        }
    }

    // Stream ended without message_stop, send Done anyway
    let _ = tx.send(StreamEvent::Done { stop_reason }).await;
    Ok(())
}

/// Breaks once the stream is finished or the receiver is gone.
async fn handle_anthropic_block(
    block: &str,
    stop_reason: &mut Option<String>,
    tx: &mpsc::Sender<StreamEvent>,
) -> ControlFlow<()> {
    let (event_type, event_data) = parse_event_block(block);
    if event_data.is_empty() {
        return ControlFlow::Continue(());
    }

    match event_type.as_str() {
        "content_block_delta" => {
            let Ok(v) = serde_json::from_str::<serde_json::Value>(&event_data) else {
                return ControlFlow::Continue(());
            };
            if v["delta"]["type"].as_str() != Some("text_delta") {
                return ControlFlow::Continue(());
            }
            if let Some(text) = v["delta"]["text"].as_str() {
                if tx.send(StreamEvent::TextDelta(text.to_string())).await.is_err() {
                    tracing::debug!("Stream receiver dropped, aborting");
                    return ControlFlow::Break(());
                }
            }
        }
        "message_delta" => {
            if let Ok(v) = serde_json::from_str::<serde_json::Value>(&event_data) {
                if let Some(sr) = v["delta"]["stop_reason"].as_str() {
                    *stop_reason = Some(sr.to_string());
                }
            }
        }
        "message_stop" => {
            let _ = tx.send(StreamEvent::Done { stop_reason: stop_reason.take() }).await;
            return ControlFlow::Break(());
        }
        "error" => {
            let _ = tx.send(StreamEvent::Error(event_data)).await;
            return ControlFlow::Break(());
        }
        _ => {} // ping, message_start, content_block_start/stop
    }
    ControlFlow::Continue(())
}

//! Primary/secondary backend chain.

use crate::api_types::{Message, StreamEvent};
use crate::llm::{CompletionParams, LlmClient};
use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Tries `primary`, and on error or timeout retries the same request against
/// `secondary`.
pub struct FallbackClient {
    primary: Arc<dyn LlmClient>,
    secondary: Arc<dyn LlmClient>,
    /// Time allowed for the primary before giving up on it. For streams this
    /// covers opening the stream and the first fragment.
    primary_timeout: Option<Duration>,
    name: String,
}

impl FallbackClient {
    pub fn new(primary: Arc<dyn LlmClient>, secondary: Arc<dyn LlmClient>) -> Self {
        let name = format!("{}+{}", primary.name(), secondary.name());
        Self {
            primary,
            secondary,
            primary_timeout: None,
            name,
        }
    }

    pub fn with_primary_timeout(mut self, limit: Duration) -> Self {
        self.primary_timeout = Some(limit);
        self
    }

    async fn within_budget<T>(&self, attempt: impl Future<Output = Result<T>>) -> Result<T> {
        match self.primary_timeout {
            Some(limit) => tokio::time::timeout(limit, attempt)
                .await
                .unwrap_or_else(|_| Err(anyhow::anyhow!("timed out after {:?}", limit))),
            None => attempt.await,
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for FallbackClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        system: &str,
        messages: Vec<Message>,
        params: CompletionParams,
    ) -> Result<String> {
        let attempt = self.primary.complete(system, messages.clone(), params);
        match self.within_budget(attempt).await {
            Ok(text) => Ok(text),
            Err(e) => {
                tracing::warn!(
                    "{} failed, falling back to {}: {:#}",
                    self.primary.name(),
                    self.secondary.name(),
                    e
                );
                self.secondary.complete(system, messages, params).await
            }
        }
    }

    /// Falls back when the primary cannot open a stream, or when it fails
    /// before producing any text. Errors after partial output are forwarded.
    async fn stream_complete(
        &self,
        system: &str,
        messages: Vec<Message>,
        params: CompletionParams,
    ) -> Result<mpsc::Receiver<StreamEvent>> {
        // Wait for the first meaningful event before committing to the primary.
        let attempt = async {
            let mut rx = self.primary.stream_complete(system, messages.clone(), params).await?;
            let first = loop {
                match rx.recv().await {
                    Some(StreamEvent::TextDelta(t)) if t.is_empty() => continue,
                    other => break other,
                }
            };
            Ok::<_, anyhow::Error>((rx, first))
        };

        let (mut primary_rx, first) = match self.within_budget(attempt).await {
            Ok(opened) => opened,
            Err(e) => {
                tracing::warn!(
                    "{} stream failed, falling back to {}: {:#}",
                    self.primary.name(),
                    self.secondary.name(),
                    e
                );
                return self.secondary.stream_complete(system, messages, params).await;
            }
        };

        match first {
            Some(StreamEvent::TextDelta(text)) => {
                let (tx, rx) = mpsc::channel(64);
                tokio::spawn(async move {
                    if tx.send(StreamEvent::TextDelta(text)).await.is_err() {
                        return;
                    }
                    loop {
                        let ev = tokio::select! {
                            ev = primary_rx.recv() => ev,
                            _ = tx.closed() => return,
                        };
                        let Some(ev) = ev else {
                            return;
                        };
                        if tx.send(ev).await.is_err() {
                            return;
                        }
                    }
                });
                Ok(rx)
            }
            Some(StreamEvent::Done { .. }) | None => {
                tracing::warn!(
                    "{} produced an empty stream, falling back to {}",
                    self.primary.name(),
                    self.secondary.name()
                );
                self.secondary.stream_complete(system, messages, params).await
            }
            Some(StreamEvent::Error(e)) => {
                tracing::warn!(
                    "{} stream error, falling back to {}: {}",
                    self.primary.name(),
                    self.secondary.name(),
                    e
                );
                self.secondary.stream_complete(system, messages, params).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        label: &'static str,
        reply: Option<&'static str>,
        hang: bool,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn ok(label: &'static str, reply: &'static str) -> Arc<Self> {
            Arc::new(Self {
                label,
                reply: Some(reply),
                hang: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(label: &'static str) -> Arc<Self> {
            Arc::new(Self {
                label,
                reply: None,
                hang: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn hanging(label: &'static str) -> Arc<Self> {
            Arc::new(Self {
                label,
                reply: None,
                hang: true,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl LlmClient for Fixed {
        fn name(&self) -> &str {
            self.label
        }

        async fn complete(&self, _: &str, _: Vec<Message>, _: CompletionParams) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                std::future::pending::<()>().await;
            }
            self.reply
                .map(str::to_string)
                .ok_or_else(|| anyhow::anyhow!("{} is down", self.label))
        }
    }

    async fn drain(mut rx: mpsc::Receiver<StreamEvent>) -> String {
        let mut out = String::new();
        while let Some(ev) = rx.recv().await {
            if let StreamEvent::TextDelta(t) = ev {
                out.push_str(&t);
            }
        }
        out
    }

    #[tokio::test]
    async fn test_primary_success_skips_secondary() {
        let primary = Fixed::ok("a", "from a");
        let secondary = Fixed::ok("b", "from b");
        let client = FallbackClient::new(primary.clone(), secondary.clone());
        let text = client
            .complete("", vec![Message::user("hi")], CompletionParams::default())
            .await
            .unwrap();
        assert_eq!(text, "from a");
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 0);
        assert_eq!(client.name(), "a+b");
    }

    #[tokio::test]
    async fn test_primary_failure_uses_secondary() {
        let client = FallbackClient::new(Fixed::failing("a"), Fixed::ok("b", "from b"));
        let text = client
            .complete("", vec![Message::user("hi")], CompletionParams::default())
            .await
            .unwrap();
        assert_eq!(text, "from b");
    }

    #[tokio::test]
    async fn test_both_failing_is_an_error() {
        let client = FallbackClient::new(Fixed::failing("a"), Fixed::failing("b"));
        let err = client
            .complete("", vec![Message::user("hi")], CompletionParams::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("b is down"));
    }

    #[tokio::test]
    async fn test_stream_falls_back_before_first_fragment() {
        let client = FallbackClient::new(Fixed::failing("a"), Fixed::ok("b", "streamed b"));
        let rx = client
            .stream_complete("", vec![Message::user("hi")], CompletionParams::default())
            .await
            .unwrap();
        assert_eq!(drain(rx).await, "streamed b");
    }

    #[tokio::test]
    async fn test_stream_keeps_primary_once_text_arrives() {
        let secondary = Fixed::ok("b", "streamed b");
        let client = FallbackClient::new(Fixed::ok("a", "streamed a"), secondary.clone());
        let rx = client
            .stream_complete("", vec![Message::user("hi")], CompletionParams::default())
            .await
            .unwrap();
        assert_eq!(drain(rx).await, "streamed a");
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_hanging_primary_times_out_to_secondary() {
        let primary = Fixed::hanging("a");
        let secondary = Fixed::ok("b", "from b");
        let client = FallbackClient::new(primary.clone(), secondary.clone())
            .with_primary_timeout(Duration::from_millis(50));

        let text = tokio::time::timeout(
            Duration::from_secs(5),
            client.complete("", vec![Message::user("hi")], CompletionParams::default()),
        )
        .await
        .expect("primary budget should expire")
        .unwrap();
        assert_eq!(text, "from b");
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hanging_primary_stream_times_out_to_secondary() {
        let client = FallbackClient::new(Fixed::hanging("a"), Fixed::ok("b", "streamed b"))
            .with_primary_timeout(Duration::from_millis(50));
        let rx = tokio::time::timeout(
            Duration::from_secs(5),
            client.stream_complete("", vec![Message::user("hi")], CompletionParams::default()),
        )
        .await
        .expect("primary budget should expire")
        .unwrap();
        assert_eq!(drain(rx).await, "streamed b");
    }
}

//! Integration tests for the conversation handler.

mod common;

use common::{approx, engine_for, memory, text, Reply, ScriptedLlm};
use reverie_core::config::DialogueConfig;
use reverie_core::record::kinds;
use reverie_core::{MemoryLog, NewRecord};
use reverie_limbic::EmotionEngine;
use reverie_memory::SqliteMemory;
use reverie_reasoning::api_types::Role;
use reverie_reasoning::dialogue::{ChatError, ConversationHandler};
use reverie_reasoning::llm::LlmClient;
use reverie_reasoning::prompts::APOLOGY;
use reverie_reasoning::providers::FallbackClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct Fixture {
    handler: Arc<ConversationHandler>,
    mem: Arc<SqliteMemory>,
    engine: Arc<EmotionEngine>,
    llm: Arc<ScriptedLlm>,
}

async fn fixture_with(llm: Arc<ScriptedLlm>, cfg: DialogueConfig) -> Fixture {
    let mem = memory().await;
    let engine = engine_for(&mem);
    let handler = ConversationHandler::new(engine.clone(), mem.clone(), llm.clone(), cfg);
    Fixture {
        handler: Arc::new(handler),
        mem,
        engine,
        llm,
    }
}

async fn fixture(replies: Vec<Reply>) -> Fixture {
    fixture_with(ScriptedLlm::new(replies), DialogueConfig::default()).await
}

async fn drain(mut rx: mpsc::Receiver<String>) -> String {
    let mut out = String::new();
    while let Some(fragment) = rx.recv().await {
        out.push_str(&fragment);
    }
    out
}

// ============================================================================
// Blocking replies
// ============================================================================

#[tokio::test]
async fn test_blank_message_is_rejected() {
    let f = fixture(vec![]).await;
    let before = f.engine.snapshot();

    let err = f.handler.handle("   \n ").await.unwrap_err();
    assert!(matches!(err, ChatError::EmptyMessage));
    assert_eq!(f.mem.counts().await.unwrap().total, 0);
    assert_eq!(f.handler.current_thread().await, None);
    assert_eq!(f.engine.snapshot(), before);
    assert_eq!(f.llm.calls(), 0);
}

#[tokio::test]
async fn test_first_message_opens_thread() {
    let f = fixture(vec![text("  Nice to meet you.  ")]).await;
    let focus = f.engine.snapshot().focus;

    let exchange = f.handler.handle("hello there").await.unwrap();
    assert_eq!(exchange.response, "Nice to meet you.");
    assert!(!exchange.degraded);
    assert_eq!(exchange.thread_id.len(), 8);
    assert_eq!(f.handler.current_thread().await, Some(exchange.thread_id.clone()));
    // new-conversation sharpens focus
    assert!(approx(f.engine.snapshot().focus, focus + 0.15));

    let thread = f.mem.by_thread(&exchange.thread_id, 10).await.unwrap();
    assert_eq!(thread.len(), 2);
    assert_eq!(thread[0].kind, kinds::USER_MESSAGE);
    assert_eq!(thread[0].content, "hello there");
    assert!(approx(thread[0].importance, 0.7));
    assert_eq!(thread[1].kind, kinds::RESPONSE);
    assert!(approx(thread[1].importance, 0.5));
    assert!(!thread[1].flag("degraded"));
}

#[tokio::test]
async fn test_history_is_replayed_without_current_message() {
    let f = fixture(vec![text("Nice to meet you."), text("Doing fine.")]).await;

    let first = f.handler.handle("hello there").await.unwrap();
    let focus = f.engine.snapshot().focus;
    let second = f.handler.handle("how are you").await.unwrap();
    assert_eq!(first.thread_id, second.thread_id);
    // no second new-conversation event
    assert!(approx(f.engine.snapshot().focus, focus));

    let messages = f.llm.last_messages.lock().await.clone();
    let turns: Vec<(Role, String)> = messages.iter().map(|m| (m.role, m.text())).collect();
    assert_eq!(
        turns,
        vec![
            (Role::User, "hello there".to_string()),
            (Role::Assistant, "Nice to meet you.".to_string()),
            (Role::User, "how are you".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_new_conversation_starts_fresh_thread() {
    let f = fixture(vec![text("First reply."), text("Second reply.")]).await;

    let first = f.handler.handle("hello there").await.unwrap();
    f.handler.new_conversation().await;
    assert_eq!(f.handler.current_thread().await, None);

    let second = f.handler.handle("starting over").await.unwrap();
    assert_ne!(first.thread_id, second.thread_id);
    assert_eq!(f.llm.last_messages.lock().await.len(), 1);
}

#[tokio::test]
async fn test_backend_failure_returns_stored_apology() {
    let f = fixture(vec![Reply::Fail("503 overloaded".into())]).await;

    let exchange = f.handler.handle("are you there").await.unwrap();
    assert_eq!(exchange.response, APOLOGY);
    assert!(exchange.degraded);

    let thread = f.mem.by_thread(&exchange.thread_id, 10).await.unwrap();
    assert_eq!(thread.len(), 2);
    assert_eq!(thread[1].content, APOLOGY);
    assert!(thread[1].flag("degraded"));
}

#[tokio::test]
async fn test_empty_reply_is_degraded() {
    let f = fixture(vec![text("   ")]).await;
    let exchange = f.handler.handle("say something").await.unwrap();
    assert_eq!(exchange.response, APOLOGY);
    assert!(exchange.degraded);
}

#[tokio::test]
async fn test_backend_timeout_returns_apology() {
    let cfg = DialogueConfig {
        backend_timeout_secs: 0.05,
        ..Default::default()
    };
    let f = fixture_with(ScriptedLlm::new(vec![Reply::Hang]), cfg).await;

    let exchange = tokio::time::timeout(Duration::from_secs(5), f.handler.handle("hello"))
        .await
        .expect("handler should time out on its own")
        .unwrap();
    assert_eq!(exchange.response, APOLOGY);
    assert!(exchange.degraded);
}

#[tokio::test]
async fn test_user_tone_moves_emotions() {
    let f = fixture(vec![text("Glad it helped."), text("Let me look again.")]).await;

    f.handler.handle("hello").await.unwrap();
    let before = f.engine.snapshot();
    f.handler.handle("thanks, that was great").await.unwrap();
    let after_praise = f.engine.snapshot();
    assert!(approx(after_praise.satisfaction, before.satisfaction + 0.15));

    f.handler.handle("this is still broken").await.unwrap();
    assert!(approx(f.engine.snapshot().empathy, after_praise.empathy + 0.20));
}

#[tokio::test]
async fn test_search_hits_reach_system_prompt() {
    let f = fixture(vec![text("They are.")]).await;
    f.mem
        .append(NewRecord::new(kinds::RESPONSE, "zebras are my favourite animal").with_importance(0.9))
        .await
        .unwrap();
    f.mem
        .append(NewRecord::new(kinds::USER_MESSAGE, "I once asked about zebras").with_thread("oldthrd1"))
        .await
        .unwrap();
    f.mem.append(NewRecord::thought("clouds look like sheep today")).await.unwrap();

    f.handler.handle("zebras").await.unwrap();
    let system = f.llm.last_system.lock().await.clone();
    assert!(system.contains("Relevant memories"));
    assert!(system.contains("zebras are my favourite animal"));
    assert!(!system.contains("I once asked about zebras"));
    assert!(system.contains("clouds look like sheep today"));
}

#[tokio::test]
async fn test_fallback_backend_answers_when_primary_fails() {
    let mem = memory().await;
    let engine = engine_for(&mem);
    let primary = ScriptedLlm::new(vec![Reply::Fail("no key".into())]);
    let secondary = ScriptedLlm::new(vec![text("Backup here.")]);
    let chain: Arc<dyn LlmClient> = Arc::new(FallbackClient::new(primary.clone(), secondary.clone()));
    let handler = ConversationHandler::new(engine, mem, chain, DialogueConfig::default());

    let exchange = handler.handle("hello").await.unwrap();
    assert_eq!(exchange.response, "Backup here.");
    assert!(!exchange.degraded);
    assert_eq!(primary.calls(), 1);
    assert_eq!(secondary.calls(), 1);
}

#[tokio::test]
async fn test_hanging_primary_falls_back_within_turn_budget() {
    let mem = memory().await;
    let engine = engine_for(&mem);
    let primary = ScriptedLlm::new(vec![Reply::Hang]);
    let secondary = ScriptedLlm::new(vec![text("Backup here.")]);
    let cfg = DialogueConfig {
        backend_timeout_secs: 0.2,
        primary_timeout_secs: 0.05,
        ..Default::default()
    };
    let chain: Arc<dyn LlmClient> = Arc::new(
        FallbackClient::new(primary.clone(), secondary.clone()).with_primary_timeout(cfg.primary_timeout()),
    );
    let handler = ConversationHandler::new(engine, mem, chain, cfg);

    let exchange = handler.handle("hello").await.unwrap();
    assert_eq!(exchange.response, "Backup here.");
    assert!(!exchange.degraded);
    assert_eq!(primary.calls(), 1);
    assert_eq!(secondary.calls(), 1);
}

#[tokio::test]
async fn test_hanging_primary_stream_falls_back_within_turn_budget() {
    let mem = memory().await;
    let engine = engine_for(&mem);
    let primary = ScriptedLlm::new(vec![Reply::Hang]);
    let secondary = ScriptedLlm::new(vec![text("Backup here.")]);
    let cfg = DialogueConfig {
        backend_timeout_secs: 0.2,
        primary_timeout_secs: 0.05,
        ..Default::default()
    };
    let chain: Arc<dyn LlmClient> = Arc::new(
        FallbackClient::new(primary.clone(), secondary.clone()).with_primary_timeout(cfg.primary_timeout()),
    );
    let handler = Arc::new(ConversationHandler::new(engine, mem, chain, cfg));

    let reply = drain(handler.handle_stream("hello").await.unwrap()).await;
    assert_eq!(reply, "Backup here.");
    assert_eq!(secondary.calls(), 1);
}

// ============================================================================
// Streaming
// ============================================================================

#[tokio::test]
async fn test_stream_persists_after_last_fragment() {
    let f = fixture(vec![text("one two three")]).await;

    let rx = f.handler.handle_stream("count for me").await.unwrap();
    assert_eq!(drain(rx).await, "one two three");

    // The channel closes only after the reply is stored.
    let thread_id = f.handler.current_thread().await.unwrap();
    let thread = f.mem.by_thread(&thread_id, 10).await.unwrap();
    assert_eq!(thread.len(), 2);
    assert_eq!(thread[1].content, "one two three");
    assert!(!thread[1].flag("degraded"));
}

#[tokio::test]
async fn test_stream_blank_message_is_rejected() {
    let f = fixture(vec![]).await;
    assert!(matches!(
        f.handler.handle_stream("").await,
        Err(ChatError::EmptyMessage)
    ));
}

#[tokio::test]
async fn test_dropped_stream_stores_no_reply() {
    let llm = ScriptedLlm::slow_stream(
        vec![text("alpha beta gamma delta epsilon zeta eta theta")],
        Duration::from_millis(30),
    );
    let f = fixture_with(llm, DialogueConfig::default()).await;

    let mut rx = f.handler.handle_stream("tell me a list").await.unwrap();
    assert_eq!(rx.recv().await.as_deref(), Some("alpha "));
    drop(rx);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(f.mem.counts().await.unwrap().total, 1);
    assert!(f.mem.recent(Some(kinds::RESPONSE), 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_dropping_stream_releases_idle_upstream() {
    let llm = ScriptedLlm::new(vec![Reply::Stall("thinking about it".into())]);
    let f = fixture_with(llm, DialogueConfig::default()).await;

    let mut rx = f.handler.handle_stream("take your time").await.unwrap();
    let mut received = String::new();
    while received != "thinking about it" {
        received.push_str(&rx.recv().await.unwrap());
    }
    drop(rx);

    tokio::time::timeout(Duration::from_secs(2), async {
        while f.llm.released() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("upstream should be dropped as soon as the reader leaves");
    assert!(f.mem.recent(Some(kinds::RESPONSE), 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_broken_stream_keeps_partial_reply_as_degraded() {
    let f = fixture(vec![Reply::BreakAfter("partial answer".into())]).await;

    let rx = f.handler.handle_stream("explain").await.unwrap();
    assert_eq!(drain(rx).await, "partial answer");

    let responses = f.mem.recent(Some(kinds::RESPONSE), 5).await.unwrap();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].content, "partial answer");
    assert!(responses[0].flag("degraded"));
}

#[tokio::test]
async fn test_stream_that_cannot_open_sends_apology() {
    let f = fixture(vec![Reply::Fail("refused".into())]).await;

    let rx = f.handler.handle_stream("hello").await.unwrap();
    assert_eq!(drain(rx).await, APOLOGY);

    let responses = f.mem.recent(Some(kinds::RESPONSE), 5).await.unwrap();
    assert_eq!(responses.len(), 1);
    assert!(responses[0].flag("degraded"));
}

//! Generation backends and the two loops built on them: the background
//! thought daemon and the conversation handler, plus the `Mind` facade that
//! owns both.

pub mod api_types;
pub mod context;
pub mod daemon;
pub mod dedup;
pub mod dialogue;
pub mod filter;
pub mod llm;
pub mod mind;
pub mod pacing;
pub mod prompts;
pub mod providers;
pub mod retry;
pub mod salience;
pub mod subscribers;

pub use daemon::{CycleOutcome, DaemonState, ThoughtDaemon};
pub use dialogue::{ChatError, ConversationHandler, Exchange};
pub use llm::{CompletionParams, LlmClient};
pub use mind::{ChatReply, Mind, MindStatus};
pub use subscribers::{BroadcastSubscriber, SubscriberSet, ThoughtEvent, ThoughtSubscriber};

//! Conversation relay engine.
//!
//! Drives one phone call: consumes call-channel events, keeps the
//! conversation history, talks to the chat model (with a one-level-deep
//! tool-call loop), and mirrors every step to the session's tunnel.

pub mod engine;
pub mod model;
pub mod tools;

pub use engine::{ConversationRelay, DEFAULT_SYSTEM_PROMPT, MODEL_FAILURE_REPLY};
pub use model::{ChatModel, ChatRequest, ChatResponse, ModelError, OpenAiChatModel, TokenUsage};
pub use tools::{NullToolExecutor, ToolError, ToolExecutor};

//! Core type definitions: events, snippets, request/response shapes.

pub mod events;
pub mod message;

pub use events::{RelayEvent, Snippet};
pub use message::{ChatRequest, ChatResponse, Message, MessageRole};

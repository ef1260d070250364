pub mod agent;
pub mod app;
pub mod assistant;
pub mod attachments;
pub mod background;
pub mod chat;
pub mod cli;
pub mod commands;
pub mod config;
pub mod core;
pub mod display;
pub mod input;
pub mod models;
pub mod notifications;
pub mod providers;
pub mod sessions;
pub mod tools;
pub mod types;
pub mod utils;

pub use assistant::{Assistant, AssistantBuilder};
pub use background::BackgroundManager;
pub use config::Config;
pub use core::error::AssistantError;
pub use providers::{LlmClient, ModelInfo, Provider, ProviderKind, ProviderRegistry};
pub use sessions::{ChatSession, FileSessionStore, SessionStore, StorageStats};
pub use types::{
    AiConfig, ChatMessage, ChatRequest, FileAttachment, MessageMetadata, MessageRole,
};

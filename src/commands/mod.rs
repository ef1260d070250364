pub mod dispatcher;
pub mod handler;
pub mod registry;

pub use dispatcher::create_command_registry;

use crate::assistant::Assistant;
use crate::config::Config;
use crate::sessions::{ChatSession, SessionStore};
use std::sync::Arc;

/// Mutable state the slash commands operate on: the live assistant, the
/// session being built up, and the persisted configuration.
pub struct ChatState {
    pub assistant: Arc<Assistant>,
    pub store: Arc<dyn SessionStore>,
    pub config: Config,
    pub session: ChatSession,
    pub should_continue: bool,
}

impl ChatState {
    pub fn new(assistant: Arc<Assistant>, store: Arc<dyn SessionStore>, config: Config) -> Self {
        Self {
            assistant,
            store,
            config,
            session: ChatSession::new("Untitled chat"),
            should_continue: true,
        }
    }

    /// Title for an unsaved session, taken from its first user turn.
    pub fn derived_title(&self) -> String {
        self.session
            .messages
            .iter()
            .find(|m| m.role == crate::types::MessageRole::User)
            .map(|m| crate::utils::text::truncate_to_width(m.content.trim(), 48))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Untitled chat".to_string())
    }
}

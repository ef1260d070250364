use super::ChatState;
use crate::config::Config;
use crate::core::error::AssistantError;
use crate::sessions::{ChatSession, SessionStore, clear_all_data};
use crate::types::{AgentSettings, MessageRole};
use crate::utils::text::truncate_to_width;
use async_trait::async_trait;
use console::style;

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn execute(
        &self,
        state: &mut ChatState,
        args: &[&str],
    ) -> Result<Option<String>, AssistantError>;
    fn help(&self) -> &'static str;
}

pub struct QuitCommand;
pub struct HelpCommand;
pub struct ClearCommand;
pub struct ModelCommand;
pub struct ProviderCommand;
pub struct AutonomousCommand;
pub struct ToolsCommand;
pub struct SaveCommand;
pub struct LoadCommand;
pub struct SessionsCommand;
pub struct DeleteCommand;
pub struct ResetCommand;

#[async_trait]
impl CommandHandler for QuitCommand {
    async fn execute(
        &self,
        state: &mut ChatState,
        _args: &[&str],
    ) -> Result<Option<String>, AssistantError> {
        state.should_continue = false;
        Ok(None)
    }

    fn help(&self) -> &'static str {
        "/quit - Exit the chat session"
    }
}

#[async_trait]
impl CommandHandler for HelpCommand {
    async fn execute(
        &self,
        _state: &mut ChatState,
        _args: &[&str],
    ) -> Result<Option<String>, AssistantError> {
        let title = style("Available Commands").bold().underlined();
        let help_text = vec![
            title.to_string(),
            HelpCommand.help().to_string(),
            QuitCommand.help().to_string(),
            ClearCommand.help().to_string(),
            ModelCommand.help().to_string(),
            ProviderCommand.help().to_string(),
            AutonomousCommand.help().to_string(),
            ToolsCommand.help().to_string(),
            SaveCommand.help().to_string(),
            LoadCommand.help().to_string(),
            SessionsCommand.help().to_string(),
            DeleteCommand.help().to_string(),
            ResetCommand.help().to_string(),
        ]
        .join("\n");

        Ok(Some(help_text))
    }

    fn help(&self) -> &'static str {
        "/help - Show available commands"
    }
}

#[async_trait]
impl CommandHandler for ClearCommand {
    async fn execute(
        &self,
        state: &mut ChatState,
        _args: &[&str],
    ) -> Result<Option<String>, AssistantError> {
        state.session = ChatSession::new("Untitled chat");
        Ok(Some("Conversation cleared.".to_string()))
    }

    fn help(&self) -> &'static str {
        "/clear - Start a fresh conversation"
    }
}

#[async_trait]
impl CommandHandler for ModelCommand {
    async fn execute(
        &self,
        state: &mut ChatState,
        args: &[&str],
    ) -> Result<Option<String>, AssistantError> {
        if args.is_empty() {
            let current = state.config.models.text.as_deref().unwrap_or("auto");
            return Ok(Some(format!("Current model: {}", current)));
        }
        let name = args[0].to_string();
        state.config.models.text = Some(name.clone());
        state.config.save()?;
        Ok(Some(format!("Model changed to: {}", name)))
    }

    fn help(&self) -> &'static str {
        "/model [name] - Show or change the text model"
    }
}

#[async_trait]
impl CommandHandler for ProviderCommand {
    async fn execute(
        &self,
        state: &mut ChatState,
        args: &[&str],
    ) -> Result<Option<String>, AssistantError> {
        if args.is_empty() {
            let providers = state.assistant.get_providers();
            if providers.is_empty() {
                return Ok(Some(
                    "No providers configured. Add one to the config file.".to_string(),
                ));
            }
            let primary = state.config.primary_provider.clone();
            let lines: Vec<String> = providers
                .iter()
                .map(|p| {
                    let marker = if primary.as_deref() == Some(p.id.as_str()) {
                        "*"
                    } else {
                        " "
                    };
                    let status = if p.enabled { "" } else { " [disabled]" };
                    format!("{} {} - {} ({}){}", marker, p.id, p.name, p.base_url, status)
                })
                .collect();
            return Ok(Some(lines.join("\n")));
        }

        let id = args[0].to_string();
        state.assistant.set_primary_provider(&id)?;
        state.config.primary_provider = Some(id.clone());
        state.config.save()?;
        Ok(Some(format!("Provider changed to: {}", id)))
    }

    fn help(&self) -> &'static str {
        "/provider [id] - List providers or switch the primary one"
    }
}

#[async_trait]
impl CommandHandler for AutonomousCommand {
    async fn execute(
        &self,
        state: &mut ChatState,
        args: &[&str],
    ) -> Result<Option<String>, AssistantError> {
        if args.is_empty() {
            let mode = if state.config.ai_config().autonomous_enabled() {
                "on"
            } else {
                "off"
            };
            return Ok(Some(format!("Autonomous mode: {}", mode)));
        }

        let enabled = match args[0] {
            "on" => true,
            "off" => false,
            _ => return Ok(Some("Usage: /autonomous [on|off]".to_string())),
        };
        let max_steps = state
            .config
            .autonomous_agent
            .as_ref()
            .map(|a| a.max_steps)
            .unwrap_or_else(|| AgentSettings::default().max_steps);
        state.config.autonomous_agent = Some(AgentSettings { enabled, max_steps });
        state.config.save()?;
        Ok(Some(format!(
            "Autonomous mode {}.",
            if enabled { "enabled" } else { "disabled" }
        )))
    }

    fn help(&self) -> &'static str {
        "/autonomous [on|off] - Show or set autonomous agent mode"
    }
}

#[async_trait]
impl CommandHandler for ToolsCommand {
    async fn execute(
        &self,
        state: &mut ChatState,
        args: &[&str],
    ) -> Result<Option<String>, AssistantError> {
        match args.first().copied() {
            None => {
                let provider = state
                    .assistant
                    .current_provider()
                    .map(|p| p.id)
                    .or_else(|| state.config.primary_provider.clone())
                    .unwrap_or_else(|| "unknown".to_string());
                let registry = state.assistant.tool_registry();
                let tools = registry.available_tools(&state.config.ai_config(), &provider);
                let blacklisted = registry.blacklisted(&provider);

                if tools.is_empty() && blacklisted.is_empty() {
                    return Ok(Some("No tools loaded.".to_string()));
                }
                let mut lines: Vec<String> = tools
                    .iter()
                    .map(|t| format!("  {} - {}", t.name(), t.description()))
                    .collect();
                if !blacklisted.is_empty() {
                    let mut names: Vec<_> = blacklisted.into_iter().collect();
                    names.sort();
                    lines.push(format!("Blacklisted: {}", names.join(", ")));
                }
                Ok(Some(lines.join("\n")))
            }
            Some("reset") => {
                state.assistant.clear_blacklisted_tools();
                Ok(None)
            }
            Some("on") | Some("off") => {
                let enabled = args[0] == "on";
                state.config.features.enable_tools = enabled;
                state.config.save()?;
                Ok(Some(format!(
                    "Tools {}.",
                    if enabled { "enabled" } else { "disabled" }
                )))
            }
            Some(_) => Ok(Some("Usage: /tools [reset|on|off]".to_string())),
        }
    }

    fn help(&self) -> &'static str {
        "/tools [reset|on|off] - List tools, clear the blacklist, or toggle tool use"
    }
}

#[async_trait]
impl CommandHandler for SaveCommand {
    async fn execute(
        &self,
        state: &mut ChatState,
        args: &[&str],
    ) -> Result<Option<String>, AssistantError> {
        if state.session.messages.is_empty() {
            return Ok(Some("Nothing to save yet.".to_string()));
        }
        let title = if !args.is_empty() {
            args.join(" ")
        } else if state.session.title != "Untitled chat" {
            state.session.title.clone()
        } else {
            state.derived_title()
        };
        state.session.title = title;
        state.store.save(&state.session).await?;
        Ok(Some(format!(
            "Session saved: {} - {}",
            short_id(&state.session.id),
            state.session.title
        )))
    }

    fn help(&self) -> &'static str {
        "/save [title] - Save the current conversation"
    }
}

#[async_trait]
impl CommandHandler for LoadCommand {
    async fn execute(
        &self,
        state: &mut ChatState,
        args: &[&str],
    ) -> Result<Option<String>, AssistantError> {
        let Some(prefix) = args.first() else {
            return Ok(Some("Usage: /load <session-id>".to_string()));
        };

        match find_session(state.store.as_ref(), prefix).await? {
            SessionLookup::Missing => Ok(Some(format!("No session matches '{}'.", prefix))),
            SessionLookup::Ambiguous(n) => Ok(Some(format!(
                "'{}' matches {} sessions; use more of the id.",
                prefix, n
            ))),
            SessionLookup::Found(session) => {
                for message in &session.messages {
                    let who = match message.role {
                        MessageRole::User => "You",
                        MessageRole::Assistant => "Archie",
                    };
                    println!("\n{}: {}", style(who).bold().cyan(), message.content);
                }
                let summary = format!(
                    "Loaded session: {} ({} messages)",
                    session.title,
                    session.messages.len()
                );
                state.session = session;
                Ok(Some(summary))
            }
        }
    }

    fn help(&self) -> &'static str {
        "/load <id> - Load a saved conversation"
    }
}

#[async_trait]
impl CommandHandler for SessionsCommand {
    async fn execute(
        &self,
        state: &mut ChatState,
        _args: &[&str],
    ) -> Result<Option<String>, AssistantError> {
        let sessions = state.store.recent(20).await?;
        if sessions.is_empty() {
            return Ok(Some("No saved sessions.".to_string()));
        }
        let lines: Vec<String> = sessions
            .iter()
            .map(|s| {
                let star = if s.starred { "★" } else { " " };
                format!(
                    "{} {}  {:<40}  {:>3} msgs  {}",
                    star,
                    short_id(&s.id),
                    truncate_to_width(&s.title, 40),
                    s.messages.len(),
                    s.updated_at.format("%Y-%m-%d %H:%M")
                )
            })
            .collect();
        Ok(Some(lines.join("\n")))
    }

    fn help(&self) -> &'static str {
        "/sessions - List saved conversations"
    }
}

#[async_trait]
impl CommandHandler for DeleteCommand {
    async fn execute(
        &self,
        state: &mut ChatState,
        args: &[&str],
    ) -> Result<Option<String>, AssistantError> {
        let Some(prefix) = args.first() else {
            return Ok(Some("Usage: /delete <session-id>".to_string()));
        };

        match find_session(state.store.as_ref(), prefix).await? {
            SessionLookup::Missing => Ok(Some(format!("No session matches '{}'.", prefix))),
            SessionLookup::Ambiguous(n) => Ok(Some(format!(
                "'{}' matches {} sessions; use more of the id.",
                prefix, n
            ))),
            SessionLookup::Found(session) => {
                state.store.delete(&session.id).await?;
                Ok(Some(format!("Deleted session: {}", session.title)))
            }
        }
    }

    fn help(&self) -> &'static str {
        "/delete <id> - Delete a saved conversation"
    }
}

#[async_trait]
impl CommandHandler for ResetCommand {
    async fn execute(
        &self,
        state: &mut ChatState,
        _args: &[&str],
    ) -> Result<Option<String>, AssistantError> {
        let stats = state.store.stats().await?;
        let question = format!(
            "This will permanently delete {} sessions ({} messages). Continue?",
            stats.sessions, stats.messages
        );
        if !crate::display::prompt_confirmation(&question) {
            return Ok(Some("Reset cancelled.".to_string()));
        }

        let history_path = Config::history_path();
        let cleared = clear_all_data(state.store.as_ref(), Some(&history_path)).await?;
        state.session = ChatSession::new("Untitled chat");
        Ok(Some(format!(
            "Cleared {} sessions ({} messages, {} attachments).",
            cleared.sessions, cleared.messages, cleared.attachments
        )))
    }

    fn help(&self) -> &'static str {
        "/reset - Delete all saved conversations and input history"
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

enum SessionLookup {
    Missing,
    Ambiguous(usize),
    Found(ChatSession),
}

async fn find_session(
    store: &dyn SessionStore,
    prefix: &str,
) -> Result<SessionLookup, AssistantError> {
    let mut matches: Vec<ChatSession> = store
        .all()
        .await?
        .into_iter()
        .filter(|s| s.id.starts_with(prefix))
        .collect();
    match matches.len() {
        0 => Ok(SessionLookup::Missing),
        1 => Ok(SessionLookup::Found(matches.remove(0))),
        n => Ok(SessionLookup::Ambiguous(n)),
    }
}

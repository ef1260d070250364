use crate::assistant::Assistant;
use crate::cli::Args;
use crate::commands::{ChatState, dispatcher::CommandDispatcher};
use crate::config::Config;
use crate::core::error::AssistantError;
use crate::display;
use crate::input;
use crate::notifications::ConsoleSink;
use crate::providers::{ClientFactory, ProviderRegistry};
use crate::sessions::FileSessionStore;
use crate::tools::ToolRegistry;
use crate::tools::mcp::register_mcp_tools;
use crate::types::{AgentSettings, AiConfig, ChatMessage, ChatRequest, FileAttachment};
use std::io::{self, Read, Write};
use std::sync::Arc;

pub struct Application {
    args: Args,
    state: ChatState,
    dispatcher: CommandDispatcher,
}

impl Application {
    pub async fn new(args: Args, config: Config) -> Result<Self, AssistantError> {
        let registry = Arc::new(ProviderRegistry::with_providers(
            ClientFactory::new(),
            config.providers.clone(),
            config.primary_provider.clone(),
        ));

        let tools = Arc::new(ToolRegistry::new());
        if config.features.enable_tools && !args.no_tools {
            let added = register_mcp_tools(&config.mcp_servers, &tools).await;
            if added > 0 {
                tracing::info!(count = added, "MCP tools registered");
            }
        }

        let assistant = Arc::new(
            Assistant::builder()
                .registry(registry)
                .tools(tools)
                .notifications(Arc::new(ConsoleSink::new()))
                .build(),
        );

        let store = Arc::new(FileSessionStore::open(Config::sessions_dir())?);
        let dispatcher = crate::commands::create_command_registry();
        let state = ChatState::new(assistant, store, config);

        Ok(Self {
            args,
            state,
            dispatcher,
        })
    }

    pub async fn run(&mut self) -> Result<(), AssistantError> {
        let piped_context = if !is_terminal::IsTerminal::is_terminal(&std::io::stdin()) {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|e| AssistantError::Input(format!("Failed to read from stdin: {}", e)))?;
            Some(buffer)
        } else {
            None
        };

        if self.args.chat || (self.args.query.is_none() && piped_context.is_none()) {
            self.run_chat_loop().await
        } else {
            self.run_one_shot(piped_context).await
        }
    }

    /// Per-request config: the file settings with the CLI flags layered on.
    fn request_config(&self) -> AiConfig {
        let mut config = self.state.config.ai_config();
        if let Some(provider) = &self.args.provider {
            config.provider = Some(provider.clone());
        }
        if let Some(model) = &self.args.model {
            config.models.text = Some(model.clone());
        }
        if self.args.no_agent {
            let max_steps = config
                .autonomous_agent
                .as_ref()
                .map(|a| a.max_steps)
                .unwrap_or_else(|| AgentSettings::default().max_steps);
            config.autonomous_agent = Some(AgentSettings {
                enabled: false,
                max_steps,
            });
        }
        if self.args.no_tools {
            config.features.enable_tools = false;
        }
        config
    }

    fn read_attachments(&self) -> Result<Vec<FileAttachment>, AssistantError> {
        let mut attachments = Vec::new();
        for path in &self.args.attach {
            let bytes = std::fs::read(path)
                .map_err(|e| AssistantError::Input(format!("Cannot read {}: {}", path.display(), e)))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            attachments.push(FileAttachment::new(name, None, bytes));
        }
        Ok(attachments)
    }

    async fn run_one_shot(&mut self, context: Option<String>) -> Result<(), AssistantError> {
        let message = match (self.args.query.as_deref(), context) {
            (Some(query), Some(piped)) => format!("<pipe>{}</pipe>\n\n{}", piped, query),
            (None, Some(piped)) => format!("<pipe>{}</pipe>", piped),
            (Some(query), None) => query.to_string(),
            (None, None) => {
                return Err(AssistantError::Input("No query provided".to_string()));
            }
        };

        let mut request = ChatRequest::new(message, self.request_config())
            .with_attachments(self.read_attachments()?);
        if let Some(prompt) = &self.state.config.system_prompt {
            request = request.with_system_prompt(prompt.clone());
        }

        let response = send_with_interrupt(&self.state.assistant, request).await?;
        render_response(&response);
        Ok(())
    }

    async fn run_chat_loop(&mut self) -> Result<(), AssistantError> {
        let config = self.request_config();
        display::display_welcome(
            config.provider.as_deref(),
            config.models.text.as_deref(),
        );

        self.state
            .assistant
            .preload_model(&config, &self.state.session.messages)
            .await;

        let mut editor = input::create_editor(self.dispatcher.clone())?;
        let mut pending_attachments = self.read_attachments()?;

        loop {
            let line = match input::read_input(&mut editor)? {
                Some(line) => line.trim().to_string(),
                None => break,
            };
            if line.is_empty() {
                continue;
            }

            if let Some(rest) = line.strip_prefix('/') {
                let parts: Vec<&str> = rest.split_whitespace().collect();
                let Some((command, args)) = parts.split_first() else {
                    continue;
                };
                match self.dispatcher.execute(command, args, &mut self.state).await {
                    Ok(Some(output)) => println!("{}", output),
                    Ok(None) => {}
                    Err(e) => display::display_error(&e.to_string()),
                }
                if !self.state.should_continue {
                    break;
                }
                continue;
            }

            let attachments = std::mem::take(&mut pending_attachments);
            let user_turn = ChatMessage::user(line.clone()).with_attachments(attachments.clone());

            let mut request = ChatRequest::new(line, self.request_config())
                .with_attachments(attachments)
                .with_history(self.state.session.messages.clone())
                .with_chunk_handler(Arc::new(|chunk: &str| {
                    print!("{}", chunk);
                    let _ = io::stdout().flush();
                }));
            if let Some(prompt) = &self.state.config.system_prompt {
                request = request.with_system_prompt(prompt.clone());
            }

            println!("\n{}", console::style("Archie").bold().blue());
            let response = match send_with_interrupt(&self.state.assistant, request).await {
                Ok(response) => response,
                Err(e) => {
                    display::display_error(&e.to_string());
                    continue;
                }
            };

            if !response.content.is_empty() && !response.content.ends_with('\n') {
                println!();
            }
            if response.metadata.aborted == Some(true) {
                display::display_notice("Response stopped.");
            } else if let Some(error) = &response.metadata.error {
                display::display_error(error);
            }

            self.state.session.messages.push(user_turn);
            self.state.session.messages.push(response);
        }

        input::save_history(&mut editor)?;
        Ok(())
    }
}

/// Drives one request while listening for Ctrl-C; the first interrupt asks
/// the assistant to stop and the request then resolves with its aborted
/// message.
async fn send_with_interrupt(
    assistant: &Assistant,
    request: ChatRequest,
) -> Result<ChatMessage, AssistantError> {
    let send = assistant.send_chat_message(request);
    tokio::pin!(send);
    loop {
        tokio::select! {
            result = &mut send => return result,
            _ = tokio::signal::ctrl_c() => {
                assistant.stop();
            }
        }
    }
}

fn render_response(message: &ChatMessage) {
    if message.metadata.aborted == Some(true) {
        display::display_notice("Response stopped.");
        return;
    }
    if message.content.is_empty() {
        if let Some(error) = &message.metadata.error {
            display::display_error(error);
        }
        return;
    }
    if display::looks_like_markdown(&message.content) {
        display::display_markdown(&message.content);
    } else {
        display::display_response(&message.content);
    }
    if let Some(error) = &message.metadata.error {
        display::display_error(error);
    }
}

use super::ChatState;
use super::handler::{
    AutonomousCommand, ClearCommand, DeleteCommand, HelpCommand, LoadCommand, ModelCommand,
    ProviderCommand, QuitCommand, ResetCommand, SaveCommand, SessionsCommand, ToolsCommand,
};
use super::registry::CommandRegistry;
use crate::core::error::AssistantError;
use std::sync::Arc;

#[derive(Clone)]
pub struct CommandDispatcher {
    registry: Arc<CommandRegistry>,
}

impl CommandDispatcher {
    pub fn new(registry: Arc<CommandRegistry>) -> Self {
        Self { registry }
    }

    pub async fn execute(
        &self,
        command: &str,
        args: &[&str],
        state: &mut ChatState,
    ) -> Result<Option<String>, AssistantError> {
        self.registry.execute(command, args, state).await
    }

    pub fn command_names(&self) -> Vec<String> {
        self.registry.command_names()
    }
}

pub fn create_command_registry() -> CommandDispatcher {
    let mut registry = CommandRegistry::new();

    registry.register("quit", QuitCommand);
    registry.register("help", HelpCommand);
    registry.register("clear", ClearCommand);
    registry.register("model", ModelCommand);
    registry.register("provider", ProviderCommand);
    registry.register("autonomous", AutonomousCommand);
    registry.register("tools", ToolsCommand);
    registry.register("save", SaveCommand);
    registry.register("load", LoadCommand);
    registry.register("sessions", SessionsCommand);
    registry.register("delete", DeleteCommand);
    registry.register("reset", ResetCommand);

    CommandDispatcher::new(Arc::new(registry))
}

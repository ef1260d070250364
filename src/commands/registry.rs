use crate::commands::ChatState;
use crate::commands::handler::CommandHandler;
use crate::core::error::AssistantError;
use std::collections::HashMap;
use std::sync::Arc;

pub struct CommandRegistry {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register<C: CommandHandler + 'static>(&mut self, name: &str, command: C) {
        self.handlers.insert(name.to_string(), Arc::new(command));
    }

    pub async fn execute(
        &self,
        name: &str,
        args: &[&str],
        state: &mut ChatState,
    ) -> Result<Option<String>, AssistantError> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| AssistantError::Input(format!("Unknown command: {}", name)))?;
        handler.execute(state, args).await
    }

    pub fn command_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

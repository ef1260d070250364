use crate::core::error::AssistantError;
use crate::providers::Provider;
use crate::tools::mcp::McpServerConfig;
use crate::types::{AgentSettings, AiConfig, ChatParameters, FeatureSettings, ModelSlots};
use serde::{Deserialize, Deserializer, Serialize, de::Error as SerdeError};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;

/// On-disk configuration, `~/.archie/config.yaml`. Everything is optional
/// so a fresh file starts the assistant in a usable unconfigured state.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Config {
    pub primary_provider: Option<String>,
    #[serde(default)]
    pub providers: Vec<Provider>,
    #[serde(default)]
    pub models: ModelSlots,
    #[serde(default)]
    pub parameters: ChatParameters,
    pub autonomous_agent: Option<AgentSettings>,
    #[serde(default)]
    pub features: FeatureSettings,
    pub system_prompt: Option<String>,
    #[serde(default)]
    #[serde(deserialize_with = "deserialize_mcp_servers")]
    pub mcp_servers: Vec<McpServerConfig>,
}

// Older config files wrote MCP servers without a `type` field; infer it
// from which connection key is present.
fn deserialize_mcp_servers<'de, D>(deserializer: D) -> Result<Vec<McpServerConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    let values: Vec<Value> = Vec::deserialize(deserializer)?;
    values
        .into_iter()
        .map(|mut v| {
            let obj = v
                .as_object_mut()
                .ok_or_else(|| SerdeError::custom("Expected a map"))?;
            if !obj.contains_key("type") {
                if obj.contains_key("url") {
                    obj.insert(
                        "type".to_string(),
                        Value::String("streamable-http".to_string()),
                    );
                } else if obj.contains_key("command") {
                    obj.insert("type".to_string(), Value::String("stdio".to_string()));
                }
            }
            McpServerConfig::deserialize(v).map_err(SerdeError::custom)
        })
        .collect()
}

impl Config {
    fn home_dir() -> PathBuf {
        #[cfg(windows)]
        {
            dirs::home_dir().expect("Could not find home directory")
        }
        #[cfg(not(windows))]
        {
            dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
        }
    }

    pub fn app_dir() -> PathBuf {
        Self::home_dir().join(".archie")
    }

    pub fn config_path() -> PathBuf {
        Self::app_dir().join("config.yaml")
    }

    pub fn history_path() -> PathBuf {
        Self::app_dir().join("history")
    }

    pub fn sessions_dir() -> PathBuf {
        Self::app_dir().join("sessions")
    }

    pub fn load() -> Result<Config, AssistantError> {
        let path = Self::config_path();
        let config_dir = path.parent().unwrap();

        if path.exists() {
            let contents = fs::read_to_string(&path)?;
            let config = serde_yml::from_str::<Config>(&contents)
                .map_err(|e| AssistantError::Config(format!("Parse {}: {}", path.display(), e)))?;
            return Ok(config);
        }

        if !config_dir.exists() {
            fs::create_dir_all(config_dir)?;
        }

        let config = Config::default();
        let _ = config.save();
        Ok(config)
    }

    pub fn save(&self) -> Result<(), AssistantError> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let yaml_content = serde_yml::to_string(self)?;
        fs::write(&path, yaml_content)?;
        Ok(())
    }

    pub fn get_provider(&self, id: &str) -> Option<&Provider> {
        self.providers.iter().find(|p| p.id == id)
    }

    pub fn upsert_provider(&mut self, provider: Provider) {
        match self.providers.iter_mut().find(|p| p.id == provider.id) {
            Some(existing) => *existing = provider,
            None => self.providers.push(provider),
        }
    }

    /// The per-request view of this configuration.
    pub fn ai_config(&self) -> AiConfig {
        AiConfig {
            provider: self.primary_provider.clone(),
            models: self.models.clone(),
            parameters: self.parameters.clone(),
            autonomous_agent: self.autonomous_agent.clone(),
            features: self.features.clone(),
        }
    }
}

use super::{Tool, ToolRegistry};
use crate::core::error::AssistantError;
use async_trait::async_trait;
use rmcp::{
    RoleClient, ServiceExt,
    model::{CallToolRequestParam, Tool as McpTool},
    service::RunningService,
    transport::{ConfigureCommandExt, StreamableHttpClientTransport},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

fn default_true() -> bool {
    true
}

/// One MCP server entry from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(flatten)]
    pub transport: McpTransportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum McpTransportConfig {
    Sse {
        url: String,
    },
    StreamableHttp {
        url: String,
    },
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        envs: HashMap<String, String>,
    },
}

impl McpTransportConfig {
    pub async fn start(&self) -> Result<RunningService<RoleClient, ()>, AssistantError> {
        let client = match self {
            McpTransportConfig::Sse { url } => {
                let transport =
                    rmcp::transport::sse_client::SseClientTransport::start(url.to_owned())
                        .await
                        .map_err(|e| {
                            AssistantError::McpConnection(format!("SSE transport: {}", e))
                        })?;
                ().serve(transport)
                    .await
                    .map_err(|e| AssistantError::McpConnection(format!("SSE serve: {}", e)))?
            }
            McpTransportConfig::StreamableHttp { url } => {
                let transport = StreamableHttpClientTransport::from_uri(url.to_owned());
                ().serve(transport)
                    .await
                    .map_err(|e| AssistantError::McpConnection(format!("HTTP serve: {}", e)))?
            }
            McpTransportConfig::Stdio {
                command,
                args,
                envs,
            } => {
                let transport = rmcp::transport::child_process::TokioChildProcess::new(
                    tokio::process::Command::new(command).configure(|cmd| {
                        cmd.args(args);
                        cmd.envs(envs);
                        cmd.stderr(Stdio::null());
                        cmd.stdout(Stdio::null());
                    }),
                )?;
                ().serve(transport)
                    .await
                    .map_err(|e| AssistantError::McpConnection(format!("Stdio serve: {}", e)))?
            }
        };
        Ok(client)
    }
}

/// Tool served by a connected MCP server.
pub struct RemoteTool {
    name: String,
    description: String,
    parameters: Value,
    client: Arc<RunningService<RoleClient, ()>>,
}

impl RemoteTool {
    pub fn new(client: Arc<RunningService<RoleClient, ()>>, tool: McpTool) -> Self {
        Self {
            name: tool.name.to_string(),
            description: tool.description.unwrap_or_default().to_string(),
            parameters: serde_json::to_value(&tool.input_schema).unwrap_or(serde_json::json!({})),
            client,
        }
    }
}

#[async_trait]
impl Tool for RemoteTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.parameters.clone()
    }

    async fn call(&self, args: Value) -> Result<Value, AssistantError> {
        let arguments = match args {
            Value::Object(map) => Some(map),
            _ => None,
        };

        let result = self
            .client
            .call_tool(CallToolRequestParam {
                name: self.name.clone().into(),
                arguments,
            })
            .await
            .map_err(|e| AssistantError::ToolExecution(format!("MCP tool call failed: {}", e)))?;

        Ok(serde_json::json!({
            "is_error": result.is_error,
            "content": result.content
        }))
    }
}

pub async fn get_mcp_tools(
    client: Arc<RunningService<RoleClient, ()>>,
) -> Result<Vec<RemoteTool>, AssistantError> {
    let tools = client
        .list_all_tools()
        .await
        .map_err(|e| AssistantError::McpConnection(format!("Failed to list tools: {}", e)))?;

    Ok(tools
        .into_iter()
        .map(|tool| RemoteTool::new(client.clone(), tool))
        .collect())
}

/// Connects every enabled server and registers its tools. A server that
/// fails to come up is skipped with a warning so one dead server does not
/// take the whole tool surface down. Returns how many tools were added.
pub async fn register_mcp_tools(servers: &[McpServerConfig], registry: &ToolRegistry) -> usize {
    let mut added = 0;
    for server in servers.iter().filter(|s| s.enabled) {
        let client = match server.transport.start().await {
            Ok(client) => Arc::new(client),
            Err(e) => {
                tracing::warn!(server = %server.name, error = %e, "skipping MCP server");
                continue;
            }
        };
        match get_mcp_tools(client).await {
            Ok(tools) => {
                for tool in tools {
                    tracing::debug!(server = %server.name, tool = %tool.name(), "registered MCP tool");
                    registry.register(Arc::new(tool));
                    added += 1;
                }
            }
            Err(e) => {
                tracing::warn!(server = %server.name, error = %e, "could not list MCP tools");
            }
        }
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_transport_forms() {
        let yaml = r#"
name: files
type: stdio
command: mcp-files
args: ["--root", "/tmp"]
"#;
        let server: McpServerConfig = serde_yml::from_str(yaml).unwrap();
        assert!(server.enabled);
        assert!(matches!(
            server.transport,
            McpTransportConfig::Stdio { ref command, .. } if command == "mcp-files"
        ));

        let yaml = r#"
name: search
enabled: false
type: streamable-http
url: http://localhost:9000/mcp
"#;
        let server: McpServerConfig = serde_yml::from_str(yaml).unwrap();
        assert!(!server.enabled);
        assert!(matches!(
            server.transport,
            McpTransportConfig::StreamableHttp { .. }
        ));
    }
}

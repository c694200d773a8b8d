use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AgentConfig;
use crate::services::wallet::WalletStore;
use crate::utils::error::AgentError;

/// Factory for conversational agent handles.
///
/// Construction is the expensive path: the runtime provisions a wallet and
/// boots a full agent instance behind it, which is why admission control
/// bounds how many constructions can be live at once.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AgentFactory: Send + Sync {
    async fn construct(&self) -> Result<Arc<dyn AgentHandle>, AgentError>;
}

/// One running agent instance. Opaque to the session layer: the core only
/// forwards messages and returns the aggregated reply.
#[async_trait]
pub trait AgentHandle: Send + Sync {
    async fn converse(&self, message: &str) -> Result<String, AgentError>;
}

#[derive(Debug, Serialize)]
struct ConstructAgentRequest<'a> {
    model: &'a str,
    temperature: f32,
    network_id: &'a str,
    instructions: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    wallet_data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConstructAgentResponse {
    agent_id: String,
    #[serde(default)]
    wallet_data: Option<String>,
}

#[derive(Debug, Serialize)]
struct ConverseRequest<'a> {
    message: &'a str,
    stream: bool,
}

// Local chunk struct for the runtime's SSE frames
#[derive(Debug, Deserialize)]
struct ConverseChunk {
    #[serde(default)]
    delta: Option<String>,
    #[serde(default)]
    tool_log: Option<String>,
}

/// Reqwest-backed client for the agent runtime.
pub struct AgentService {
    client: Client,
    config: AgentConfig,
    wallet: WalletStore,
    instructions: String,
}

impl AgentService {
    pub fn new(config: AgentConfig, wallet: WalletStore, instructions: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(config.timeout_seconds))
                .build()
                .expect("Failed to create HTTP client"),
            config,
            wallet,
            instructions,
        }
    }
}

#[async_trait]
impl AgentFactory for AgentService {
    /// Construct a new agent on the runtime, feeding it the persisted
    /// wallet blob and re-persisting whatever the runtime exports back.
    async fn construct(&self) -> Result<Arc<dyn AgentHandle>, AgentError> {
        let wallet_data = self.wallet.load().await;

        let request = ConstructAgentRequest {
            model: &self.config.model,
            temperature: self.config.temperature,
            network_id: &self.config.network_id,
            instructions: &self.instructions,
            wallet_data,
        };

        let response = self
            .client
            .post(format!("{}/v1/agents", self.config.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| AgentError::Construction(format!("Failed to call agent runtime: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Construction(format!(
                "Agent runtime error: {} - {}",
                status, body
            )));
        }

        let constructed: ConstructAgentResponse = response.json().await.map_err(|e| {
            AgentError::Construction(format!("Failed to parse construct response: {}", e))
        })?;

        // Export wallet data so the next construction reuses the wallet
        if let Some(blob) = &constructed.wallet_data {
            self.wallet.persist(blob).await;
        }

        debug!("Constructed agent [{}]", constructed.agent_id);

        Ok(Arc::new(RemoteAgentHandle {
            client: self.client.clone(),
            base_url: self.config.base_url.clone(),
            agent_id: constructed.agent_id,
        }))
    }
}

/// Handle to an agent hosted by the runtime.
struct RemoteAgentHandle {
    client: Client,
    base_url: String,
    agent_id: String,
}

#[async_trait]
impl AgentHandle for RemoteAgentHandle {
    /// Send one message and aggregate the streamed reply. Tool invocations
    /// reported by the runtime are folded in as `(tool)` lines so the
    /// caller sees everything the agent did.
    async fn converse(&self, message: &str) -> Result<String, AgentError> {
        debug!("Sending message to agent [{}]", self.agent_id);

        let response = self
            .client
            .post(format!(
                "{}/v1/agents/{}/messages",
                self.base_url, self.agent_id
            ))
            .json(&ConverseRequest {
                message,
                stream: true,
            })
            .send()
            .await
            .map_err(|e| AgentError::Conversation(format!("Failed to call agent runtime: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Conversation(format!(
                "Agent runtime error: {} - {}",
                status, body
            )));
        }

        let mut stream = response.bytes_stream();
        let mut reply = String::new();
        let mut buffer = String::new();

        while let Some(chunk) = stream.next().await {
            let bytes =
                chunk.map_err(|e| AgentError::Conversation(format!("Stream error: {}", e)))?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            // SSE frames are newline-delimited; a partial line stays in the
            // buffer until the next chunk completes it.
            while let Some(pos) = buffer.find('\n') {
                let line = buffer[..pos].trim().to_string();
                buffer.drain(..=pos);

                let Some(json_str) = line.strip_prefix("data: ") else {
                    continue;
                };

                if json_str == "[DONE]" {
                    return Ok(reply);
                }

                if let Ok(event) = serde_json::from_str::<ConverseChunk>(json_str) {
                    if let Some(delta) = event.delta {
                        reply.push_str(&delta);
                    }
                    if let Some(tool_log) = event.tool_log {
                        reply.push_str(&format!("(tool) {}\n", tool_log));
                    }
                }
            }
        }

        Ok(reply)
    }
}

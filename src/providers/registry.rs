use super::factory::ClientFactory;
use super::{LlmClient, ModelInfo, Provider};
use crate::core::error::AssistantError;
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Clone)]
struct CurrentClient {
    provider: Provider,
    client: Arc<dyn LlmClient>,
}

struct RegistryState {
    providers: Vec<Provider>,
    primary: Option<String>,
    current: Option<CurrentClient>,
}

/// Holds the configured provider entries and the single active client.
/// Switching providers replaces the active client wholesale; concurrent
/// switches serialize on the lock and the last one wins.
pub struct ProviderRegistry {
    factory: ClientFactory,
    inner: RwLock<RegistryState>,
}

impl ProviderRegistry {
    pub fn new(factory: ClientFactory) -> Self {
        Self {
            factory,
            inner: RwLock::new(RegistryState {
                providers: Vec::new(),
                primary: None,
                current: None,
            }),
        }
    }

    pub fn with_providers(
        factory: ClientFactory,
        providers: Vec<Provider>,
        primary: Option<String>,
    ) -> Self {
        Self {
            factory,
            inner: RwLock::new(RegistryState {
                providers,
                primary,
                current: None,
            }),
        }
    }

    pub fn list(&self) -> Vec<Provider> {
        self.inner.read().providers.clone()
    }

    pub fn get(&self, id: &str) -> Option<Provider> {
        self.inner
            .read()
            .providers
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    /// Replaces (or adds) a provider entry. When the entry backs the active
    /// client the client is rebuilt with the new settings; if that rebuild
    /// fails the stale client is dropped rather than left serving the old
    /// configuration.
    pub fn update_provider(&self, provider: Provider) -> Result<(), AssistantError> {
        let mut state = self.inner.write();
        match state.providers.iter_mut().find(|p| p.id == provider.id) {
            Some(slot) => *slot = provider.clone(),
            None => state.providers.push(provider.clone()),
        }

        let is_current = state
            .current
            .as_ref()
            .is_some_and(|c| c.provider.id == provider.id);
        if is_current {
            match self.factory.create(&provider) {
                Ok(client) => {
                    state.current = Some(CurrentClient { provider, client });
                }
                Err(e) => {
                    state.current = None;
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    pub fn set_primary(&self, id: &str) -> Result<(), AssistantError> {
        let mut state = self.inner.write();
        if !state.providers.iter().any(|p| p.id == id) {
            return Err(AssistantError::ProviderNotFound(id.to_string()));
        }
        state.primary = Some(id.to_string());
        Ok(())
    }

    pub fn primary(&self) -> Option<Provider> {
        let state = self.inner.read();
        let id = state.primary.as_deref()?;
        state.providers.iter().find(|p| p.id == id).cloned()
    }

    /// Switches the active client to the named provider. Validates the entry
    /// before touching the current client, so a failed switch leaves the
    /// previous client in place.
    pub fn make_current(&self, id: &str) -> Result<Arc<dyn LlmClient>, AssistantError> {
        let mut state = self.inner.write();
        let provider = state
            .providers
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| AssistantError::ProviderNotFound(id.to_string()))?;
        if !provider.enabled {
            return Err(AssistantError::ProviderDisabled(id.to_string()));
        }

        let client =
            self.factory
                .create(&provider)
                .map_err(|e| AssistantError::ProviderSwitchFailed {
                    provider: id.to_string(),
                    reason: e.to_string(),
                })?;
        tracing::info!(provider = %id, "switched active provider");
        state.current = Some(CurrentClient {
            provider,
            client: client.clone(),
        });
        Ok(client)
    }

    pub fn current_client(&self) -> Option<Arc<dyn LlmClient>> {
        self.inner.read().current.as_ref().map(|c| c.client.clone())
    }

    pub fn current_provider(&self) -> Option<Provider> {
        self.inner.read().current.as_ref().map(|c| c.provider.clone())
    }

    /// Probes the active client. No active client means not healthy.
    pub async fn health_check(&self) -> Result<bool, AssistantError> {
        let client = match self.current_client() {
            Some(client) => client,
            None => return Ok(false),
        };
        client.health_check().await
    }

    /// Probes a candidate provider entry with a throwaway client, without
    /// disturbing the active one. The candidate does not have to be
    /// registered.
    pub async fn test_provider(&self, provider: &Provider) -> Result<bool, AssistantError> {
        let client = match self.factory.create(provider) {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(provider = %provider.id, error = %e, "provider test could not build a client");
                return Ok(false);
            }
        };
        client.health_check().await
    }

    /// Lists models for the named provider, or for the active one when no
    /// name is given.
    pub async fn get_models(&self, provider_id: Option<&str>) -> Result<Vec<ModelInfo>, AssistantError> {
        let client = match provider_id {
            None => self
                .current_client()
                .ok_or(AssistantError::NoProviderConfigured)?,
            Some(id) => {
                let reuse = {
                    let state = self.inner.read();
                    state
                        .current
                        .as_ref()
                        .filter(|c| c.provider.id == id)
                        .map(|c| c.client.clone())
                };
                match reuse {
                    Some(client) => client,
                    None => {
                        let provider = self
                            .get(id)
                            .ok_or_else(|| AssistantError::ProviderNotFound(id.to_string()))?;
                        self.factory.create(&provider)?
                    }
                }
            }
        };
        client.list_models().await
    }
}

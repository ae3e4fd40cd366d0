//! Provider registry: tracks configured provider instances, their declared
//! capabilities and their lifecycle.

use std::sync::Arc;

use dashmap::DashMap;

use super::capability::ProviderCapability;
use super::traits::{MusicProvider, PlayerProvider};
use crate::{Error, Result};

#[derive(Default)]
pub struct ProviderRegistry {
    music_providers: DashMap<String, Arc<dyn MusicProvider>>,
    player_providers: DashMap<String, Arc<dyn PlayerProvider>>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a music provider instance, running its start hook first.
    pub async fn register(&self, provider: Arc<dyn MusicProvider>) -> Result<()> {
        provider.start().await?;
        let instance_id = provider.instance_id().to_string();
        tracing::info!(
            instance_id = %instance_id,
            domain = provider.domain(),
            "music provider registered"
        );
        self.music_providers.insert(instance_id, provider);
        Ok(())
    }

    /// Unregister an instance, running its stop hook.
    pub async fn unregister(&self, instance_id: &str) -> Result<()> {
        if let Some((_, provider)) = self.music_providers.remove(instance_id) {
            provider.stop().await?;
            tracing::info!(instance_id, "music provider unregistered");
        }
        Ok(())
    }

    /// Stop and start an instance in place.
    pub async fn reload(&self, instance_id: &str) -> Result<()> {
        let provider = self
            .get(instance_id)
            .ok_or_else(|| Error::MediaNotFound(format!("Provider not found: {instance_id}")))?;
        provider.reload().await
    }

    /// Look up a provider by instance id, falling back to the first
    /// instance of a matching domain.
    #[must_use]
    pub fn get(&self, instance_id_or_domain: &str) -> Option<Arc<dyn MusicProvider>> {
        if let Some(provider) = self.music_providers.get(instance_id_or_domain) {
            return Some(provider.clone());
        }
        self.music_providers
            .iter()
            .find(|entry| entry.value().domain() == instance_id_or_domain)
            .map(|entry| entry.value().clone())
    }

    /// All registered, currently available music providers.
    #[must_use]
    pub fn providers(&self) -> Vec<Arc<dyn MusicProvider>> {
        self.music_providers
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|provider| provider.is_available())
            .collect()
    }

    /// Available providers declaring the given capability.
    #[must_use]
    pub fn providers_supporting(&self, capability: ProviderCapability) -> Vec<Arc<dyn MusicProvider>> {
        self.providers()
            .into_iter()
            .filter(|provider| provider.supports(capability))
            .collect()
    }

    /// One provider per domain (fan-out targets for versions/match lookups:
    /// querying two accounts of the same service would only produce
    /// duplicates).
    #[must_use]
    pub fn unique_providers(&self) -> Vec<Arc<dyn MusicProvider>> {
        let mut seen = std::collections::HashSet::new();
        self.providers()
            .into_iter()
            .filter(|provider| seen.insert(provider.domain().to_string()))
            .collect()
    }

    pub fn register_player_provider(&self, provider: Arc<dyn PlayerProvider>) {
        tracing::info!(
            instance_id = provider.instance_id(),
            domain = provider.domain(),
            "player provider registered"
        );
        self.player_providers
            .insert(provider.instance_id().to_string(), provider);
    }

    #[must_use]
    pub fn get_player_provider(&self, instance_id: &str) -> Option<Arc<dyn PlayerProvider>> {
        self.player_providers
            .get(instance_id)
            .map(|entry| entry.value().clone())
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("music_providers", &self.music_providers.len())
            .field("player_providers", &self.player_providers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;

    struct MockProvider {
        instance_id: String,
        domain: String,
    }

    #[async_trait]
    impl MusicProvider for MockProvider {
        fn instance_id(&self) -> &str {
            &self.instance_id
        }
        fn domain(&self) -> &str {
            &self.domain
        }
        fn capabilities(&self) -> HashSet<ProviderCapability> {
            HashSet::from([ProviderCapability::Search])
        }
    }

    fn mock(instance_id: &str, domain: &str) -> Arc<dyn MusicProvider> {
        Arc::new(MockProvider {
            instance_id: instance_id.to_string(),
            domain: domain.to_string(),
        })
    }

    #[tokio::test]
    async fn test_lookup_by_instance_and_domain() {
        let registry = ProviderRegistry::new();
        registry.register(mock("spotify--main", "spotify")).await.unwrap();

        assert!(registry.get("spotify--main").is_some());
        assert!(registry.get("spotify").is_some());
        assert!(registry.get("qobuz").is_none());
    }

    #[tokio::test]
    async fn test_unique_providers_one_per_domain() {
        let registry = ProviderRegistry::new();
        registry.register(mock("spotify--a", "spotify")).await.unwrap();
        registry.register(mock("spotify--b", "spotify")).await.unwrap();
        registry.register(mock("qobuz--a", "qobuz")).await.unwrap();

        assert_eq!(registry.providers().len(), 3);
        assert_eq!(registry.unique_providers().len(), 2);
    }

    #[tokio::test]
    async fn test_providers_supporting() {
        let registry = ProviderRegistry::new();
        registry.register(mock("spotify--a", "spotify")).await.unwrap();

        assert_eq!(
            registry
                .providers_supporting(ProviderCapability::Search)
                .len(),
            1
        );
        assert!(registry
            .providers_supporting(ProviderCapability::SimilarTracks)
            .is_empty());
    }

    #[tokio::test]
    async fn test_unregister() {
        let registry = ProviderRegistry::new();
        registry.register(mock("spotify--a", "spotify")).await.unwrap();
        registry.unregister("spotify--a").await.unwrap();
        assert!(registry.get("spotify--a").is_none());
    }
}

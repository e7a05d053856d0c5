//! Named provider slots.

use std::sync::{Arc, PoisonError, RwLock};

use crate::config::EngineConfig;
use crate::error::{ComposerError, Result};

use super::{create_provider, ModelProvider};

/// Logical provider slots and the currently active one.
///
/// Sessions store slot ids only, so replacing the provider behind a slot or
/// changing the active slot never touches session state.
pub struct ProviderRegistry {
    slots: RwLock<Vec<Arc<dyn ModelProvider>>>,
    active: RwLock<String>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("slots", &self.ids())
            .field("active", &self.active_id())
            .finish()
    }
}

impl ProviderRegistry {
    /// Registry over already constructed providers; the first one is active.
    pub fn new(providers: Vec<Arc<dyn ModelProvider>>) -> Result<Self> {
        let active = providers
            .first()
            .map(|p| p.describe().id.clone())
            .ok_or_else(|| ComposerError::Configuration("no providers registered".into()))?;
        Ok(Self {
            slots: RwLock::new(providers),
            active: RwLock::new(active),
        })
    }

    /// Build every configured provider.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let providers = config
            .providers
            .iter()
            .map(create_provider)
            .collect::<Result<Vec<_>>>()?;
        let registry = Self::new(providers)?;
        registry.set_active(&config.active_provider)?;
        Ok(registry)
    }

    /// Add a provider, replacing any slot with the same id.
    pub fn insert(&self, provider: Arc<dyn ModelProvider>) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let id = provider.describe().id.clone();
        match slots.iter_mut().find(|p| p.describe().id == id) {
            Some(slot) => *slot = provider,
            None => slots.push(provider),
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn ModelProvider>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|p| p.describe().id == id)
            .cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn ids(&self) -> Vec<String> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|p| p.describe().id.clone())
            .collect()
    }

    pub fn active_id(&self) -> String {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Make `id` the slot used by sessions without an explicit provider.
    pub fn set_active(&self, id: &str) -> Result<()> {
        if !self.contains(id) {
            return Err(ComposerError::Configuration(format!(
                "unknown provider '{id}'"
            )));
        }
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = id.to_string();
        tracing::info!(provider = id, "active provider changed");
        Ok(())
    }

    /// Resolve a slot, defaulting to the active one.
    pub fn resolve(&self, slot: Option<&str>) -> Result<Arc<dyn ModelProvider>> {
        let id = slot.map(str::to_string).unwrap_or_else(|| self.active_id());
        self.get(&id)
            .ok_or_else(|| ComposerError::Configuration(format!("unknown provider '{id}'")))
    }

    /// `preferred` first, then every other slot in registration order.
    pub fn fallback_order(&self, preferred: &str) -> Vec<Arc<dyn ModelProvider>> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        let mut ordered: Vec<_> = slots
            .iter()
            .filter(|p| p.describe().id == preferred)
            .cloned()
            .collect();
        ordered.extend(
            slots
                .iter()
                .filter(|p| p.describe().id != preferred)
                .cloned(),
        );
        ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::provider::ScriptedProvider;

    fn scripted(id: &str) -> Arc<dyn ModelProvider> {
        Arc::new(ScriptedProvider::new(ProviderConfig::scripted(id, true)))
    }

    #[test]
    fn first_provider_is_active_by_default() {
        let registry = ProviderRegistry::new(vec![scripted("a"), scripted("b")]).unwrap();
        assert_eq!(registry.active_id(), "a");
        assert_eq!(registry.resolve(None).unwrap().describe().id, "a");
    }

    #[test]
    fn set_active_rejects_unknown_slot() {
        let registry = ProviderRegistry::new(vec![scripted("a")]).unwrap();
        assert!(registry.set_active("zzz").is_err());
        assert_eq!(registry.active_id(), "a");
    }

    #[test]
    fn fallback_order_puts_preferred_first() {
        let registry =
            ProviderRegistry::new(vec![scripted("a"), scripted("b"), scripted("c")]).unwrap();
        let order: Vec<String> = registry
            .fallback_order("b")
            .iter()
            .map(|p| p.describe().id.clone())
            .collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[test]
    fn insert_replaces_existing_slot() {
        let registry = ProviderRegistry::new(vec![scripted("a")]).unwrap();
        registry.insert(Arc::new(ScriptedProvider::new(ProviderConfig::scripted("a", false))));
        assert_eq!(registry.ids(), vec!["a"]);
        assert!(!registry.get("a").unwrap().capabilities().supports_tools);
    }

    #[test]
    fn empty_registry_is_a_configuration_error() {
        assert!(matches!(
            ProviderRegistry::new(Vec::new()),
            Err(ComposerError::Configuration(_))
        ));
    }
}

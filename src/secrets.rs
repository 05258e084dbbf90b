use crate::error::StoreError;
use crate::store::SettingsStore;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Key the secret set is cached under.
pub const CACHE_KEY: &str = "gocardless_webhooks_secret";

pub type SecretSet = Arc<BTreeSet<String>>;

/// Lazily loaded set of webhook secrets across every settings record.
///
/// Entries never expire; whoever saves settings must call
/// [`SecretCache::invalidate`]. A request racing an invalidation may still
/// verify against the previous set, but that set is never cached.
pub struct SecretCache {
    settings: Arc<dyn SettingsStore>,
    state: RwLock<CacheState>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<&'static str, SecretSet>,
    /// Bumped by every invalidation. A load only populates the cache if no
    /// invalidation happened while it was reading settings.
    generation: u64,
}

impl SecretCache {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            settings,
            state: RwLock::new(CacheState::default()),
        }
    }

    pub async fn get(&self) -> Result<SecretSet, StoreError> {
        let generation = {
            let state = self.state.read().await;
            if let Some(set) = state.entries.get(CACHE_KEY) {
                return Ok(set.clone());
            }
            state.generation
        };

        let secrets: BTreeSet<String> = self
            .settings
            .webhook_secrets()
            .await?
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect();
        tracing::debug!(count = secrets.len(), "loaded webhook secrets");

        let set = Arc::new(secrets);
        let mut state = self.state.write().await;
        if state.generation == generation {
            state.entries.insert(CACHE_KEY, set.clone());
        } else {
            tracing::debug!("secret cache invalidated during load, not caching");
        }
        Ok(set)
    }

    pub async fn invalidate(&self) {
        let mut state = self.state.write().await;
        state.entries.remove(CACHE_KEY);
        state.generation += 1;
        tracing::debug!(generation = state.generation, "webhook secret cache invalidated");
    }
}

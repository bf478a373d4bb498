use crate::core::error::{RegistryError, StoreError};
use crate::core::model::AddonDescriptor;
use crate::core::store::KeyValueStore;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

pub const ADDONS_KEY: &str = "addons";

/// Registered addons, persisted as one JSON list under [`ADDONS_KEY`].
///
/// Insertion order is preserved. Every mutation is written through to the
/// store before it returns.
pub struct AddonRegistry {
    store: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
}

impl AddonRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store, write_lock: Mutex::new(()) }
    }

    pub async fn list(&self) -> Result<Vec<AddonDescriptor>, RegistryError> {
        Ok(self.load().await?)
    }

    pub async fn get(&self, id: &str) -> Result<Option<AddonDescriptor>, RegistryError> {
        Ok(self.load().await?.into_iter().find(|a| a.id == id))
    }

    /// Replaces the entry with the same id in place, or appends.
    pub async fn upsert(&self, descriptor: AddonDescriptor) -> Result<(), RegistryError> {
        let problems = descriptor.validate();
        if !problems.is_empty() {
            return Err(RegistryError::Invalid(problems));
        }

        let _guard = self.write_lock.lock().await;
        let mut addons = self.load().await?;
        match addons.iter_mut().find(|a| a.id == descriptor.id) {
            Some(existing) => {
                info!(addon = %descriptor.id, "updating addon");
                *existing = descriptor;
            }
            None => {
                info!(addon = %descriptor.id, "adding addon");
                addons.push(descriptor);
            }
        }
        self.save(&addons).await?;
        Ok(())
    }

    /// Returns whether an entry was removed. Unknown ids are a no-op.
    pub async fn remove(&self, id: &str) -> Result<bool, RegistryError> {
        let _guard = self.write_lock.lock().await;
        let mut addons = self.load().await?;
        let before = addons.len();
        addons.retain(|a| a.id != id);
        if addons.len() == before {
            return Ok(false);
        }
        info!(addon = %id, "removing addon");
        self.save(&addons).await?;
        Ok(true)
    }

    async fn load(&self) -> Result<Vec<AddonDescriptor>, StoreError> {
        match self.store.get(ADDONS_KEY).await? {
            None => Ok(Vec::new()),
            Some(raw) if raw.trim().is_empty() => Ok(Vec::new()),
            Some(raw) => serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
                key: ADDONS_KEY.to_string(),
                source,
            }),
        }
    }

    async fn save(&self, addons: &[AddonDescriptor]) -> Result<(), StoreError> {
        let raw = serde_json::to_string(addons)?;
        self.store.set(ADDONS_KEY, &raw).await
    }
}

//! Swappable cell holding the model that serves predictions

use crate::error::RegistryError;
use crate::registry::ModelRegistry;
use crate::trainer::TrainedModel;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Readers clone the `Arc` and drop the lock immediately, so a concurrent
/// swap never exposes a half-replaced model
#[derive(Debug, Default)]
pub struct ModelHandle {
    model: RwLock<Option<Arc<TrainedModel>>>,
}

impl ModelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(model: TrainedModel) -> Self {
        Self {
            model: RwLock::new(Some(Arc::new(model))),
        }
    }

    pub fn current(&self) -> Option<Arc<TrainedModel>> {
        self.model
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in a new model, returning the one it replaced
    pub fn replace(&self, model: TrainedModel) -> Option<Arc<TrainedModel>> {
        let mut slot = self.model.write().unwrap_or_else(PoisonError::into_inner);
        slot.replace(Arc::new(model))
    }

    pub fn is_loaded(&self) -> bool {
        self.model
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Current model, loading it from the registry on first use
    pub fn get_or_load(&self, registry: &ModelRegistry) -> Result<Arc<TrainedModel>, RegistryError> {
        if let Some(model) = self.current() {
            return Ok(model);
        }

        let loaded = Arc::new(registry.load()?);
        let mut slot = self.model.write().unwrap_or_else(PoisonError::into_inner);
        // A concurrent train may have won the race; keep its model.
        if let Some(existing) = slot.as_ref() {
            return Ok(Arc::clone(existing));
        }
        debug!(path = %registry.path().display(), "Model loaded into handle");
        *slot = Some(Arc::clone(&loaded));
        Ok(loaded)
    }
}

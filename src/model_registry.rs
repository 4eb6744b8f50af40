//! Process-owned cache of loaded in-process models.
//!
//! Each model name gets its own slot. The first caller for a name loads it while holding that
//! slot's lock; concurrent callers for the same name wait and then share the loaded instance.
//! Different names never wait on each other. A failed load leaves the slot empty so a later call
//! can retry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use tracing::info;

type Loader<M> = Box<dyn Fn(&str) -> Result<M> + Send + Sync>;
type Slot<M> = Arc<Mutex<Option<Arc<M>>>>;

pub struct ModelRegistry<M> {
    loader: Loader<M>,
    slots: Mutex<HashMap<String, Slot<M>>>,
}

impl<M> ModelRegistry<M> {
    pub fn new(loader: impl Fn(&str) -> Result<M> + Send + Sync + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached model for `name`, loading it on first use.
    pub fn get_or_load(&self, name: &str) -> Result<Arc<M>> {
        let slot = self.slot(name);
        let mut guard = lock(&slot);
        if let Some(model) = guard.as_ref() {
            return Ok(Arc::clone(model));
        }

        info!(model = name, "loading model");
        let model = Arc::new((self.loader)(name)?);
        *guard = Some(Arc::clone(&model));
        Ok(model)
    }

    /// The cached model for `name`, without loading.
    pub fn get(&self, name: &str) -> Option<Arc<M>> {
        let slot = lock(&self.slots).get(name).cloned()?;
        let guard = lock(&slot);
        guard.as_ref().map(Arc::clone)
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    fn slot(&self, name: &str) -> Slot<M> {
        let mut slots = lock(&self.slots);
        Arc::clone(slots.entry(name.to_owned()).or_default())
    }
}

// A panicking loader never stores a partial model, so a poisoned slot is still consistent.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

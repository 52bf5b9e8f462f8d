//! Lazily loaded, process-wide conversion resources (models, renderers)

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A single shared resource, loaded on first use.
///
/// Concurrent callers of [`get_or_init`](Self::get_or_init) wait for the one
/// in-flight load instead of starting their own. [`teardown`](Self::teardown)
/// drops the cached value so the next caller reloads it.
pub struct ResourceCache<R> {
    slot: Mutex<Option<Arc<R>>>,
    loads: AtomicUsize,
}

impl<R> ResourceCache<R> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            loads: AtomicUsize::new(0),
        }
    }

    /// Return the cached resource, running `loader` if there is none
    pub async fn get_or_init<F, Fut, E>(&self, loader: F) -> Result<Arc<R>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(resource) = slot.as_ref() {
            return Ok(resource.clone());
        }

        let resource = Arc::new(loader().await?);
        let n = self.loads.fetch_add(1, Ordering::Relaxed) + 1;
        info!(loads = n, "Resource loaded");
        *slot = Some(resource.clone());
        Ok(resource)
    }

    /// The resource, if it is currently loaded
    pub async fn get(&self) -> Option<Arc<R>> {
        self.slot.lock().await.clone()
    }

    /// Drop the cached resource. Returns whether one was loaded.
    pub async fn teardown(&self) -> bool {
        let released = self.slot.lock().await.take().is_some();
        if released {
            debug!("Resource released");
        }
        released
    }

    /// How many times a loader has completed
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }
}

impl<R> Default for ResourceCache<R> {
    fn default() -> Self {
        Self::new()
    }
}

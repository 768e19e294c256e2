//! The process-wide holder of the active configuration snapshot.

use crate::config::RenderableConfig;
use arc_swap::ArcSwap;
use std::sync::Arc;

/// Holds the current [`RenderableConfig`] behind an atomic pointer.
///
/// Readers take one `Arc` at the start of a request and keep using it, so a
/// reload that lands mid-request is never observed half-applied. A store
/// cannot exist without a snapshot: it is created from the first successful
/// load.
#[derive(Debug)]
pub struct ConfigStore {
    current: ArcSwap<RenderableConfig>,
}

impl ConfigStore {
    pub fn new(initial: RenderableConfig) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    /// Returns the active snapshot.
    pub fn current(&self) -> Arc<RenderableConfig> {
        self.current.load_full()
    }

    /// Makes `next` the active snapshot.
    pub fn replace(&self, next: RenderableConfig) {
        self.current.store(Arc::new(next));
    }
}

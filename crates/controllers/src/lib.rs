use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use shared::domain::DocumentDescriptor;

mod factory;
mod registry;
pub mod text;

pub use factory::{ContentFilter, ControllerFactory};
pub use registry::{ControllerFactoryRegistry, Resolution};

/// Callback a document installs to hear about dirty-state flips.
#[derive(Clone)]
pub struct DirtyListener(Arc<dyn Fn(bool) + Send + Sync>);

impl DirtyListener {
    pub fn new(callback: impl Fn(bool) + Send + Sync + 'static) -> Self {
        Self(Arc::new(callback))
    }

    pub fn notify(&self, dirty: bool) {
        (self.0)(dirty)
    }
}

impl fmt::Debug for DirtyListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DirtyListener")
    }
}

/// Dirty flag with change notification, for controllers to embed.
#[derive(Debug, Default)]
pub struct DirtyState {
    dirty: AtomicBool,
    listener: Mutex<Option<DirtyListener>>,
}

impl DirtyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Updates the flag; the listener only hears effective changes.
    pub fn set_dirty(&self, dirty: bool) {
        if self.dirty.swap(dirty, Ordering::SeqCst) == dirty {
            return;
        }
        let listener = self.listener.lock().clone();
        if let Some(listener) = listener {
            listener.notify(dirty);
        }
    }

    pub fn set_listener(&self, listener: DirtyListener) {
        *self.listener.lock() = Some(listener);
    }
}

/// The live unit that renders or edits one view of a document.
///
/// A controller is owned by exactly one document. `dispose` is called at most
/// once by the owning document, and may be called even when `initialize`
/// never completed.
#[async_trait]
pub trait DocumentController: Send + Sync {
    async fn initialize(&self, descriptor: Option<&DocumentDescriptor>) -> Result<()>;
    fn is_dirty(&self) -> bool;
    /// Must be a no-op when the controller is clean.
    async fn save(&self) -> Result<()>;
    async fn dispose(&self) -> Result<()>;

    /// Descriptor backing a controller that was constructed by the caller.
    fn descriptor(&self) -> Option<DocumentDescriptor> {
        None
    }

    fn title(&self) -> Option<String> {
        None
    }

    fn set_dirty_listener(&self, _listener: DirtyListener) {}

    /// Called after the owning document moved to `descriptor`.
    async fn renamed(&self, _descriptor: &DocumentDescriptor) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/dirty_state_tests.rs"]
mod tests;

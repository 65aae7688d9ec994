use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::Serialize;
use shared::domain::{DocumentId, WindowId};
use tracing::{debug, warn};

/// Receives window signals that originate in the shell.
#[async_trait]
pub trait WindowSignalSink: Send + Sync {
    async fn window_focused(&self, window: WindowId);
    /// The window is gone; it will not be closed again.
    async fn window_destroyed(&self, window: WindowId);
}

/// Windowing surface the document manager presents documents through.
///
/// The shell owns its windows. Implementations report user-driven focus and
/// destruction to the attached sink, and should echo `select_window` as a
/// focus signal once the window actually has focus.
#[async_trait]
pub trait Shell: Send + Sync {
    fn attach_signal_sink(&self, sink: Arc<dyn WindowSignalSink>);
    async fn create_window(&self, document: DocumentId, title: &str) -> Result<WindowId>;
    async fn close_window(&self, window: WindowId) -> Result<()>;
    async fn select_window(&self, window: WindowId) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowRecord {
    pub id: WindowId,
    pub document: DocumentId,
    pub title: String,
}

#[derive(Default)]
struct HeadlessState {
    next_window: u64,
    windows: Vec<WindowRecord>,
    focused: Option<WindowId>,
}

/// In-process shell without any real windows.
#[derive(Default)]
pub struct HeadlessShell {
    state: Mutex<HeadlessState>,
    sink: RwLock<Option<Arc<dyn WindowSignalSink>>>,
}

impl HeadlessShell {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, HeadlessState> {
        self.state.lock()
    }

    fn sink(&self) -> Option<Arc<dyn WindowSignalSink>> {
        self.sink.read().clone()
    }

    /// Open windows in creation order.
    pub fn windows(&self) -> Vec<WindowRecord> {
        self.state().windows.clone()
    }

    pub fn window_for(&self, document: DocumentId) -> Option<WindowRecord> {
        self.state()
            .windows
            .iter()
            .find(|record| record.document == document)
            .cloned()
    }

    pub fn focused(&self) -> Option<WindowId> {
        self.state().focused
    }

    /// Simulates the user clicking a window.
    pub async fn user_select(&self, window: WindowId) -> Result<()> {
        self.focus(window).await
    }

    /// Simulates the user (or the platform) tearing a window down.
    pub async fn user_destroy(&self, window: WindowId) -> Result<()> {
        self.remove(window)?;
        if let Some(sink) = self.sink() {
            sink.window_destroyed(window).await;
        }
        Ok(())
    }

    async fn focus(&self, window: WindowId) -> Result<()> {
        {
            let mut state = self.state();
            if !state.windows.iter().any(|record| record.id == window) {
                return Err(anyhow!("unknown window {window}"));
            }
            state.focused = Some(window);
        }
        match self.sink() {
            Some(sink) => sink.window_focused(window).await,
            None => warn!(%window, "window focused with no signal sink attached"),
        }
        Ok(())
    }

    fn remove(&self, window: WindowId) -> Result<WindowRecord> {
        let mut state = self.state();
        let index = state
            .windows
            .iter()
            .position(|record| record.id == window)
            .ok_or_else(|| anyhow!("unknown window {window}"))?;
        let record = state.windows.remove(index);
        if state.focused == Some(window) {
            state.focused = None;
        }
        Ok(record)
    }
}

#[async_trait]
impl Shell for HeadlessShell {
    fn attach_signal_sink(&self, sink: Arc<dyn WindowSignalSink>) {
        *self.sink.write() = Some(sink);
    }

    async fn create_window(&self, document: DocumentId, title: &str) -> Result<WindowId> {
        let mut state = self.state();
        state.next_window += 1;
        let id = WindowId(state.next_window);
        state.windows.push(WindowRecord {
            id,
            document,
            title: title.to_string(),
        });
        debug!(window = %id, %document, title, "window created");
        Ok(id)
    }

    async fn close_window(&self, window: WindowId) -> Result<()> {
        let record = self.remove(window)?;
        debug!(window = %record.id, document = %record.document, "window closed");
        Ok(())
    }

    async fn select_window(&self, window: WindowId) -> Result<()> {
        self.focus(window).await
    }
}

#[cfg(test)]
#[path = "tests/headless_tests.rs"]
mod tests;

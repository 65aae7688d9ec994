//! Plain-text controller and the factory that offers it.

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use shared::domain::{ControllerDescription, ControllerRole, DocumentDescriptor};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{ContentFilter, ControllerFactory, DirtyListener, DirtyState, DocumentController};

#[derive(Default)]
struct TextBuffer {
    text: String,
    path: Option<PathBuf>,
    loaded: bool,
}

pub struct TextFileController {
    role: ControllerRole,
    buffer: Mutex<TextBuffer>,
    dirty: DirtyState,
    disposed: AtomicBool,
}

impl TextFileController {
    pub fn new(role: ControllerRole) -> Self {
        Self {
            role,
            buffer: Mutex::new(TextBuffer::default()),
            dirty: DirtyState::new(),
            disposed: AtomicBool::new(false),
        }
    }

    pub async fn text(&self) -> String {
        self.buffer.lock().await.text.clone()
    }

    pub async fn set_text(&self, text: impl Into<String>) -> Result<()> {
        if self.role == ControllerRole::Preview {
            return Err(anyhow!("preview views are read-only"));
        }
        let mut buffer = self.buffer.lock().await;
        if !buffer.loaded {
            return Err(anyhow!("text controller is not initialized"));
        }
        buffer.text = text.into();
        drop(buffer);
        self.dirty.set_dirty(true);
        Ok(())
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentController for TextFileController {
    async fn initialize(&self, descriptor: Option<&DocumentDescriptor>) -> Result<()> {
        let descriptor =
            descriptor.ok_or_else(|| anyhow!("text controller requires a descriptor"))?;

        let text = match (descriptor.content(), descriptor.path()) {
            (Some(content), _) => String::from_utf8(content.to_vec())
                .context("descriptor content is not valid UTF-8")?,
            (None, Some(path)) => tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read '{}'", path.display()))?,
            (None, None) => String::new(),
        };

        let mut buffer = self.buffer.lock().await;
        buffer.text = text;
        buffer.path = descriptor.path().map(|path| path.to_path_buf());
        buffer.loaded = true;
        debug!(%descriptor, bytes = buffer.text.len(), "text controller initialized");
        Ok(())
    }

    fn is_dirty(&self) -> bool {
        self.dirty.is_dirty()
    }

    async fn save(&self) -> Result<()> {
        if !self.dirty.is_dirty() {
            return Ok(());
        }
        let buffer = self.buffer.lock().await;
        if let Some(path) = &buffer.path {
            tokio::fs::write(path, buffer.text.as_bytes())
                .await
                .with_context(|| format!("failed to write '{}'", path.display()))?;
        }
        drop(buffer);
        self.dirty.set_dirty(false);
        Ok(())
    }

    async fn renamed(&self, descriptor: &DocumentDescriptor) -> Result<()> {
        let mut buffer = self.buffer.lock().await;
        if buffer.path.is_some() {
            buffer.path = descriptor.path().map(|path| path.to_path_buf());
        }
        Ok(())
    }

    async fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut buffer = self.buffer.lock().await;
        buffer.text.clear();
        buffer.loaded = false;
        Ok(())
    }

    fn set_dirty_listener(&self, listener: DirtyListener) {
        self.dirty.set_listener(listener);
    }
}

/// Offers a default source view and a read-only preview for text content.
pub struct TextFileControllerFactory {
    filter: ContentFilter,
}

impl TextFileControllerFactory {
    pub fn new() -> Self {
        Self::with_filter(ContentFilter::new().with_mime_type("text/*"))
    }

    pub fn with_filter(filter: ContentFilter) -> Self {
        Self { filter }
    }
}

impl Default for TextFileControllerFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ControllerFactory for TextFileControllerFactory {
    fn name(&self) -> &str {
        "text"
    }

    fn supports(&self, descriptor: &DocumentDescriptor) -> bool {
        self.filter.matches(descriptor)
    }

    fn supported_controllers(&self, _descriptor: &DocumentDescriptor) -> Vec<ControllerDescription> {
        vec![
            ControllerDescription::new("Source", true, ControllerRole::Source),
            ControllerDescription::new("Preview", false, ControllerRole::Preview),
        ]
    }

    async fn create_controller(
        &self,
        _descriptor: &DocumentDescriptor,
        description: &ControllerDescription,
    ) -> Result<Arc<dyn DocumentController>> {
        Ok(Arc::new(TextFileController::new(description.role)))
    }
}

#[cfg(test)]
#[path = "tests/text_tests.rs"]
mod tests;

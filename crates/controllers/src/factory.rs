use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use shared::domain::{ControllerDescription, DocumentDescriptor};

use crate::DocumentController;

/// Extension point for contributing controllers.
#[async_trait]
pub trait ControllerFactory: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the descriptor's content type or extension is handled at all.
    fn supports(&self, descriptor: &DocumentDescriptor) -> bool;

    /// Views offered for the descriptor, in preference order.
    fn supported_controllers(&self, descriptor: &DocumentDescriptor) -> Vec<ControllerDescription>;

    async fn create_controller(
        &self,
        descriptor: &DocumentDescriptor,
        description: &ControllerDescription,
    ) -> Result<Arc<dyn DocumentController>>;
}

/// Matches descriptors by mime type (exact or `type/*`) or by extension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentFilter {
    mime_types: Vec<String>,
    extensions: Vec<String>,
}

impl ContentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_types.push(mime_type.into().to_ascii_lowercase());
        self
    }

    /// Accepts `rs`, `.rs` or `.RS`.
    pub fn with_extension(mut self, extension: impl AsRef<str>) -> Self {
        let extension = extension.as_ref().trim_start_matches('.').to_ascii_lowercase();
        self.extensions.push(format!(".{extension}"));
        self
    }

    pub fn matches(&self, descriptor: &DocumentDescriptor) -> bool {
        let mime = descriptor.mime_type().to_ascii_lowercase();
        let mime_match = self.mime_types.iter().any(|pattern| {
            match pattern.strip_suffix("/*") {
                Some(family) => mime
                    .split_once('/')
                    .is_some_and(|(candidate, _)| candidate == family),
                None => *pattern == mime,
            }
        });
        if mime_match {
            return true;
        }

        descriptor
            .extension()
            .is_some_and(|ext| self.extensions.iter().any(|known| *known == ext))
    }
}

use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use async_trait::async_trait;

use shared::domain::DocumentIdentity;

use crate::document::Document;

/// Informational lifecycle notifications, delivered in the order they happen.
#[derive(Debug, Clone)]
pub enum DocumentEvent {
    Opened(Document),
    Closed(Document),
    /// `None` once no document is active.
    ActiveChanged(Option<Document>),
    DirtyChanged {
        document: Document,
        dirty: bool,
    },
    /// A controller failed to dispose while its document was closing.
    ControllerDisposeFailed {
        document: Document,
        controller: usize,
        message: String,
    },
    /// The document's file moved; `old` is the identity it was known by.
    Renamed {
        document: Document,
        old: DocumentIdentity,
    },
}

impl DocumentEvent {
    pub fn document(&self) -> Option<&Document> {
        match self {
            DocumentEvent::Opened(document) | DocumentEvent::Closed(document) => Some(document),
            DocumentEvent::ActiveChanged(document) => document.as_ref(),
            DocumentEvent::DirtyChanged { document, .. }
            | DocumentEvent::ControllerDisposeFailed { document, .. }
            | DocumentEvent::Renamed { document, .. } => Some(document),
        }
    }
}

/// Handed to every closing handler of one close attempt. Cancelling is
/// sticky: a later handler cannot undo an earlier veto.
#[derive(Debug, Clone)]
pub struct DocumentClosingEvent {
    document: Document,
    forced: bool,
    cancelled: Arc<AtomicBool>,
}

impl DocumentClosingEvent {
    pub(crate) fn new(document: Document, forced: bool) -> Self {
        Self {
            document,
            forced,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Set when the caller asked to close without prompting.
    pub fn forced(&self) -> bool {
        self.forced
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[async_trait]
pub trait DocumentClosingHandler: Send + Sync {
    async fn on_closing(&self, event: DocumentClosingEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClosingHandlerId(pub u64);

pub struct FnClosingHandler<F>(F);

/// Adapts an async closure into a [`DocumentClosingHandler`].
pub fn closing_handler_fn<F, Fut>(handler: F) -> FnClosingHandler<F>
where
    F: Fn(DocumentClosingEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    FnClosingHandler(handler)
}

#[async_trait]
impl<F, Fut> DocumentClosingHandler for FnClosingHandler<F>
where
    F: Fn(DocumentClosingEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn on_closing(&self, event: DocumentClosingEvent) {
        (self.0)(event).await
    }
}

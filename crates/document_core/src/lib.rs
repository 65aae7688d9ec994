//! Document lifecycle management: which documents are open, which one is
//! active, and the cancellable close protocol.

pub mod config;
mod document;
mod events;
mod manager;

pub use config::{load_settings, load_settings_from, CloseActivation, Settings};
pub use document::{Document, DocumentState, DocumentSummary};
pub use events::{
    closing_handler_fn, ClosingHandlerId, DocumentClosingEvent, DocumentClosingHandler,
    DocumentEvent, FnClosingHandler,
};
pub use manager::{DocumentManager, OpenOptions};
pub use shared::{
    domain::{
        ControllerDescription, ControllerRole, DocumentDescriptor, DocumentId, DocumentIdentity,
        WindowId,
    },
    error::{DocumentError, DocumentResult, ErrorKind},
};

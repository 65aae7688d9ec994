use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
};

use controllers::{DirtyListener, DocumentController};
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use shared::{
    domain::{ControllerDescription, DocumentDescriptor, DocumentId, DocumentIdentity, WindowId},
    error::{DocumentError, DocumentResult},
};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::{events::DocumentEvent, manager::ManagerInner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    Opening,
    Open,
    Closing,
    Closed,
}

pub(crate) struct ControllerSlot {
    pub(crate) controller: Arc<dyn DocumentController>,
    pub(crate) description: Option<ControllerDescription>,
}

struct DocumentSlot {
    identity: DocumentIdentity,
    descriptor: Option<DocumentDescriptor>,
    title: String,
    state: DocumentState,
    /// Disposal has started; the document can no longer be kept alive.
    finalizing: bool,
    controllers: Vec<ControllerSlot>,
    window: Option<WindowId>,
}

pub(crate) struct DocumentInner {
    id: DocumentId,
    manager: Weak<ManagerInner>,
    slot: Mutex<DocumentSlot>,
    close_gate: AsyncMutex<()>,
    published_dirty: AtomicBool,
}

/// Handle to one tracked document. Clones refer to the same document;
/// equality is identity.
#[derive(Clone)]
pub struct Document {
    inner: Arc<DocumentInner>,
}

/// Serializable snapshot of a document, for status output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentSummary {
    pub id: DocumentId,
    pub identity: String,
    pub title: String,
    pub state: DocumentState,
    pub dirty: bool,
    pub views: Vec<String>,
    pub window: Option<WindowId>,
}

impl Document {
    pub(crate) fn new(
        id: DocumentId,
        identity: DocumentIdentity,
        descriptor: Option<DocumentDescriptor>,
        title: String,
        manager: Weak<ManagerInner>,
    ) -> Self {
        Self {
            inner: Arc::new(DocumentInner {
                id,
                manager,
                slot: Mutex::new(DocumentSlot {
                    identity,
                    descriptor,
                    title,
                    state: DocumentState::Opening,
                    finalizing: false,
                    controllers: Vec::new(),
                    window: None,
                }),
                close_gate: AsyncMutex::new(()),
                published_dirty: AtomicBool::new(false),
            }),
        }
    }

    fn slot(&self) -> MutexGuard<'_, DocumentSlot> {
        self.inner.slot.lock()
    }

    pub fn id(&self) -> DocumentId {
        self.inner.id
    }

    /// Current identity; changes when the backing file is renamed.
    pub fn identity(&self) -> DocumentIdentity {
        self.slot().identity.clone()
    }

    pub fn descriptor(&self) -> Option<DocumentDescriptor> {
        self.slot().descriptor.clone()
    }

    pub fn title(&self) -> String {
        self.slot().title.clone()
    }

    pub fn state(&self) -> DocumentState {
        self.slot().state
    }

    pub fn is_closed(&self) -> bool {
        self.state() == DocumentState::Closed
    }

    pub fn window(&self) -> Option<WindowId> {
        self.slot().window
    }

    pub(crate) fn ensure_live(&self) -> DocumentResult<()> {
        if self.is_closed() {
            return Err(DocumentError::DocumentDisposed(self.id()));
        }
        Ok(())
    }

    pub(crate) fn is_finalizing(&self) -> bool {
        let slot = self.slot();
        slot.finalizing || slot.state == DocumentState::Closed
    }

    fn manager(&self) -> DocumentResult<Arc<ManagerInner>> {
        self.inner
            .manager
            .upgrade()
            .ok_or(DocumentError::DocumentDisposed(self.inner.id))
    }

    /// Controllers in the order they were attached.
    pub fn controllers(&self) -> DocumentResult<Vec<Arc<dyn DocumentController>>> {
        let slot = self.slot();
        if slot.state == DocumentState::Closed {
            return Err(DocumentError::DocumentDisposed(self.inner.id));
        }
        Ok(slot
            .controllers
            .iter()
            .map(|entry| Arc::clone(&entry.controller))
            .collect())
    }

    pub fn is_dirty(&self) -> DocumentResult<bool> {
        let slot = self.slot();
        if slot.state == DocumentState::Closed {
            return Err(DocumentError::DocumentDisposed(self.inner.id));
        }
        Ok(slot.controllers.iter().any(|entry| entry.controller.is_dirty()))
    }

    /// Saves every dirty controller, stopping at the first failure.
    pub async fn save(&self) -> DocumentResult<()> {
        for controller in self.controllers()? {
            if !controller.is_dirty() {
                continue;
            }
            controller
                .save()
                .await
                .map_err(|source| DocumentError::Save {
                    identity: self.identity().to_string(),
                    source,
                })?;
        }
        self.refresh_dirty();
        Ok(())
    }

    /// Asks the shell to focus this document's window. The active document
    /// changes when the shell reports the focus back.
    pub async fn select(&self) -> DocumentResult<()> {
        self.ensure_live()?;
        let manager = self.manager()?;
        if manager.is_active(self) {
            return Ok(());
        }
        let Some(window) = self.window() else {
            return Ok(());
        };
        if let Err(error) = manager.shell().select_window(window).await {
            warn!(document = %self.inner.id, %window, %error, "shell failed to select window");
        }
        Ok(())
    }

    /// Runs the close protocol. `Ok(false)` means a closing handler vetoed,
    /// or that the call came from a handler of this document's own close.
    pub async fn close(&self, force: bool) -> DocumentResult<bool> {
        self.ensure_live()?;
        let manager = self.manager()?;
        manager.close_document(self, force).await
    }

    /// Adds an alternate view. The controller is initialized before it
    /// becomes part of the document.
    pub async fn attach_controller(
        &self,
        controller: Arc<dyn DocumentController>,
    ) -> DocumentResult<()> {
        self.attach(controller, None).await
    }

    pub(crate) async fn attach(
        &self,
        controller: Arc<dyn DocumentController>,
        description: Option<ControllerDescription>,
    ) -> DocumentResult<()> {
        self.ensure_live()?;
        if let Err(source) = controller.initialize(self.descriptor().as_ref()).await {
            dispose_quietly(self.inner.id, &controller).await;
            return Err(DocumentError::ControllerInitialization {
                identity: self.identity().to_string(),
                source,
            });
        }

        let attached = {
            let mut slot = self.slot();
            if slot.finalizing || slot.state == DocumentState::Closed {
                false
            } else {
                slot.controllers.push(ControllerSlot {
                    controller: Arc::clone(&controller),
                    description,
                });
                true
            }
        };
        if !attached {
            dispose_quietly(self.inner.id, &controller).await;
            return Err(DocumentError::DocumentDisposed(self.inner.id));
        }

        self.watch_dirty(&controller);
        self.refresh_dirty();
        debug!(document = %self.inner.id, "attached controller");
        Ok(())
    }

    /// Completes `Opening -> Open` once the first controller is initialized
    /// and the window exists.
    pub(crate) fn bind(
        &self,
        controller: Arc<dyn DocumentController>,
        description: Option<ControllerDescription>,
        window: WindowId,
    ) {
        {
            let mut slot = self.slot();
            slot.controllers.push(ControllerSlot {
                controller: Arc::clone(&controller),
                description,
            });
            slot.window = Some(window);
            slot.state = DocumentState::Open;
        }
        self.inner
            .published_dirty
            .store(controller.is_dirty(), Ordering::SeqCst);
        self.watch_dirty(&controller);
    }

    /// `Open -> Closing`. Returns `false` when the document is already being
    /// torn down.
    pub(crate) fn begin_closing(&self) -> bool {
        let mut slot = self.slot();
        if slot.finalizing || slot.state == DocumentState::Closed {
            return false;
        }
        slot.state = DocumentState::Closing;
        true
    }

    /// `Closing -> Open` after a veto. Returns `false` if the document was
    /// torn down while the handlers ran.
    pub(crate) fn abort_closing(&self) -> bool {
        let mut slot = self.slot();
        if slot.finalizing || slot.state == DocumentState::Closed {
            return false;
        }
        slot.state = DocumentState::Open;
        true
    }

    /// Claims disposal. Only the first caller gets the controllers.
    pub(crate) fn take_for_disposal(&self) -> Option<(Vec<ControllerSlot>, Option<WindowId>)> {
        let mut slot = self.slot();
        if slot.finalizing || slot.state == DocumentState::Closed {
            return None;
        }
        slot.finalizing = true;
        slot.state = DocumentState::Closing;
        Some((std::mem::take(&mut slot.controllers), slot.window.take()))
    }

    /// Moves the document to a new identity after its file was renamed.
    /// Returns the controllers to notify.
    pub(crate) fn rekey(
        &self,
        identity: DocumentIdentity,
        descriptor: Option<DocumentDescriptor>,
        title: String,
    ) -> Vec<Arc<dyn DocumentController>> {
        let mut slot = self.slot();
        slot.identity = identity;
        slot.descriptor = descriptor;
        slot.title = title;
        slot.controllers
            .iter()
            .map(|entry| Arc::clone(&entry.controller))
            .collect()
    }

    pub(crate) fn mark_closed(&self) {
        self.slot().state = DocumentState::Closed;
    }

    pub(crate) fn close_gate(&self) -> &AsyncMutex<()> {
        &self.inner.close_gate
    }

    fn watch_dirty(&self, controller: &Arc<dyn DocumentController>) {
        let document = Arc::downgrade(&self.inner);
        controller.set_dirty_listener(DirtyListener::new(move |_| {
            if let Some(inner) = document.upgrade() {
                Document { inner }.refresh_dirty();
            }
        }));
    }

    /// Publishes `DirtyChanged` when the aggregate flag flips.
    fn refresh_dirty(&self) {
        let dirty = match self.is_dirty() {
            Ok(dirty) => dirty,
            Err(_) => return,
        };
        if self.state() == DocumentState::Opening {
            self.inner.published_dirty.store(dirty, Ordering::SeqCst);
            return;
        }
        if self.inner.published_dirty.swap(dirty, Ordering::SeqCst) == dirty {
            return;
        }
        if let Some(manager) = self.inner.manager.upgrade() {
            manager.publish(DocumentEvent::DirtyChanged {
                document: self.clone(),
                dirty,
            });
        }
    }

    pub fn summary(&self) -> DocumentSummary {
        let slot = self.slot();
        DocumentSummary {
            id: self.inner.id,
            identity: slot.identity.to_string(),
            title: slot.title.clone(),
            state: slot.state,
            dirty: slot.controllers.iter().any(|entry| entry.controller.is_dirty()),
            views: slot
                .controllers
                .iter()
                .map(|entry| {
                    entry
                        .description
                        .as_ref()
                        .map(|description| description.name.clone())
                        .unwrap_or_else(|| "custom".to_string())
                })
                .collect(),
            window: slot.window,
        }
    }
}

pub(crate) async fn dispose_quietly(document: DocumentId, controller: &Arc<dyn DocumentController>) {
    if let Err(error) = controller.dispose().await {
        warn!(%document, error = %format!("{error:#}"), "controller disposal failed");
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Document {}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.inner.id)
            .finish_non_exhaustive()
    }
}

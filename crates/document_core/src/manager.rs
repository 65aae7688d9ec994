use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

use async_trait::async_trait;
use controllers::{ControllerFactoryRegistry, DocumentController};
use parking_lot::{Mutex, MutexGuard};
use shared::{
    domain::{
        normalize_full_path, ControllerDescription, ControllerRole, DocumentDescriptor,
        DocumentId, DocumentIdentity, WindowId,
    },
    error::{DocumentError, DocumentResult},
};
use shell::{Shell, WindowSignalSink};
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use crate::{
    config::{CloseActivation, Settings},
    document::{dispose_quietly, Document, DocumentState},
    events::{ClosingHandlerId, DocumentClosingEvent, DocumentClosingHandler, DocumentEvent},
};

tokio::task_local! {
    /// Documents whose close protocol is running in the current task.
    static CLOSING: Vec<DocumentId>;
}

fn closing_in_current_task(document: DocumentId) -> bool {
    CLOSING
        .try_with(|closing| closing.contains(&document))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    pub bring_to_front: bool,
    /// View to create instead of the factory's default.
    pub role: Option<ControllerRole>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            bring_to_front: true,
            role: None,
        }
    }
}

#[derive(Default)]
struct ManagerState {
    documents: Vec<Document>,
    active: Option<Document>,
    /// Activation order, most recent last.
    history: Vec<DocumentId>,
    windows: HashMap<WindowId, DocumentId>,
}

impl ManagerState {
    fn touch(&mut self, id: DocumentId) {
        self.history.retain(|entry| *entry != id);
        self.history.push(id);
    }

    /// The open document known by `identity`, skipping one being disposed.
    fn live(&self, identity: &DocumentIdentity) -> Option<&Document> {
        self.documents
            .iter()
            .find(|document| document.identity() == *identity && !document.is_finalizing())
    }

    fn document(&self, id: DocumentId) -> Option<&Document> {
        self.documents.iter().find(|document| document.id() == id)
    }
}

pub(crate) struct ManagerInner {
    registry: Arc<ControllerFactoryRegistry>,
    shell: Arc<dyn Shell>,
    settings: Settings,
    base_dir: PathBuf,
    state: Mutex<ManagerState>,
    open_gates: Mutex<HashMap<DocumentIdentity, Arc<AsyncMutex<()>>>>,
    closing_handlers: Mutex<Vec<(ClosingHandlerId, Arc<dyn DocumentClosingHandler>)>>,
    next_document: AtomicU64,
    next_handler: AtomicU64,
    events: broadcast::Sender<DocumentEvent>,
}

/// Owns the open documents, the active-document pointer and the
/// open/select/close protocols. Clones share the same manager.
#[derive(Clone)]
pub struct DocumentManager {
    inner: Arc<ManagerInner>,
}

struct ManagerSignalSink {
    manager: Weak<ManagerInner>,
}

#[async_trait]
impl WindowSignalSink for ManagerSignalSink {
    async fn window_focused(&self, window: WindowId) {
        if let Some(manager) = self.manager.upgrade() {
            manager.window_focused(window);
        }
    }

    async fn window_destroyed(&self, window: WindowId) {
        if let Some(manager) = self.manager.upgrade() {
            manager.window_destroyed(window).await;
        }
    }
}

impl DocumentManager {
    pub fn new(registry: Arc<ControllerFactoryRegistry>, shell: Arc<dyn Shell>) -> Self {
        Self::with_settings(registry, shell, Settings::default())
    }

    pub fn with_settings(
        registry: Arc<ControllerFactoryRegistry>,
        shell: Arc<dyn Shell>,
        settings: Settings,
    ) -> Self {
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));
        let base_dir = settings.resolved_base_dir();
        let inner = Arc::new(ManagerInner {
            registry,
            shell,
            settings,
            base_dir,
            state: Mutex::new(ManagerState::default()),
            open_gates: Mutex::new(HashMap::new()),
            closing_handlers: Mutex::new(Vec::new()),
            next_document: AtomicU64::new(1),
            next_handler: AtomicU64::new(1),
            events,
        });
        inner.shell.attach_signal_sink(Arc::new(ManagerSignalSink {
            manager: Arc::downgrade(&inner),
        }));
        Self { inner }
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<DocumentEvent> {
        self.inner.events.subscribe()
    }

    /// Open documents in insertion order.
    pub fn documents(&self) -> Vec<Document> {
        self.inner.state().documents.clone()
    }

    pub fn active_document(&self) -> Option<Document> {
        self.inner.state().active.clone()
    }

    /// Looks a document up by normalized full path. Relative paths are
    /// resolved against the configured base directory, so a bare file name
    /// never matches a document that lives elsewhere.
    pub fn get_document(&self, path: impl AsRef<Path>) -> Option<Document> {
        let full_path = normalize_full_path(path.as_ref(), &self.inner.base_dir);
        self.inner.find(&DocumentIdentity::File(full_path))
    }

    pub fn find_document(&self, identity: &DocumentIdentity) -> Option<Document> {
        self.inner.find(identity)
    }

    pub async fn open_document(
        &self,
        descriptor: DocumentDescriptor,
        bring_to_front: bool,
    ) -> DocumentResult<Document> {
        self.open_document_with(
            descriptor,
            OpenOptions {
                bring_to_front,
                role: None,
            },
        )
        .await
    }

    pub async fn open_document_with(
        &self,
        descriptor: DocumentDescriptor,
        options: OpenOptions,
    ) -> DocumentResult<Document> {
        let identity = descriptor.identity(&self.inner.base_dir);
        let gate = self.inner.open_gate(&identity);
        let result = {
            let _guard = gate.lock().await;
            self.open_descriptor_locked(identity.clone(), descriptor, options)
                .await
        };
        drop(gate);
        self.inner.release_open_gate(&identity);
        result
    }

    async fn open_descriptor_locked(
        &self,
        identity: DocumentIdentity,
        descriptor: DocumentDescriptor,
        options: OpenOptions,
    ) -> DocumentResult<Document> {
        if let Some(existing) = self.inner.find(&identity) {
            debug!(document = %existing.id(), %identity, "document already open");
            if options.bring_to_front {
                existing.select().await?;
            }
            return Ok(existing);
        }

        let (description, controller) = self
            .inner
            .registry
            .create_controller(&descriptor, options.role)
            .await?;
        let id = self.inner.allocate_document_id();
        self.inner
            .open_new(
                id,
                identity,
                Some(descriptor),
                controller,
                Some(description),
                options.bring_to_front,
            )
            .await
    }

    /// Opens a controller the caller already constructed. Controllers that
    /// report a descriptor are deduplicated by its identity; if the identity
    /// is already open the given controller is disposed unused.
    pub async fn open_controller(
        &self,
        controller: Arc<dyn DocumentController>,
        bring_to_front: bool,
    ) -> DocumentResult<Document> {
        let Some(descriptor) = controller.descriptor() else {
            let id = self.inner.allocate_document_id();
            return self
                .inner
                .open_new(
                    id,
                    DocumentIdentity::Anonymous(id),
                    None,
                    controller,
                    None,
                    bring_to_front,
                )
                .await;
        };

        let identity = descriptor.identity(&self.inner.base_dir);
        let gate = self.inner.open_gate(&identity);
        let result = {
            let _guard = gate.lock().await;
            match self.inner.find(&identity) {
                Some(existing) => {
                    debug!(document = %existing.id(), %identity, "controller targets an open document");
                    dispose_quietly(existing.id(), &controller).await;
                    let selected = if bring_to_front {
                        existing.select().await
                    } else {
                        Ok(())
                    };
                    selected.map(|()| existing)
                }
                None => {
                    let id = self.inner.allocate_document_id();
                    self.inner
                        .open_new(
                            id,
                            identity.clone(),
                            Some(descriptor),
                            controller,
                            None,
                            bring_to_front,
                        )
                        .await
                }
            }
        };
        drop(gate);
        self.inner.release_open_gate(&identity);
        result
    }

    /// Creates another view of an open document through the factory that
    /// handles its descriptor.
    pub async fn attach_view(
        &self,
        document: &Document,
        role: ControllerRole,
    ) -> DocumentResult<Arc<dyn DocumentController>> {
        document.ensure_live()?;
        let descriptor = document
            .descriptor()
            .ok_or_else(|| DocumentError::NoControllerAvailable {
                descriptor: document.identity().to_string(),
            })?;
        let (description, controller) = self
            .inner
            .registry
            .create_controller(&descriptor, Some(role))
            .await?;
        document
            .attach(Arc::clone(&controller), Some(description))
            .await?;
        Ok(controller)
    }

    /// Re-keys the open document at `old` after its file moved to `new`.
    /// Returns `None` when nothing is open at `old`; fails if another open
    /// document already lives at `new`.
    pub async fn file_renamed(
        &self,
        old: impl AsRef<Path>,
        new: impl AsRef<Path>,
    ) -> DocumentResult<Option<Document>> {
        let old_identity =
            DocumentIdentity::File(normalize_full_path(old.as_ref(), &self.inner.base_dir));
        let new_path = normalize_full_path(new.as_ref(), &self.inner.base_dir);
        let new_identity = DocumentIdentity::File(new_path.clone());

        let gate = self.inner.open_gate(&new_identity);
        let result = {
            let _guard = gate.lock().await;
            self.inner
                .rekey(&old_identity, new_identity.clone(), &new_path)
                .await
        };
        drop(gate);
        self.inner.release_open_gate(&new_identity);
        result
    }

    pub fn add_closing_handler(&self, handler: Arc<dyn DocumentClosingHandler>) -> ClosingHandlerId {
        let id = ClosingHandlerId(self.inner.next_handler.fetch_add(1, Ordering::SeqCst));
        self.inner.closing_handlers.lock().push((id, handler));
        id
    }

    pub fn remove_closing_handler(&self, id: ClosingHandlerId) -> bool {
        let mut handlers = self.inner.closing_handlers.lock();
        let before = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        handlers.len() != before
    }

    /// Saves every dirty document in list order, stopping at the first failure.
    pub async fn save_all(&self) -> DocumentResult<()> {
        for document in self.documents() {
            match document.save().await {
                Ok(()) | Err(DocumentError::DocumentDisposed(_)) => {}
                Err(error) => return Err(error),
            }
        }
        Ok(())
    }

    /// Closes documents one at a time and stops at the first veto. This is
    /// not atomic: documents closed before the veto stay closed.
    pub async fn close_all(&self, force: bool) -> DocumentResult<bool> {
        for document in self.documents() {
            match document.close(force).await {
                Ok(true) | Err(DocumentError::DocumentDisposed(_)) => {}
                Ok(false) => return Ok(false),
                Err(error) => return Err(error),
            }
        }
        Ok(true)
    }
}

impl ManagerInner {
    fn state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock()
    }

    pub(crate) fn shell(&self) -> &Arc<dyn Shell> {
        &self.shell
    }

    pub(crate) fn publish(&self, event: DocumentEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) fn is_active(&self, document: &Document) -> bool {
        self.state().active.as_ref() == Some(document)
    }

    fn allocate_document_id(&self) -> DocumentId {
        DocumentId(self.next_document.fetch_add(1, Ordering::SeqCst))
    }

    fn find(&self, identity: &DocumentIdentity) -> Option<Document> {
        self.state().live(identity).cloned()
    }

    fn open_gate(&self, identity: &DocumentIdentity) -> Arc<AsyncMutex<()>> {
        let mut gates = self.open_gates.lock();
        Arc::clone(
            gates
                .entry(identity.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }

    /// Drops the gate once no other open of the identity is waiting on it.
    fn release_open_gate(&self, identity: &DocumentIdentity) {
        let mut gates = self.open_gates.lock();
        if gates
            .get(identity)
            .is_some_and(|gate| Arc::strong_count(gate) == 1)
        {
            gates.remove(identity);
        }
    }

    async fn open_new(
        self: &Arc<Self>,
        id: DocumentId,
        identity: DocumentIdentity,
        descriptor: Option<DocumentDescriptor>,
        controller: Arc<dyn DocumentController>,
        description: Option<ControllerDescription>,
        bring_to_front: bool,
    ) -> DocumentResult<Document> {
        let title = descriptor
            .as_ref()
            .map(DocumentDescriptor::display_name)
            .or_else(|| controller.title())
            .unwrap_or_else(|| format!("Untitled {}", id.0));
        let document = Document::new(id, identity, descriptor, title, Arc::downgrade(self));

        if let Err(source) = controller.initialize(document.descriptor().as_ref()).await {
            dispose_quietly(id, &controller).await;
            return Err(DocumentError::ControllerInitialization {
                identity: document.identity().to_string(),
                source,
            });
        }

        let window = match self.shell.create_window(id, &document.title()).await {
            Ok(window) => window,
            Err(source) => {
                dispose_quietly(id, &controller).await;
                return Err(DocumentError::WindowCreation {
                    identity: document.identity().to_string(),
                    source,
                });
            }
        };

        document.bind(controller, description, window);
        {
            let mut state = self.state();
            state.documents.push(document.clone());
            state.windows.insert(window, id);
            info!(document = %id, identity = %document.identity(), %window, "document opened");
            self.publish(DocumentEvent::Opened(document.clone()));
        }

        if bring_to_front {
            self.activate(&document);
            if let Err(error) = self.shell.select_window(window).await {
                warn!(document = %id, %window, %error, "shell failed to focus new window");
            }
        }
        Ok(document)
    }

    async fn rekey(
        &self,
        old: &DocumentIdentity,
        new: DocumentIdentity,
        new_path: &Path,
    ) -> DocumentResult<Option<Document>> {
        let (document, descriptor, controllers) = {
            let state = self.state();
            let Some(document) = state.live(old).cloned() else {
                return Ok(None);
            };
            if *old == new {
                return Ok(Some(document));
            }
            if state.live(&new).is_some() {
                return Err(DocumentError::IdentityConflict {
                    identity: new.to_string(),
                });
            }

            let descriptor = document.descriptor().map(|descriptor| descriptor.renamed(new_path));
            let title = descriptor
                .as_ref()
                .map(DocumentDescriptor::display_name)
                .unwrap_or_else(|| document.title());
            let controllers = document.rekey(new.clone(), descriptor.clone(), title);
            info!(document = %document.id(), %old, %new, "document renamed");
            self.publish(DocumentEvent::Renamed {
                document: document.clone(),
                old: old.clone(),
            });
            (document, descriptor, controllers)
        };

        if let Some(descriptor) = &descriptor {
            for (index, controller) in controllers.iter().enumerate() {
                if let Err(error) = controller.renamed(descriptor).await {
                    warn!(document = %document.id(), controller = index, error = %format!("{error:#}"), "controller failed to follow rename");
                }
            }
        }
        Ok(Some(document))
    }

    /// Makes `document` active. Publishes one `ActiveChanged` per effective change.
    fn activate(&self, document: &Document) -> bool {
        let mut state = self.state();
        if state.active.as_ref() == Some(document) || !state.documents.contains(document) {
            return false;
        }
        state.active = Some(document.clone());
        state.touch(document.id());
        debug!(document = %document.id(), "active document changed");
        self.publish(DocumentEvent::ActiveChanged(Some(document.clone())));
        true
    }

    fn document_for_window(&self, window: WindowId) -> Option<Document> {
        let state = self.state();
        let id = *state.windows.get(&window)?;
        state.document(id).cloned()
    }

    fn window_focused(&self, window: WindowId) {
        let document = self.document_for_window(window);
        let Some(document) = document else {
            debug!(%window, "focus signal for unknown window");
            return;
        };
        if document.state() != DocumentState::Open {
            debug!(document = %document.id(), %window, "ignoring focus while document is closing");
            return;
        }
        self.activate(&document);
    }

    async fn window_destroyed(&self, window: WindowId) {
        let document = self.document_for_window(window);
        let Some(document) = document else {
            debug!(%window, "destroy signal for unknown window");
            return;
        };
        info!(document = %document.id(), %window, "window destroyed, closing document");
        self.finish_close(&document, false).await;
    }

    pub(crate) async fn close_document(&self, document: &Document, force: bool) -> DocumentResult<bool> {
        if closing_in_current_task(document.id()) {
            // A closing handler asked to close the document it is deciding on.
            debug!(document = %document.id(), "close requested from its own closing handler");
            return Ok(false);
        }

        let _gate = document.close_gate().lock().await;
        if !document.begin_closing() {
            return Ok(true);
        }

        let mut closing = CLOSING.try_with(Clone::clone).unwrap_or_default();
        closing.push(document.id());
        CLOSING
            .scope(closing, self.run_close_protocol(document, force))
            .await
    }

    async fn run_close_protocol(&self, document: &Document, force: bool) -> DocumentResult<bool> {
        let event = DocumentClosingEvent::new(document.clone(), force);
        let handlers: Vec<_> = self
            .closing_handlers
            .lock()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler.on_closing(event.clone()).await;
        }

        if event.is_cancelled() {
            if document.abort_closing() {
                debug!(document = %document.id(), "close vetoed");
                return Ok(false);
            }
            return Ok(true);
        }

        self.finish_close(document, true).await;
        Ok(true)
    }

    /// `Closing -> Closed`: dispose controllers, close the window, remove the
    /// document and pick the next active one. Not cancellable.
    async fn finish_close(&self, document: &Document, window_alive: bool) -> bool {
        // Also covers a destroy signal echoed by `close_window` below, which
        // must not wait on the gate this close already holds.
        if document.is_finalizing() {
            return false;
        }
        // Opens of this identity wait until the document is gone.
        let identity = document.identity();
        let gate = self.open_gate(&identity);
        let disposed = {
            let _guard = gate.lock().await;
            self.dispose_and_remove(document, window_alive).await
        };
        drop(gate);
        self.release_open_gate(&identity);
        let Some(next_active) = disposed else {
            return false;
        };

        let focus_window = next_active.and_then(|next| next.window());
        if let Some(window) = focus_window {
            if let Err(error) = self.shell.select_window(window).await {
                warn!(%window, %error, "shell failed to focus next window");
            }
        }
        true
    }

    /// Returns the newly active document, or `None` when another caller
    /// already disposed `document`.
    async fn dispose_and_remove(
        &self,
        document: &Document,
        window_alive: bool,
    ) -> Option<Option<Document>> {
        let (controllers, window) = document.take_for_disposal()?;

        for (index, slot) in controllers.into_iter().enumerate() {
            if let Err(error) = slot.controller.dispose().await {
                let message = format!("{error:#}");
                warn!(document = %document.id(), controller = index, error = %message, "controller disposal failed");
                self.publish(DocumentEvent::ControllerDisposeFailed {
                    document: document.clone(),
                    controller: index,
                    message,
                });
            }
        }

        if window_alive {
            if let Some(window) = window {
                if let Err(error) = self.shell.close_window(window).await {
                    warn!(document = %document.id(), %window, %error, "shell failed to close window");
                }
            }
        }

        let next_active = {
            let mut state = self.state();
            let position = state.documents.iter().position(|entry| entry == document);
            if let Some(position) = position {
                state.documents.remove(position);
            }
            if let Some(window) = window {
                state.windows.remove(&window);
            }
            state.history.retain(|id| *id != document.id());
            document.mark_closed();

            let was_active = state.active.as_ref() == Some(document);
            let next_active = if was_active {
                let next = self.fallback(&state, position.unwrap_or(0));
                if let Some(next) = &next {
                    state.touch(next.id());
                }
                state.active = next.clone();
                self.publish(DocumentEvent::ActiveChanged(next.clone()));
                next
            } else {
                None
            };

            info!(document = %document.id(), identity = %document.identity(), "document closed");
            self.publish(DocumentEvent::Closed(document.clone()));
            next_active
        };
        Some(next_active)
    }

    fn fallback(&self, state: &ManagerState, removed_at: usize) -> Option<Document> {
        if state.documents.is_empty() {
            return None;
        }
        match self.settings.close_activation {
            CloseActivation::MostRecent => state
                .history
                .iter()
                .rev()
                .find_map(|id| state.document(*id))
                .or_else(|| state.documents.last())
                .cloned(),
            CloseActivation::Adjacent => state
                .documents
                .get(removed_at.min(state.documents.len() - 1))
                .cloned(),
        }
    }
}

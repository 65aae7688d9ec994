#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use controllers::{
    ContentFilter, ControllerFactory, ControllerFactoryRegistry, DirtyListener, DirtyState,
    DocumentController,
};
use document_core::{
    ControllerDescription, ControllerRole, Document, DocumentClosingEvent, DocumentClosingHandler,
    DocumentDescriptor, DocumentEvent, DocumentIdentity, DocumentManager, Settings,
};
use shell::HeadlessShell;
use tokio::sync::broadcast;

pub type CallLog = Arc<Mutex<Vec<String>>>;

pub struct TestController {
    name: String,
    descriptor: Option<DocumentDescriptor>,
    fail_initialize: bool,
    fail_dispose: bool,
    initialize_delay: Option<Duration>,
    dispose_delay: Option<Duration>,
    dirty: DirtyState,
    log: CallLog,
    pub initialized: AtomicUsize,
    pub saves: AtomicUsize,
    pub disposals: AtomicUsize,
    pub renames: Mutex<Vec<DocumentDescriptor>>,
}

impl TestController {
    pub fn new() -> Self {
        Self::named("controller", Arc::new(Mutex::new(Vec::new())))
    }

    pub fn named(name: &str, log: CallLog) -> Self {
        Self {
            name: name.to_string(),
            descriptor: None,
            fail_initialize: false,
            fail_dispose: false,
            initialize_delay: None,
            dispose_delay: None,
            dirty: DirtyState::new(),
            log,
            initialized: AtomicUsize::new(0),
            saves: AtomicUsize::new(0),
            disposals: AtomicUsize::new(0),
            renames: Mutex::new(Vec::new()),
        }
    }

    pub fn with_descriptor(mut self, descriptor: DocumentDescriptor) -> Self {
        self.descriptor = Some(descriptor);
        self
    }

    pub fn failing_initialize(mut self) -> Self {
        self.fail_initialize = true;
        self
    }

    pub fn failing_dispose(mut self) -> Self {
        self.fail_dispose = true;
        self
    }

    pub fn with_initialize_delay(mut self, delay: Duration) -> Self {
        self.initialize_delay = Some(delay);
        self
    }

    pub fn with_dispose_delay(mut self, delay: Duration) -> Self {
        self.dispose_delay = Some(delay);
        self
    }

    pub fn renames(&self) -> Vec<DocumentDescriptor> {
        self.renames.lock().expect("renames").clone()
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.dirty.set_dirty(dirty);
    }

    pub fn disposals(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().expect("log").clone()
    }
}

#[async_trait]
impl DocumentController for TestController {
    async fn initialize(&self, _descriptor: Option<&DocumentDescriptor>) -> Result<()> {
        if let Some(delay) = self.initialize_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_initialize {
            return Err(anyhow!("{} refused to initialize", self.name));
        }
        self.initialized.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_dirty(&self) -> bool {
        self.dirty.is_dirty()
    }

    async fn save(&self) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.dirty.set_dirty(false);
        Ok(())
    }

    async fn renamed(&self, descriptor: &DocumentDescriptor) -> Result<()> {
        self.renames.lock().expect("renames").push(descriptor.clone());
        Ok(())
    }

    async fn dispose(&self) -> Result<()> {
        if let Some(delay) = self.dispose_delay {
            tokio::time::sleep(delay).await;
        }
        self.disposals.fetch_add(1, Ordering::SeqCst);
        self.log
            .lock()
            .expect("log")
            .push(format!("dispose:{}", self.name));
        if self.fail_dispose {
            return Err(anyhow!("{} failed to dispose", self.name));
        }
        Ok(())
    }

    fn descriptor(&self) -> Option<DocumentDescriptor> {
        self.descriptor.clone()
    }

    fn set_dirty_listener(&self, listener: DirtyListener) {
        self.dirty.set_listener(listener);
    }
}

/// Handles `.test` files with a default source view and a design view.
pub struct TestFileControllerFactory {
    filter: ContentFilter,
    create_delay: Option<Duration>,
    pub created: Mutex<Vec<Arc<TestController>>>,
}

impl TestFileControllerFactory {
    pub fn new() -> Self {
        Self {
            filter: ContentFilter::new().with_extension("test"),
            create_delay: None,
            created: Mutex::new(Vec::new()),
        }
    }

    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().expect("created").len()
    }
}

#[async_trait]
impl ControllerFactory for TestFileControllerFactory {
    fn name(&self) -> &str {
        "test-files"
    }

    fn supports(&self, descriptor: &DocumentDescriptor) -> bool {
        self.filter.matches(descriptor)
    }

    fn supported_controllers(&self, _descriptor: &DocumentDescriptor) -> Vec<ControllerDescription> {
        vec![
            ControllerDescription::new("Test Source View", true, ControllerRole::Source),
            ControllerDescription::new("Test Design View", false, ControllerRole::VisualDesign),
        ]
    }

    async fn create_controller(
        &self,
        _descriptor: &DocumentDescriptor,
        description: &ControllerDescription,
    ) -> Result<Arc<dyn DocumentController>> {
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        let controller = Arc::new(TestController::named(
            &description.name,
            Arc::new(Mutex::new(Vec::new())),
        ));
        self.created
            .lock()
            .expect("created")
            .push(Arc::clone(&controller));
        Ok(controller)
    }
}

/// Collects broadcast lifecycle events.
pub struct EventTracker {
    receiver: broadcast::Receiver<DocumentEvent>,
    events: Vec<DocumentEvent>,
}

impl EventTracker {
    pub fn new(manager: &DocumentManager) -> Self {
        Self {
            receiver: manager.subscribe_events(),
            events: Vec::new(),
        }
    }

    fn drain(&mut self) {
        while let Ok(event) = self.receiver.try_recv() {
            self.events.push(event);
        }
    }

    pub fn reset(&mut self) {
        self.drain();
        self.events.clear();
    }

    pub fn events(&mut self) -> Vec<DocumentEvent> {
        self.drain();
        self.events.clone()
    }

    pub fn opened(&mut self) -> Vec<Document> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                DocumentEvent::Opened(document) => Some(document),
                _ => None,
            })
            .collect()
    }

    pub fn closed(&mut self) -> Vec<Document> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                DocumentEvent::Closed(document) => Some(document),
                _ => None,
            })
            .collect()
    }

    pub fn active_changes(&mut self) -> Vec<Option<Document>> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                DocumentEvent::ActiveChanged(document) => Some(document),
                _ => None,
            })
            .collect()
    }

    pub fn renamed(&mut self) -> Vec<(Document, DocumentIdentity)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                DocumentEvent::Renamed { document, old } => Some((document, old)),
                _ => None,
            })
            .collect()
    }

    pub fn dirty_changes(&mut self) -> Vec<bool> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                DocumentEvent::DirtyChanged { dirty, .. } => Some(dirty),
                _ => None,
            })
            .collect()
    }
}

/// Closing handler that records every document it is asked about.
#[derive(Default)]
pub struct ClosingRecorder {
    seen: Mutex<Vec<Document>>,
}

impl ClosingRecorder {
    pub fn seen(&self) -> Vec<Document> {
        self.seen.lock().expect("seen").clone()
    }

    pub fn reset(&self) {
        self.seen.lock().expect("seen").clear();
    }
}

#[async_trait]
impl DocumentClosingHandler for ClosingRecorder {
    async fn on_closing(&self, event: DocumentClosingEvent) {
        self.seen.lock().expect("seen").push(event.document().clone());
    }
}

pub struct Fixture {
    pub manager: DocumentManager,
    pub shell: Arc<HeadlessShell>,
    pub registry: Arc<ControllerFactoryRegistry>,
    pub tracker: EventTracker,
    pub closing: Arc<ClosingRecorder>,
}

pub fn fixture() -> Fixture {
    fixture_with(Settings::default())
}

pub fn fixture_with(settings: Settings) -> Fixture {
    let shell = HeadlessShell::new();
    let registry = Arc::new(ControllerFactoryRegistry::new());
    let manager = DocumentManager::with_settings(Arc::clone(&registry), shell.clone(), settings);
    let tracker = EventTracker::new(&manager);
    let closing = Arc::new(ClosingRecorder::default());
    manager.add_closing_handler(closing.clone());
    Fixture {
        manager,
        shell,
        registry,
        tracker,
        closing,
    }
}

pub fn test_controller() -> Arc<TestController> {
    Arc::new(TestController::new())
}

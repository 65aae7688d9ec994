use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Result};
use clap::Parser;
use controllers::{text::TextFileControllerFactory, ControllerFactoryRegistry};
use document_core::{
    load_settings, load_settings_from, DocumentDescriptor, DocumentEvent, DocumentManager,
};
use shell::HeadlessShell;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::{error, info, warn};

/// Opens text files in a headless document manager and reports what is open.
#[derive(Parser, Debug)]
struct Args {
    /// Settings file to use instead of ./documents.toml.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Open files without activating them.
    #[arg(long)]
    background: bool,
    /// Leave documents open on exit.
    #[arg(long)]
    keep_open: bool,
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let settings = match &args.config {
        Some(path) => load_settings_from(path)?,
        None => load_settings(),
    };
    let base_dir = settings.resolved_base_dir();

    let registry = Arc::new(ControllerFactoryRegistry::new());
    registry.register_factory(Arc::new(TextFileControllerFactory::new()));
    let shell = HeadlessShell::new();
    let manager = DocumentManager::with_settings(registry, shell.clone(), settings);

    let mut events = BroadcastStream::new(manager.subscribe_events());
    let logger = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => log_event(&event),
                Err(error) => warn!(%error, "event log fell behind"),
            }
        }
    });

    let mut failed = 0usize;
    for file in &args.files {
        let path = base_dir.join(file);
        let descriptor = DocumentDescriptor::file(&path, "text/plain");
        if let Err(error) = manager.open_document(descriptor, !args.background).await {
            error!(path = %path.display(), error = %format!("{error:#}"), "failed to open");
            failed += 1;
        }
    }

    let summary = serde_json::json!({
        "active": manager.active_document().map(|document| document.id()),
        "documents": manager
            .documents()
            .iter()
            .map(|document| document.summary())
            .collect::<Vec<_>>(),
        "windows": shell.windows(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if !args.keep_open && !manager.close_all(true).await? {
        warn!("a closing handler kept documents open");
    }

    drop(manager);
    if let Err(error) = logger.await {
        warn!(%error, "event logger stopped unexpectedly");
    }

    if failed > 0 {
        bail!("{failed} of {} files failed to open", args.files.len());
    }
    Ok(())
}

fn log_event(event: &DocumentEvent) {
    match event {
        DocumentEvent::Opened(document) => {
            info!(document = %document.id(), title = %document.title(), "opened")
        }
        DocumentEvent::Closed(document) => info!(document = %document.id(), "closed"),
        DocumentEvent::ActiveChanged(Some(document)) => {
            info!(document = %document.id(), "active document changed")
        }
        DocumentEvent::ActiveChanged(None) => info!("no active document"),
        DocumentEvent::DirtyChanged { document, dirty } => {
            info!(document = %document.id(), dirty, "dirty state changed")
        }
        DocumentEvent::ControllerDisposeFailed {
            document,
            controller,
            message,
        } => warn!(document = %document.id(), controller, %message, "controller failed to dispose"),
        DocumentEvent::Renamed { document, old } => {
            info!(document = %document.id(), %old, new = %document.identity(), "renamed")
        }
    }
}

use super::*;
use tokio::sync::Mutex as AsyncMutex;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Signal {
    Focused(WindowId),
    Destroyed(WindowId),
}

#[derive(Default)]
struct RecordingSink {
    signals: AsyncMutex<Vec<Signal>>,
}

#[async_trait]
impl WindowSignalSink for RecordingSink {
    async fn window_focused(&self, window: WindowId) {
        self.signals.lock().await.push(Signal::Focused(window));
    }

    async fn window_destroyed(&self, window: WindowId) {
        self.signals.lock().await.push(Signal::Destroyed(window));
    }
}

async fn shell_with_sink() -> (Arc<HeadlessShell>, Arc<RecordingSink>) {
    let shell = HeadlessShell::new();
    let sink = Arc::new(RecordingSink::default());
    shell.attach_signal_sink(sink.clone());
    (shell, sink)
}

#[tokio::test]
async fn windows_keep_creation_order() {
    let (shell, _) = shell_with_sink().await;
    let a = shell.create_window(DocumentId(1), "a").await.expect("a");
    let b = shell.create_window(DocumentId(2), "b").await.expect("b");

    let windows = shell.windows();
    assert_eq!(windows.iter().map(|w| w.id).collect::<Vec<_>>(), vec![a, b]);
    assert_eq!(shell.window_for(DocumentId(2)).map(|w| w.title), Some("b".into()));
}

#[tokio::test]
async fn select_echoes_focus_signal() {
    let (shell, sink) = shell_with_sink().await;
    let a = shell.create_window(DocumentId(1), "a").await.expect("a");

    shell.select_window(a).await.expect("select");
    shell.user_select(a).await.expect("user select");

    assert_eq!(shell.focused(), Some(a));
    assert_eq!(
        *sink.signals.lock().await,
        vec![Signal::Focused(a), Signal::Focused(a)]
    );
}

#[tokio::test]
async fn requested_close_is_silent_but_destroy_is_reported() {
    let (shell, sink) = shell_with_sink().await;
    let a = shell.create_window(DocumentId(1), "a").await.expect("a");
    let b = shell.create_window(DocumentId(2), "b").await.expect("b");
    shell.select_window(b).await.expect("focus b");
    sink.signals.lock().await.clear();

    shell.close_window(a).await.expect("close a");
    shell.user_destroy(b).await.expect("destroy b");

    assert!(shell.windows().is_empty());
    assert_eq!(shell.focused(), None);
    assert_eq!(*sink.signals.lock().await, vec![Signal::Destroyed(b)]);
}

#[tokio::test]
async fn unknown_windows_are_rejected() {
    let (shell, sink) = shell_with_sink().await;
    assert!(shell.select_window(WindowId(42)).await.is_err());
    assert!(shell.close_window(WindowId(42)).await.is_err());
    assert!(shell.user_destroy(WindowId(42)).await.is_err());
    assert!(sink.signals.lock().await.is_empty());
}

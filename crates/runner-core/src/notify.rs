use tokio::sync::broadcast;

/// Fan-out for the single "tree changed" event.
///
/// The event carries no payload; observers re-query the registry for the
/// state they care about. Lagging or absent receivers are ignored.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<()>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub fn notify(&self) {
        // Err means no live receivers, which is fine.
        let _ = self.tx.send(());
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

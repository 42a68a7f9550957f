use crate::artifacts;
use crate::notify::ChangeNotifier;
use crate::platform::PlatformTag;
use crate::stage::{StageId, StageStatus, StageTree};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn from_string(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

/// Operator-submitted parameters for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    /// Target machine address as configured.
    pub machine: String,
    /// SSH port, defaulting to 22.
    #[serde(default)]
    pub port: Option<u16>,
    /// Local path of the package to deploy.
    pub package: PathBuf,
    /// Opaque profile/parameter string passed through to the tool command.
    pub profile: String,
    pub platform: PlatformTag,
}

/// One end-to-end attempt to deploy and execute the tool on one machine.
///
/// Mutated only by the owning orchestrator task, always through a
/// [`RunHandle`]; destroyed only by explicit registry removal.
#[derive(Debug)]
pub struct Run {
    pub id: RunId,
    pub machine: String,
    pub port: u16,
    pub package: PathBuf,
    pub profile: String,
    pub platform: PlatformTag,
    pub created_at: DateTime<Utc>,
    pub tree: StageTree,
    pub status: StageStatus,
    pub cancelled: bool,
    /// Per-run local directory holding the retrieved log tree.
    pub local_dir: PathBuf,
    /// Single persisted log file, when one was produced.
    pub log_file: Option<PathBuf>,
}

impl Run {
    pub fn new(request: RunRequest, artifacts_root: &std::path::Path) -> Self {
        let created_at = Utc::now();
        let label = artifacts::run_label(created_at, &request.machine);
        Self {
            id: RunId::new(),
            machine: request.machine,
            port: request.port.unwrap_or(22),
            package: request.package,
            profile: request.profile,
            platform: request.platform,
            created_at,
            tree: StageTree::new(),
            status: StageStatus::Pending,
            cancelled: false,
            local_dir: artifacts_root.join(label),
            log_file: None,
        }
    }
}

/// Shared handle to one run.
///
/// Every mutation routes through a method here that updates the tree and
/// fires exactly one change notification, so observers never miss or
/// double-see an update.
#[derive(Clone)]
pub struct RunHandle {
    inner: Arc<Mutex<Run>>,
    notifier: ChangeNotifier,
    cancel: Arc<watch::Sender<bool>>,
}

impl RunHandle {
    pub fn new(run: Run, notifier: ChangeNotifier) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            inner: Arc::new(Mutex::new(run)),
            notifier,
            cancel: Arc::new(cancel),
        }
    }

    pub fn id(&self) -> RunId {
        self.inner.lock().unwrap().id.clone()
    }

    pub fn machine(&self) -> String {
        self.inner.lock().unwrap().machine.clone()
    }

    /// Read access to the run under the lock.
    pub fn with<T>(&self, f: impl FnOnce(&Run) -> T) -> T {
        f(&self.inner.lock().unwrap())
    }

    /// Tree construction; fires one notification for the batch.
    pub fn build_stages<T>(&self, f: impl FnOnce(&mut StageTree) -> T) -> T {
        let out = f(&mut self.inner.lock().unwrap().tree);
        self.notifier.notify();
        out
    }

    pub fn set_run_status(&self, status: StageStatus) {
        self.inner.lock().unwrap().status = status;
        self.notifier.notify();
    }

    /// Single mutation point for stage status. Stage errors propagate up
    /// the tree and onto the run's aggregate status before the one
    /// notification fires.
    pub fn set_status(&self, id: StageId, status: StageStatus) {
        {
            let mut run = self.inner.lock().unwrap();
            run.tree.set_status(id, status);
            if status == StageStatus::Error {
                run.status = StageStatus::Error;
            }
        }
        self.notifier.notify();
    }

    pub fn set_detail(&self, id: StageId, detail: impl Into<String>) {
        self.inner.lock().unwrap().tree.set_detail(id, detail);
        self.notifier.notify();
    }

    /// Mark a stage failed with a human-readable cause.
    pub fn fail(&self, id: StageId, detail: impl Into<String>) {
        {
            let mut run = self.inner.lock().unwrap();
            run.tree.set_detail(id, detail);
            run.tree.set_status(id, StageStatus::Error);
            run.status = StageStatus::Error;
        }
        self.notifier.notify();
    }

    /// Resolve a parent stage from its children.
    pub fn complete(&self, id: StageId) {
        {
            let mut run = self.inner.lock().unwrap();
            run.tree.complete(id);
            if run.tree.status(id) == StageStatus::Error {
                run.status = StageStatus::Error;
            }
        }
        self.notifier.notify();
    }

    pub fn set_log_file(&self, path: PathBuf) {
        self.inner.lock().unwrap().log_file = Some(path);
        self.notifier.notify();
    }

    /// Request cooperative cancellation. The pipeline observes the flag at
    /// its next suspension point.
    pub fn cancel(&self) {
        {
            let mut run = self.inner.lock().unwrap();
            run.cancelled = true;
        }
        // send_replace stores the flag even when no receiver is listening
        // yet; the pipeline may subscribe later.
        self.cancel.send_replace(true);
        self.notifier.notify();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.lock().unwrap().cancelled
    }

    pub fn cancel_receiver(&self) -> watch::Receiver<bool> {
        self.cancel.subscribe()
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }
}

use crate::error::RunnerError;
use crate::notify::ChangeNotifier;
use crate::run::{Run, RunHandle, RunId};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Process-wide collection of active and historical runs.
///
/// Each run's subtree is mutated only by its owning orchestrator task; the
/// map itself is the single shared structure and is guarded here.
#[derive(Clone)]
pub struct RunRegistry {
    runs: Arc<Mutex<HashMap<RunId, RunHandle>>>,
    notifier: ChangeNotifier,
}

impl RunRegistry {
    pub fn new(notifier: ChangeNotifier) -> Self {
        Self {
            runs: Arc::new(Mutex::new(HashMap::new())),
            notifier,
        }
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    pub fn add(&self, run: Run) -> RunHandle {
        let handle = RunHandle::new(run, self.notifier.clone());
        self.runs
            .lock()
            .unwrap()
            .insert(handle.id(), handle.clone());
        self.notifier.notify();
        handle
    }

    pub fn get(&self, id: &RunId) -> Result<RunHandle, RunnerError> {
        self.runs
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| RunnerError::RunNotFound(id.to_string()))
    }

    pub fn list(&self) -> Vec<RunHandle> {
        let mut handles: Vec<RunHandle> = self.runs.lock().unwrap().values().cloned().collect();
        handles.sort_by_key(|h| h.with(|r| r.created_at));
        handles
    }

    pub fn list_for_machine(&self, address: &str) -> Vec<RunHandle> {
        let mut handles: Vec<RunHandle> = self
            .runs
            .lock()
            .unwrap()
            .values()
            .filter(|h| h.machine() == address)
            .cloned()
            .collect();
        handles.sort_by_key(|h| h.with(|r| r.created_at));
        handles
    }

    /// Remove a run and schedule deletion of its local artifacts.
    ///
    /// The in-memory removal and its notification happen synchronously;
    /// filesystem deletion runs on a background task, collecting individual
    /// failures into one reported warning rather than failing the removal.
    /// The returned join handle lets callers wait for the deletion.
    pub fn remove(&self, id: &RunId) -> Result<tokio::task::JoinHandle<()>, RunnerError> {
        let handle = self
            .runs
            .lock()
            .unwrap()
            .remove(id)
            .ok_or_else(|| RunnerError::RunNotFound(id.to_string()))?;
        self.notifier.notify();

        let (local_dir, log_file) = handle.with(|r| (r.local_dir.clone(), r.log_file.clone()));
        let run_id = id.clone();
        Ok(tokio::spawn(async move {
            delete_artifacts(run_id, local_dir, log_file).await;
        }))
    }
}

async fn delete_artifacts(id: RunId, local_dir: PathBuf, log_file: Option<PathBuf>) {
    let mut failures = Vec::new();

    if local_dir.exists() {
        if let Err(e) = tokio::fs::remove_dir_all(&local_dir).await {
            failures.push(format!("{}: {}", local_dir.display(), e));
        }
    }
    if let Some(path) = log_file {
        if path.exists() {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                failures.push(format!("{}: {}", path.display(), e));
            }
        }
    }

    if failures.is_empty() {
        debug!("Deleted artifacts for run {}", id);
    } else {
        warn!(
            "Failed to delete some artifacts for run {}: {}",
            id,
            failures.join("; ")
        );
    }
}

use runner_core::error::RunnerError;
use runner_core::platform::PlatformKind;
use runner_core::session::{
    CommandOutput, ProgressCallback, RemoteSession, RemoteStat, SessionInterrupt,
};
use runner_ssh::transfer::{ensure_remote_directory, remote_exists, upload_file};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct FakeState {
    entries: HashSet<String>,
    mkdir_calls: Vec<String>,
    uploads: Vec<String>,
    /// When set, mkdir fails and creates nothing.
    mkdir_broken: bool,
}

#[derive(Default)]
struct FakeSession {
    state: Arc<Mutex<FakeState>>,
}

impl FakeSession {
    fn with_entries(paths: &[&str]) -> Self {
        let fake = Self::default();
        {
            let mut state = fake.state.lock().unwrap();
            for p in paths {
                state.entries.insert(p.to_string());
            }
        }
        fake
    }

    fn state(&self) -> Arc<Mutex<FakeState>> {
        self.state.clone()
    }
}

#[async_trait::async_trait]
impl RemoteSession for FakeSession {
    async fn execute(&self, _command: &str) -> Result<CommandOutput, RunnerError> {
        Ok(CommandOutput {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: 0,
        })
    }

    async fn stat(&self, path: &str) -> Result<RemoteStat, RunnerError> {
        let state = self.state.lock().unwrap();
        if state.entries.contains(path) {
            Ok(RemoteStat {
                size: 0,
                is_dir: true,
            })
        } else {
            Err(RunnerError::Transfer(format!("no such file: {}", path)))
        }
    }

    async fn mkdir(&self, path: &str) -> Result<(), RunnerError> {
        let mut state = self.state.lock().unwrap();
        state.mkdir_calls.push(path.to_string());
        if state.mkdir_broken {
            return Err(RunnerError::Transfer(format!("mkdir failed: {}", path)));
        }
        state.entries.insert(path.to_string());
        Ok(())
    }

    async fn upload(
        &self,
        _local: &Path,
        remote: &str,
        mut progress: ProgressCallback,
    ) -> Result<(), RunnerError> {
        let mut state = self.state.lock().unwrap();
        state.uploads.push(remote.to_string());
        state.entries.insert(remote.to_string());
        progress(512, 1024);
        progress(1024, 1024);
        Ok(())
    }

    async fn download(&self, _remote: &str, _local: &Path) -> Result<(), RunnerError> {
        Ok(())
    }

    fn interrupt(&self) -> SessionInterrupt {
        SessionInterrupt::noop()
    }

    async fn close(&self) {}
}

#[tokio::test]
async fn creates_each_missing_segment_in_order() {
    let session = FakeSession::with_entries(&["/home", "/home/alice"]);
    let state = session.state();

    let created = ensure_remote_directory(
        &session,
        PlatformKind::Posix,
        "/home/alice/VirtualClientScheduler/pkg",
    )
    .await
    .unwrap();

    assert_eq!(created, "/home/alice/VirtualClientScheduler/pkg");
    let state = state.lock().unwrap();
    assert_eq!(
        state.mkdir_calls,
        vec![
            "/home/alice/VirtualClientScheduler".to_string(),
            "/home/alice/VirtualClientScheduler/pkg".to_string(),
        ]
    );
}

#[tokio::test]
async fn existing_directories_are_not_recreated() {
    let session = FakeSession::with_entries(&[
        "/home",
        "/home/alice",
        "/home/alice/VirtualClientScheduler",
    ]);
    let state = session.state();

    ensure_remote_directory(&session, PlatformKind::Posix, "/home/alice/VirtualClientScheduler")
        .await
        .unwrap();

    assert!(state.lock().unwrap().mkdir_calls.is_empty());
}

#[tokio::test]
async fn unconfirmable_parent_is_a_hard_failure() {
    let session = FakeSession::default();
    session.state().lock().unwrap().mkdir_broken = true;

    let err = ensure_remote_directory(&session, PlatformKind::Posix, "/data/runs")
        .await
        .unwrap_err();

    assert!(err.to_string().contains("parent segment missing"));
}

#[tokio::test]
async fn windows_paths_travel_slash_separated() {
    let session = FakeSession::with_entries(&["C:"]);
    let state = session.state();

    ensure_remote_directory(
        &session,
        PlatformKind::Windows,
        "C:\\VirtualClientScheduler\\pkg",
    )
    .await
    .unwrap();

    let state = state.lock().unwrap();
    assert_eq!(
        state.mkdir_calls,
        vec![
            "C:/VirtualClientScheduler".to_string(),
            "C:/VirtualClientScheduler/pkg".to_string(),
        ]
    );
}

#[tokio::test]
async fn upload_is_skipped_when_remote_file_exists() {
    let session = FakeSession::with_entries(&["/home/alice/agent.tar.gz"]);
    let state = session.state();

    let uploaded = upload_file(
        &session,
        Path::new("agent.tar.gz"),
        "/home/alice/agent.tar.gz",
        |_, _| {},
    )
    .await
    .unwrap();

    assert!(!uploaded);
    assert!(state.lock().unwrap().uploads.is_empty());
}

#[tokio::test]
async fn upload_streams_and_reports_completion() {
    let session = FakeSession::default();
    let state = session.state();
    let seen: Arc<Mutex<Vec<(u64, u64)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();

    let uploaded = upload_file(
        &session,
        Path::new("agent.tar.gz"),
        "/home/alice/agent.tar.gz",
        move |transferred, total| sink.lock().unwrap().push((transferred, total)),
    )
    .await
    .unwrap();

    assert!(uploaded);
    assert_eq!(
        state.lock().unwrap().uploads,
        vec!["/home/alice/agent.tar.gz".to_string()]
    );
    // Completion always emits, whatever the throttle swallowed before it.
    assert_eq!(seen.lock().unwrap().last(), Some(&(1024, 1024)));
    assert!(remote_exists(&session, "/home/alice/agent.tar.gz").await);
}

use runner_archive::deploy::{deploy_package, DeployOutcome, PackageDeployment};
use runner_core::error::RunnerError;
use runner_core::platform::PlatformKind;
use runner_core::session::{
    CommandOutput, ProgressCallback, RemoteSession, RemoteStat, SessionInterrupt,
};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct FakeState {
    entries: HashSet<String>,
    commands: Vec<String>,
    uploads: Vec<String>,
    /// Exit code for the next executed command.
    exit_code: i32,
    /// When true, extraction commands create the destination directory.
    extraction_works: bool,
    extract_dir: String,
}

#[derive(Default)]
struct FakeSession {
    state: Arc<Mutex<FakeState>>,
}

#[async_trait::async_trait]
impl RemoteSession for FakeSession {
    async fn execute(&self, command: &str) -> Result<CommandOutput, RunnerError> {
        let mut state = self.state.lock().unwrap();
        state.commands.push(command.to_string());
        if state.extraction_works && state.exit_code == 0 {
            let dir = state.extract_dir.clone();
            state.entries.insert(dir);
        }
        Ok(CommandOutput {
            stdout: String::new(),
            stderr: if state.exit_code == 0 {
                String::new()
            } else {
                "tar: error".to_string()
            },
            exit_code: state.exit_code,
        })
    }

    async fn stat(&self, path: &str) -> Result<RemoteStat, RunnerError> {
        if self.state.lock().unwrap().entries.contains(path) {
            Ok(RemoteStat { size: 0, is_dir: true })
        } else {
            Err(RunnerError::Transfer(format!("no such file: {}", path)))
        }
    }

    async fn mkdir(&self, path: &str) -> Result<(), RunnerError> {
        self.state.lock().unwrap().entries.insert(path.to_string());
        Ok(())
    }

    async fn upload(
        &self,
        _local: &Path,
        remote: &str,
        _progress: ProgressCallback,
    ) -> Result<(), RunnerError> {
        let mut state = self.state.lock().unwrap();
        state.uploads.push(remote.to_string());
        state.entries.insert(remote.to_string());
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

fn plan() -> PackageDeployment {
    PackageDeployment::plan(
        PlatformKind::Posix,
        "/home/alice/VirtualClientScheduler",
        Path::new("/tmp/agent.tar.gz"),
    )
    .unwrap()
}

#[tokio::test]
async fn existing_extraction_dir_skips_everything() {
    let session = FakeSession::default();
    let deployment = plan();
    session
        .state
        .lock()
        .unwrap()
        .entries
        .insert(deployment.extract_dir.clone());

    let outcome = deploy_package(
        &session,
        PlatformKind::Posix,
        Path::new("/tmp/agent.tar.gz"),
        &deployment,
        |_, _| {},
    )
    .await
    .unwrap();

    assert_eq!(outcome, DeployOutcome::AlreadyExtracted);
    let state = session.state.lock().unwrap();
    assert!(state.uploads.is_empty());
    assert!(state.commands.is_empty());
}

#[tokio::test]
async fn present_archive_extracts_without_reupload() {
    let session = FakeSession::default();
    let deployment = plan();
    {
        let mut state = session.state.lock().unwrap();
        state.entries.insert(deployment.archive_path.clone());
        state.extraction_works = true;
        state.extract_dir = deployment.extract_dir.clone();
    }

    let outcome = deploy_package(
        &session,
        PlatformKind::Posix,
        Path::new("/tmp/agent.tar.gz"),
        &deployment,
        |_, _| {},
    )
    .await
    .unwrap();

    assert_eq!(outcome, DeployOutcome::Deployed { uploaded: false });
    let state = session.state.lock().unwrap();
    assert!(state.uploads.is_empty());
    assert_eq!(state.commands.len(), 1);
    assert!(state.commands[0].contains("tar -xzf"));
}

#[tokio::test]
async fn fresh_host_uploads_then_extracts() {
    let session = FakeSession::default();
    let deployment = plan();
    {
        let mut state = session.state.lock().unwrap();
        state.extraction_works = true;
        state.extract_dir = deployment.extract_dir.clone();
    }

    let outcome = deploy_package(
        &session,
        PlatformKind::Posix,
        Path::new("/tmp/agent.tar.gz"),
        &deployment,
        |_, _| {},
    )
    .await
    .unwrap();

    assert_eq!(outcome, DeployOutcome::Deployed { uploaded: true });
    let state = session.state.lock().unwrap();
    assert_eq!(
        state.uploads,
        vec!["/home/alice/VirtualClientScheduler/agent.tar.gz".to_string()]
    );
}

#[tokio::test]
async fn nonzero_exit_is_a_command_error() {
    let session = FakeSession::default();
    let deployment = plan();
    session.state.lock().unwrap().exit_code = 2;

    let err = deploy_package(
        &session,
        PlatformKind::Posix,
        Path::new("/tmp/agent.tar.gz"),
        &deployment,
        |_, _| {},
    )
    .await
    .unwrap_err();

    match err {
        RunnerError::ExtractionCommand { code, output } => {
            assert_eq!(code, 2);
            assert!(output.contains("tar: error"));
        }
        other => panic!("expected ExtractionCommand, got {other:?}"),
    }
}

#[tokio::test]
async fn silent_extraction_is_a_verification_error() {
    let session = FakeSession::default();
    let deployment = plan();
    // Command exits 0 but never creates the destination.

    let err = deploy_package(
        &session,
        PlatformKind::Posix,
        Path::new("/tmp/agent.tar.gz"),
        &deployment,
        |_, _| {},
    )
    .await
    .unwrap_err();

    match err {
        RunnerError::ExtractionVerification(dir) => {
            assert_eq!(dir, "/home/alice/VirtualClientScheduler/agent");
        }
        other => panic!("expected ExtractionVerification, got {other:?}"),
    }
}

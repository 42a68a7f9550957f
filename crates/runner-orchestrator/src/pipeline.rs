use runner_archive::deploy::{deploy_package, DeployOutcome, PackageDeployment};
use runner_archive::local::{extract_archive, list_tree};
use runner_archive::logs::{archive_remote_logs, fetch_log_archive};
use runner_core::artifacts;
use runner_core::credentials::CredentialStore;
use runner_core::error::RunnerError;
use runner_core::registry::RunRegistry;
use runner_core::run::{Run, RunHandle, RunRequest};
use runner_core::session::{CommandOutput, RemoteSession, SessionFactory};
use runner_core::stage::{StageId, StageStatus};
use runner_ssh::transfer::ensure_remote_directory;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Stage-tree labels, fixed so viewers and tests can address nodes.
pub mod stage_labels {
    pub const SETUP_MACHINE: &str = "Setup Machine";
    pub const CONNECT: &str = "Connect";
    pub const CREATE_REMOTE_DIRECTORY: &str = "Create Remote Directory";
    pub const UPLOAD_PACKAGE: &str = "Upload Package";
    pub const RUN_TOOL: &str = "Run Tool";
    pub const VERIFY_TOOL_PRESENT: &str = "Verify Tool Present";
    pub const EXECUTE_TOOL_COMMAND: &str = "Execute Tool Command";
    pub const TRANSFER_LOGS: &str = "Transfer Logs";
    pub const ARCHIVE_REMOTE_LOGS: &str = "Archive Remote Logs";
    pub const DOWNLOAD_ARCHIVE: &str = "Download Archive";
    pub const EXTRACT_LOCALLY: &str = "Extract Locally";
}

struct PipelineStages {
    setup: StageId,
    connect: StageId,
    create_dir: StageId,
    upload: StageId,
    run_tool: StageId,
    verify_tool: StageId,
    execute: StageId,
}

/// How far the tool stage got, deciding the log-transfer attempt policy
/// and what the logs step needs to know.
enum ToolPhase {
    /// Setup never finished; there is nothing on the host worth fetching.
    NotStarted,
    /// Cancellation observed; the run aborts without further remote work.
    Cancelled,
    /// The tool stage started (whatever its outcome), so partial logs are
    /// worth retrieving.
    Started {
        deployment: PackageDeployment,
        remote_root: String,
    },
}

/// Owns run execution: sequences the pipeline, translates every outcome
/// into stage-tree transitions, and enforces the cancellation and cleanup
/// contracts. One orchestrator serves any number of concurrent runs; each
/// run's subtree is only ever touched from its own task.
#[derive(Clone)]
pub struct Orchestrator {
    factory: Arc<dyn SessionFactory>,
    credentials: Arc<dyn CredentialStore>,
    registry: RunRegistry,
    connect_timeout: Duration,
    artifacts_root: PathBuf,
}

impl Orchestrator {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        credentials: Arc<dyn CredentialStore>,
        registry: RunRegistry,
        connect_timeout: Duration,
        artifacts_root: PathBuf,
    ) -> Self {
        Self {
            factory,
            credentials,
            registry,
            connect_timeout,
            artifacts_root,
        }
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    /// Register a run without starting it.
    pub fn submit(&self, request: RunRequest) -> RunHandle {
        self.registry.add(Run::new(request, &self.artifacts_root))
    }

    /// Register a run and execute its pipeline on a background task.
    pub fn spawn_run(&self, request: RunRequest) -> (RunHandle, JoinHandle<()>) {
        let handle = self.submit(request);
        let orchestrator = self.clone();
        let task_handle = handle.clone();
        let join = tokio::spawn(async move { orchestrator.execute_run(task_handle).await });
        (handle, join)
    }

    /// Drive one run through the full pipeline. Errors never escape: every
    /// failure is recorded as the failing stage's detail and the run-level
    /// status; the session is closed on every exit path.
    pub async fn execute_run(&self, handle: RunHandle) {
        let stages = handle.build_stages(|tree| {
            let setup = tree.add_root(stage_labels::SETUP_MACHINE);
            let connect = tree.add_child(setup, stage_labels::CONNECT);
            let create_dir = tree.add_child(setup, stage_labels::CREATE_REMOTE_DIRECTORY);
            let upload = tree.add_child(setup, stage_labels::UPLOAD_PACKAGE);
            let run_tool = tree.add_root(stage_labels::RUN_TOOL);
            let verify_tool = tree.add_child(run_tool, stage_labels::VERIFY_TOOL_PRESENT);
            let execute = tree.add_child(run_tool, stage_labels::EXECUTE_TOOL_COMMAND);
            PipelineStages {
                setup,
                connect,
                create_dir,
                upload,
                run_tool,
                verify_tool,
                execute,
            }
        });
        handle.set_run_status(StageStatus::Running);

        let (run_id, machine, port) = handle.with(|r| (r.id.clone(), r.machine.clone(), r.port));
        handle.set_status(stages.setup, StageStatus::Running);
        handle.set_status(stages.connect, StageStatus::Running);

        let Some(credentials) = self.credentials.get_credentials(&machine) else {
            let err = RunnerError::CredentialsNotFound(machine.clone());
            handle.fail(stages.connect, err.to_string());
            return;
        };

        let session = match self
            .factory
            .open(&machine, port, &credentials, self.connect_timeout)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                handle.fail(stages.connect, e.to_string());
                return;
            }
        };
        handle.set_status(stages.connect, StageStatus::Success);

        let phase = self
            .drive(&handle, &stages, session.as_ref(), &credentials.username)
            .await;

        // Partial logs are valuable even after a tool failure, so the log
        // transfer runs whenever the tool stage was at least started.
        if let ToolPhase::Started {
            ref deployment,
            ref remote_root,
        } = phase
        {
            self.transfer_logs(&handle, session.as_ref(), deployment, remote_root)
                .await;
        }

        session.close().await;

        let aggregate = handle.with(|r| r.tree.aggregate());
        handle.set_run_status(aggregate);
        info!("Run {} on {} finished: {}", run_id, machine, aggregate);
    }

    async fn drive(
        &self,
        handle: &RunHandle,
        stages: &PipelineStages,
        session: &dyn RemoteSession,
        username: &str,
    ) -> ToolPhase {
        let (package, profile, platform_tag) =
            handle.with(|r| (r.package.clone(), r.profile.clone(), r.platform));
        let platform = platform_tag.kind();

        handle.set_status(stages.create_dir, StageStatus::Running);
        let remote_root = platform.default_remote_dir(username);
        if let Err(e) = ensure_remote_directory(session, platform, &remote_root).await {
            handle.fail(stages.create_dir, e.to_string());
            return ToolPhase::NotStarted;
        }
        handle.set_status(stages.create_dir, StageStatus::Success);

        handle.set_status(stages.upload, StageStatus::Running);
        let deployment = match PackageDeployment::plan(platform, &remote_root, &package) {
            Ok(deployment) => deployment,
            Err(e) => {
                handle.fail(stages.upload, e.to_string());
                return ToolPhase::NotStarted;
            }
        };
        let progress = {
            let handle = handle.clone();
            let upload = stages.upload;
            move |transferred: u64, total: u64| {
                let percent = if total == 0 { 100 } else { transferred * 100 / total };
                handle.set_detail(
                    upload,
                    format!("{}% ({} of {} bytes)", percent, transferred, total),
                );
            }
        };
        match deploy_package(session, platform, &package, &deployment, progress).await {
            Ok(DeployOutcome::AlreadyExtracted) => {
                handle.set_detail(stages.upload, "already extracted on host");
            }
            Ok(DeployOutcome::Deployed { uploaded: false }) => {
                handle.set_detail(stages.upload, "archive already on host");
            }
            Ok(DeployOutcome::Deployed { uploaded: true }) => {}
            Err(e) => {
                handle.fail(stages.upload, e.to_string());
                return ToolPhase::NotStarted;
            }
        }
        handle.set_status(stages.upload, StageStatus::Success);
        handle.complete(stages.setup);

        handle.set_status(stages.run_tool, StageStatus::Running);
        handle.set_status(stages.verify_tool, StageStatus::Running);
        let tool_path = platform.join(&[deployment.extract_dir.as_str(), platform.tool_executable()]);
        if let Err(e) = session.stat(&platform.transfer_path(&tool_path)).await {
            handle.fail(
                stages.verify_tool,
                format!("tool not found at {}: {}", tool_path, e),
            );
            return ToolPhase::Started {
                deployment,
                remote_root,
            };
        }
        handle.set_status(stages.verify_tool, StageStatus::Success);

        // Last check of the cancellation flag before the remote dispatch.
        let mut cancel_rx = handle.cancel_receiver();
        if *cancel_rx.borrow_and_update() || handle.is_cancelled() {
            handle.fail(stages.execute, RunnerError::Cancelled.to_string());
            return ToolPhase::Cancelled;
        }

        handle.set_status(stages.execute, StageStatus::Running);
        let command = platform.tool_command(&tool_path, &profile);
        let interrupt = session.interrupt();
        let exec = session.execute(&command);
        tokio::pin!(exec);
        let output = tokio::select! {
            out = &mut exec => out,
            _ = cancel_rx.changed() => {
                // The command is already dispatched; forcing the channel
                // closed is what resolves the pending execute.
                interrupt.fire();
                exec.await
            }
        };

        match output {
            Ok(out) => {
                self.persist_tool_output(handle, &out);
                if out.success() {
                    handle.set_status(stages.execute, StageStatus::Success);
                    handle.complete(stages.run_tool);
                } else {
                    handle.fail(
                        stages.execute,
                        format!("exit code {}: {}", out.exit_code, out.stderr.trim()),
                    );
                }
                ToolPhase::Started {
                    deployment,
                    remote_root,
                }
            }
            Err(e) => {
                if handle.is_cancelled() {
                    handle.fail(stages.execute, RunnerError::Cancelled.to_string());
                    ToolPhase::Cancelled
                } else {
                    handle.fail(stages.execute, e.to_string());
                    ToolPhase::Started {
                        deployment,
                        remote_root,
                    }
                }
            }
        }
    }

    /// Keep the tool's combined output as the run's persisted log file.
    fn persist_tool_output(&self, handle: &RunHandle, output: &CommandOutput) {
        let local_dir = handle.with(|r| r.local_dir.clone());
        let path = local_dir.join("tool-output.log");
        let write = std::fs::create_dir_all(&local_dir)
            .and_then(|_| std::fs::write(&path, output.combined()));
        match write {
            Ok(()) => handle.set_log_file(path),
            Err(e) => warn!("Could not persist tool output to {}: {}", path.display(), e),
        }
    }

    async fn transfer_logs(
        &self,
        handle: &RunHandle,
        session: &dyn RemoteSession,
        deployment: &PackageDeployment,
        remote_root: &str,
    ) {
        let (platform_tag, local_dir, created_at, machine) = handle.with(|r| {
            (
                r.platform,
                r.local_dir.clone(),
                r.created_at,
                r.machine.clone(),
            )
        });
        let platform = platform_tag.kind();

        let (logs_root, archive_stage, download_stage, extract_stage) =
            handle.build_stages(|tree| {
                let root = tree.add_root(stage_labels::TRANSFER_LOGS);
                (
                    root,
                    tree.add_child(root, stage_labels::ARCHIVE_REMOTE_LOGS),
                    tree.add_child(root, stage_labels::DOWNLOAD_ARCHIVE),
                    tree.add_child(root, stage_labels::EXTRACT_LOCALLY),
                )
            });
        handle.set_status(logs_root, StageStatus::Running);

        handle.set_status(archive_stage, StageStatus::Running);
        let remote_logs_dir = platform.join(&[deployment.extract_dir.as_str(), "logs"]);
        let archive_name = format!(
            "{}-logs.{}",
            artifacts::run_label(created_at, &machine),
            platform.log_archive_format().extension()
        );
        let remote_archive = platform.join(&[remote_root, archive_name.as_str()]);
        if let Err(e) =
            archive_remote_logs(session, platform, &remote_logs_dir, &remote_archive).await
        {
            handle.fail(archive_stage, e.to_string());
            return;
        }
        handle.set_status(archive_stage, StageStatus::Success);

        handle.set_status(download_stage, StageStatus::Running);
        let local_archive = local_dir.join(&archive_name);
        if let Err(e) = fetch_log_archive(session, platform, &remote_archive, &local_archive).await
        {
            handle.fail(download_stage, e.to_string());
            return;
        }
        handle.set_status(download_stage, StageStatus::Success);

        handle.set_status(extract_stage, StageStatus::Running);
        let local_logs_dir = local_dir.join("logs");
        let entries = match extract_archive(&local_archive, &local_logs_dir)
            .and_then(|_| list_tree(&local_logs_dir))
        {
            Ok(entries) => entries,
            Err(e) => {
                handle.fail(extract_stage, e.to_string());
                return;
            }
        };
        // The downloaded archive is transient; the extracted tree is the
        // artifact that stays.
        std::fs::remove_file(&local_archive).ok();

        handle.build_stages(|tree| {
            let mut dir_nodes: HashMap<String, StageId> = HashMap::new();
            for entry in &entries {
                let parent = match entry.relative_path.rsplit_once('/') {
                    Some((dir, _)) => *dir_nodes.get(dir).unwrap_or(&extract_stage),
                    None => extract_stage,
                };
                let name = entry
                    .relative_path
                    .rsplit('/')
                    .next()
                    .unwrap_or(&entry.relative_path);
                let id = tree.add_child(parent, name);
                tree.set_artifact(id, entry.relative_path.as_str());
                tree.set_status(id, StageStatus::Success);
                if entry.is_dir {
                    dir_nodes.insert(entry.relative_path.clone(), id);
                }
            }
        });
        handle.set_status(extract_stage, StageStatus::Success);
        handle.complete(logs_root);
    }
}

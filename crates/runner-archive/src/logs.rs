use runner_core::error::RunnerError;
use runner_core::platform::PlatformKind;
use runner_core::session::RemoteSession;
use runner_ssh::transfer::download_file;
use std::path::Path;
use tracing::{debug, warn};

/// Compress the remote logs directory into a single archive.
///
/// A non-zero exit is reported with the command's combined output; an
/// unreachable command channel surfaces as the underlying `Exec` error.
pub async fn archive_remote_logs(
    session: &dyn RemoteSession,
    platform: PlatformKind,
    logs_dir: &str,
    archive_path: &str,
) -> Result<(), RunnerError> {
    let command = platform.compress_command(logs_dir, archive_path);
    debug!("Archiving remote logs: {}", command);
    let output = session.execute(&command).await?;
    if !output.success() {
        return Err(RunnerError::Exec(format!(
            "log archive command exited with {}: {}",
            output.exit_code,
            output.combined()
        )));
    }
    Ok(())
}

/// Download the remote log archive, then delete the remote copy.
///
/// Deleting is best-effort: a failure is logged and never fails the run.
pub async fn fetch_log_archive(
    session: &dyn RemoteSession,
    platform: PlatformKind,
    remote_archive: &str,
    local_path: &Path,
) -> Result<(), RunnerError> {
    download_file(session, &platform.transfer_path(remote_archive), local_path).await?;

    let delete = platform.delete_command(remote_archive);
    match session.execute(&delete).await {
        Ok(output) if !output.success() => {
            warn!(
                "Could not delete remote log archive {}: {}",
                remote_archive,
                output.combined()
            );
        }
        Err(e) => warn!("Could not delete remote log archive {}: {}", remote_archive, e),
        Ok(_) => {}
    }
    Ok(())
}

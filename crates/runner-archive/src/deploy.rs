use runner_core::error::RunnerError;
use runner_core::platform::{ArchiveFormat, PlatformKind};
use runner_core::session::RemoteSession;
use runner_ssh::transfer::{remote_exists, upload_file};
use std::path::Path;
use tracing::{debug, info};

/// Remote locations for one package deployment, in the target platform's
/// native path style. Transfer-channel operations convert separators
/// themselves.
#[derive(Debug, Clone)]
pub struct PackageDeployment {
    /// Remote path the package archive is uploaded to.
    pub archive_path: String,
    /// Directory the archive extracts into.
    pub extract_dir: String,
    pub format: ArchiveFormat,
}

impl PackageDeployment {
    /// Lay out the deployment under the remote working root, naming the
    /// extraction directory after the package file stem.
    pub fn plan(
        platform: PlatformKind,
        remote_root: &str,
        local_package: &Path,
    ) -> Result<Self, RunnerError> {
        let file_name = local_package
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                RunnerError::Transfer(format!(
                    "package path has no file name: {}",
                    local_package.display()
                ))
            })?;
        let format = ArchiveFormat::from_path(file_name).ok_or_else(|| {
            RunnerError::Transfer(format!("unsupported package archive: {}", file_name))
        })?;
        let stem = package_stem(file_name);
        Ok(Self {
            archive_path: platform.join(&[remote_root, file_name]),
            extract_dir: platform.join(&[remote_root, &stem]),
            format,
        })
    }
}

fn package_stem(file_name: &str) -> String {
    let lower = file_name.to_ascii_lowercase();
    for suffix in [".tar.gz", ".tgz", ".tar", ".zip"] {
        if lower.ends_with(suffix) {
            return file_name[..file_name.len() - suffix.len()].to_string();
        }
    }
    file_name.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployOutcome {
    /// The extraction directory was already present; nothing was touched.
    AlreadyExtracted,
    Deployed {
        /// False when the archive was already on the host.
        uploaded: bool,
    },
}

/// Deploy the package archive onto the remote host.
///
/// Re-entrant: an existing extraction directory short-circuits the whole
/// deployment, and an archive already present remotely is not re-uploaded.
/// After a zero-exit extraction command, the destination is re-probed with
/// an error-bearing stat; a missing directory at that point is a silent
/// discrepancy reported as `ExtractionVerification`, distinct from the
/// command itself failing.
pub async fn deploy_package(
    session: &dyn RemoteSession,
    platform: PlatformKind,
    local_package: &Path,
    deployment: &PackageDeployment,
    on_progress: impl FnMut(u64, u64) + Send + 'static,
) -> Result<DeployOutcome, RunnerError> {
    let extract_dir_wire = platform.transfer_path(&deployment.extract_dir);
    if remote_exists(session, &extract_dir_wire).await {
        info!(
            "Extraction directory already present, skipping deployment: {}",
            deployment.extract_dir
        );
        return Ok(DeployOutcome::AlreadyExtracted);
    }

    let archive_wire = platform.transfer_path(&deployment.archive_path);
    let uploaded = upload_file(session, local_package, &archive_wire, on_progress).await?;

    let command =
        platform.extract_command(deployment.format, &deployment.archive_path, &deployment.extract_dir);
    debug!("Extracting package: {}", command);
    let output = session.execute(&command).await?;
    if !output.success() {
        return Err(RunnerError::ExtractionCommand {
            code: output.exit_code,
            output: output.combined(),
        });
    }

    if session.stat(&extract_dir_wire).await.is_err() {
        return Err(RunnerError::ExtractionVerification(
            deployment.extract_dir.clone(),
        ));
    }

    Ok(DeployOutcome::Deployed { uploaded })
}

use runner_core::error::RunnerError;
use runner_core::platform::PlatformKind;
use runner_core::session::RemoteSession;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const MIN_DELTA_PERCENT: u64 = 5;
const MIN_INTERVAL: Duration = Duration::from_secs(5);

/// Throttles transfer progress to one emission per >=5% delta or >=5s
/// elapsed. Completion always emits. Not persisted anywhere.
pub struct ProgressThrottle {
    last_percent: u64,
    last_emit: Instant,
}

impl ProgressThrottle {
    pub fn new() -> Self {
        Self {
            last_percent: 0,
            last_emit: Instant::now(),
        }
    }

    pub fn update(&mut self, transferred: u64, total: u64) -> bool {
        self.update_at(transferred, total, Instant::now())
    }

    fn update_at(&mut self, transferred: u64, total: u64, now: Instant) -> bool {
        let percent = if total == 0 {
            100
        } else {
            transferred * 100 / total
        };
        let due = percent >= 100
            || percent.saturating_sub(self.last_percent) >= MIN_DELTA_PERCENT
            || now.duration_since(self.last_emit) >= MIN_INTERVAL;
        if due {
            self.last_percent = percent;
            self.last_emit = now;
        }
        due
    }
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::new()
    }
}

/// Metadata probe that never errors: inability to stat means "does not
/// exist". Callers needing a hard existence guarantee use `session.stat`
/// directly.
pub async fn remote_exists(session: &dyn RemoteSession, path: &str) -> bool {
    session.stat(path).await.is_ok()
}

/// Create each segment of `path` in order, relative to the transfer
/// channel's working root.
///
/// A segment that already exists is fine, and a failed mkdir is tolerated
/// on its own; but a segment is only ever attempted once its parent has
/// been confirmed present, so an unconfirmable parent is a hard failure.
pub async fn ensure_remote_directory(
    session: &dyn RemoteSession,
    platform: PlatformKind,
    path: &str,
) -> Result<String, RunnerError> {
    let wire = platform.transfer_path(path);
    let mut acc = String::new();
    let mut parent_confirmed = true;

    for segment in wire.split('/') {
        if segment.is_empty() {
            if acc.is_empty() {
                acc.push('/');
            }
            continue;
        }
        if !acc.is_empty() && !acc.ends_with('/') {
            acc.push('/');
        }
        acc.push_str(segment);

        if session.stat(&acc).await.is_ok() {
            parent_confirmed = true;
            continue;
        }
        if !parent_confirmed {
            return Err(RunnerError::Transfer(format!(
                "cannot create '{}': parent segment missing",
                acc
            )));
        }
        if let Err(e) = session.mkdir(&acc).await {
            debug!("mkdir '{}' tolerated: {}", acc, e);
        }
        parent_confirmed = session.stat(&acc).await.is_ok();
    }

    debug!("Remote directory ready: {}", acc);
    Ok(acc)
}

/// Stream a local file to the remote path, invoking `on_progress`
/// (bytes transferred, total) at the throttled cadence.
///
/// Skipped entirely when the remote file already exists, so re-running
/// against a host that already holds the package does not re-upload.
/// Returns whether an upload actually happened.
pub async fn upload_file(
    session: &dyn RemoteSession,
    local: &Path,
    remote: &str,
    mut on_progress: impl FnMut(u64, u64) + Send + 'static,
) -> Result<bool, RunnerError> {
    if remote_exists(session, remote).await {
        info!("Remote file already present, skipping upload: {}", remote);
        return Ok(false);
    }

    let mut throttle = ProgressThrottle::new();
    session
        .upload(
            local,
            remote,
            Box::new(move |transferred, total| {
                if throttle.update(transferred, total) {
                    on_progress(transferred, total);
                }
            }),
        )
        .await?;
    Ok(true)
}

/// Stream a remote file to the local path. Unconditional.
pub async fn download_file(
    session: &dyn RemoteSession,
    remote: &str,
    local: &Path,
) -> Result<(), RunnerError> {
    session.download(remote, local).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_emits_on_five_percent_delta() {
        let start = Instant::now();
        let mut throttle = ProgressThrottle::new();
        let total = 1000;

        assert!(throttle.update_at(50, total, start)); // 5%
        assert!(!throttle.update_at(70, total, start)); // 7%, delta 2
        assert!(!throttle.update_at(90, total, start)); // 9%, delta 4
        assert!(throttle.update_at(100, total, start)); // 10%, delta 5
    }

    #[test]
    fn throttle_emits_after_interval() {
        let start = Instant::now();
        let mut throttle = ProgressThrottle::new();
        let total = 1_000_000;

        assert!(!throttle.update_at(10, total, start + Duration::from_secs(1)));
        assert!(throttle.update_at(20, total, start + Duration::from_secs(6)));
    }

    #[test]
    fn throttle_always_emits_completion() {
        let start = Instant::now();
        let mut throttle = ProgressThrottle::new();

        assert!(throttle.update_at(950, 1000, start)); // 95%
        assert!(throttle.update_at(1000, 1000, start)); // 100%, delta < 5
    }

    #[test]
    fn zero_total_counts_as_complete() {
        let mut throttle = ProgressThrottle::new();
        assert!(throttle.update(0, 0));
    }
}

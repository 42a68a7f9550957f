use crate::credentials::Credentials;
use crate::error::RunnerError;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Result of a single-shot remote command: full stdout and stderr plus the
/// process exit code. A non-zero exit is a result, not an `Err`.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Combined output for stage-detail diagnostics.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.trim_end().to_string();
        let err = self.stderr.trim_end();
        if !err.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(err);
        }
        out
    }
}

/// Metadata from an error-bearing remote stat probe.
#[derive(Debug, Clone, Copy)]
pub struct RemoteStat {
    pub size: u64,
    pub is_dir: bool,
}

/// Per-chunk progress callback: (bytes transferred, total bytes).
pub type ProgressCallback = Box<dyn FnMut(u64, u64) + Send>;

/// Clonable handle that forces a session's underlying stream shut,
/// unblocking any in-flight blocking call. Used for cancellation while a
/// remote command is executing.
#[derive(Clone)]
pub struct SessionInterrupt(Arc<dyn Fn() + Send + Sync>);

impl SessionInterrupt {
    pub fn new(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn noop() -> Self {
        Self(Arc::new(|| {}))
    }

    pub fn fire(&self) {
        (self.0)()
    }
}

impl std::fmt::Debug for SessionInterrupt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionInterrupt")
    }
}

/// One authenticated channel pair to a single remote host, scoped to a
/// single run. The command channel carries one outstanding command at a
/// time; the transfer channel is opened once and reused.
///
/// Implementations take `&self` and serialize access internally, which is
/// what enforces the single-outstanding-command contract.
#[async_trait::async_trait]
pub trait RemoteSession: Send + Sync {
    /// Run one non-interactive command to completion.
    async fn execute(&self, command: &str) -> Result<CommandOutput, RunnerError>;

    /// Error-bearing metadata probe over the transfer channel.
    async fn stat(&self, path: &str) -> Result<RemoteStat, RunnerError>;

    /// Create a single directory segment.
    async fn mkdir(&self, path: &str) -> Result<(), RunnerError>;

    /// Stream a local file to the remote path in fixed-size chunks,
    /// reporting progress after each chunk.
    async fn upload(
        &self,
        local: &Path,
        remote: &str,
        progress: ProgressCallback,
    ) -> Result<(), RunnerError>;

    /// Stream a remote file to the local path.
    async fn download(&self, remote: &str, local: &Path) -> Result<(), RunnerError>;

    /// Handle that forces the session's stream shut from another task.
    fn interrupt(&self) -> SessionInterrupt;

    /// Close both channels and the session, in that order, tolerating each
    /// step's failure. Safe to call more than once.
    async fn close(&self);
}

/// Opens sessions; the seam that lets tests drive the orchestrator with a
/// fake session instead of a live host.
#[async_trait::async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(
        &self,
        host: &str,
        port: u16,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<Box<dyn RemoteSession>, RunnerError>;
}

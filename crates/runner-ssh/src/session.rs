use runner_core::credentials::Credentials;
use runner_core::error::RunnerError;
use runner_core::session::{
    CommandOutput, ProgressCallback, RemoteSession, RemoteStat, SessionFactory, SessionInterrupt,
};
use ssh2::Session;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_CHUNK_SIZE: usize = 32 * 1024;

/// Blocking ssh2 state, serialized behind one lock. The lock is what
/// enforces the single-outstanding-command contract.
struct Inner {
    session: Session,
    sftp: Option<ssh2::Sftp>,
    closed: bool,
    chunk_size: usize,
}

impl Inner {
    fn ensure_open(&self) -> Result<(), RunnerError> {
        if self.closed {
            return Err(RunnerError::Exec("session is closed".into()));
        }
        Ok(())
    }

    /// The file-transfer channel is opened on first use and reused for the
    /// lifetime of the session.
    fn sftp(&mut self) -> Result<&ssh2::Sftp, RunnerError> {
        if self.sftp.is_none() {
            let sftp = self
                .session
                .sftp()
                .map_err(|e| RunnerError::Transfer(format!("open transfer channel: {}", e)))?;
            self.sftp = Some(sftp);
        }
        Ok(self.sftp.as_ref().unwrap())
    }

    fn exec(&mut self, command: &str) -> Result<CommandOutput, RunnerError> {
        self.ensure_open()?;
        debug!("Remote exec: {}", command);
        let mut channel = self
            .session
            .channel_session()
            .map_err(|e| RunnerError::Exec(format!("channel: {}", e)))?;
        channel
            .exec(command)
            .map_err(|e| RunnerError::Exec(format!("exec '{}': {}", command, e)))?;

        let mut stdout = String::new();
        channel
            .read_to_string(&mut stdout)
            .map_err(|e| RunnerError::Exec(format!("read output: {}", e)))?;

        let mut stderr = String::new();
        channel
            .stderr()
            .read_to_string(&mut stderr)
            .map_err(|e| RunnerError::Exec(format!("read stderr: {}", e)))?;

        channel.wait_close().ok();
        let exit_code = channel.exit_status().unwrap_or(-1);

        Ok(CommandOutput {
            stdout,
            stderr,
            exit_code,
        })
    }

    fn stat(&mut self, path: &str) -> Result<RemoteStat, RunnerError> {
        self.ensure_open()?;
        let st = self
            .sftp()?
            .stat(Path::new(path))
            .map_err(|e| RunnerError::Transfer(format!("stat '{}': {}", path, e)))?;
        Ok(RemoteStat {
            size: st.size.unwrap_or(0),
            is_dir: st.is_dir(),
        })
    }

    fn mkdir(&mut self, path: &str) -> Result<(), RunnerError> {
        self.ensure_open()?;
        self.sftp()?
            .mkdir(Path::new(path), 0o755)
            .map_err(|e| RunnerError::Transfer(format!("mkdir '{}': {}", path, e)))
    }

    fn upload(
        &mut self,
        local: &Path,
        remote: &str,
        mut progress: ProgressCallback,
    ) -> Result<(), RunnerError> {
        self.ensure_open()?;
        let mut file = std::fs::File::open(local)
            .map_err(|e| RunnerError::Transfer(format!("open '{}': {}", local.display(), e)))?;
        let total = file
            .metadata()
            .map_err(|e| RunnerError::Transfer(format!("stat '{}': {}", local.display(), e)))?
            .len();

        let chunk_size = self.chunk_size;
        let mut remote_file = self
            .sftp()?
            .create(Path::new(remote))
            .map_err(|e| RunnerError::Transfer(format!("create '{}': {}", remote, e)))?;

        let mut buf = vec![0u8; chunk_size];
        let mut transferred: u64 = 0;
        loop {
            let n = file
                .read(&mut buf)
                .map_err(|e| RunnerError::Transfer(format!("read '{}': {}", local.display(), e)))?;
            if n == 0 {
                break;
            }
            remote_file
                .write_all(&buf[..n])
                .map_err(|e| RunnerError::Transfer(format!("write '{}': {}", remote, e)))?;
            transferred += n as u64;
            progress(transferred, total);
        }
        Ok(())
    }

    fn download(&mut self, remote: &str, local: &Path) -> Result<(), RunnerError> {
        self.ensure_open()?;
        if let Some(parent) = local.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RunnerError::Transfer(format!("mkdir '{}': {}", parent.display(), e)))?;
        }
        let chunk_size = self.chunk_size;
        let mut remote_file = self
            .sftp()?
            .open(Path::new(remote))
            .map_err(|e| RunnerError::Transfer(format!("open '{}': {}", remote, e)))?;
        let mut file = std::fs::File::create(local)
            .map_err(|e| RunnerError::Transfer(format!("create '{}': {}", local.display(), e)))?;

        let mut buf = vec![0u8; chunk_size];
        loop {
            let n = remote_file
                .read(&mut buf)
                .map_err(|e| RunnerError::Transfer(format!("read '{}': {}", remote, e)))?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])
                .map_err(|e| RunnerError::Transfer(format!("write '{}': {}", local.display(), e)))?;
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        // Transfer channel first, then the session, each best-effort.
        if let Some(mut sftp) = self.sftp.take() {
            if let Err(e) = sftp.shutdown() {
                debug!("Transfer channel shutdown: {}", e);
            }
        }
        if let Err(e) = self
            .session
            .disconnect(Some(ssh2::DisconnectCode::ByApplication), "closing", None)
        {
            debug!("Session disconnect: {}", e);
        }
        self.closed = true;
    }
}

/// Authenticated command + transfer channel pair to one host, scoped to a
/// single run. Blocking ssh2 calls run on the blocking pool.
pub struct SshSession {
    inner: Arc<Mutex<Inner>>,
    interrupt: SessionInterrupt,
    host: String,
}

impl SshSession {
    /// Connect, handshake, and authenticate within `timeout`. On any
    /// failure no partial state is retained.
    pub fn open(
        host: &str,
        port: u16,
        credentials: &Credentials,
        timeout: Duration,
        chunk_size: usize,
    ) -> Result<Self, RunnerError> {
        let connect_err = |reason: String| RunnerError::Connect {
            host: host.to_string(),
            reason,
        };

        let addr = format!("{}:{}", host, port);
        debug!("Connecting to {}@{}", credentials.username, addr);
        let sock = addr
            .to_socket_addrs()
            .map_err(|e| connect_err(format!("resolve {}: {}", addr, e)))?
            .next()
            .ok_or_else(|| connect_err(format!("no address for {}", addr)))?;

        let tcp = TcpStream::connect_timeout(&sock, timeout)
            .map_err(|e| connect_err(format!("TCP connect to {}: {}", addr, e)))?;
        let interrupt_stream = tcp
            .try_clone()
            .map_err(|e| connect_err(format!("clone stream: {}", e)))?;

        let mut session =
            Session::new().map_err(|e| connect_err(format!("Session::new: {}", e)))?;
        session.set_tcp_stream(tcp);
        // Bound the handshake and auth; lifted afterwards so long tool runs
        // are not cut off mid-command.
        session.set_timeout(timeout.as_millis() as u32);
        session
            .handshake()
            .map_err(|e| connect_err(format!("handshake: {}", e)))?;
        session
            .userauth_password(&credentials.username, &credentials.secret)
            .map_err(|e| connect_err(format!("password auth: {}", e)))?;
        if !session.authenticated() {
            return Err(connect_err("authentication failed".into()));
        }
        session.set_timeout(0);

        info!("SSH connected to {}@{}", credentials.username, addr);

        let interrupt = SessionInterrupt::new(move || {
            let _ = interrupt_stream.shutdown(Shutdown::Both);
        });

        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                session,
                sftp: None,
                closed: false,
                chunk_size,
            })),
            interrupt,
            host: host.to_string(),
        })
    }

    async fn blocking<T, F>(&self, label: &str, f: F) -> Result<T, RunnerError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Inner) -> Result<T, RunnerError> + Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || f(&mut inner.lock().unwrap()))
            .await
            .map_err(|e| RunnerError::Exec(format!("{} task failed: {}", label, e)))?
    }
}

#[async_trait::async_trait]
impl RemoteSession for SshSession {
    async fn execute(&self, command: &str) -> Result<CommandOutput, RunnerError> {
        let command = command.to_string();
        self.blocking("exec", move |inner| inner.exec(&command)).await
    }

    async fn stat(&self, path: &str) -> Result<RemoteStat, RunnerError> {
        let path = path.to_string();
        self.blocking("stat", move |inner| inner.stat(&path)).await
    }

    async fn mkdir(&self, path: &str) -> Result<(), RunnerError> {
        let path = path.to_string();
        self.blocking("mkdir", move |inner| inner.mkdir(&path)).await
    }

    async fn upload(
        &self,
        local: &Path,
        remote: &str,
        progress: ProgressCallback,
    ) -> Result<(), RunnerError> {
        let local: PathBuf = local.to_path_buf();
        let remote = remote.to_string();
        self.blocking("upload", move |inner| inner.upload(&local, &remote, progress))
            .await
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<(), RunnerError> {
        let remote = remote.to_string();
        let local: PathBuf = local.to_path_buf();
        self.blocking("download", move |inner| inner.download(&remote, &local))
            .await
    }

    fn interrupt(&self) -> SessionInterrupt {
        self.interrupt.clone()
    }

    async fn close(&self) {
        let inner = self.inner.clone();
        let host = self.host.clone();
        let joined = tokio::task::spawn_blocking(move || {
            inner.lock().unwrap().close();
        })
        .await;
        if joined.is_err() {
            warn!("Session close task failed for {}", host);
        }
    }
}

/// Opens live [`SshSession`]s for the orchestrator.
pub struct SshSessionFactory {
    chunk_size: usize,
}

impl SshSessionFactory {
    pub fn new(chunk_size: usize) -> Self {
        Self { chunk_size }
    }
}

impl Default for SshSessionFactory {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

#[async_trait::async_trait]
impl SessionFactory for SshSessionFactory {
    async fn open(
        &self,
        host: &str,
        port: u16,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<Box<dyn RemoteSession>, RunnerError> {
        let host = host.to_string();
        let credentials = credentials.clone();
        let chunk_size = self.chunk_size;
        let session = tokio::task::spawn_blocking(move || {
            SshSession::open(&host, port, &credentials, timeout, chunk_size)
        })
        .await
        .map_err(|e| RunnerError::Exec(format!("connect task failed: {}", e)))??;
        Ok(Box::new(session))
    }
}

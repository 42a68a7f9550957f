pub mod session;
pub mod transfer;

pub use session::{SshSession, SshSessionFactory};
pub use transfer::{
    download_file, ensure_remote_directory, remote_exists, upload_file, ProgressThrottle,
};

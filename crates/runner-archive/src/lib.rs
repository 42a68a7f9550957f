pub mod deploy;
pub mod local;
pub mod logs;

pub use deploy::{deploy_package, DeployOutcome, PackageDeployment};
pub use local::{extract_archive, list_tree, TreeEntry};
pub use logs::{archive_remote_logs, fetch_log_archive};

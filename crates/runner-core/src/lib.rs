pub mod artifacts;
pub mod config;
pub mod credentials;
pub mod error;
pub mod notify;
pub mod platform;
pub mod registry;
pub mod run;
pub mod session;
pub mod stage;

pub use config::Config;
pub use credentials::{CredentialStore, Credentials};
pub use error::RunnerError;
pub use notify::ChangeNotifier;
pub use platform::{PlatformKind, PlatformTag};
pub use registry::RunRegistry;
pub use run::{Run, RunHandle, RunId, RunRequest};
pub use session::{CommandOutput, RemoteSession, RemoteStat, SessionFactory, SessionInterrupt};
pub use stage::{StageId, StageStatus, StageTree};

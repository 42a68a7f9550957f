use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("connection to {host} failed: {reason}")]
    Connect { host: String, reason: String },

    #[error("remote command failed: {0}")]
    Exec(String),

    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("extraction command exited with code {code}: {output}")]
    ExtractionCommand { code: i32, output: String },

    #[error("extraction reported success but '{0}' was not created")]
    ExtractionVerification(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("no credentials for machine: {0}")]
    CredentialsNotFound(String),

    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

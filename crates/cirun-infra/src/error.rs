use thiserror::Error;

#[derive(Error, Debug)]
pub enum InfraError {
    #[error("terraform {command} failed ({status}): {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("terraform binary not usable: {0}")]
    Binary(String),

    #[error("terraform {found} is older than the required {required}")]
    VersionTooOld { found: String, required: String },

    #[error("runner has no cloud configuration")]
    NotCloud,

    #[error("invalid state: {0}")]
    State(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

use thiserror::Error;

/// Invalid flag combinations and launch preconditions.
///
/// Always fatal: reported before any provisioning begins.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown driver: {0} (expected: github|gitlab|bitbucket)")]
    UnknownDriver(String),
    #[error("unknown cloud: {0} (expected: aws|azure|gcp|kubernetes)")]
    UnknownCloud(String),
    #[error("cannot infer driver from repository {0}; pass --driver")]
    DriverNotInferred(String),
    #[error("runner name must not be empty")]
    EmptyName,
    #[error("flags {0} and {1} are mutually exclusive")]
    Conflict(&'static str, &'static str),
    #[error(
        "Runner name {0} is already in use. Please change the name or terminate the existing runner."
    )]
    NameInUse(String),
    #[error("cirun runner flag --reuse-idle is unsupported by {0}")]
    ReuseIdleUnsupported(String),
    #[error("invalid tf resource: {0}")]
    InvalidTfResource(String),
}

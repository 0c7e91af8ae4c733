use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{method} {url} returned {status}: {body}")]
    Status {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error("token rejected for {0}; check repository access and token scopes")]
    Unauthorized(String),

    #[error("invalid repository url: {0}")]
    InvalidRepo(String),

    #[error("runner not found: {0}")]
    RunnerNotFound(String),

    #[error("{0} is not supported by this platform")]
    Unsupported(&'static str),

    #[error("runner installation failed: {0}")]
    Install(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("missing program")]
    MissingProgram,
    #[error("child {0} is not piped")]
    MissingPipe(&'static str),
    #[error("io error: {0}")]
    Io(String),
    #[error("supervisor task failed: {0}")]
    Join(String),
}

impl From<std::io::Error> for ExecError {
    fn from(e: std::io::Error) -> Self {
        ExecError::Io(e.to_string())
    }
}

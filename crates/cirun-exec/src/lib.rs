mod error;
pub use error::ExecError;

mod process;
pub use process::{OutputStream, ProcessEvent, RunnerProcess};

mod util;
pub use util::cmd_program;

use tokio::process::{Child, Command};

pub fn cmd_program(program: &str, args: &[String]) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args.iter().map(|s| s.as_str()));
    cmd
}

/// Ask the child to stop the way an interactive user would (SIGINT).
///
/// Runner agents deregister their current job on SIGINT, which SIGKILL would skip.
#[cfg(unix)]
pub fn interrupt(child: &mut Child) -> std::io::Result<()> {
    let Some(id) = child.id() else {
        // already reaped
        return Ok(());
    };
    let rc = unsafe { libc::kill(id as libc::pid_t, libc::SIGINT) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn interrupt(child: &mut Child) -> std::io::Result<()> {
    child.start_kill()
}

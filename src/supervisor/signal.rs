//! Graceful termination requests
//!
//! Unix gets SIGTERM so the agent can shut its listener down cleanly.
//! Other platforms have no equivalent for console processes and fall back
//! to an immediate kill.

use tokio::process::Child;

/// Ask the child to terminate. Returns false if the request could not be sent
/// (the process is already gone or has no pid).
#[cfg(unix)]
pub fn request_termination(child: &mut Child) -> bool {
    let Some(pid) = child.id() else {
        return false;
    };
    // SAFETY: plain kill(2) on a pid we spawned and have not yet reaped.
    let result = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if result != 0 {
        tracing::debug!(
            pid,
            error = %std::io::Error::last_os_error(),
            "SIGTERM delivery failed"
        );
        return false;
    }
    true
}

#[cfg(not(unix))]
pub fn request_termination(child: &mut Child) -> bool {
    child.start_kill().is_ok()
}

//! Thin wrappers over the OS process primitives used by the managers.

use std::io;
use std::path::PathBuf;

/// Deliver `signal` to `pid`.
pub fn send_signal(pid: u32, signal: i32) -> io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(pid, signal) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Path of the running executable, used to spawn workers and services.
pub fn current_program() -> io::Result<PathBuf> {
    std::env::current_exe()
}

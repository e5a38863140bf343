//! OS side effects of service management.

use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

use super::Service;
use crate::error::ServiceError;
use crate::registry::Named;

/// The operations [`ServiceManager`](super::ServiceManager) delegates to
/// the operating system.
pub trait ServiceRuntime {
    /// Issue the service's launch command. Returns once the command is
    /// issued, not once the service is up.
    fn launch(&self, service: &Service) -> Result<(), ServiceError>;

    fn discover_pid(&self, service: &Service) -> Result<u32, ServiceError>;

    fn send_signal(&self, pid: u32, signal: i32) -> Result<(), ServiceError>;

    fn remove_artifact(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }
}

/// Runs launch commands through `sh` in a fresh session.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRuntime;

impl ServiceRuntime for SystemRuntime {
    fn launch(&self, service: &Service) -> Result<(), ServiceError> {
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(service.launch_command())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // SAFETY: setsid is async-signal-safe and touches no parent state.
            // A new session keeps the terminal's Ctrl-C and hangup away from
            // the service.
            unsafe {
                command.pre_exec(|| {
                    libc::setsid();
                    Ok(())
                });
            }
        }

        let output = command.output().map_err(|e| ServiceError::LaunchFailed {
            name: service.name().to_string(),
            reason: e.to_string(),
        })?;

        if !output.status.success() {
            return Err(ServiceError::LaunchFailed {
                name: service.name().to_string(),
                reason: format!(
                    "sh exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(())
    }

    fn discover_pid(&self, service: &Service) -> Result<u32, ServiceError> {
        service.pid()
    }

    fn send_signal(&self, pid: u32, signal: i32) -> Result<(), ServiceError> {
        crate::process::send_signal(pid, signal).map_err(|source| ServiceError::Signal {
            pid,
            signal,
            source,
        })
    }
}

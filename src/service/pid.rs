//! Recovering a detached service's PID.
//!
//! Two strategies, selected by [`PidDiscovery`]:
//!
//! - **Sidecar**: the service process writes its own PID next to its
//!   script on startup. Before trusting it, the live process must still
//!   carry the service signature, so a stale file left by a crash (and a
//!   recycled PID) reads as "not running".
//! - **Process table**: scan the current user's processes for a command
//!   line containing the signature. Exactly one match is required.

use std::ffi::OsStr;
use std::path::Path;

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

use super::{PidDiscovery, RUN_SERVICE_SUBCOMMAND, Service};
use crate::error::ServiceError;
use crate::registry::Named;

/// `"<program-file-name> run-service ./<stem>_service"`
pub fn signature(program: &Path, stem: &str) -> String {
    let program_name = program
        .file_name()
        .unwrap_or(program.as_os_str())
        .to_string_lossy();
    format!("{program_name} {RUN_SERVICE_SUBCOMMAND} ./{stem}_service")
}

/// Flatten an argv into the line signatures are matched against.
///
/// argv0 is reduced to its file name so the match holds whether the
/// program was started by absolute path, relative path, or `$PATH`.
pub fn command_line<S: AsRef<OsStr>>(argv: &[S]) -> String {
    let mut parts = Vec::with_capacity(argv.len());
    if let Some((program, args)) = argv.split_first() {
        let program = Path::new(program.as_ref());
        parts.push(
            program
                .file_name()
                .unwrap_or(program.as_os_str())
                .to_string_lossy()
                .into_owned(),
        );
        parts.extend(args.iter().map(|a| a.as_ref().to_string_lossy().into_owned()));
    }
    parts.join(" ")
}

/// PIDs whose command line contains `signature`.
pub fn matching_pids<I>(candidates: I, signature: &str) -> Vec<u32>
where
    I: IntoIterator<Item = (u32, String)>,
{
    candidates
        .into_iter()
        .filter(|(_, line)| line.contains(signature))
        .map(|(pid, _)| pid)
        .collect()
}

/// Resolve `service`'s PID with its configured strategy.
pub fn discover(service: &Service) -> Result<u32, ServiceError> {
    let not_found = || ServiceError::ServicePidNotFound {
        name: service.name().to_string(),
    };
    let signature = service.signature();

    match service.pid_discovery() {
        PidDiscovery::Sidecar => {
            let pid = read_sidecar(&service.pid_file()).ok_or_else(not_found)?;
            let line = process_command_line(pid).ok_or_else(not_found)?;
            if line.contains(&signature) {
                Ok(pid)
            } else {
                tracing::debug!(
                    "[service] stale pid file for '{}': pid {pid} runs '{line}'",
                    service.name()
                );
                Err(not_found())
            }
        }
        PidDiscovery::ProcessTable => {
            let pids = matching_pids(user_processes(), &signature);
            match pids.as_slice() {
                [pid] => Ok(*pid),
                [] => Err(not_found()),
                many => {
                    tracing::warn!(
                        "[service] {} processes match '{signature}', refusing to guess",
                        many.len()
                    );
                    Err(not_found())
                }
            }
        }
    }
}

/// Record the calling process as the service at `path`.
pub fn write_sidecar(path: &Path) -> std::io::Result<()> {
    std::fs::write(path, format!("{}\n", std::process::id()))
}

/// Missing or unparseable sidecars read as `None`.
pub fn read_sidecar(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

fn refresh_kind() -> ProcessRefreshKind {
    ProcessRefreshKind::nothing()
        .with_cmd(UpdateKind::Always)
        .with_user(UpdateKind::Always)
}

/// Command line of a single live process.
fn process_command_line(pid: u32) -> Option<String> {
    let pid = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes_specifics(ProcessesToUpdate::Some(&[pid]), true, refresh_kind());
    sys.process(pid).map(|process| command_line(process.cmd()))
}

/// `(pid, command line)` of every process owned by the current user.
fn user_processes() -> Vec<(u32, String)> {
    let mut sys = System::new();
    sys.refresh_processes_specifics(ProcessesToUpdate::All, true, refresh_kind());

    let current_user = sysinfo::get_current_pid()
        .ok()
        .and_then(|pid| sys.process(pid))
        .and_then(|process| process.user_id())
        .cloned();

    sys.processes()
        .iter()
        // Linux lists threads as tasks; only whole processes count
        .filter(|(_, process)| process.thread_kind().is_none())
        .filter(|(_, process)| match &current_user {
            Some(uid) => process.user_id() == Some(uid),
            None => true,
        })
        .map(|(pid, process)| (pid.as_u32(), command_line(process.cmd())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_signature_uses_program_file_name() {
        assert_eq!(
            signature(Path::new("/opt/bin/watchplus"), "docs"),
            "watchplus run-service ./docs_service"
        );
        assert_eq!(
            signature(Path::new("watchplus"), "docs"),
            "watchplus run-service ./docs_service"
        );
    }

    #[test]
    fn test_command_line_strips_program_dir() {
        let argv = ["/opt/bin/watchplus", "run-service", "./docs_service.toml"];
        assert_eq!(
            command_line(&argv),
            "watchplus run-service ./docs_service.toml"
        );
        assert_eq!(command_line::<&str>(&[]), "");
    }

    #[test]
    fn test_matching_pids() {
        let sig = signature(Path::new("/opt/bin/watchplus"), "docs");
        let candidates = vec![
            (10, "watchplus run-service ./docs_service.toml".to_string()),
            (11, "vim ./docs_service.toml".to_string()),
            (12, "watchplus run-service ./docs2_service.toml".to_string()),
            (13, "watchplus observe --name docs".to_string()),
        ];
        assert_eq!(matching_pids(candidates, &sig), vec![10]);
    }

    #[test]
    fn test_ambiguous_matches_are_all_reported() {
        let sig = "watchplus run-service ./docs_service";
        let candidates = vec![
            (1, "watchplus run-service ./docs_service.toml".to_string()),
            (2, "watchplus run-service ./docs_service.toml".to_string()),
        ];
        assert_eq!(matching_pids(candidates, sig).len(), 2);
    }

    #[test]
    fn test_sidecar_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("docs_service.pid");

        assert_eq!(read_sidecar(&path), None);
        write_sidecar(&path).unwrap();
        assert_eq!(read_sidecar(&path), Some(std::process::id()));

        std::fs::write(&path, "not a pid").unwrap();
        assert_eq!(read_sidecar(&path), None);
    }

    #[test]
    fn test_stale_sidecar_is_not_trusted() {
        let temp_dir = TempDir::new().unwrap();
        let service = Service::new(
            "docs",
            "/data",
            temp_dir.path(),
            "/opt/bin/watchplus",
            PidDiscovery::Sidecar,
        )
        .unwrap();

        // The test runner is alive but is not the service
        write_sidecar(&service.pid_file()).unwrap();
        assert!(matches!(
            discover(&service),
            Err(ServiceError::ServicePidNotFound { .. })
        ));
    }

    #[test]
    fn test_process_table_without_service_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let service = Service::new(
            "no-such-service-anywhere",
            "/data",
            temp_dir.path(),
            "/opt/bin/watchplus",
            PidDiscovery::ProcessTable,
        )
        .unwrap();

        assert!(matches!(
            discover(&service),
            Err(ServiceError::ServicePidNotFound { .. })
        ));
    }

    #[test]
    fn test_own_command_line_is_visible() {
        let line = process_command_line(std::process::id()).unwrap();
        assert!(!line.is_empty());
    }
}

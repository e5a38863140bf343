//! Services: observers running as detached background processes.
//!
//! A service is a generated script plus the process launched from it.
//! The launching call never sees the child's PID; it is recovered later
//! either from a sidecar file the service writes on startup, or by
//! scanning the process table for the command-line signature.
//!
//! # Artifacts
//!
//! ```text
//! <service_dir>/
//!   <name>_service.toml   generated script (shebang + TOML)
//!   <name>_output.txt     stdout/stderr of the detached process
//!   <name>_service.pid    sidecar written by the running service
//! ```

mod manager;
pub mod pid;
mod runner;
mod runtime;
mod script;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use manager::{ServiceManager, ServiceStatus};
pub use runner::run_service;
pub use runtime::{ServiceRuntime, SystemRuntime};
pub use script::ServiceScript;

use crate::error::ServiceError;
use crate::registry::Named;

/// Subcommand the generated script runs under.
pub const RUN_SERVICE_SUBCOMMAND: &str = "run-service";

/// How a service's PID is recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PidDiscovery {
    /// Read the PID the service wrote next to its script, then check the
    /// live process still carries the service signature.
    #[default]
    Sidecar,
    /// Scan the current user's processes for the signature. Racy, and a
    /// process whose command line contains the signature is
    /// indistinguishable from the service.
    ProcessTable,
}

/// Service manager settings (the `[service]` config section).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Parent of default service directories.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Executable the scripts run under. Defaults to the running binary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<PathBuf>,

    #[serde(default)]
    pub pid_discovery: PidDiscovery,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            program: None,
            pid_discovery: PidDiscovery::default(),
        }
    }
}

impl ServiceSettings {
    /// Resolve the program, falling back to the running executable.
    pub fn program(&self) -> Result<PathBuf, ServiceError> {
        match &self.program {
            Some(program) => Ok(program.clone()),
            None => crate::process::current_program()
                .map_err(|e| ServiceError::io("<current executable>", e)),
        }
    }

    /// Default directory for a service named `name`.
    pub fn default_service_dir(&self, name: &str) -> PathBuf {
        self.base_dir.join(format!("{name} watchplus-service"))
    }
}

/// A named, file-backed description of a detached observer process.
///
/// Everything derived from the name (file paths, launch command,
/// signature, PID) is recomputed on each call and never cached, so a
/// value is only as fresh as the call that produced it.
#[derive(Debug, Clone)]
pub struct Service {
    name: String,
    path: PathBuf,
    service_dir: PathBuf,
    program: PathBuf,
    pid_discovery: PidDiscovery,
    is_active: bool,
}

impl Service {
    /// Describe a service and make sure its directory exists.
    pub fn new(
        name: &str,
        path: impl Into<PathBuf>,
        service_dir: impl Into<PathBuf>,
        program: impl Into<PathBuf>,
        pid_discovery: PidDiscovery,
    ) -> Result<Self, ServiceError> {
        validate_name(name)?;
        let service_dir = service_dir.into();
        std::fs::create_dir_all(&service_dir)
            .map_err(|e| ServiceError::io(&service_dir, e))?;

        Ok(Self {
            name: name.to_string(),
            path: path.into(),
            service_dir,
            program: program.into(),
            pid_discovery,
            is_active: false,
        })
    }

    /// Monitored path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn service_dir(&self) -> &Path {
        &self.service_dir
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn pid_discovery(&self) -> PidDiscovery {
        self.pid_discovery
    }

    /// Whether the launch command was issued. Not a liveness check.
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.is_active = active;
    }

    /// Script location for a service named `name` in `service_dir`,
    /// without building the service.
    pub fn script_path(service_dir: &Path, name: &str) -> PathBuf {
        service_dir.join(script_name(&file_stem(name)))
    }

    fn file_stem(&self) -> String {
        file_stem(&self.name)
    }

    fn script_name(&self) -> String {
        script_name(&self.file_stem())
    }

    fn output_name(&self) -> String {
        format!("{}_output.txt", self.file_stem())
    }

    pub fn service_file(&self) -> PathBuf {
        self.service_dir.join(self.script_name())
    }

    pub fn output_file(&self) -> PathBuf {
        self.service_dir.join(self.output_name())
    }

    pub fn pid_file(&self) -> PathBuf {
        self.service_dir
            .join(format!("{}_service.pid", self.file_stem()))
    }

    /// Shell command that starts the service detached from the caller.
    ///
    /// Runs from the service directory so the script argument is the
    /// relative `./<name>_service.toml` the signature expects. The
    /// backgrounded subshell execs into the service, leaving no `sh`
    /// process whose command line also carries the signature.
    pub fn launch_command(&self) -> String {
        let dir = self.service_dir.to_string_lossy();
        let program = self.program.to_string_lossy();
        let script = format!("./{}", self.script_name());
        let output = format!("./{}", self.output_name());
        format!(
            "cd {} && exec nohup {} {RUN_SERVICE_SUBCOMMAND} {} > {} 2>&1 &",
            shell_words::quote(&dir),
            shell_words::quote(&program),
            shell_words::quote(&script),
            shell_words::quote(&output),
        )
    }

    /// Command-line fragment identifying this service's process.
    pub fn signature(&self) -> String {
        pid::signature(&self.program, &self.file_stem())
    }

    /// Recover the PID through this service's discovery strategy.
    pub fn pid(&self) -> Result<u32, ServiceError> {
        pid::discover(self)
    }
}

impl Named for Service {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Artifact file names use the lowercased service name.
fn file_stem(name: &str) -> String {
    name.to_lowercase()
}

fn script_name(stem: &str) -> String {
    format!("{stem}_service.toml")
}

pub(crate) fn validate_name(name: &str) -> Result<(), ServiceError> {
    if name.is_empty() || name.contains('/') || name.contains('\0') {
        return Err(ServiceError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

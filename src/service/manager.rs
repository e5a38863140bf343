//! Registry of services and their lifecycle operations.

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::{Service, ServiceRuntime, ServiceScript, ServiceSettings, SystemRuntime};
use crate::error::{RegistryError, ServiceError, WatchError};
use crate::events::BUILTIN_HANDLERS;
use crate::registry::{Named, Registry};

/// Point-in-time view of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub name: String,
    pub path: PathBuf,
    pub service_dir: PathBuf,
    /// Launch was issued by this manager (or the service was attached).
    pub active: bool,
    /// Live PID, if discovery succeeded.
    pub pid: Option<u32>,
    pub script_present: bool,
}

/// Creates, launches, signals and cleans up detached services.
///
/// OS interaction goes through `R`, so launch, signal delivery and file
/// removal can be observed or replaced.
pub struct ServiceManager<R: ServiceRuntime = SystemRuntime> {
    settings: ServiceSettings,
    services: Registry<Service>,
    runtime: R,
}

impl ServiceManager<SystemRuntime> {
    pub fn new(settings: ServiceSettings) -> Self {
        Self::with_runtime(settings, SystemRuntime)
    }
}

impl<R: ServiceRuntime> ServiceManager<R> {
    pub fn with_runtime(settings: ServiceSettings, runtime: R) -> Self {
        Self {
            settings,
            services: Registry::new(),
            runtime,
        }
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn get_service(&self, name: &str) -> Result<&Service, ServiceError> {
        Ok(self.services.get(name)?)
    }

    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.services.iter()
    }

    /// Write a service script that watches `path` with the built-in
    /// `handler` (default `log`) appending to `output_file`, and register
    /// the service under `name`.
    ///
    /// `service_dir` defaults to `<base_dir>/<name> watchplus-service`.
    pub fn create_service(
        &mut self,
        path: impl Into<PathBuf>,
        name: &str,
        output_file: impl Into<PathBuf>,
        service_dir: Option<PathBuf>,
        handler: Option<&str>,
    ) -> Result<&Service, ServiceError> {
        let mut script = ServiceScript::new(name, path, output_file);
        if let Some(handler) = handler {
            script.handler = handler.to_string();
        }
        self.create_from_script(script, service_dir)
    }

    /// Like [`create_service`](Self::create_service) with every script
    /// field under the caller's control.
    pub fn create_from_script(
        &mut self,
        script: ServiceScript,
        service_dir: Option<PathBuf>,
    ) -> Result<&Service, ServiceError> {
        let name = script.name.clone();
        if self.services.contains(&name) {
            return Err(RegistryError::AlreadyExists { name }.into());
        }
        if !BUILTIN_HANDLERS.contains(&script.handler.as_str()) {
            return Err(WatchError::UnknownHandler {
                name: script.handler,
            }
            .into());
        }

        // The service runs from its own directory
        let script = ServiceScript {
            path: absolute(&script.path)?,
            log_file: absolute(&script.log_file)?,
            ..script
        };

        let service_dir =
            service_dir.unwrap_or_else(|| self.settings.default_service_dir(&name));
        // Names differing only in case share one set of files
        let script_file = Service::script_path(&service_dir, &name);
        if let Some(owner) = self
            .services
            .iter()
            .find(|existing| existing.service_file() == script_file)
        {
            crate::debug_event!(
                "service",
                "file collision",
                "{name} would reuse the files of {}",
                owner.name()
            );
            return Err(RegistryError::AlreadyExists { name }.into());
        }

        let program = self.settings.program()?;
        let service = Service::new(
            &name,
            script.path.clone(),
            service_dir,
            program,
            self.settings.pid_discovery,
        )?;

        script.write(service.program(), &service.service_file())?;
        crate::debug_event!(
            "service",
            "script written",
            "{}",
            service.service_file().display()
        );

        self.services.insert(service)?;
        self.get_service(&name)
    }

    /// Register a service whose artifacts already exist, typically one
    /// started by an earlier invocation. The service counts as active.
    pub fn attach_service(
        &mut self,
        name: &str,
        service_dir: Option<PathBuf>,
    ) -> Result<&Service, ServiceError> {
        if self.services.contains(name) {
            return Err(RegistryError::AlreadyExists {
                name: name.to_string(),
            }
            .into());
        }

        super::validate_name(name)?;
        let service_dir =
            service_dir.unwrap_or_else(|| self.settings.default_service_dir(name));
        // Load first so a missing service leaves nothing behind on disk
        let script = ServiceScript::load(&Service::script_path(&service_dir, name))?;

        let mut service = Service::new(
            name,
            script.path,
            service_dir,
            self.settings.program()?,
            self.settings.pid_discovery,
        )?;
        service.set_active(true);

        self.services.insert(service)?;
        self.get_service(name)
    }

    /// Drop a service from the registry. Its files and process are left alone.
    pub fn remove_service(&mut self, name: &str) -> Result<Service, ServiceError> {
        Ok(self.services.remove(name)?)
    }

    /// Issue the launch command and mark the service active.
    pub fn start_service(&mut self, name: &str) -> Result<(), ServiceError> {
        let service = self.services.get(name)?;

        // A leftover sidecar would be read before the new process rewrites it
        remove_quietly(&self.runtime, &service.pid_file())?;
        self.runtime.launch(service)?;
        crate::log_event!("service", "started", "{name}");

        self.services.get_mut(name)?.set_active(true);
        Ok(())
    }

    /// Current PID of the service. Recomputed on every call.
    pub fn pid(&self, name: &str) -> Result<u32, ServiceError> {
        let service = self.services.get(name)?;
        self.runtime.discover_pid(service)
    }

    /// Deliver `signal` to the service process.
    ///
    /// Requires the service to be active; liveness is only checked by PID
    /// discovery itself.
    pub fn send_signal(&self, name: &str, signal: i32) -> Result<(), ServiceError> {
        let service = self.services.get(name)?;
        if !service.is_active() {
            return Err(ServiceError::ServiceNotFound {
                name: name.to_string(),
            });
        }

        let pid = self.runtime.discover_pid(service)?;
        self.runtime.send_signal(pid, signal)?;
        crate::debug_event!("service", "signaled", "{name} pid {pid} signal {signal}");
        Ok(())
    }

    /// Kill the service process. It gets no chance to clean up.
    pub fn stop(&self, name: &str) -> Result<(), ServiceError> {
        self.send_signal(name, libc::SIGKILL)?;
        crate::log_event!("service", "stopped", "{name}");
        Ok(())
    }

    /// Remove the service's script, output and pid files. Absent files
    /// are not an error.
    pub fn clean_files(&self, name: &str) -> Result<(), ServiceError> {
        let service = self.services.get(name)?;
        for path in [
            service.service_file(),
            service.output_file(),
            service.pid_file(),
        ] {
            remove_quietly(&self.runtime, &path)?;
        }
        crate::debug_event!("service", "cleaned", "{name}");
        Ok(())
    }

    /// [`stop`](Self::stop) then [`clean_files`](Self::clean_files).
    /// Nothing is removed if stopping fails.
    pub fn clean_stop(&self, name: &str) -> Result<(), ServiceError> {
        self.stop(name)?;
        self.clean_files(name)
    }

    /// Restart an active service from its existing script.
    ///
    /// A service whose process already died is simply started again.
    pub fn reload_service(&mut self, name: &str) -> Result<(), ServiceError> {
        let service = self.services.get(name)?;
        if !service.is_active() {
            return Err(ServiceError::ServiceNotRunning {
                name: name.to_string(),
            });
        }
        let script = service.service_file();
        if !script.is_file() {
            return Err(ServiceError::ServiceReloadError {
                name: name.to_string(),
                reason: format!("script {} is missing", script.display()),
            });
        }

        match self.stop(name) {
            Ok(()) | Err(ServiceError::ServicePidNotFound { .. }) => {}
            Err(e) => {
                return Err(ServiceError::ServiceReloadError {
                    name: name.to_string(),
                    reason: e.to_string(),
                });
            }
        }
        self.start_service(name)
    }

    pub fn status(&self, name: &str) -> Result<ServiceStatus, ServiceError> {
        let service = self.services.get(name)?;
        Ok(ServiceStatus {
            name: service.name().to_string(),
            path: service.path().to_path_buf(),
            service_dir: service.service_dir().to_path_buf(),
            active: service.is_active(),
            pid: self.runtime.discover_pid(service).ok(),
            script_present: service.service_file().is_file(),
        })
    }
}

impl<R: ServiceRuntime> std::fmt::Debug for ServiceManager<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceManager")
            .field("settings", &self.settings)
            .field("services", &self.services.names())
            .finish()
    }
}

fn absolute(path: &Path) -> Result<PathBuf, ServiceError> {
    std::path::absolute(path).map_err(|e| ServiceError::io(path, e))
}

fn remove_quietly<R: ServiceRuntime>(runtime: &R, path: &Path) -> Result<(), ServiceError> {
    match runtime.remove_artifact(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ServiceError::io(path, e)),
    }
}

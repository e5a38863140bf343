//! Service commands.
//!
//! Each invocation builds a fresh [`ServiceManager`]; services created by
//! an earlier invocation are re-registered from their script with
//! [`ServiceManager::attach_service`].

use anyhow::Context;

use crate::cli::{ServiceAction, ServiceRef};
use crate::config::Settings;
use crate::registry::Named;
use crate::service::{ServiceManager, ServiceScript};

pub fn run(action: ServiceAction, settings: &Settings) -> anyhow::Result<()> {
    let mut manager = ServiceManager::new(settings.service.clone());

    match action {
        ServiceAction::Create {
            name,
            path,
            output,
            dir,
            handler,
            recursive,
            filter_dir_modified,
            start,
        } => {
            let service_dir = dir.unwrap_or_else(|| settings.service.default_service_dir(&name));
            // Not a service artifact, so `clean` leaves it in place
            let output = output.unwrap_or_else(|| {
                service_dir.join(format!("{}_events.log", name.to_lowercase()))
            });

            let mut script = ServiceScript::new(&name, path, output);
            if let Some(handler) = handler {
                script.handler = handler;
            }
            script.recursive = recursive;
            script.filter_dir_modified = filter_dir_modified;

            let service = manager.create_from_script(script, Some(service_dir))?;
            println!("Created service '{}'", service.name());
            println!("  script: {}", service.service_file().display());
            println!("  output: {}", service.output_file().display());

            if start {
                manager.start_service(&name)?;
                println!("Started service '{name}'");
            }
        }
        ServiceAction::Start(target) => {
            attach(&mut manager, &target)?;
            manager.start_service(&target.name)?;
            println!("Started service '{}'", target.name);
        }
        ServiceAction::Stop(target) => {
            attach(&mut manager, &target)?;
            manager.stop(&target.name)?;
            println!("Stopped service '{}'", target.name);
        }
        ServiceAction::Clean(target) => {
            attach(&mut manager, &target)?;
            manager.clean_files(&target.name)?;
            println!("Removed files of service '{}'", target.name);
        }
        ServiceAction::CleanStop(target) => {
            attach(&mut manager, &target)?;
            manager.clean_stop(&target.name)?;
            println!("Stopped service '{}' and removed its files", target.name);
        }
        ServiceAction::Pid(target) => {
            attach(&mut manager, &target)?;
            println!("{}", manager.pid(&target.name)?);
        }
        ServiceAction::Signal { service, signal } => {
            attach(&mut manager, &service)?;
            manager.send_signal(&service.name, signal)?;
            println!("Sent signal {signal} to service '{}'", service.name);
        }
        ServiceAction::Reload(target) => {
            attach(&mut manager, &target)?;
            manager.reload_service(&target.name)?;
            println!("Reloaded service '{}'", target.name);
        }
        ServiceAction::Status {
            service: target,
            json,
        } => {
            attach(&mut manager, &target)?;
            let status = manager.status(&target.name)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
                return Ok(());
            }
            println!("Service:  {}", status.name);
            println!("Path:     {}", status.path.display());
            println!("Dir:      {}", status.service_dir.display());
            match status.pid {
                Some(pid) => println!("State:    running (pid {pid})"),
                None => println!("State:    not running"),
            }
        }
    }
    Ok(())
}

fn attach(manager: &mut ServiceManager, target: &ServiceRef) -> anyhow::Result<()> {
    manager
        .attach_service(&target.name, target.dir.clone())
        .with_context(|| format!("no service '{}' found; run `service create` first", target.name))?;
    Ok(())
}

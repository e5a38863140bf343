//! The generated service script.
//!
//! A TOML document behind a shebang line. TOML reads `#` lines as
//! comments, so the same text is both executable by the kernel and
//! parseable by [`ServiceScript::parse`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::RUN_SERVICE_SUBCOMMAND;
use crate::error::ServiceError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceScript {
    /// Observer name inside the service process.
    pub name: String,

    /// Monitored path.
    pub path: PathBuf,

    /// File the log handler appends to.
    pub log_file: PathBuf,

    /// Built-in handler name.
    #[serde(default = "default_handler")]
    pub handler: String,

    #[serde(default)]
    pub recursive: bool,

    #[serde(default)]
    pub filter_dir_modified: bool,
}

fn default_handler() -> String {
    "log".to_string()
}

impl ServiceScript {
    pub fn new(name: &str, path: impl Into<PathBuf>, log_file: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            path: path.into(),
            log_file: log_file.into(),
            handler: default_handler(),
            recursive: false,
            filter_dir_modified: false,
        }
    }

    /// Render the script text for `program`.
    pub fn render(&self, program: &Path) -> Result<String, toml::ser::Error> {
        let body = toml::to_string(self)?;
        Ok(format!(
            "#!{} {RUN_SERVICE_SUBCOMMAND}\n\
             # watchplus service script, regenerated by `watchplus service create`\n\
             \n\
             {body}",
            program.display()
        ))
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Render and write the script to `path`, replacing any previous one.
    pub fn write(&self, program: &Path, path: &Path) -> Result<(), ServiceError> {
        let text = self.render(program).map_err(|e| ServiceError::Script {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        std::fs::write(path, text).map_err(|e| ServiceError::io(path, e))?;
        mark_executable(path)
    }

    pub fn load(path: &Path) -> Result<Self, ServiceError> {
        let text = std::fs::read_to_string(path).map_err(|e| ServiceError::io(path, e))?;
        Self::parse(&text).map_err(|e| ServiceError::Script {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<(), ServiceError> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = std::fs::metadata(path)
        .map_err(|e| ServiceError::io(path, e))?
        .permissions();
    permissions.set_mode(permissions.mode() | 0o111);
    std::fs::set_permissions(path, permissions).map_err(|e| ServiceError::io(path, e))
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> Result<(), ServiceError> {
    Ok(())
}

//! Locating the primer3 executable and its thermodynamic parameters
//!
//! Search order for the executable:
//! 1. An explicit path given by the user
//! 2. `primer3_core` next to the running executable
//! 3. PATH (system fallback)
//!
//! The thermodynamic parameters directory defaults to `primer3_config/`
//! next to whichever executable was found.

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

use crate::error::PreconditionError;
use crate::settings_io::executable_dir;

pub const PRIMER3_BINARY: &str = "primer3_core";
pub const THERMODYNAMIC_DIR: &str = "primer3_config";

/// Where to find primer3 and whether to hand it the parameters directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolLocation {
    pub executable: PathBuf,
    pub thermodynamic_dir: PathBuf,
    pub include_thermodynamic_path: bool,
}

impl ToolLocation {
    /// Resolve from optional user-supplied paths.
    pub fn resolve(
        executable: Option<&Path>,
        thermodynamic_dir: Option<&Path>,
        include_thermodynamic_path: bool,
    ) -> Result<Self> {
        let executable = match executable {
            Some(path) => path.to_path_buf(),
            None => find_binary(PRIMER3_BINARY)?,
        };
        let thermodynamic_dir = match thermodynamic_dir {
            Some(dir) => dir.to_path_buf(),
            None => executable
                .parent()
                .map(|dir| dir.join(THERMODYNAMIC_DIR))
                .unwrap_or_else(|| PathBuf::from(THERMODYNAMIC_DIR)),
        };
        Ok(Self {
            executable,
            thermodynamic_dir,
            include_thermodynamic_path,
        })
    }

    /// Fail if primer3 cannot be launched with these settings.
    pub fn check(&self) -> Result<(), PreconditionError> {
        if !self.executable.is_file() {
            return Err(PreconditionError::Primer3Missing(self.executable.clone()));
        }
        if self.include_thermodynamic_path && !self.thermodynamic_dir.is_dir() {
            return Err(PreconditionError::ThermodynamicParametersMissing(
                self.thermodynamic_dir.clone(),
            ));
        }
        Ok(())
    }

    /// Parameters path to put in requests, if enabled
    pub fn request_thermodynamic_path(&self) -> Option<&Path> {
        self.include_thermodynamic_path
            .then_some(self.thermodynamic_dir.as_path())
    }
}

/// Find `binary_name` beside the running executable or on PATH.
pub fn find_binary(binary_name: &str) -> Result<PathBuf> {
    if let Some(dir) = executable_dir() {
        let path = dir.join(binary_name);
        if path.is_file() {
            return Ok(path);
        }
    }

    if let Ok(output) = std::process::Command::new("which")
        .arg(binary_name)
        .output()
    {
        if output.status.success() {
            let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !path.is_empty() {
                log::debug!("[primer3] Using {} from PATH: {}", binary_name, path);
                return Ok(PathBuf::from(path));
            }
        }
    }

    Err(anyhow!(
        "'{}' not found next to this executable or in PATH.\n\
         Install primer3 or pass its location with --primer3.",
        binary_name
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_explicit_paths_and_checks() {
        let dir = TempDir::new().unwrap();
        let exe = dir.path().join("primer3_core");
        std::fs::write(&exe, "").unwrap();

        let location = ToolLocation::resolve(Some(&exe), None, true).unwrap();
        assert_eq!(location.thermodynamic_dir, dir.path().join(THERMODYNAMIC_DIR));
        assert_eq!(
            location.check(),
            Err(PreconditionError::ThermodynamicParametersMissing(
                dir.path().join(THERMODYNAMIC_DIR)
            ))
        );

        std::fs::create_dir(dir.path().join(THERMODYNAMIC_DIR)).unwrap();
        assert_eq!(location.check(), Ok(()));
        assert!(location.request_thermodynamic_path().is_some());
    }

    #[test]
    fn test_missing_executable() {
        let dir = TempDir::new().unwrap();
        let exe = dir.path().join("nope");
        let location = ToolLocation::resolve(Some(&exe), None, false).unwrap();
        assert_eq!(location.check(), Err(PreconditionError::Primer3Missing(exe)));
        assert!(location.request_thermodynamic_path().is_none());
    }
}

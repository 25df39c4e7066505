//! Configuration validation
//!
//! Errors block startup; warnings are logged and ignored.

use crate::config::schema::MediaConfig;
use crate::error::{MediaError, Result};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Timeouts above this are allowed but suspicious
pub const LONG_TIMEOUT_SECS: u64 = 3600;

/// Outcome of validating a configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Log warnings, then fail with every error if there are any
    pub fn into_result(self) -> Result<Vec<String>> {
        for warning in &self.warnings {
            warn!(warning = %warning, "Configuration warning");
        }
        if self.errors.is_empty() {
            Ok(self.warnings)
        } else {
            Err(MediaError::InvalidConfig(self.errors))
        }
    }
}

impl MediaConfig {
    /// Check everything generation needs: database, engine, scripts,
    /// output directory and timeout.
    ///
    /// Creates the output directory if it is missing.
    pub fn validate(&self) -> ValidationReport {
        let mut report = self.validate_database(true);
        self.check_engine(&mut report);
        report
    }

    /// Check only the database setting. With `must_exist` a missing file is
    /// an error; otherwise only an empty path is.
    pub fn validate_database(&self, must_exist: bool) -> ValidationReport {
        let mut report = ValidationReport::default();
        let db_path = &self.database.path;

        if db_path.as_os_str().is_empty() {
            report.error("Database path not specified in config");
        } else if must_exist && !db_path.exists() {
            report.error(format!("Database not found: {}", db_path.display()));
        }

        if self.database.busy_timeout_secs == 0 {
            report.warning("Database busy timeout is 0s; concurrent writers will fail immediately");
        }
        report
    }

    fn check_engine(&self, report: &mut ValidationReport) {
        let engine = &self.engine;
        let comfyui = &engine.comfyui_directory;
        let comfyui_set = !comfyui.as_os_str().is_empty();

        if !comfyui_set {
            report.error("ComfyUI directory not specified in config");
        } else if !comfyui.is_dir() {
            report.error(format!("ComfyUI directory not found: {}", comfyui.display()));
        }

        if engine.python.as_os_str().is_empty() {
            report.error("Python executable not specified in config");
        } else if find_executable(&engine.python).is_none() {
            report.error(format!("Python executable not found: {}", engine.python.display()));
        }

        if self.workflows.image.script.as_os_str().is_empty() {
            report.error("Image workflow script not specified in config");
        } else if comfyui_set {
            let script = self.image_script_path();
            if !script.is_file() {
                report.error(format!("Image workflow script not found: {}", script.display()));
            }
        }

        match self.song_script_path() {
            Some(script) if comfyui_set && !script.is_file() => {
                report.error(format!("Song workflow script not found: {}", script.display()));
            }
            None => report.warning("Song workflow script not configured; lyrics prompts will fail"),
            _ => {}
        }

        let output = &engine.output_directory;
        if output.as_os_str().is_empty() {
            report.error("Output directory not specified in config");
        } else if let Err(e) = std::fs::create_dir_all(output) {
            report.error(format!("Cannot create output directory {}: {}", output.display(), e));
        }

        if engine.timeout_seconds == 0 {
            report.error("Workflow timeout must be positive, got 0");
        } else if engine.timeout_seconds > LONG_TIMEOUT_SECS {
            report.warning(format!(
                "Workflow timeout is very high ({}s), consider reducing",
                engine.timeout_seconds
            ));
        }

        if engine.queue_size == 0 {
            report.error("Engine queue size must be at least 1");
        }
        if self.service.batch_limit == 0 {
            report.warning("Service batch limit is 0; passes will generate nothing");
        }
    }
}

/// Resolve an executable: paths are checked directly, bare names on `PATH`
pub fn find_executable(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 || program.is_absolute() {
        return program.is_file().then(|| program.to_path_buf());
    }

    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn valid_config(dir: &TempDir) -> MediaConfig {
        let comfy = dir.path().join("ComfyUI");
        std::fs::create_dir_all(&comfy).unwrap();
        std::fs::write(comfy.join("image.py"), "").unwrap();
        std::fs::write(comfy.join("song.py"), "").unwrap();
        let db = dir.path().join("media.db");
        std::fs::write(&db, "").unwrap();
        let python = dir.path().join("python");
        std::fs::write(&python, "").unwrap();

        let mut config = MediaConfig::default();
        config.database.path = db;
        config.engine.comfyui_directory = comfy;
        config.engine.python = python;
        config.engine.output_directory = dir.path().join("out");
        config.workflows.image.script = PathBuf::from("image.py");
        config.workflows.song.script = Some(PathBuf::from("song.py"));
        config
    }

    #[test]
    fn test_valid_config_passes_and_creates_output() {
        let dir = TempDir::new().unwrap();
        let config = valid_config(&dir);

        let report = config.validate();
        assert!(report.is_ok(), "unexpected errors: {:?}", report.errors);
        assert!(report.warnings.is_empty());
        assert!(dir.path().join("out").is_dir());
    }

    #[test]
    fn test_defaults_list_every_missing_setting() {
        let report = MediaConfig::default().validate();
        let joined = report.errors.join("\n");

        assert!(joined.contains("Database path not specified"));
        assert!(joined.contains("ComfyUI directory not specified"));
        assert!(joined.contains("Image workflow script not specified"));
        assert!(joined.contains("Output directory not specified"));
        assert!(matches!(
            report.into_result(),
            Err(MediaError::InvalidConfig(errors)) if errors.len() >= 4
        ));
    }

    #[test]
    fn test_missing_files_are_errors() {
        let dir = TempDir::new().unwrap();
        let mut config = valid_config(&dir);
        config.database.path = dir.path().join("absent.db");
        config.workflows.image.script = PathBuf::from("missing.py");

        let report = config.validate();
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors[0].starts_with("Database not found"));
        assert!(report.errors[1].starts_with("Image workflow script not found"));
    }

    #[test]
    fn test_long_timeout_is_only_a_warning() {
        let dir = TempDir::new().unwrap();
        let mut config = valid_config(&dir);
        config.engine.timeout_seconds = 7200;

        let report = config.validate();
        assert!(report.is_ok());
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("7200s"));
    }

    #[test]
    fn test_zero_timeout_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mut config = valid_config(&dir);
        config.engine.timeout_seconds = 0;

        assert!(!config.validate().is_ok());
    }

    #[test]
    fn test_database_only_validation() {
        let config = MediaConfig::default();
        assert!(!config.validate_database(false).is_ok());

        let mut config = MediaConfig::default();
        config.database.path = PathBuf::from("/tmp/not-yet-created.db");
        assert!(config.validate_database(false).is_ok());
        assert!(!config.validate_database(true).is_ok());
    }

    #[test]
    fn test_find_executable() {
        let dir = TempDir::new().unwrap();
        let exe = dir.path().join("tool");
        std::fs::write(&exe, "").unwrap();

        assert_eq!(find_executable(&exe), Some(exe.clone()));
        assert_eq!(find_executable(&dir.path().join("nope")), None);
    }
}

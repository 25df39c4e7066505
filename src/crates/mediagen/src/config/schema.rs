//! Configuration schema definitions

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main mediagen configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct MediaConfig {
    /// Shared prompt database
    pub database: DatabaseConfig,

    /// External engine settings
    pub engine: EngineConfig,

    /// Workflow scripts per media kind
    pub workflows: WorkflowsConfig,

    /// Periodic service settings
    pub service: ServiceConfig,

    /// Which prompts are offered for generation
    pub eligibility: EligibilityConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite database shared with the prompt producer
    pub path: PathBuf,

    /// How long a writer waits on a locked database
    pub busy_timeout_secs: u64,

    /// How long a checkpoint waits on a locked database
    pub checkpoint_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            busy_timeout_secs: 30,
            checkpoint_timeout_secs: 5,
        }
    }
}

/// ComfyUI engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// ComfyUI installation; workflow scripts run from here
    pub comfyui_directory: PathBuf,

    /// Python interpreter used to run workflow scripts
    pub python: PathBuf,

    /// Root under which generated files are written
    pub output_directory: PathBuf,

    /// Hard limit for one generation
    pub timeout_seconds: u64,

    /// Value passed as `--queue-size`
    pub queue_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            comfyui_directory: PathBuf::new(),
            python: PathBuf::from("python3"),
            output_directory: PathBuf::new(),
            timeout_seconds: 600,
            queue_size: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct WorkflowsConfig {
    pub image: ImageWorkflowConfig,
    pub song: SongWorkflowConfig,
}

/// Image workflow script
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImageWorkflowConfig {
    /// Script path relative to the ComfyUI directory
    pub script: PathBuf,

    /// Argument name carrying the prompt text
    pub prompt_arg: String,
}

impl Default for ImageWorkflowConfig {
    fn default() -> Self {
        Self {
            script: PathBuf::new(),
            prompt_arg: "prompt".to_string(),
        }
    }
}

/// Song workflow script
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SongWorkflowConfig {
    /// Script path relative to the ComfyUI directory; lyrics prompts fail without it
    pub script: Option<PathBuf>,

    /// Argument name carrying the style tags
    pub tags_arg: String,

    /// Argument name carrying the rendered lyrics
    pub lyrics_arg: String,
}

impl Default for SongWorkflowConfig {
    fn default() -> Self {
        Self {
            script: None,
            tags_arg: "tags".to_string(),
            lyrics_arg: "lyrics".to_string(),
        }
    }
}

/// Periodic service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Pause between passes
    pub interval_secs: u64,

    /// Maximum prompts per type per pass
    pub batch_limit: u32,

    /// Processing prompts older than this are returned to pending
    pub stale_after_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            batch_limit: 10,
            stale_after_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct EligibilityConfig {
    /// Only generate prompts whose upstream status equals this value
    pub required_upstream_status: Option<String>,
}

/// Log line layout
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Full,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format
    pub format: LogFormat,

    /// Enable colored output
    pub colored: bool,

    /// Include timestamps
    pub timestamps: bool,

    /// Also append logs to this file
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            colored: true,
            timestamps: true,
            file: None,
        }
    }
}

impl MediaConfig {
    /// Expand `${VAR}` references and a leading `~` in every path setting
    pub fn resolve_env_vars(&mut self) {
        for path in [
            &mut self.database.path,
            &mut self.engine.comfyui_directory,
            &mut self.engine.python,
            &mut self.engine.output_directory,
            &mut self.workflows.image.script,
        ] {
            *path = expand_path(path);
        }
        if let Some(script) = self.workflows.song.script.as_mut() {
            *script = expand_path(script);
        }
        if let Some(file) = self.logging.file.as_mut() {
            *file = expand_path(file);
        }
        if let Some(status) = self.eligibility.required_upstream_status.as_mut() {
            *status = expand_env_vars(status);
        }
    }

    /// Full path of the image workflow script
    pub fn image_script_path(&self) -> PathBuf {
        self.engine.comfyui_directory.join(&self.workflows.image.script)
    }

    /// Full path of the song workflow script, if configured
    pub fn song_script_path(&self) -> Option<PathBuf> {
        self.workflows
            .song
            .script
            .as_ref()
            .map(|script| self.engine.comfyui_directory.join(script))
    }
}

/// Replace every `${VAR}` with the variable's value. Unknown variables are
/// left as written.
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match std::env::var(name) {
                    Ok(resolved) => out.push_str(&resolved),
                    Err(_) => out.push_str(&rest[start..start + 3 + end]),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn expand_path(path: &Path) -> PathBuf {
    let Some(raw) = path.to_str() else {
        return path.to_path_buf();
    };
    let expanded = expand_env_vars(raw);

    match expanded.strip_prefix("~/") {
        Some(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(expanded),
        },
        None => PathBuf::from(expanded),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MediaConfig::default();
        assert_eq!(config.database.busy_timeout_secs, 30);
        assert_eq!(config.database.checkpoint_timeout_secs, 5);
        assert_eq!(config.engine.timeout_seconds, 600);
        assert_eq!(config.engine.queue_size, 1);
        assert_eq!(config.workflows.image.prompt_arg, "prompt");
        assert_eq!(config.workflows.song.tags_arg, "tags");
        assert_eq!(config.workflows.song.lyrics_arg, "lyrics");
        assert_eq!(config.service.interval_secs, 300);
        assert_eq!(config.service.batch_limit, 10);
        assert_eq!(config.service.stale_after_secs, 3600);
        assert_eq!(config.eligibility.required_upstream_status, None);
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: MediaConfig = toml::from_str(
            r#"
[engine]
comfyui_directory = "/opt/ComfyUI"
timeout_seconds = 900

[workflows.song]
script = "ace_audio_workflow.py"

[logging]
format = "pretty"
"#,
        )
        .unwrap();

        assert_eq!(config.engine.comfyui_directory, PathBuf::from("/opt/ComfyUI"));
        assert_eq!(config.engine.timeout_seconds, 900);
        assert_eq!(config.engine.python, PathBuf::from("python3"));
        assert_eq!(
            config.song_script_path(),
            Some(PathBuf::from("/opt/ComfyUI/ace_audio_workflow.py"))
        );
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("MEDIAGEN_TEST_ROOT", "/data");
        assert_eq!(expand_env_vars("${MEDIAGEN_TEST_ROOT}/media.db"), "/data/media.db");
        assert_eq!(
            expand_env_vars("${MEDIAGEN_TEST_UNSET_VAR}/x"),
            "${MEDIAGEN_TEST_UNSET_VAR}/x"
        );
        assert_eq!(expand_env_vars("plain"), "plain");
        assert_eq!(expand_env_vars("broken ${OPEN"), "broken ${OPEN");
    }

    #[test]
    fn test_resolve_env_vars_on_paths() {
        std::env::set_var("MEDIAGEN_TEST_COMFY", "/srv/comfy");
        let mut config = MediaConfig::default();
        config.engine.comfyui_directory = PathBuf::from("${MEDIAGEN_TEST_COMFY}");
        config.workflows.image.script = PathBuf::from("image.py");
        config.resolve_env_vars();

        assert_eq!(config.image_script_path(), PathBuf::from("/srv/comfy/image.py"));
    }
}

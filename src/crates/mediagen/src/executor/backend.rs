//! External generation backend
//!
//! The engine is an opaque subprocess: arguments go in, files appear in the
//! output directory. [`WorkflowScriptBackend`] runs a ComfyUI workflow script
//! with a hard timeout.

use crate::config::MediaConfig;
use crate::error::{MediaError, Result};
use crate::executor::pipeline::EngineArgument;
use crate::models::PromptType;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Characters of stderr kept in a failure message
pub const STDERR_TAIL_CHARS: usize = 2000;

/// Everything a backend needs for one generation
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt_id: i64,
    pub prompt_type: PromptType,
    pub arguments: Vec<EngineArgument>,
    /// Existing directory the engine writes into
    pub output_dir: PathBuf,
    pub timeout: Duration,
}

/// Produces media files for a request
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate into `request.output_dir`, or fail with a diagnostic
    async fn generate(&self, request: &GenerationRequest) -> Result<()>;
}

/// Runs `<python> <comfyui>/<script> --<arg> <value>... --output <dir>
/// --comfyui-directory <comfyui> --queue-size <n>` from the ComfyUI directory.
#[derive(Debug, Clone)]
pub struct WorkflowScriptBackend {
    python: PathBuf,
    comfyui_directory: PathBuf,
    image_script: PathBuf,
    song_script: Option<PathBuf>,
    queue_size: u32,
}

impl WorkflowScriptBackend {
    /// Create a backend; script paths are relative to `comfyui_directory`
    pub fn new(
        python: impl Into<PathBuf>,
        comfyui_directory: impl Into<PathBuf>,
        image_script: impl Into<PathBuf>,
        song_script: Option<PathBuf>,
    ) -> Self {
        Self {
            python: python.into(),
            comfyui_directory: comfyui_directory.into(),
            image_script: image_script.into(),
            song_script,
            queue_size: 1,
        }
    }

    /// Builder: set the `--queue-size` passed to the script
    pub fn with_queue_size(mut self, queue_size: u32) -> Self {
        self.queue_size = queue_size;
        self
    }

    pub fn from_config(config: &MediaConfig) -> Self {
        Self::new(
            &config.engine.python,
            &config.engine.comfyui_directory,
            &config.workflows.image.script,
            config.workflows.song.script.clone(),
        )
        .with_queue_size(config.engine.queue_size)
    }

    /// Absolute script path for a prompt type
    pub fn script_for(&self, prompt_type: PromptType) -> Result<PathBuf> {
        let script = match prompt_type {
            PromptType::Image => &self.image_script,
            PromptType::Lyrics => self.song_script.as_ref().ok_or_else(|| {
                MediaError::generation("No song workflow script configured")
            })?,
        };
        Ok(self.comfyui_directory.join(script))
    }

    fn build_command(&self, script: &Path, request: &GenerationRequest) -> Command {
        let mut cmd = Command::new(&self.python);
        cmd.arg(script);
        for argument in &request.arguments {
            cmd.arg(format!("--{}", argument.name)).arg(&argument.value);
        }
        cmd.arg("--output")
            .arg(&request.output_dir)
            .arg("--comfyui-directory")
            .arg(&self.comfyui_directory)
            .arg("--queue-size")
            .arg(self.queue_size.to_string())
            .current_dir(&self.comfyui_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl GenerationBackend for WorkflowScriptBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<()> {
        let script = self.script_for(request.prompt_type)?;
        if !script.is_file() {
            return Err(MediaError::generation(format!(
                "Workflow script not found: {}",
                script.display()
            )));
        }

        info!(
            prompt_id = request.prompt_id,
            script = %script.display(),
            output_dir = %request.output_dir.display(),
            timeout_secs = request.timeout.as_secs(),
            "Starting workflow"
        );

        let child = self
            .build_command(&script, request)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => MediaError::generation(format!(
                    "Python executable not found: {}",
                    self.python.display()
                )),
                _ => MediaError::generation(format!("Failed to start workflow: {}", e)),
            })?;

        // Dropping the wait future on timeout drops the child, which kills it
        let output = match tokio::time::timeout(request.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                return Err(MediaError::Timeout {
                    prompt_id: request.prompt_id,
                    duration_secs: request.timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            let mut message = match output.status.code() {
                Some(code) => format!("Workflow failed with exit code {}", code),
                None => "Workflow terminated by signal".to_string(),
            };
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.trim().is_empty() {
                message.push_str("\nStderr: ");
                message.push_str(tail_chars(&stderr, STDERR_TAIL_CHARS));
            }
            return Err(MediaError::Generation(message));
        }

        debug!(
            prompt_id = request.prompt_id,
            stdout_bytes = output.stdout.len(),
            "Workflow finished"
        );
        Ok(())
    }
}

/// Last `max_chars` characters of `text`
pub fn tail_chars(text: &str, max_chars: usize) -> &str {
    if max_chars == 0 {
        return "";
    }
    match text.char_indices().rev().nth(max_chars - 1) {
        Some((start, _)) => &text[start..],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_chars() {
        assert_eq!(tail_chars("abcdef", 3), "def");
        assert_eq!(tail_chars("abc", 10), "abc");
        assert_eq!(tail_chars("ééé", 2), "éé");
        assert_eq!(tail_chars("abc", 0), "");
    }

    #[test]
    fn test_script_paths_resolve_under_comfyui() {
        let backend = WorkflowScriptBackend::new("python3", "/opt/comfy", "image.py", None);

        assert_eq!(
            backend.script_for(PromptType::Image).unwrap(),
            PathBuf::from("/opt/comfy/image.py")
        );
        assert!(backend.script_for(PromptType::Lyrics).is_err());
    }

    #[test]
    fn test_command_line_layout() {
        let backend = WorkflowScriptBackend::new("python3", "/opt/comfy", "image.py", None)
            .with_queue_size(2);
        let request = GenerationRequest {
            prompt_id: 1,
            prompt_type: PromptType::Image,
            arguments: vec![EngineArgument::new("prompt", "a fox")],
            output_dir: PathBuf::from("/out/image/1_x"),
            timeout: Duration::from_secs(5),
        };

        let cmd = backend.build_command(Path::new("/opt/comfy/image.py"), &request);
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            args,
            vec![
                "/opt/comfy/image.py",
                "--prompt",
                "a fox",
                "--output",
                "/out/image/1_x",
                "--comfyui-directory",
                "/opt/comfy",
                "--queue-size",
                "2",
            ]
        );
        assert_eq!(cmd.as_std().get_current_dir(), Some(Path::new("/opt/comfy")));
    }
}

//! Media pipelines
//!
//! A pipeline knows everything that differs between media kinds: how the
//! payload is parsed, which arguments the engine script takes, what the
//! output files look like and which metadata each artifact carries.

use crate::config::WorkflowsConfig;
use crate::error::{MediaError, Result};
use crate::models::{ArtifactType, PromptPayload, PromptType};
use chrono::Utc;
use serde_json::{json, Value};
use std::fmt::Debug;
use std::path::Path;

/// One `--name value` pair passed to the engine script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineArgument {
    pub name: String,
    pub value: String,
}

impl EngineArgument {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Per-media-kind generation capability
pub trait MediaPipeline: Send + Sync + Debug {
    /// Prompt type this pipeline serves
    fn prompt_type(&self) -> PromptType;

    /// Engine arguments for a parsed payload
    fn engine_arguments(&self, payload: &PromptPayload) -> Result<Vec<EngineArgument>>;

    /// Lowercase extensions of files the engine produces
    fn output_extensions(&self) -> &'static [&'static str];

    /// Whether the artifact file doubles as its own preview
    fn has_preview(&self) -> bool;

    fn artifact_type(&self) -> ArtifactType {
        self.prompt_type().artifact_type()
    }

    /// Strictly parse a content record
    fn parse(&self, content: &str) -> Result<PromptPayload> {
        PromptPayload::parse_strict(self.prompt_type(), content)
    }

    /// Whether `path` looks like one of this pipeline's outputs
    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.output_extensions().iter().any(|known| *known == ext)
            })
            .unwrap_or(false)
    }

    /// Metadata stored with one generated file
    fn artifact_metadata(&self, payload: &PromptPayload, file: &Path, file_size: u64) -> Value {
        let mut metadata = payload.metadata();
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_format = file
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        metadata.insert("file_size".into(), json!(file_size));
        metadata.insert("file_name".into(), json!(file_name));
        metadata.insert("file_format".into(), json!(file_format));
        metadata.insert("generated_at".into(), json!(Utc::now().to_rfc3339()));
        Value::Object(metadata)
    }
}

/// Still images from a text prompt
#[derive(Debug, Clone)]
pub struct ImagePipeline {
    prompt_arg: String,
}

impl ImagePipeline {
    pub fn new(prompt_arg: impl Into<String>) -> Self {
        Self {
            prompt_arg: prompt_arg.into(),
        }
    }
}

impl Default for ImagePipeline {
    fn default() -> Self {
        Self::new("prompt")
    }
}

impl MediaPipeline for ImagePipeline {
    fn prompt_type(&self) -> PromptType {
        PromptType::Image
    }

    fn engine_arguments(&self, payload: &PromptPayload) -> Result<Vec<EngineArgument>> {
        let PromptPayload::Image(data) = payload else {
            return Err(MediaError::payload("image pipeline received a lyrics payload"));
        };
        if data.prompt.trim().is_empty() {
            return Err(MediaError::payload("image prompt is empty"));
        }
        Ok(vec![EngineArgument::new(&self.prompt_arg, &data.prompt)])
    }

    fn output_extensions(&self) -> &'static [&'static str] {
        &["png"]
    }

    fn has_preview(&self) -> bool {
        true
    }
}

/// Songs from structured lyrics
#[derive(Debug, Clone)]
pub struct AudioPipeline {
    tags_arg: String,
    lyrics_arg: String,
}

impl AudioPipeline {
    pub fn new(tags_arg: impl Into<String>, lyrics_arg: impl Into<String>) -> Self {
        Self {
            tags_arg: tags_arg.into(),
            lyrics_arg: lyrics_arg.into(),
        }
    }
}

impl Default for AudioPipeline {
    fn default() -> Self {
        Self::new("tags", "lyrics")
    }
}

impl MediaPipeline for AudioPipeline {
    fn prompt_type(&self) -> PromptType {
        PromptType::Lyrics
    }

    fn engine_arguments(&self, payload: &PromptPayload) -> Result<Vec<EngineArgument>> {
        let PromptPayload::Lyrics(data) = payload else {
            return Err(MediaError::payload("audio pipeline received an image payload"));
        };
        if data.structure.is_empty() {
            return Err(MediaError::payload("lyrics prompt has no sections"));
        }
        Ok(vec![
            EngineArgument::new(&self.tags_arg, data.tags()),
            EngineArgument::new(&self.lyrics_arg, data.full_lyrics()),
        ])
    }

    fn output_extensions(&self) -> &'static [&'static str] {
        &["mp3", "wav", "flac"]
    }

    fn has_preview(&self) -> bool {
        false
    }
}

/// The pipeline for every prompt type
#[derive(Debug, Clone, Default)]
pub struct Pipelines {
    image: ImagePipeline,
    audio: AudioPipeline,
}

impl Pipelines {
    pub fn new(image: ImagePipeline, audio: AudioPipeline) -> Self {
        Self { image, audio }
    }

    /// Build pipelines using the argument names from `[workflows]`
    pub fn from_config(workflows: &WorkflowsConfig) -> Self {
        Self::new(
            ImagePipeline::new(&workflows.image.prompt_arg),
            AudioPipeline::new(&workflows.song.tags_arg, &workflows.song.lyrics_arg),
        )
    }

    pub fn for_type(&self, prompt_type: PromptType) -> &dyn MediaPipeline {
        match prompt_type {
            PromptType::Image => &self.image,
            PromptType::Lyrics => &self.audio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipelines() -> Pipelines {
        Pipelines::default()
    }

    #[test]
    fn test_image_arguments() {
        let pipeline = pipelines();
        let image = pipeline.for_type(PromptType::Image);
        let payload = image.parse(r#"{"prompt":"a red fox"}"#).unwrap();

        assert_eq!(
            image.engine_arguments(&payload).unwrap(),
            vec![EngineArgument::new("prompt", "a red fox")]
        );
        assert_eq!(image.artifact_type(), ArtifactType::Image);
        assert!(image.has_preview());
    }

    #[test]
    fn test_empty_image_prompt_is_rejected() {
        let image = ImagePipeline::default();
        let payload = image.parse("{}").unwrap();
        assert!(image.engine_arguments(&payload).is_err());
    }

    #[test]
    fn test_audio_arguments_use_configured_names() {
        let audio = AudioPipeline::new("style", "text");
        let payload = audio
            .parse(r#"{"genre":"Folk","structure":[{"type":"verse","number":1,"lyrics":"la"}]}"#)
            .unwrap();

        let args = audio.engine_arguments(&payload).unwrap();
        assert_eq!(args[0], EngineArgument::new("style", "Genre: Folk"));
        assert_eq!(args[1], EngineArgument::new("text", "[Verse 1]\nla\n"));
        assert!(!audio.has_preview());
    }

    #[test]
    fn test_audio_without_sections_is_rejected() {
        let audio = AudioPipeline::default();
        let payload = audio.parse(r#"{"title":"Silence"}"#).unwrap();
        assert!(audio.engine_arguments(&payload).is_err());
    }

    #[test]
    fn test_mismatched_payload_is_rejected() {
        let audio = AudioPipeline::default();
        let payload = ImagePipeline::default().parse(r#"{"prompt":"x"}"#).unwrap();
        assert!(audio.engine_arguments(&payload).is_err());
    }

    #[test]
    fn test_accepts_extensions_case_insensitively() {
        let audio = AudioPipeline::default();
        assert!(audio.accepts(Path::new("song.MP3")));
        assert!(audio.accepts(Path::new("take.flac")));
        assert!(!audio.accepts(Path::new("cover.png")));
        assert!(!audio.accepts(Path::new("README")));
    }

    #[test]
    fn test_artifact_metadata_has_file_fields() {
        let image = ImagePipeline::default();
        let payload = image.parse(r#"{"prompt":"fox","style_tags":["ink"]}"#).unwrap();
        let meta = image.artifact_metadata(&payload, Path::new("/tmp/out/Fox.PNG"), 42);

        assert_eq!(meta["prompt"], "fox");
        assert_eq!(meta["style_tags"], json!(["ink"]));
        assert_eq!(meta["file_size"], 42);
        assert_eq!(meta["file_name"], "Fox.PNG");
        assert_eq!(meta["file_format"], "png");
        assert!(meta["generated_at"].is_string());
    }
}

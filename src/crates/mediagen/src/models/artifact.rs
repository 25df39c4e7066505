//! Artifact model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of generated output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactType {
    Image,
    Audio,
}

impl ArtifactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" => Some(Self::Image),
            "audio" => Some(Self::Audio),
            _ => None,
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ArtifactType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown artifact type '{}'", s))
    }
}

/// An artifact about to be recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewArtifact {
    pub prompt_id: i64,
    pub artifact_type: ArtifactType,
    /// Path relative to the output root, `/` separated
    pub file_path: String,
    pub preview_path: Option<String>,
    pub metadata: serde_json::Value,
}

impl NewArtifact {
    /// Create an artifact with empty metadata and no preview
    pub fn new(prompt_id: i64, artifact_type: ArtifactType, file_path: impl Into<String>) -> Self {
        Self {
            prompt_id,
            artifact_type,
            file_path: file_path.into(),
            preview_path: None,
            metadata: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    /// Builder: set preview path
    pub fn with_preview(mut self, preview_path: impl Into<String>) -> Self {
        self.preview_path = Some(preview_path.into());
        self
    }

    /// Builder: set metadata
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A recorded artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub id: i64,
    pub prompt_id: i64,
    pub artifact_type: ArtifactType,
    pub file_path: String,
    pub preview_path: Option<String>,
    pub metadata: serde_json::Value,
    /// Creation timestamp (Unix timestamp)
    pub created_at: i64,
    pub updated_at: i64,
}

impl ArtifactRecord {
    /// File name component of `file_path`
    pub fn file_name(&self) -> &str {
        self.file_path
            .rsplit('/')
            .next()
            .unwrap_or(self.file_path.as_str())
    }
}

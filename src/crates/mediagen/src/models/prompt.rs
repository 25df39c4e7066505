//! Prompt model

use crate::models::artifact::ArtifactType;
use crate::models::payload::{content_json, PromptPayload};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of media a prompt asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptType {
    /// Still image
    Image,
    /// Song with lyrics
    Lyrics,
}

impl PromptType {
    /// Stored form, shared with the producer
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image_prompt",
            Self::Lyrics => "lyrics_prompt",
        }
    }

    /// Short name used on the command line
    pub fn short_name(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Lyrics => "lyrics",
        }
    }

    pub fn all() -> [PromptType; 2] {
        [Self::Image, Self::Lyrics]
    }

    /// Parse either the stored or the short form.
    ///
    /// Legacy `song` rows hold raw text rather than structured lyrics and do
    /// not parse.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image_prompt" | "image" => Some(Self::Image),
            "lyrics_prompt" | "lyrics" => Some(Self::Lyrics),
            _ => None,
        }
    }

    /// Artifact type produced for this prompt type
    pub fn artifact_type(&self) -> ArtifactType {
        match self {
            Self::Image => ArtifactType::Image,
            Self::Lyrics => ArtifactType::Audio,
        }
    }
}

impl fmt::Display for PromptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PromptType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown prompt type '{}'", s))
    }
}

/// Generation state of a prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    /// Waiting to be generated
    Pending,
    /// Claimed by a worker
    Processing,
    /// Artifacts recorded
    Ready,
    /// Generation failed, see `error_message`
    Error,
}

impl ArtifactStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for ArtifactStatus {
    fn from(s: &str) -> Self {
        match s {
            "processing" => Self::Processing,
            "ready" => Self::Ready,
            "error" => Self::Error,
            _ => Self::Pending,
        }
    }
}

/// Strict parse for user input; rows use the lenient `From<&str>`
impl std::str::FromStr for ArtifactStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "ready" => Ok(Self::Ready),
            "error" => Ok(Self::Error),
            other => Err(format!(
                "Unknown status '{}': expected pending, processing, ready or error",
                other
            )),
        }
    }
}

/// A content record linked to a prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: i64,
    /// JSON document text
    pub content: String,
    pub content_type: String,
    pub title: String,
    pub position: i64,
}

/// A prompt hydrated with its matching content records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptRecord {
    pub id: i64,
    pub prompt_text: String,
    pub prompt_type: PromptType,
    /// Upstream producer status
    pub status: String,
    pub artifact_status: ArtifactStatus,
    /// Creation timestamp (Unix timestamp)
    pub created_at: i64,
    pub completed_at: Option<i64>,
    /// Set while claimed (Unix timestamp)
    pub processing_started_at: Option<i64>,
    pub error_message: Option<String>,
    /// Content records of this prompt's type, in link order
    pub contents: Vec<ContentItem>,
}

impl PromptRecord {
    /// The content record generation is driven from: the last one in order
    pub fn primary_content(&self) -> Option<&ContentItem> {
        self.contents.last()
    }

    pub fn is_pending(&self) -> bool {
        self.artifact_status == ArtifactStatus::Pending
    }

    /// Raw JSON of the primary content record, `{}` if absent or malformed
    pub fn content_json(&self) -> serde_json::Value {
        content_json(self.primary_content().map_or("", |c| c.content.as_str()))
    }

    /// Leniently parsed payload for display
    pub fn display_payload(&self) -> PromptPayload {
        PromptPayload::parse_lenient(
            self.prompt_type,
            self.primary_content().map_or("", |c| c.content.as_str()),
        )
    }

    /// Best title for listings: the primary record's title, else the payload summary
    pub fn display_title(&self) -> String {
        match self.primary_content() {
            Some(item) if !item.title.trim().is_empty() => item.title.clone(),
            _ => self.display_payload().summary(),
        }
    }
}

/// Which prompts are offered for generation beyond `artifact_status = pending`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EligibilityPolicy {
    /// When set, only prompts whose upstream `status` equals this value qualify
    pub required_upstream_status: Option<String>,
}

impl EligibilityPolicy {
    pub fn requiring(status: impl Into<String>) -> Self {
        Self {
            required_upstream_status: Some(status.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(contents: Vec<ContentItem>) -> PromptRecord {
        PromptRecord {
            id: 1,
            prompt_text: "make a fox".to_string(),
            prompt_type: PromptType::Image,
            status: "completed".to_string(),
            artifact_status: ArtifactStatus::Pending,
            created_at: 0,
            completed_at: None,
            processing_started_at: None,
            error_message: None,
            contents,
        }
    }

    fn item(id: i64, content: &str, title: &str) -> ContentItem {
        ContentItem {
            id,
            content: content.to_string(),
            content_type: "image_prompt".to_string(),
            title: title.to_string(),
            position: id,
        }
    }

    #[test]
    fn test_prompt_type_round_trip() {
        for ty in PromptType::all() {
            assert_eq!(PromptType::parse(ty.as_str()), Some(ty));
            assert_eq!(PromptType::parse(ty.short_name()), Some(ty));
        }
        assert_eq!(PromptType::parse("video"), None);
        assert_eq!(PromptType::parse("song"), None);
        assert_eq!(PromptType::Lyrics.artifact_type(), ArtifactType::Audio);
    }

    #[test]
    fn test_unknown_status_reads_as_pending() {
        assert_eq!(ArtifactStatus::from("ready"), ArtifactStatus::Ready);
        assert_eq!(ArtifactStatus::from("bogus"), ArtifactStatus::Pending);
        assert_eq!("Error".parse::<ArtifactStatus>(), Ok(ArtifactStatus::Error));
        assert!("bogus".parse::<ArtifactStatus>().is_err());
    }

    #[test]
    fn test_primary_content_is_last() {
        let rec = record(vec![
            item(1, r#"{"prompt":"first"}"#, ""),
            item(2, r#"{"prompt":"second"}"#, ""),
        ]);
        assert_eq!(rec.primary_content().map(|c| c.id), Some(2));
        assert_eq!(rec.display_title(), "second");
    }

    #[test]
    fn test_display_is_lenient() {
        let rec = record(vec![item(1, "not json", "Fox at dawn")]);
        assert_eq!(rec.content_json(), serde_json::json!({}));
        assert_eq!(rec.display_title(), "Fox at dawn");
        assert!(record(vec![]).primary_content().is_none());
    }
}

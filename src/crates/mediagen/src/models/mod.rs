//! Domain models for mediagen
//!
//! Defines prompts, content records, artifacts and the typed payloads parsed
//! from content records.

pub mod artifact;
pub mod payload;
pub mod prompt;

pub use artifact::{ArtifactRecord, ArtifactType, NewArtifact};
pub use payload::{
    Composition, ImagePromptData, LyricSection, LyricsMetadata, LyricsPromptData, PromptPayload,
    TechnicalParams,
};
pub use prompt::{ArtifactStatus, ContentItem, EligibilityPolicy, PromptRecord, PromptType};

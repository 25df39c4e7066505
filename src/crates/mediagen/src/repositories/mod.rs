//! Database repositories
//!
//! Provides repository patterns for prompt state transitions and artifact
//! persistence.

pub mod artifact_repository;
pub mod prompt_repository;
pub mod timestamp;

pub use artifact_repository::ArtifactRepository;
pub use prompt_repository::{PendingCounts, PromptRepository};

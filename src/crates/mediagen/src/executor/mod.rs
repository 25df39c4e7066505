//! Generation executor
//!
//! # Components
//!
//! - **Pipeline** - per-media-kind parsing, engine arguments and output rules
//! - **Backend** - the external engine, run as a workflow script subprocess
//! - **Orchestrator** - claims prompts and carries them to `ready` or `error`

pub mod backend;
pub mod orchestrator;
pub mod pipeline;

pub use backend::{GenerationBackend, GenerationRequest, WorkflowScriptBackend};
pub use orchestrator::{BatchReport, GenerationOrchestrator, GenerationOutcome};
pub use pipeline::{AudioPipeline, EngineArgument, ImagePipeline, MediaPipeline, Pipelines};

//! # mediagen - Prompt-to-media generation pipeline
//!
//! Polls a SQLite database shared with a prompt producer for pending image
//! and lyrics prompts, drives ComfyUI workflow scripts to render them, and
//! records the generated files back as artifacts.
//!
//! ## Features
//!
//! - **Safe sharing** - every state change is a short `IMMEDIATE` transaction
//!   on its own connection, followed by a WAL checkpoint
//! - **Compare-and-swap claims** - two workers never generate the same prompt
//! - **Atomic artifacts** - all files of a generation land together with the
//!   `ready` flip, or none do
//! - **Crash recovery** - prompts stuck in `processing` are reclaimed
//! - **Two front ends** - a background worker for interactive batches and a
//!   periodic service for unattended runs
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mediagen::{
//!     Database, GenerationOrchestrator, MediaConfig, PromptType, WorkflowScriptBackend,
//! };
//! use std::sync::Arc;
//!
//! # async fn example(config: MediaConfig) -> mediagen::Result<()> {
//! let db = Arc::new(Database::from_config(&config.database).await?);
//! db.run_migrations().await?;
//!
//! let backend = Arc::new(WorkflowScriptBackend::from_config(&config));
//! let orchestrator = GenerationOrchestrator::from_config(db, &config, backend);
//!
//! let report = orchestrator.run_pending(PromptType::Image, 10).await?;
//! println!("{} generated, {} failed", report.succeeded, report.failed);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod executor;
pub mod logging;
pub mod models;
pub mod repositories;
pub mod service;
pub mod shutdown;
pub mod worker;

pub use config::{ConfigLoader, MediaConfig, ValidationReport};
pub use db::{CheckpointMode, CheckpointOutcome, Database, IsolationLevel, TransactionManager};
pub use executor::{
    BatchReport, GenerationBackend, GenerationOrchestrator, GenerationOutcome, GenerationRequest,
    WorkflowScriptBackend,
};
pub use models::{
    ArtifactRecord, ArtifactStatus, ArtifactType, NewArtifact, PromptPayload, PromptRecord,
    PromptType,
};
pub use repositories::{ArtifactRepository, PromptRepository};
pub use service::{MediaService, ServiceReport};
pub use shutdown::ShutdownCoordinator;
pub use worker::{GenerationWorker, WorkerEvent};

pub use error::{MediaError, Result};

//! Periodic generation service
//!
//! One pass reclaims stale prompts, then generates pending image prompts,
//! then pending lyrics prompts. `serve` repeats passes on an interval until
//! shutdown is requested.

use crate::config::ServiceConfig;
use crate::error::Result;
use crate::executor::{BatchReport, GenerationOrchestrator};
use crate::models::PromptType;
use crate::shutdown::ShutdownCoordinator;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Result of one service pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServiceReport {
    pub reclaimed: u64,
    pub images: BatchReport,
    pub songs: BatchReport,
    pub elapsed_ms: u128,
}

impl ServiceReport {
    pub fn processed(&self) -> usize {
        self.images.total() + self.songs.total()
    }

    pub fn failed(&self) -> usize {
        self.images.failed + self.songs.failed
    }

    /// Query errors of this pass, by prompt type
    pub fn query_errors(&self) -> Vec<(PromptType, &str)> {
        [(PromptType::Image, &self.images), (PromptType::Lyrics, &self.songs)]
            .into_iter()
            .filter_map(|(ty, report)| report.query_error.as_deref().map(|e| (ty, e)))
            .collect()
    }
}

/// Unattended generation loop
#[derive(Debug, Clone)]
pub struct MediaService {
    orchestrator: GenerationOrchestrator,
    interval: Duration,
    batch_limit: u32,
    stale_after: Duration,
}

impl MediaService {
    pub fn new(orchestrator: GenerationOrchestrator, config: &ServiceConfig) -> Self {
        Self {
            orchestrator,
            interval: Duration::from_secs(config.interval_secs),
            batch_limit: config.batch_limit,
            stale_after: Duration::from_secs(config.stale_after_secs),
        }
    }

    /// Builder: override the pause between passes
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run a single pass
    pub async fn run_once(&self) -> Result<ServiceReport> {
        let started = Instant::now();
        info!(batch_limit = self.batch_limit, "Starting generation pass");

        let reclaimed = self
            .orchestrator
            .prompts()
            .reclaim_stale(self.stale_after)
            .await?;

        let images = self.run_type(PromptType::Image).await;
        let songs = self.run_type(PromptType::Lyrics).await;

        let report = ServiceReport {
            reclaimed,
            images,
            songs,
            elapsed_ms: started.elapsed().as_millis(),
        };

        info!(
            reclaimed = report.reclaimed,
            images_succeeded = report.images.succeeded,
            images_failed = report.images.failed,
            songs_succeeded = report.songs.succeeded,
            songs_failed = report.songs.failed,
            elapsed_ms = report.elapsed_ms as u64,
            "Generation pass complete"
        );
        Ok(report)
    }

    /// Generate one prompt type. A failed query is recorded on the report so
    /// the next type still runs.
    async fn run_type(&self, prompt_type: PromptType) -> BatchReport {
        match self.orchestrator.run_pending(prompt_type, self.batch_limit).await {
            Ok(report) => report,
            Err(e) => {
                error!(prompt_type = %prompt_type, error = %e, "Failed to load eligible prompts");
                BatchReport::query_failed(e.to_string())
            }
        }
    }

    /// Repeat passes until shutdown. Returns the number of passes run.
    pub async fn run_until_shutdown(&self, shutdown: &ShutdownCoordinator) -> u64 {
        let mut passes = 0;
        info!(interval_secs = self.interval.as_secs(), "Generation service started");

        while !shutdown.is_shutdown_requested() {
            passes += 1;
            if let Err(e) = self.run_once().await {
                error!(pass = passes, error = %e, "Generation pass failed");
            }

            if !shutdown.sleep_or_shutdown(self.interval).await {
                break;
            }
        }

        info!(passes, "Generation service stopped");
        passes
    }
}

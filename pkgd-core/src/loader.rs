//! Bulk reload of the packages directory into the version index.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::error::{IngestionError, Stage};
use crate::pipeline::IngestionPipeline;

/// One artifact that could not be reloaded.
#[derive(Debug, Clone, Serialize)]
pub struct ReloadFailure {
    pub path: PathBuf,
    pub stage: Stage,
    pub reason: String,
}

impl From<IngestionError> for ReloadFailure {
    fn from(err: IngestionError) -> Self {
        Self {
            reason: err.kind.to_string(),
            stage: err.stage,
            path: err.artifact,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReloadReport {
    pub loaded: usize,
    pub failed: Vec<ReloadFailure>,
}

impl ReloadReport {
    pub fn total(&self) -> usize {
        self.loaded + self.failed.len()
    }
}

/// Re-ingests every stored artifact, a bounded number at a time.
#[derive(Debug, Clone)]
pub struct BulkLoader {
    pipeline: IngestionPipeline,
    concurrency: usize,
}

impl BulkLoader {
    pub fn new(pipeline: IngestionPipeline, concurrency: usize) -> Self {
        Self {
            pipeline,
            concurrency: concurrency.max(1),
        }
    }

    /// Ingest every regular file directly under the packages directory.
    ///
    /// Returns after all of them have been processed. A failing artifact is
    /// logged and counted; it never stops the others. The index is not
    /// cleared beforehand.
    pub async fn reload_all(&self) -> std::io::Result<ReloadReport> {
        let files = self.list_artifacts().await?;
        info!(
            count = files.len(),
            concurrency = self.concurrency,
            "Reloading stored packages"
        );

        let outcomes = run_bounded(files, self.concurrency, |path| async move {
            let outcome = self.pipeline.ingest(&path, None).await;
            (path, outcome)
        })
        .await;

        let mut report = ReloadReport::default();
        for (path, outcome) in outcomes {
            match outcome {
                Ok(_) => report.loaded += 1,
                Err(e) => {
                    warn!(path = %path.display(), stage = %e.stage, error = %e, "Failed to reload package");
                    report.failed.push(e.into());
                }
            }
        }

        info!(
            loaded = report.loaded,
            failed = report.failed.len(),
            "Reload complete"
        );
        Ok(report)
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    async fn list_artifacts(&self) -> std::io::Result<Vec<PathBuf>> {
        let dir = self.pipeline.layout().packages_dir();
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Run `task` over `items` with at most `limit` futures in flight.
async fn run_bounded<T, F, Fut>(items: Vec<T>, limit: usize, task: F) -> Vec<Fut::Output>
where
    F: Fn(T) -> Fut,
    Fut: Future,
{
    stream::iter(items)
        .map(task)
        .buffer_unordered(limit.max(1))
        .collect()
        .await
}

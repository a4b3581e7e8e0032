//! Strategy selection for the orchestrator.

use std::time::Duration;

use async_trait::async_trait;
use grader_core::{Assignment, SourceStrategyKind, StorageLayout, Submission};
use tracing::info;

use crate::error::{AcquisitionError, AcquisitionResult};
use crate::manager::DownloadManager;
use crate::repository::DownloadRepositoryStrategy;
use crate::strategy::{SourceStrategy, StagedSource};
use crate::uploaded::UploadedSourcesStrategy;

/// Stages a submission's sources.
#[async_trait]
pub trait SourceAcquirer: Send + Sync {
    async fn acquire(
        &self,
        submission: &Submission,
        assignment: &Assignment,
    ) -> AcquisitionResult<StagedSource>;
}

/// Picks the strategy from the submission's declared kind.
pub struct StrategyAcquirer {
    layout: StorageLayout,
    client: reqwest::Client,
}

impl StrategyAcquirer {
    pub fn new(layout: StorageLayout, http_timeout: Duration) -> AcquisitionResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("grader/{}", grader_core::VERSION))
            .timeout(http_timeout)
            .build()
            .map_err(|e| AcquisitionError::HttpClient(e.to_string()))?;
        Ok(Self::with_client(layout, client))
    }

    pub fn with_client(layout: StorageLayout, client: reqwest::Client) -> Self {
        Self { layout, client }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn strategy_for(
        &self,
        submission: &Submission,
        assignment: &Assignment,
    ) -> AcquisitionResult<Box<dyn SourceStrategy>> {
        let layout = self.layout.clone();
        let strategy: Box<dyn SourceStrategy> = match submission.strategy {
            SourceStrategyKind::Uploaded => Box::new(UploadedSourcesStrategy::new(
                layout,
                assignment.course_id,
                submission,
            )?),
            SourceStrategyKind::Repository => Box::new(DownloadRepositoryStrategy::new(
                self.client.clone(),
                layout,
                assignment.course_id,
                submission,
            )?),
        };
        Ok(strategy)
    }
}

#[async_trait]
impl SourceAcquirer for StrategyAcquirer {
    async fn acquire(
        &self,
        submission: &Submission,
        assignment: &Assignment,
    ) -> AcquisitionResult<StagedSource> {
        let manager = DownloadManager::with_strategy(self.strategy_for(submission, assignment)?);
        let staged = manager.download().await?;
        info!(
            submission_id = %submission.id,
            strategy = %submission.strategy,
            store_dir = %staged.store_dir.display(),
            "Sources staged"
        );
        Ok(staged)
    }
}

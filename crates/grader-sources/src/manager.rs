//! Holds one strategy and runs it.

use crate::error::{AcquisitionError, AcquisitionResult};
use crate::strategy::{SourceStrategy, StagedSource};

#[derive(Default)]
pub struct DownloadManager {
    strategy: Option<Box<dyn SourceStrategy>>,
}

impl DownloadManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategy(strategy: Box<dyn SourceStrategy>) -> Self {
        Self {
            strategy: Some(strategy),
        }
    }

    pub fn set_strategy(&mut self, strategy: Box<dyn SourceStrategy>) {
        self.strategy = Some(strategy);
    }

    pub fn strategy(&self) -> Option<&dyn SourceStrategy> {
        self.strategy.as_deref()
    }

    /// Run the configured strategy; `NoStrategyConfigured` without one.
    pub async fn download(&self) -> AcquisitionResult<StagedSource> {
        let strategy = self
            .strategy
            .as_deref()
            .ok_or(AcquisitionError::NoStrategyConfigured)?;
        strategy.process_sources().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use grader_core::{SourceStrategyKind, SubmissionId};

    struct Fixed;

    #[async_trait]
    impl SourceStrategy for Fixed {
        fn kind(&self) -> SourceStrategyKind {
            SourceStrategyKind::Uploaded
        }

        async fn process_sources(&self) -> AcquisitionResult<StagedSource> {
            Ok(StagedSource {
                submission_id: SubmissionId(1),
                store_dir: "/m/s".into(),
                source_ref: None,
                archive_sha256: None,
            })
        }
    }

    #[tokio::test]
    async fn test_download_without_strategy() {
        let manager = DownloadManager::new();
        assert!(manager.strategy().is_none());
        assert!(matches!(
            manager.download().await,
            Err(AcquisitionError::NoStrategyConfigured)
        ));
    }

    #[tokio::test]
    async fn test_download_delegates() {
        let mut manager = DownloadManager::new();
        manager.set_strategy(Box::new(Fixed));
        assert_eq!(
            manager.strategy().map(|s| s.kind()),
            Some(SourceStrategyKind::Uploaded)
        );
        let staged = manager.download().await.unwrap();
        assert_eq!(staged.submission_id, SubmissionId(1));
    }
}

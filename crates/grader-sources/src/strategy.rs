//! The source strategy seam.

use std::path::PathBuf;

use async_trait::async_trait;
use grader_core::{SourceStrategyKind, SubmissionId};
use serde::{Deserialize, Serialize};

use crate::error::AcquisitionResult;

/// A submission's sources, materialized and ready to mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedSource {
    pub submission_id: SubmissionId,
    /// Absolute local path of the store directory.
    pub store_dir: PathBuf,
    /// New upload reference (relative to the media root) after relocation.
    pub source_ref: Option<String>,
    /// SHA-256 of the downloaded archive, hex encoded.
    pub archive_sha256: Option<String>,
}

/// One way of getting a submission's sources into its store directory.
///
/// Implementations are built per submission and consumed by
/// [`DownloadManager`](crate::DownloadManager).
#[async_trait]
pub trait SourceStrategy: Send + Sync {
    fn kind(&self) -> SourceStrategyKind;

    async fn process_sources(&self) -> AcquisitionResult<StagedSource>;
}

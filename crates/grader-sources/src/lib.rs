//! Source acquisition for graded submissions.
//!
//! Before a submission can be graded its sources must be staged at
//! `courses/course_{course_id}/submissions/submission_{submission_id}` under
//! the media root. Two strategies exist, selected from the submission's
//! declared [`SourceStrategyKind`](grader_core::SourceStrategyKind):
//!
//! - [`UploadedSourcesStrategy`] relocates an upload out of temporary storage.
//! - [`DownloadRepositoryStrategy`] fetches `{repo_url}/tarball/{branch}`,
//!   extracts it and flattens the wrapper folder away.
//!
//! [`DownloadManager`] runs whichever strategy it holds; [`StrategyAcquirer`]
//! picks the strategy for a submission and is what the orchestrator calls.

pub mod acquirer;
pub mod archive;
pub mod error;
pub mod manager;
pub mod repository;
pub mod strategy;
pub mod uploaded;

pub use acquirer::{SourceAcquirer, StrategyAcquirer};
pub use error::{AcquisitionError, AcquisitionResult};
pub use manager::DownloadManager;
pub use repository::DownloadRepositoryStrategy;
pub use strategy::{SourceStrategy, StagedSource};
pub use uploaded::UploadedSourcesStrategy;

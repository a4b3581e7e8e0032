//! Uploaded sources: relocate a staged upload into the store directory.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use grader_core::{CourseId, SourceStrategyKind, StorageLayout, Submission, SubmissionId};
use tokio::fs;
use tracing::{debug, info};

use crate::error::{AcquisitionError, AcquisitionResult};
use crate::strategy::{SourceStrategy, StagedSource};

pub struct UploadedSourcesStrategy {
    layout: StorageLayout,
    course_id: CourseId,
    submission_id: SubmissionId,
    source_ref: String,
}

impl UploadedSourcesStrategy {
    pub fn new(
        layout: StorageLayout,
        course_id: CourseId,
        submission: &Submission,
    ) -> AcquisitionResult<Self> {
        let source_ref = submission
            .uploaded_source_ref
            .clone()
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| {
                AcquisitionError::InvalidSubmission(format!(
                    "submission {} has no uploaded source",
                    submission.id
                ))
            })?;
        Ok(Self {
            layout,
            course_id,
            submission_id: submission.id,
            source_ref,
        })
    }

    /// Reference the upload will have once relocated.
    fn target_ref(&self) -> AcquisitionResult<String> {
        let filename = Path::new(&self.source_ref)
            .file_name()
            .ok_or_else(|| {
                AcquisitionError::InvalidSubmission(format!(
                    "upload reference {:?} has no file name",
                    self.source_ref
                ))
            })?;
        let target = StorageLayout::store_dir_rel(self.course_id, self.submission_id).join(filename);
        Ok(target.to_string_lossy().into_owned())
    }
}

async fn relocate(from: &Path, to: &Path) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).await?;
    }
    if fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    // Renames fail across filesystems.
    fs::copy(from, to).await?;
    fs::remove_file(from).await
}

/// Remove the upload's now-empty temporary directory, if it is one.
async fn prune_temporary_dir(layout: &StorageLayout, initial: &Path) {
    let tmp_root = layout.resolve("tmp");
    let Some(parent) = initial.parent() else {
        return;
    };
    if parent.starts_with(&tmp_root) && parent != tmp_root.as_path() {
        if let Err(e) = fs::remove_dir(parent).await {
            debug!(dir = %parent.display(), error = %e, "Temporary directory kept");
        }
    }
}

#[async_trait]
impl SourceStrategy for UploadedSourcesStrategy {
    fn kind(&self) -> SourceStrategyKind {
        SourceStrategyKind::Uploaded
    }

    async fn process_sources(&self) -> AcquisitionResult<StagedSource> {
        let initial: PathBuf = self.layout.resolve(&self.source_ref);
        let target_ref = self.target_ref()?;
        let target = self.layout.resolve(&target_ref);

        if fs::metadata(&initial).await.is_err() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("uploaded source {} does not exist", initial.display()),
            )
            .into());
        }
        if fs::metadata(&target).await.is_ok() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("target {} already exists", target.display()),
            )
            .into());
        }

        relocate(&initial, &target).await?;
        prune_temporary_dir(&self.layout, &initial).await;

        info!(
            submission_id = %self.submission_id,
            from = %self.source_ref,
            to = %target_ref,
            "Relocated uploaded sources"
        );

        Ok(StagedSource {
            submission_id: self.submission_id,
            store_dir: self.layout.store_dir(self.course_id, self.submission_id),
            source_ref: Some(target_ref),
            archive_sha256: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grader_core::{AssignmentId, NewSubmission, UserId};

    fn submission(source_ref: &str) -> Submission {
        NewSubmission::uploaded(AssignmentId(1), UserId(9), source_ref).into_submission(SubmissionId(12))
    }

    #[tokio::test]
    async fn test_relocates_and_prunes_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path());
        let source_ref = layout.stage_upload("main.c", b"int main(){}").unwrap();
        let tmp_dir = layout.resolve(&source_ref).parent().unwrap().to_path_buf();

        let strategy =
            UploadedSourcesStrategy::new(layout.clone(), CourseId(3), &submission(&source_ref)).unwrap();
        let staged = strategy.process_sources().await.unwrap();

        assert_eq!(
            staged.source_ref.as_deref(),
            Some("courses/course_3/submissions/submission_12/main.c")
        );
        assert_eq!(
            std::fs::read(staged.store_dir.join("main.c")).unwrap(),
            b"int main(){}"
        );
        assert!(!tmp_dir.exists());
        assert!(layout.resolve("tmp").exists());
    }

    #[tokio::test]
    async fn test_missing_upload_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path());
        let strategy =
            UploadedSourcesStrategy::new(layout, CourseId(3), &submission("tmp/tmp_abcdefgh/gone.c"))
                .unwrap();

        match strategy.process_sources().await {
            Err(AcquisitionError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_existing_target_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path());
        let source_ref = layout.stage_upload("main.c", b"new").unwrap();
        let store = layout.store_dir(CourseId(3), SubmissionId(12));
        std::fs::create_dir_all(&store).unwrap();
        std::fs::write(store.join("main.c"), b"old").unwrap();

        let strategy =
            UploadedSourcesStrategy::new(layout.clone(), CourseId(3), &submission(&source_ref)).unwrap();
        match strategy.process_sources().await {
            Err(AcquisitionError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::AlreadyExists),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(std::fs::read(store.join("main.c")).unwrap(), b"old");
        assert!(layout.resolve(&source_ref).exists());
    }

    #[test]
    fn test_requires_source_ref() {
        let mut sub = submission("tmp/tmp_x/main.c");
        sub.uploaded_source_ref = None;
        assert!(matches!(
            UploadedSourcesStrategy::new(StorageLayout::new("/m"), CourseId(1), &sub),
            Err(AcquisitionError::InvalidSubmission(_))
        ));
    }
}

//! Filesystem layout of the media root.
//!
//! ```text
//! <media_root>/
//!   courses/course_<course_id>/attachments/            shared, mounted read-only
//!   courses/course_<course_id>/submissions/submission_<submission_id>/
//!   tmp/tmp_<8 chars>/<filename>                       uploads awaiting relocation
//! ```
//!
//! When the grader itself runs inside a container, bind mounts must name
//! paths as the container host sees them; `host_media_root` covers that case.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{CourseId, SubmissionId};
use crate::error::{DomainError, Result};

const TEMP_DIR_SYMBOLS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLayout {
    media_root: PathBuf,
    host_media_root: Option<PathBuf>,
}

impl StorageLayout {
    pub fn new(media_root: impl Into<PathBuf>) -> Self {
        Self {
            media_root: media_root.into(),
            host_media_root: None,
        }
    }

    /// Use a different root when handing paths to the container runtime.
    pub fn with_host_media_root(mut self, host_media_root: impl Into<PathBuf>) -> Self {
        self.host_media_root = Some(host_media_root.into());
        self
    }

    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    fn host_root(&self) -> &Path {
        self.host_media_root.as_deref().unwrap_or(&self.media_root)
    }

    /// Resolve a path stored relative to the media root.
    pub fn resolve(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.media_root.join(relative)
    }

    pub fn course_dir_rel(course_id: CourseId) -> PathBuf {
        PathBuf::from("courses").join(format!("course_{course_id}"))
    }

    pub fn store_dir_rel(course_id: CourseId, submission_id: SubmissionId) -> PathBuf {
        Self::course_dir_rel(course_id)
            .join("submissions")
            .join(format!("submission_{submission_id}"))
    }

    pub fn attachments_dir_rel(course_id: CourseId) -> PathBuf {
        Self::course_dir_rel(course_id).join("attachments")
    }

    /// Local store directory of a submission.
    pub fn store_dir(&self, course_id: CourseId, submission_id: SubmissionId) -> PathBuf {
        self.media_root
            .join(Self::store_dir_rel(course_id, submission_id))
    }

    /// Store directory as the container host sees it.
    pub fn host_store_dir(&self, course_id: CourseId, submission_id: SubmissionId) -> PathBuf {
        self.host_root()
            .join(Self::store_dir_rel(course_id, submission_id))
    }

    pub fn attachments_dir(&self, course_id: CourseId) -> PathBuf {
        self.media_root.join(Self::attachments_dir_rel(course_id))
    }

    /// Attachments directory as the container host sees it.
    pub fn host_attachments_dir(&self, course_id: CourseId) -> PathBuf {
        self.host_root().join(Self::attachments_dir_rel(course_id))
    }

    /// Create the course attachments directory if missing.
    pub fn ensure_attachments_dir(&self, course_id: CourseId) -> Result<PathBuf> {
        let dir = self.attachments_dir(course_id);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// File names in the course attachments directory, sorted.
    pub fn list_attachments(&self, course_id: CourseId) -> Result<Vec<String>> {
        let dir = self.ensure_attachments_dir(course_id)?;
        let mut names = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    /// Write (or overwrite) a course attachment.
    pub fn store_attachment(&self, course_id: CourseId, name: &str, data: &[u8]) -> Result<PathBuf> {
        let name = single_component(name)?;
        let path = self.ensure_attachments_dir(course_id)?.join(name);
        fs::write(&path, data)?;
        debug!(course_id = %course_id, attachment = %name, bytes = data.len(), "Stored attachment");
        Ok(path)
    }

    /// Random temporary reference (relative to the media root) for a fresh upload.
    pub fn temporary_upload_ref(filename: &str) -> Result<String> {
        let filename = single_component(filename)?;
        let symbols: String = uuid::Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(TEMP_DIR_SYMBOLS)
            .collect();
        Ok(format!("tmp/tmp_{symbols}/{filename}"))
    }

    /// Park uploaded bytes in a temporary location and return their reference.
    pub fn stage_upload(&self, filename: &str, data: &[u8]) -> Result<String> {
        let source_ref = Self::temporary_upload_ref(filename)?;
        let path = self.resolve(&source_ref);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, data)?;
        debug!(source_ref = %source_ref, bytes = data.len(), "Staged upload");
        Ok(source_ref)
    }
}

/// Accept only a plain file name: no separators, no `..`, not empty.
fn single_component(name: &str) -> Result<&str> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(name),
        _ => Err(DomainError::InvalidAttachmentName(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_dir_layout() {
        let layout = StorageLayout::new("/media");
        assert_eq!(
            layout.store_dir(CourseId(3), SubmissionId(17)),
            PathBuf::from("/media/courses/course_3/submissions/submission_17")
        );
        assert_eq!(
            layout.attachments_dir(CourseId(3)),
            PathBuf::from("/media/courses/course_3/attachments")
        );
    }

    #[test]
    fn test_host_paths_fall_back_to_media_root() {
        let layout = StorageLayout::new("/media");
        assert_eq!(
            layout.host_store_dir(CourseId(1), SubmissionId(2)),
            layout.store_dir(CourseId(1), SubmissionId(2))
        );

        let layout = layout.with_host_media_root("/srv/grader/media");
        assert_eq!(
            layout.host_attachments_dir(CourseId(1)),
            PathBuf::from("/srv/grader/media/courses/course_1/attachments")
        );
    }

    #[test]
    fn test_temporary_upload_ref_shape() {
        let source_ref = StorageLayout::temporary_upload_ref("main.c").unwrap();
        let parts: Vec<&str> = source_ref.split('/').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "tmp");
        assert!(parts[1].starts_with("tmp_"));
        assert_eq!(parts[1].len(), "tmp_".len() + TEMP_DIR_SYMBOLS);
        assert_eq!(parts[2], "main.c");
    }

    #[test]
    fn test_rejects_path_like_names() {
        assert!(StorageLayout::temporary_upload_ref("../etc/passwd").is_err());
        assert!(StorageLayout::temporary_upload_ref("a/b").is_err());
        assert!(StorageLayout::temporary_upload_ref("").is_err());
        assert!(StorageLayout::temporary_upload_ref("..").is_err());
    }

    #[test]
    fn test_attachments_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path());

        assert!(layout.list_attachments(CourseId(1)).unwrap().is_empty());
        layout
            .store_attachment(CourseId(1), "tests.py", b"assert True")
            .unwrap();
        layout
            .store_attachment(CourseId(1), "Makefile", b"all:")
            .unwrap();

        assert_eq!(
            layout.list_attachments(CourseId(1)).unwrap(),
            vec!["Makefile".to_string(), "tests.py".to_string()]
        );
        assert!(layout
            .store_attachment(CourseId(1), "../escape", b"x")
            .is_err());
    }

    #[test]
    fn test_stage_upload_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path());
        let source_ref = layout.stage_upload("main.c", b"int main(){}").unwrap();
        let bytes = std::fs::read(layout.resolve(&source_ref)).unwrap();
        assert_eq!(bytes, b"int main(){}");
    }
}

//! Repository sources: download `{repo_url}/tarball/{branch}` and flatten it.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use grader_core::{CourseId, SourceStrategyKind, StorageLayout, Submission, SubmissionId};
use reqwest::header::CONTENT_DISPOSITION;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::archive::{self, ARCHIVE_NAME};
use crate::error::{AcquisitionError, AcquisitionResult};
use crate::strategy::{SourceStrategy, StagedSource};

/// Tarball URL for a repository reference. `https://` is assumed when the
/// reference carries no scheme.
pub fn tarball_url(repo_url: &str, branch: &str) -> String {
    let repo_url = repo_url.trim().trim_end_matches('/');
    if repo_url.contains("://") {
        format!("{repo_url}/tarball/{branch}")
    } else {
        format!("https://{repo_url}/tarball/{branch}")
    }
}

pub struct DownloadRepositoryStrategy {
    client: reqwest::Client,
    layout: StorageLayout,
    course_id: CourseId,
    submission_id: SubmissionId,
    repo_url: String,
    branch: String,
}

struct Downloaded {
    filename: String,
    sha256: String,
    bytes: u64,
}

impl DownloadRepositoryStrategy {
    pub fn new(
        client: reqwest::Client,
        layout: StorageLayout,
        course_id: CourseId,
        submission: &Submission,
    ) -> AcquisitionResult<Self> {
        let non_empty = |value: &Option<String>, what: &str| {
            value
                .clone()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| {
                    AcquisitionError::InvalidSubmission(format!(
                        "submission {} has no {what}",
                        submission.id
                    ))
                })
        };
        Ok(Self {
            client,
            layout,
            course_id,
            submission_id: submission.id,
            repo_url: non_empty(&submission.repo_url, "repository url")?,
            branch: non_empty(&submission.branch, "branch")?,
        })
    }

    pub fn url(&self) -> String {
        tarball_url(&self.repo_url, &self.branch)
    }

    async fn download(&self, url: &str, destination: &Path) -> AcquisitionResult<Downloaded> {
        debug!(url = %url, "Downloading repository tarball");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AcquisitionError::download(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AcquisitionError::download(url, format!("HTTP {status}")));
        }

        let filename = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(archive::filename_from_content_disposition)
            .ok_or_else(|| AcquisitionError::MissingFilename {
                url: url.to_string(),
            })?;

        let mut file = fs::File::create(destination).await?;
        let mut hasher = Sha256::new();
        let mut bytes = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| AcquisitionError::download(url, e))?;
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
            bytes += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(Downloaded {
            filename,
            sha256: hex::encode(hasher.finalize()),
            bytes,
        })
    }
}

/// Create the store directory; it must not already hold anything.
async fn prepare_store_dir(store_dir: &Path) -> io::Result<()> {
    fs::create_dir_all(store_dir).await?;
    let mut entries = fs::read_dir(store_dir).await?;
    if entries.next_entry().await?.is_some() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("store directory {} is not empty", store_dir.display()),
        ));
    }
    Ok(())
}

#[async_trait]
impl SourceStrategy for DownloadRepositoryStrategy {
    fn kind(&self) -> SourceStrategyKind {
        SourceStrategyKind::Repository
    }

    async fn process_sources(&self) -> AcquisitionResult<StagedSource> {
        let url = self.url();
        let store_dir = self.layout.store_dir(self.course_id, self.submission_id);
        prepare_store_dir(&store_dir).await?;

        let archive_path: PathBuf = store_dir.join(ARCHIVE_NAME);
        let downloaded = self.download(&url, &archive_path).await?;
        let root = archive::strip_archive_extensions(&downloaded.filename).to_string();

        let dest = store_dir.clone();
        tokio::task::spawn_blocking(move || {
            archive::extract(&archive_path, &dest)?;
            archive::flatten_root(&dest, &root)
        })
        .await
        .map_err(io::Error::other)??;

        info!(
            submission_id = %self.submission_id,
            url = %url,
            filename = %downloaded.filename,
            bytes = downloaded.bytes,
            sha256 = %downloaded.sha256,
            "Staged repository sources"
        );

        Ok(StagedSource {
            submission_id: self.submission_id,
            store_dir,
            source_ref: None,
            archive_sha256: Some(downloaded.sha256),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grader_core::{AssignmentId, NewSubmission, UserId};

    #[test]
    fn test_tarball_url() {
        assert_eq!(
            tarball_url("github.com/acme/lab1", "main"),
            "https://github.com/acme/lab1/tarball/main"
        );
        assert_eq!(
            tarball_url("http://127.0.0.1:8080/acme/lab1/", "dev"),
            "http://127.0.0.1:8080/acme/lab1/tarball/dev"
        );
    }

    #[test]
    fn test_requires_repo_and_branch() {
        let mut sub = NewSubmission::repository(AssignmentId(1), UserId(1), "github.com/a/b", "main")
            .into_submission(SubmissionId(1));
        sub.branch = Some("  ".into());
        assert!(matches!(
            DownloadRepositoryStrategy::new(
                reqwest::Client::new(),
                StorageLayout::new("/m"),
                CourseId(1),
                &sub
            ),
            Err(AcquisitionError::InvalidSubmission(_))
        ));
    }

    #[tokio::test]
    async fn test_store_dir_must_be_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("left-over"), "").unwrap();
        let err = prepare_store_dir(dir.path()).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }
}

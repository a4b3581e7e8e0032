//! Batch manifest for `grader run`.
//!
//! ```json
//! {
//!   "course_id": 1,
//!   "assignment": { "id": 1, "title": "Lab 1", "environment_tag": "gcc-13" },
//!   "rules": [
//!     { "title": "compile", "command": "gcc -o app *.c", "continue_on_fail": false },
//!     { "title": "test", "command": "./run_tests.sh", "timeout_secs": 30 }
//!   ],
//!   "submissions": [
//!     { "user_id": 7, "upload": "work/alice/main.c" },
//!     { "user_id": 8, "repo_url": "github.com/bob/lab1", "branch": "main" }
//!   ]
//! }
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use grader_core::{Assignment, AssignmentId, CourseId, NewRule, UserId};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Manifest {
    pub course_id: CourseId,
    pub assignment: AssignmentSpec,
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
    #[serde(default)]
    pub submissions: Vec<SubmissionSpec>,
}

#[derive(Debug, Deserialize)]
pub struct AssignmentSpec {
    pub id: AssignmentId,
    #[serde(default)]
    pub title: String,
    pub environment_tag: String,
}

#[derive(Debug, Deserialize)]
pub struct RuleSpec {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub command: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_continue_on_fail")]
    pub continue_on_fail: bool,
}

fn default_continue_on_fail() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SubmissionSpec {
    Upload {
        user_id: UserId,
        upload: PathBuf,
    },
    Repository {
        user_id: UserId,
        repo_url: String,
        branch: String,
    },
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        let mut manifest: Manifest = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse manifest {}", path.display()))?;

        // Upload paths are relative to the manifest.
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for submission in &mut manifest.submissions {
            if let SubmissionSpec::Upload { upload, .. } = submission {
                if upload.is_relative() {
                    *upload = base.join(&*upload);
                }
            }
        }
        Ok(manifest)
    }

    pub fn assignment(&self) -> Assignment {
        Assignment {
            id: self.assignment.id,
            course_id: self.course_id,
            title: self.assignment.title.clone(),
            environment_tag: self.assignment.environment_tag.clone(),
        }
    }

    pub fn new_rules(&self) -> Vec<NewRule> {
        self.rules
            .iter()
            .map(|spec| {
                let mut rule = NewRule::new(self.assignment.id, &spec.title, &spec.command)
                    .with_description(&spec.description);
                if let Some(secs) = spec.timeout_secs {
                    rule = rule.with_timeout(secs);
                }
                if !spec.continue_on_fail {
                    rule = rule.stop_on_fail();
                }
                rule
            })
            .collect()
    }
}

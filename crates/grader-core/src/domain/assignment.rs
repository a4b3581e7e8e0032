//! Assignments and their container environments.

use serde::{Deserialize, Serialize};

use super::ids::{AssignmentId, CourseId};

/// Execution context a submission is graded against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub course_id: CourseId,
    pub title: String,
    /// Tag of the container image the rules run in.
    pub environment_tag: String,
}

/// Build state of an environment image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentStatus {
    Processing,
    Created,
    Failed,
}

/// A course-defined container image built from Dockerfile content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub tag: String,
    pub dockerfile_content: String,
    pub status: EnvironmentStatus,
}

impl Environment {
    pub fn new(tag: &str, dockerfile_content: &str) -> Self {
        Self {
            tag: tag.to_string(),
            dockerfile_content: dockerfile_content.to_string(),
            status: EnvironmentStatus::Processing,
        }
    }
}

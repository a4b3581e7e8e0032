//! Build/test rules.

use serde::{Deserialize, Serialize};

use super::ids::{AssignmentId, RuleId};
use crate::error::{DomainError, Result};

/// One ordered build/test step of an assignment.
///
/// `order` is positive, unique within the assignment and dense; the
/// [`RuleBook`](crate::ordering::RuleBook) maintains that invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub assignment_id: AssignmentId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub order: u32,
    /// Shell command executed inside the container.
    pub command: String,
    /// Wall-clock limit in seconds; `None` runs unbounded.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Keep going after a non-zero exit.
    #[serde(default = "default_continue_on_fail")]
    pub continue_on_fail: bool,
}

fn default_continue_on_fail() -> bool {
    true
}

/// Rule definition before the ordering service assigns an id and order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRule {
    pub assignment_id: AssignmentId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub command: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_continue_on_fail")]
    pub continue_on_fail: bool,
}

impl NewRule {
    /// A continue-on-fail rule without timeout.
    pub fn new(assignment_id: AssignmentId, title: &str, command: &str) -> Self {
        Self {
            assignment_id,
            title: title.to_string(),
            description: String::new(),
            command: command.to_string(),
            timeout_secs: None,
            continue_on_fail: true,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    /// Abort the remaining rules when this one fails.
    pub fn stop_on_fail(mut self) -> Self {
        self.continue_on_fail = false;
        self
    }

    /// Check the invariants that do not depend on other rules.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(DomainError::InvalidRule("title must not be empty".into()));
        }
        if self.command.trim().is_empty() {
            return Err(DomainError::InvalidRule(format!(
                "rule '{}' has an empty command",
                self.title
            )));
        }
        if self.timeout_secs == Some(0) {
            return Err(DomainError::InvalidRule(format!(
                "rule '{}' timeout must be a positive number of seconds",
                self.title
            )));
        }
        Ok(())
    }

    /// Materialize into a [`Rule`] with the given identity and position.
    pub fn into_rule(self, id: RuleId, order: u32) -> Rule {
        Rule {
            id,
            assignment_id: self.assignment_id,
            title: self.title,
            description: self.description,
            order,
            command: self.command,
            timeout_secs: self.timeout_secs,
            continue_on_fail: self.continue_on_fail,
        }
    }
}

//! Numeric identifiers.
//!
//! Identifiers are plain integers on the wire and in storage paths
//! (`course_{id}`, `submission_{id}`), wrapped in newtypes so they cannot be
//! swapped by accident.

use serde::{Deserialize, Serialize};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                $name(value)
            }
        }
    };
}

numeric_id!(
    /// Identifier of a course.
    CourseId
);
numeric_id!(
    /// Identifier of an assignment within a course.
    AssignmentId
);
numeric_id!(
    /// Identifier of a build/test rule.
    RuleId
);
numeric_id!(
    /// Identifier of a submission.
    SubmissionId
);
numeric_id!(
    /// Identifier of a user.
    UserId
);

//! Turning a rule into a container command.

use std::time::Duration;

use grader_core::Rule;
use grader_sandbox::{ExecStatus, TIMEOUT_EXIT_CODE};

/// argv for `rule` under `shell`, wrapped in coreutils `timeout` when the
/// rule has one: `timeout N shell -c COMMAND`.
pub fn rule_argv(shell: &str, rule: &Rule) -> Vec<String> {
    let mut argv = Vec::with_capacity(5);
    if let Some(secs) = rule.timeout_secs {
        argv.push("timeout".to_string());
        argv.push(secs.to_string());
    }
    argv.push(shell.to_string());
    argv.push("-c".to_string());
    argv.push(rule.command.clone());
    argv
}

/// Host-side bound on the exec: the in-container limit plus `grace`, so the
/// container's own `timeout` normally fires first.
pub fn host_timeout(rule: &Rule, grace: Duration) -> Option<Duration> {
    rule.timeout_secs
        .map(|secs| Duration::from_secs(secs).saturating_add(grace))
}

/// Whether an exec of `rule` ended on its timeout. A host kill is certain;
/// the in-container `timeout` only counts when it exited 124 after the limit
/// had actually passed.
pub fn timed_out(rule: &Rule, status: &ExecStatus) -> bool {
    if status.killed {
        return true;
    }
    rule.timeout_secs.is_some_and(|secs| {
        status.exit_code == TIMEOUT_EXIT_CODE && status.elapsed >= Duration::from_secs(secs)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use grader_core::{AssignmentId, NewRule, RuleId};

    fn status(exit_code: i32, killed: bool, elapsed_secs: u64) -> ExecStatus {
        ExecStatus {
            exit_code,
            killed,
            elapsed: Duration::from_secs(elapsed_secs),
        }
    }

    #[test]
    fn test_unbounded_rule() {
        let rule = NewRule::new(AssignmentId(1), "build", "make all").into_rule(RuleId(1), 1);
        assert_eq!(rule_argv("bash", &rule), vec!["bash", "-c", "make all"]);
        assert_eq!(host_timeout(&rule, Duration::from_secs(5)), None);
    }

    #[test]
    fn test_bounded_rule() {
        let rule = NewRule::new(AssignmentId(1), "test", "./run_tests.sh")
            .with_timeout(30)
            .into_rule(RuleId(2), 2);
        assert_eq!(
            rule_argv("bash", &rule),
            vec!["timeout", "30", "bash", "-c", "./run_tests.sh"]
        );
        assert_eq!(
            host_timeout(&rule, Duration::from_secs(5)),
            Some(Duration::from_secs(35))
        );
    }

    #[test]
    fn test_timed_out() {
        let rule = NewRule::new(AssignmentId(1), "test", "./run_tests.sh")
            .with_timeout(30)
            .into_rule(RuleId(2), 2);
        assert!(timed_out(&rule, &status(124, false, 30)));
        assert!(timed_out(&rule, &status(124, true, 35)));
        // The command itself chose 124 well inside its limit.
        assert!(!timed_out(&rule, &status(124, false, 1)));
        assert!(!timed_out(&rule, &status(1, false, 31)));

        let unbounded = NewRule::new(AssignmentId(1), "build", "make").into_rule(RuleId(1), 1);
        assert!(!timed_out(&unbounded, &status(124, false, 600)));
    }
}

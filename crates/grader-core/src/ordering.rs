//! Rule ordering service.
//!
//! Keeps the rules of every assignment in a dense 1-based order:
//! for N rules the orders are exactly `{1..N}`.
//!
//! - `create` appends at `max(order) + 1`
//! - `move_rule` shifts every rule strictly between the old and the new
//!   position by one to make room
//! - `remove` closes the gap left behind
//!
//! The execution pipeline only consumes [`RuleSource::rules_for`].

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::{AssignmentId, NewRule, Rule, RuleId};
use crate::error::OrderingError;
use crate::store::{RuleSource, StoreResult};

type OrderingResult<T> = std::result::Result<T, OrderingError>;

#[derive(Debug, Default)]
struct Book {
    next_id: u64,
    rules: BTreeMap<RuleId, Rule>,
}

impl Book {
    fn orders_in(&self, assignment_id: AssignmentId) -> impl Iterator<Item = &Rule> {
        self.rules
            .values()
            .filter(move |r| r.assignment_id == assignment_id)
    }

    fn count_in(&self, assignment_id: AssignmentId) -> u32 {
        self.orders_in(assignment_id).count() as u32
    }
}

/// In-memory rule ordering service.
#[derive(Debug, Default)]
pub struct RuleBook {
    book: Mutex<Book>,
}

impl RuleBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule at the end of its assignment's order.
    pub fn create(&self, new_rule: NewRule) -> OrderingResult<Rule> {
        new_rule.validate()?;

        let mut book = self.book.lock().unwrap_or_else(|e| e.into_inner());
        let next_order = book
            .orders_in(new_rule.assignment_id)
            .map(|r| r.order)
            .max()
            .unwrap_or(0)
            + 1;

        book.next_id += 1;
        let rule = new_rule.into_rule(RuleId(book.next_id), next_order);
        debug!(rule_id = %rule.id, order = rule.order, "Created rule");
        book.rules.insert(rule.id, rule.clone());
        Ok(rule)
    }

    /// Move a rule to `new_order`, shifting the rules in between.
    pub fn move_rule(&self, rule_id: RuleId, new_order: u32) -> OrderingResult<Rule> {
        let mut book = self.book.lock().unwrap_or_else(|e| e.into_inner());
        let (assignment_id, old_order) = book
            .rules
            .get(&rule_id)
            .map(|r| (r.assignment_id, r.order))
            .ok_or(OrderingError::RuleNotFound(rule_id))?;

        let max = book.count_in(assignment_id);
        if new_order < 1 || new_order > max {
            return Err(OrderingError::OrderOutOfRange {
                order: new_order,
                max,
            });
        }

        for rule in book.rules.values_mut() {
            if rule.assignment_id != assignment_id || rule.id == rule_id {
                continue;
            }
            if old_order > new_order {
                if rule.order >= new_order && rule.order < old_order {
                    rule.order += 1;
                }
            } else if rule.order > old_order && rule.order <= new_order {
                rule.order -= 1;
            }
        }

        let rule = book
            .rules
            .get_mut(&rule_id)
            .ok_or(OrderingError::RuleNotFound(rule_id))?;
        rule.order = new_order;
        debug!(rule_id = %rule_id, from = old_order, to = new_order, "Moved rule");
        Ok(rule.clone())
    }

    /// Delete a rule and close the gap it leaves.
    pub fn remove(&self, rule_id: RuleId) -> OrderingResult<Rule> {
        let mut book = self.book.lock().unwrap_or_else(|e| e.into_inner());
        let removed = book
            .rules
            .remove(&rule_id)
            .ok_or(OrderingError::RuleNotFound(rule_id))?;

        for rule in book.rules.values_mut() {
            if rule.assignment_id == removed.assignment_id && rule.order > removed.order {
                rule.order -= 1;
            }
        }
        Ok(removed)
    }

    pub fn get(&self, rule_id: RuleId) -> OrderingResult<Rule> {
        let book = self.book.lock().unwrap_or_else(|e| e.into_inner());
        book.rules
            .get(&rule_id)
            .cloned()
            .ok_or(OrderingError::RuleNotFound(rule_id))
    }

    /// Rules of an assignment in ascending order.
    pub fn ordered(&self, assignment_id: AssignmentId) -> Vec<Rule> {
        let book = self.book.lock().unwrap_or_else(|e| e.into_inner());
        let mut rules: Vec<Rule> = book.orders_in(assignment_id).cloned().collect();
        rules.sort_by_key(|r| r.order);
        rules
    }
}

#[async_trait]
impl RuleSource for RuleBook {
    async fn rules_for(&self, assignment_id: AssignmentId) -> StoreResult<Vec<Rule>> {
        Ok(self.ordered(assignment_id))
    }
}

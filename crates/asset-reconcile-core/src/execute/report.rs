use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::PlanningError;
use crate::plan::{OperationKind, Plan, PlanOperation};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationNote {
    pub index: usize,
    pub operation: PlanOperation,
    pub message: String,
}

/// Outcome of applying one plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub started_at: String,
    pub finished_at: String,
    pub total_operations: usize,
    pub applied: BTreeMap<OperationKind, usize>,
    pub skipped: Vec<OperationNote>,
    pub failures: Vec<OperationNote>,
    /// Store changes that failed after the matching file change went through.
    pub warnings: Vec<OperationNote>,
    /// Carried over from the plan; these still need a human.
    pub planning_errors: Vec<PlanningError>,
    pub cancelled: bool,
    pub not_started: usize,
}

impl ExecutionReport {
    pub(crate) fn begin(plan: &Plan) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            started_at: now.clone(),
            finished_at: now,
            total_operations: plan.operations.len(),
            applied: BTreeMap::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
            warnings: Vec::new(),
            planning_errors: plan.errors.clone(),
            cancelled: false,
            not_started: 0,
        }
    }

    pub(crate) fn finish(&mut self) {
        self.finished_at = Utc::now().to_rfc3339();
    }

    pub fn applied_total(&self) -> usize {
        self.applied.values().sum()
    }

    /// True when something is left for an operator: a failed operation, an
    /// unresolved planning error or work cut short by cancellation.
    pub fn needs_follow_up(&self) -> bool {
        !self.failures.is_empty() || !self.planning_errors.is_empty() || self.cancelled
    }
}

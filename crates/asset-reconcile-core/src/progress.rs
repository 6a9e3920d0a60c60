use crate::execute::OpState;
use crate::plan::OperationKind;

/// Hooks for reporting progress of a reconciliation pass.
///
/// The CLI drives indicatif bars from these. All methods default to no-ops.
pub trait ProgressReporter: Send + Sync {
    fn on_scan_start(&self) {}
    fn on_scan_complete(&self, _total_files: usize, _duration_secs: f64) {}
    fn on_classify_start(&self, _total_files: usize) {}
    fn on_classify_progress(&self, _files_done: usize, _total_files: usize) {}
    fn on_classify_complete(&self, _failures: usize, _duration_secs: f64) {}
    fn on_plan_complete(&self, _operations: usize, _errors: usize, _duration_secs: f64) {}
    fn on_execute_start(&self, _operations: usize) {}
    fn on_operation_complete(&self, _index: usize, _kind: OperationKind, _state: OpState) {}
    fn on_execute_complete(&self, _applied: usize, _failed: usize, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

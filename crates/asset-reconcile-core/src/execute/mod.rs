//! Applies a plan, one operation at a time, in plan order.
//!
//! Each operation moves `pending -> verifying -> applied | skipped | failed`.
//! A failure is recorded and the run continues.

mod fs_ops;
pub mod report;
mod store_ops;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::config::{AppConfig, RecodeSettings};
use crate::error::{io_err, ExecutionError};
use crate::plan::{Plan, PlanOperation};
use crate::progress::ProgressReporter;
use crate::storage::{AssetStore, PathMapper};

pub use report::{ExecutionReport, OperationNote};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpState {
    Pending,
    Verifying,
    Applied,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outcome {
    Applied,
    Skipped(String),
}

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub operation_timeout: Duration,
    pub recode: RecodeSettings,
    pub mapper: PathMapper,
}

impl ExecutorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            operation_timeout: config.operation_timeout(),
            recode: config.recode.clone(),
            mapper: PathMapper::new(&config.path_prefix),
        }
    }
}

pub struct Executor {
    root: PathBuf,
    settings: ExecutorSettings,
    cancel: Arc<AtomicBool>,
}

impl Executor {
    pub fn new(root: &Path, settings: ExecutorSettings, cancel: Arc<AtomicBool>) -> Self {
        Self {
            root: root.to_path_buf(),
            settings,
            cancel,
        }
    }

    pub fn execute(
        &self,
        plan: &Plan,
        store: &mut dyn AssetStore,
        reporter: &dyn ProgressReporter,
    ) -> ExecutionReport {
        let start = Instant::now();
        let total = plan.operations.len();
        let mut report = ExecutionReport::begin(plan);
        info!("Executing {} operations...", total);
        reporter.on_execute_start(total);

        // Lowercased relative paths.
        let mut tainted: HashSet<String> = HashSet::new();
        let mut changed: HashSet<String> = HashSet::new();

        for (index, op) in plan.operations.iter().enumerate() {
            if self.cancel.load(Ordering::SeqCst) {
                report.cancelled = true;
                report.not_started = total - index;
                warn!("Cancelled; {} operations not started", report.not_started);
                break;
            }

            trace!("[{}] {:?}: {}", index, OpState::Pending, op);
            let touched = self.relative_paths(op);
            let result = if touched.iter().any(|p| tainted.contains(p)) {
                Err(ExecutionError::Precondition(
                    "a path it needs is held by a timed-out operation".to_string(),
                ))
            } else {
                trace!("[{}] {:?}", index, OpState::Verifying);
                self.apply(op, store)
            };

            let state = match result {
                Ok(Outcome::Applied) => {
                    debug!("[{}] applied: {}", index, op);
                    *report.applied.entry(op.kind()).or_insert(0) += 1;
                    if op.is_filesystem() {
                        changed.extend(touched);
                    }
                    OpState::Applied
                }
                Ok(Outcome::Skipped(reason)) => {
                    debug!("[{}] skipped: {} ({})", index, op, reason);
                    report.skipped.push(note(index, op, reason));
                    OpState::Skipped
                }
                Err(e) => {
                    error!("[{}] failed: {}: {}", index, op, e);
                    if matches!(e, ExecutionError::TimedOut(_)) {
                        tainted.extend(touched.iter().cloned());
                    }
                    if !op.is_filesystem() && touched.iter().any(|p| changed.contains(p)) {
                        report.warnings.push(note(
                            index,
                            op,
                            "store no longer matches files changed earlier in this run".to_string(),
                        ));
                    }
                    report.failures.push(note(index, op, e.to_string()));
                    OpState::Failed
                }
            };
            trace!("[{}] {:?}", index, state);
            reporter.on_operation_complete(index, op.kind(), state);
        }

        report.finish();
        let duration = start.elapsed().as_secs_f64();
        info!(
            "Execution finished in {:.2}s: {} applied, {} skipped, {} failed",
            duration,
            report.applied_total(),
            report.skipped.len(),
            report.failures.len()
        );
        if !report.warnings.is_empty() {
            warn!("{} consistency warnings", report.warnings.len());
        }
        reporter.on_execute_complete(report.applied_total(), report.failures.len(), duration);
        report
    }

    fn apply(&self, op: &PlanOperation, store: &mut dyn AssetStore) -> Result<Outcome, ExecutionError> {
        if op.is_filesystem() {
            self.apply_with_timeout(op)
        } else {
            store_ops::apply(store, &self.root, &self.settings.mapper, op)
        }
    }

    fn apply_with_timeout(&self, op: &PlanOperation) -> Result<Outcome, ExecutionError> {
        let root = self.root.clone();
        let recode = self.settings.recode.clone();
        let owned = op.clone();
        run_bounded(&self.root, self.settings.operation_timeout, move || {
            fs_ops::apply(&root, &owned, &recode)
        })
    }

    /// Content-relative, lowercased paths an operation touches.
    fn relative_paths(&self, op: &PlanOperation) -> Vec<String> {
        let touched = op.touched_paths();
        if op.is_filesystem() {
            touched.into_iter().map(str::to_lowercase).collect()
        } else {
            touched
                .into_iter()
                .filter_map(|p| self.settings.mapper.to_relative(p))
                .map(|p| p.to_lowercase())
                .collect()
        }
    }
}

/// Runs `work` on its own thread. On timeout the thread is abandoned; it may
/// still finish in the background.
fn run_bounded<F>(root: &Path, timeout: Duration, work: F) -> Result<Outcome, ExecutionError>
where
    F: FnOnce() -> Result<Outcome, ExecutionError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("reconcile-op".to_string())
        .spawn(move || {
            let _ = tx.send(work());
        })
        .map_err(|e| io_err(root, e))?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(ExecutionError::TimedOut(timeout.as_secs())),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(ExecutionError::WorkerLost),
    }
}

fn note(index: usize, op: &PlanOperation, message: String) -> OperationNote {
    OperationNote {
        index,
        operation: op.clone(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{fixtures, MediaFormat};
    use crate::plan::OperationKind;
    use crate::progress::SilentReporter;
    use crate::storage::MemoryStore;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct StateRecorder {
        states: Mutex<Vec<OpState>>,
    }

    impl ProgressReporter for StateRecorder {
        fn on_operation_complete(&self, _index: usize, _kind: OperationKind, state: OpState) {
            self.states.lock().unwrap().push(state);
        }
    }

    fn executor(root: &Path) -> (Executor, Arc<AtomicBool>) {
        let cancel = Arc::new(AtomicBool::new(false));
        let settings = ExecutorSettings::from_config(&AppConfig::default());
        (Executor::new(root, settings, cancel.clone()), cancel)
    }

    fn rename(from: &str, to: &str) -> PlanOperation {
        PlanOperation::Rename {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    #[test]
    fn test_failure_does_not_stop_the_run() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.JPG"), b"b").unwrap();
        let plan = Plan {
            operations: vec![rename("missing.JPG", "missing.jpg"), rename("b.JPG", "b.jpg")],
            ..Plan::default()
        };
        let (executor, _) = executor(dir.path());
        let mut store = MemoryStore::new();
        let report = executor.execute(&plan, &mut store, &SilentReporter);

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 0);
        assert_eq!(report.applied_total(), 1);
        assert!(dir.path().join("b.jpg").is_file());
        assert!(report.needs_follow_up());
    }

    #[test]
    fn test_store_failure_after_rename_is_a_warning() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.PNG"), b"a").unwrap();
        let mut store = MemoryStore::new();
        let id = store.insert("/somewhere-else.png");
        let plan = Plan {
            operations: vec![
                rename("a.PNG", "a.png"),
                PlanOperation::UpdateAssetPath {
                    id,
                    old_path: "/a.PNG".to_string(),
                    new_path: "/a.png".to_string(),
                },
            ],
            ..Plan::default()
        };
        let (executor, _) = executor(dir.path());
        let report = executor.execute(&plan, &mut store, &SilentReporter);

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].index, 1);
    }

    #[test]
    fn test_cancel_before_start() {
        let dir = tempdir().unwrap();
        let plan = Plan {
            operations: vec![rename("a.JPG", "a.jpg")],
            ..Plan::default()
        };
        let (executor, cancel) = executor(dir.path());
        cancel.store(true, Ordering::SeqCst);
        let report = executor.execute(&plan, &mut MemoryStore::new(), &SilentReporter);

        assert!(report.cancelled);
        assert_eq!(report.not_started, 1);
        assert_eq!(report.applied_total(), 0);
    }

    #[test]
    fn test_clean_run_needs_no_follow_up() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.JPG"), b"a").unwrap();
        let plan = Plan {
            operations: vec![rename("a.JPG", "a.jpg")],
            ..Plan::default()
        };
        let (executor, _) = executor(dir.path());
        let report = executor.execute(&plan, &mut MemoryStore::new(), &SilentReporter);
        assert!(!report.needs_follow_up());
        assert_eq!(report.total_operations, 1);
    }

    #[test]
    fn test_bounded_work_times_out() {
        let dir = tempdir().unwrap();
        let result = run_bounded(dir.path(), Duration::from_millis(20), || {
            thread::sleep(Duration::from_millis(500));
            Ok(Outcome::Applied)
        });
        assert!(matches!(result, Err(ExecutionError::TimedOut(0))));

        let quick = run_bounded(dir.path(), Duration::from_secs(5), || Ok(Outcome::Applied));
        assert_eq!(quick.unwrap(), Outcome::Applied);
    }

    #[test]
    fn test_panicking_work_is_worker_lost() {
        let dir = tempdir().unwrap();
        let result = run_bounded(dir.path(), Duration::from_secs(5), || -> Result<Outcome, ExecutionError> {
            panic!("recode blew up")
        });
        assert!(matches!(result, Err(ExecutionError::WorkerLost)));
    }

    #[test]
    fn test_timed_out_operation_taints_its_paths() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("big.png"), fixtures::opaque_png_bytes(2000, 2000)).unwrap();
        fs::write(dir.path().join("small.JPG"), b"s").unwrap();
        let plan = Plan {
            operations: vec![
                PlanOperation::ConvertFormat {
                    path: "big.png".to_string(),
                    from_format: MediaFormat::Png,
                    to_format: MediaFormat::Jpeg,
                    target: "big.jpg".to_string(),
                },
                rename("BIG.png", "other.png"),
                rename("small.JPG", "small.jpg"),
            ],
            ..Plan::default()
        };
        let settings = ExecutorSettings {
            operation_timeout: Duration::ZERO,
            ..ExecutorSettings::from_config(&AppConfig::default())
        };
        let executor = Executor::new(dir.path(), settings, Arc::new(AtomicBool::new(false)));
        let recorder = StateRecorder::default();
        let report = executor.execute(&plan, &mut MemoryStore::new(), &recorder);

        assert_eq!(report.failures.len(), 2, "{:?}", report.failures);
        assert!(report.failures[0].message.contains("timed out"));
        assert_eq!(report.failures[1].index, 1);
        assert!(report.failures[1].message.contains("timed-out operation"));
        assert!(!dir.path().join("other.png").exists());
        let states = recorder.states.lock().unwrap().clone();
        assert_eq!(states[0], OpState::Failed);
        assert_eq!(states[1], OpState::Failed);
    }
}

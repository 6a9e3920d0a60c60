use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::classify::{classify_file, Classification};
use crate::config::AppConfig;
use crate::error::{ClassifyError, Error};
use crate::execute::{ExecutionReport, Executor, ExecutorSettings};
use crate::plan::{Plan, Planner, PlanningOutcome};
use crate::progress::ProgressReporter;
use crate::scanner::{ScanOutcome, Scanner};
use crate::storage::AssetStore;

pub struct ReconcileEngine {
    config: AppConfig,
    cancel: Arc<AtomicBool>,
}

impl ReconcileEngine {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Setting the flag stops the current pass at the next checkpoint.
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn check_cancelled(&self) -> Result<(), Error> {
        if self.cancel.load(Ordering::SeqCst) {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    fn pool(&self) -> Result<ThreadPool, Error> {
        Ok(ThreadPoolBuilder::new()
            .num_threads(self.config.concurrency)
            .thread_name(|i| format!("reconcile-worker-{}", i))
            .build()?)
    }

    /// Read-only pass over the tree and the store:
    /// 1. Parallel scan of the content root
    /// 2. Parallel byte-level classification
    /// 3. Planning (digests and metadata in parallel, the rest sequential)
    ///
    /// Running it twice over an unchanged tree and store yields equal plans.
    pub fn analyze(
        &self,
        root: &Path,
        store: &dyn AssetStore,
        reporter: &dyn ProgressReporter,
    ) -> Result<PlanningOutcome, Error> {
        let records = store.list_all()?;
        debug!("Loaded {} asset records", records.len());
        let pool = self.pool()?;
        let planner = Planner::new(&self.config);

        pool.install(|| -> Result<PlanningOutcome, Error> {
            info!("Scanning {}...", root.display());
            reporter.on_scan_start();
            let scan_start = Instant::now();
            let scanner = Scanner::new(&self.config.extensions, &self.config.ignore_patterns);
            let scan = scanner.scan(root)?;
            let scan_secs = scan_start.elapsed().as_secs_f64();
            debug!(
                "Scan completed in {:.2}s: {} files, {} bytes, {} skipped",
                scan_secs,
                scan.files.len(),
                scan.total_bytes(),
                scan.issues.len()
            );
            reporter.on_scan_complete(scan.files.len(), scan_secs);
            self.check_cancelled()?;

            info!("Classifying {} files...", scan.files.len());
            let classify_start = Instant::now();
            let classifications = classify_all(&scan, reporter);
            let failures = classifications.iter().filter(|c| c.is_err()).count();
            let classify_secs = classify_start.elapsed().as_secs_f64();
            debug!(
                "Classification completed in {:.2}s: {} unclassifiable",
                classify_secs, failures
            );
            reporter.on_classify_complete(failures, classify_secs);
            self.check_cancelled()?;

            info!("Planning...");
            let plan_start = Instant::now();
            let outcome = planner.plan(&scan, &classifications, &records);
            reporter.on_plan_complete(
                outcome.plan.operations.len(),
                outcome.plan.errors.len(),
                plan_start.elapsed().as_secs_f64(),
            );
            Ok(outcome)
        })
    }

    pub fn execute(
        &self,
        root: &Path,
        plan: &Plan,
        store: &mut dyn AssetStore,
        reporter: &dyn ProgressReporter,
    ) -> ExecutionReport {
        let settings = ExecutorSettings::from_config(&self.config);
        Executor::new(root, settings, self.cancel_token()).execute(plan, store, reporter)
    }
}

fn classify_all(scan: &ScanOutcome, reporter: &dyn ProgressReporter) -> Vec<Result<Classification, ClassifyError>> {
    let total = scan.files.len();
    reporter.on_classify_start(total);
    let done = AtomicUsize::new(0);
    scan.files
        .par_iter()
        .map(|file| {
            let result = classify_file(&file.absolute(&scan.root));
            let n = done.fetch_add(1, Ordering::Relaxed) + 1;
            reporter.on_classify_progress(n, total);
            result
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentReporter;
    use crate::storage::MemoryStore;
    use tempfile::tempdir;

    #[test]
    fn test_missing_root_is_fatal() {
        let dir = tempdir().unwrap();
        let engine = ReconcileEngine::new(AppConfig::default());
        let result = engine.analyze(&dir.path().join("nope"), &MemoryStore::new(), &SilentReporter);
        assert!(matches!(result, Err(Error::Scan(_))));
    }

    #[test]
    fn test_cancel_stops_analysis() {
        let dir = tempdir().unwrap();
        let engine = ReconcileEngine::new(AppConfig::default());
        engine.cancel_token().store(true, Ordering::SeqCst);
        let result = engine.analyze(dir.path(), &MemoryStore::new(), &SilentReporter);
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}

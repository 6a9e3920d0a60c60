pub mod analysis;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod execute;
pub mod hasher;
pub mod normalize;
pub mod paths;
pub mod plan;
pub mod platform;
pub mod progress;
pub mod report;
pub mod scanner;
pub mod storage;

pub use config::AppConfig;
pub use engine::ReconcileEngine;
pub use error::{Error, ExecutionError, PlanningError};
pub use execute::{ExecutionReport, OpState};
pub use plan::{OperationKind, Plan, PlanOperation, PlanningOutcome};
pub use progress::{ProgressReporter, SilentReporter};
pub use report::{ReportKind, ReportWriter};
pub use storage::{AssetStore, MemoryStore, SqliteStore};

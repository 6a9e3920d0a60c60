pub mod order;
pub mod planner;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::analysis::ConflictGroup;
use crate::classify::{Classification, Correction, MediaFormat};
use crate::error::{ClassifyError, PlanningError};
use crate::scanner::{FileRecord, ScanIssue};
use crate::storage::DerivedMetadata;

pub use planner::Planner;

/// One step of a plan. Filesystem paths are content-relative, store paths
/// are as the store holds them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PlanOperation {
    /// Remove a byte-identical duplicate of `duplicate_of`.
    Delete {
        path: String,
        duplicate_of: String,
        digest: String,
    },
    Rename {
        from: String,
        to: String,
    },
    Move {
        from: String,
        to: String,
    },
    /// Recode `path` into `target`, then remove `path`.
    ConvertFormat {
        path: String,
        from_format: MediaFormat,
        to_format: MediaFormat,
        target: String,
    },
    UpdateAssetPath {
        id: i64,
        old_path: String,
        new_path: String,
    },
    CreateAssetRecord {
        path: String,
        metadata: DerivedMetadata,
    },
    DeleteAssetRecord {
        id: i64,
        path: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Delete,
    Rename,
    Move,
    ConvertFormat,
    UpdateAssetPath,
    CreateAssetRecord,
    DeleteAssetRecord,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Delete => "delete",
            OperationKind::Rename => "rename",
            OperationKind::Move => "move",
            OperationKind::ConvertFormat => "convert_format",
            OperationKind::UpdateAssetPath => "update_asset_path",
            OperationKind::CreateAssetRecord => "create_asset_record",
            OperationKind::DeleteAssetRecord => "delete_asset_record",
        };
        f.write_str(name)
    }
}

impl PlanOperation {
    pub fn kind(&self) -> OperationKind {
        match self {
            PlanOperation::Delete { .. } => OperationKind::Delete,
            PlanOperation::Rename { .. } => OperationKind::Rename,
            PlanOperation::Move { .. } => OperationKind::Move,
            PlanOperation::ConvertFormat { .. } => OperationKind::ConvertFormat,
            PlanOperation::UpdateAssetPath { .. } => OperationKind::UpdateAssetPath,
            PlanOperation::CreateAssetRecord { .. } => OperationKind::CreateAssetRecord,
            PlanOperation::DeleteAssetRecord { .. } => OperationKind::DeleteAssetRecord,
        }
    }

    pub fn is_filesystem(&self) -> bool {
        matches!(
            self.kind(),
            OperationKind::Delete | OperationKind::Rename | OperationKind::Move | OperationKind::ConvertFormat
        )
    }

    /// Every path the operation reads or writes.
    pub fn touched_paths(&self) -> Vec<&str> {
        match self {
            PlanOperation::Delete { path, duplicate_of, .. } => vec![path.as_str(), duplicate_of.as_str()],
            PlanOperation::Rename { from, to } | PlanOperation::Move { from, to } => vec![from.as_str(), to.as_str()],
            PlanOperation::ConvertFormat { path, target, .. } => vec![path.as_str(), target.as_str()],
            PlanOperation::UpdateAssetPath { old_path, new_path, .. } => {
                vec![old_path.as_str(), new_path.as_str()]
            }
            PlanOperation::CreateAssetRecord { path, .. } | PlanOperation::DeleteAssetRecord { path, .. } => {
                vec![path.as_str()]
            }
        }
    }
}

impl fmt::Display for PlanOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanOperation::Delete { path, duplicate_of, .. } => {
                write!(f, "delete {} (duplicate of {})", path, duplicate_of)
            }
            PlanOperation::Rename { from, to } => write!(f, "rename {} -> {}", from, to),
            PlanOperation::Move { from, to } => write!(f, "move {} -> {}", from, to),
            PlanOperation::ConvertFormat {
                path,
                from_format,
                to_format,
                target,
            } => write!(f, "convert {} ({} -> {}) -> {}", path, from_format, to_format, target),
            PlanOperation::UpdateAssetPath { id, old_path, new_path } => {
                write!(f, "update record {}: {} -> {}", id, old_path, new_path)
            }
            PlanOperation::CreateAssetRecord { path, .. } => write!(f, "create record {}", path),
            PlanOperation::DeleteAssetRecord { id, path } => write!(f, "delete record {} ({})", id, path),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub operations: Vec<PlanOperation>,
    pub conflict_groups: Vec<ConflictGroup>,
    pub errors: Vec<PlanningError>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn counts(&self) -> BTreeMap<OperationKind, usize> {
        let mut counts = BTreeMap::new();
        for op in &self.operations {
            *counts.entry(op.kind()).or_insert(0) += 1;
        }
        counts
    }

    pub fn count(&self, kind: OperationKind) -> usize {
        self.operations.iter().filter(|op| op.kind() == kind).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatEntry {
    pub path: String,
    pub actual_format: MediaFormat,
    pub has_transparency: bool,
    pub correction: Correction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatFailure {
    pub path: String,
    pub error: ClassifyError,
}

/// What the classifier found across the tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatSummary {
    pub by_format: BTreeMap<MediaFormat, usize>,
    /// Files whose name or encoding has to change, in path order.
    pub corrections: Vec<FormatEntry>,
    pub failures: Vec<FormatFailure>,
}

impl FormatSummary {
    pub fn record(&mut self, file: &FileRecord, classification: &Classification) {
        *self.by_format.entry(classification.actual_format).or_insert(0) += 1;
        let correction = classification.correction(&file.extension);
        if correction != Correction::None {
            self.corrections.push(FormatEntry {
                path: file.current_path.clone(),
                actual_format: classification.actual_format,
                has_transparency: classification.has_transparency,
                correction,
            });
        }
    }

    pub fn recode_count(&self) -> usize {
        self.corrections
            .iter()
            .filter(|e| e.correction == Correction::RecodeToJpeg)
            .count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStats {
    pub files_scanned: usize,
    pub total_bytes: u64,
    pub records: usize,
    pub frozen: usize,
    pub duplicates: usize,
}

/// Everything one analysis pass produced.
#[derive(Debug, Clone)]
pub struct PlanningOutcome {
    pub root: PathBuf,
    pub plan: Plan,
    pub formats: FormatSummary,
    pub scan_issues: Vec<ScanIssue>,
    pub stats: PlanStats,
}

use std::path::Path;

use super::Outcome;
use crate::error::ExecutionError;
use crate::paths;
use crate::plan::PlanOperation;
use crate::storage::{AssetStore, PathMapper};

pub(crate) fn apply(
    store: &mut dyn AssetStore,
    root: &Path,
    mapper: &PathMapper,
    op: &PlanOperation,
) -> Result<Outcome, ExecutionError> {
    match op {
        PlanOperation::UpdateAssetPath { id, old_path, new_path } => {
            let record = store
                .get(*id)?
                .ok_or_else(|| precondition(format!("record {} no longer exists", id)))?;
            if record.path == *new_path {
                return Ok(Outcome::Skipped(format!("record {} is already at {}", id, new_path)));
            }
            if record.path != *old_path {
                return Err(precondition(format!("record {} now points at {}", id, record.path)));
            }
            if let Some(holder) = store.find_by_path(new_path)? {
                return Err(precondition(format!("{} is held by record {}", new_path, holder.id)));
            }
            if !paths::is_staging_name(paths::file_name(new_path)) {
                require_file(root, mapper, new_path)?;
            }
            store.update_path(*id, new_path)?;
            Ok(Outcome::Applied)
        }
        PlanOperation::CreateAssetRecord { path, metadata } => {
            if let Some(existing) = store.find_by_path(path)? {
                return Ok(Outcome::Skipped(format!("{} is already tracked by record {}", path, existing.id)));
            }
            require_file(root, mapper, path)?;
            store.create(path, metadata)?;
            Ok(Outcome::Applied)
        }
        PlanOperation::DeleteAssetRecord { id, path } => {
            let Some(record) = store.get(*id)? else {
                return Ok(Outcome::Skipped(format!("record {} is already gone", id)));
            };
            if record.path != *path {
                return Err(precondition(format!("record {} now points at {}", id, record.path)));
            }
            if let Some(rel) = mapper.to_relative(path) {
                if paths::absolute(root, &rel).exists() {
                    return Err(precondition(format!("{} exists again", rel)));
                }
            }
            store.delete(*id)?;
            Ok(Outcome::Applied)
        }
        other => Err(precondition(format!("{} is not a store operation", other.kind()))),
    }
}

fn precondition(message: String) -> ExecutionError {
    ExecutionError::Precondition(message)
}

fn require_file(root: &Path, mapper: &PathMapper, store_path: &str) -> Result<(), ExecutionError> {
    let rel = mapper
        .to_relative(store_path)
        .ok_or_else(|| precondition(format!("{} is outside the content root", store_path)))?;
    if paths::absolute(root, &rel).is_file() {
        Ok(())
    } else {
        Err(precondition(format!("file {} does not exist", rel)))
    }
}

//! Filesystem side of execution. Every function re-checks its
//! preconditions against the disk before touching anything.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::Outcome;
use crate::classify::{classify_file, recode_to_jpeg, MediaFormat};
use crate::config::RecodeSettings;
use crate::error::{io_err, ExecutionError};
use crate::hasher::content_digest;
use crate::paths::{self, STAGING_PREFIX};
use crate::plan::PlanOperation;
use crate::platform;

pub(crate) fn apply(root: &Path, op: &PlanOperation, recode: &RecodeSettings) -> Result<Outcome, ExecutionError> {
    match op {
        PlanOperation::Delete {
            path,
            duplicate_of,
            digest,
        } => delete_duplicate(root, path, duplicate_of, digest),
        PlanOperation::Rename { from, to } | PlanOperation::Move { from, to } => relocate(root, from, to),
        PlanOperation::ConvertFormat {
            path,
            to_format,
            from_format,
            target,
        } => convert(root, path, *from_format, *to_format, target, recode),
        other => Err(ExecutionError::Precondition(format!(
            "{} is not a filesystem operation",
            other.kind()
        ))),
    }
}

fn precondition(message: String) -> ExecutionError {
    ExecutionError::Precondition(message)
}

fn delete_duplicate(root: &Path, path: &str, duplicate_of: &str, digest: &str) -> Result<Outcome, ExecutionError> {
    let doomed = paths::absolute(root, path);
    if !doomed.exists() {
        return Ok(Outcome::Skipped(format!("{} is already gone", path)));
    }
    let keeper = paths::absolute(root, duplicate_of);
    if !keeper.is_file() {
        return Err(precondition(format!("survivor {} is missing", duplicate_of)));
    }
    if platform::same_file(&doomed, &keeper) {
        return Err(precondition(format!("{} and {} are the same file", path, duplicate_of)));
    }

    let current = content_digest(&doomed).map_err(|e| io_err(&doomed, e))?;
    if current != digest {
        return Err(precondition(format!("{} changed since planning", path)));
    }
    let kept = content_digest(&keeper).map_err(|e| io_err(&keeper, e))?;
    if kept != digest {
        return Err(precondition(format!("survivor {} changed since planning", duplicate_of)));
    }

    fs::remove_file(&doomed).map_err(|e| io_err(&doomed, e))?;
    Ok(Outcome::Applied)
}

fn relocate(root: &Path, from: &str, to: &str) -> Result<Outcome, ExecutionError> {
    let source = paths::absolute(root, from);
    let destination = paths::absolute(root, to);

    if !source.exists() {
        if destination.exists() {
            return Ok(Outcome::Skipped(format!("{} is already at {}", from, to)));
        }
        return Err(precondition(format!("source {} is missing", from)));
    }

    if destination.exists() {
        if is_case_only(from, to) && platform::same_file(&source, &destination) {
            return rename_through_staging(&source, &destination);
        }
        return Err(precondition(format!("destination {} already exists", to)));
    }

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    fs::rename(&source, &destination).map_err(|e| io_err(&source, e))?;
    Ok(Outcome::Applied)
}

/// Case-insensitive filesystems treat `A.jpg -> a.jpg` as a no-op, so the
/// file takes a detour through a staging name.
fn rename_through_staging(source: &Path, destination: &Path) -> Result<Outcome, ExecutionError> {
    let staging = staging_sibling(destination, "case");
    fs::rename(source, &staging).map_err(|e| io_err(source, e))?;
    if let Err(e) = fs::rename(&staging, destination) {
        // Put the file back under its old name.
        let _ = fs::rename(&staging, source);
        return Err(io_err(destination, e));
    }
    debug!("Case-only rename via {}", staging.display());
    Ok(Outcome::Applied)
}

fn convert(
    root: &Path,
    path: &str,
    from_format: MediaFormat,
    to_format: MediaFormat,
    target: &str,
    recode: &RecodeSettings,
) -> Result<Outcome, ExecutionError> {
    let source = paths::absolute(root, path);
    let destination = paths::absolute(root, target);
    let in_place = path == target || (is_case_only(path, target) && platform::same_file(&source, &destination));

    if !source.exists() {
        if destination.exists() {
            return Ok(Outcome::Skipped(format!("{} is already converted", path)));
        }
        return Err(precondition(format!("source {} is missing", path)));
    }
    if !in_place && destination.exists() {
        return Err(precondition(format!("destination {} already exists", target)));
    }
    if to_format != MediaFormat::Jpeg {
        return Err(ExecutionError::Unsupported(to_format.to_string()));
    }
    let found = classify_file(&source).map_err(|e| precondition(format!("cannot classify {}: {}", path, e)))?;
    if found.actual_format != from_format {
        return Err(precondition(format!(
            "{} is now {}, planned as {}",
            path, found.actual_format, from_format
        )));
    }

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let staging = staging_sibling(&destination, "convert");
    if let Err(e) = recode_to_jpeg(&source, &staging, recode) {
        let _ = fs::remove_file(&staging);
        return Err(e);
    }
    if let Err(e) = fs::rename(&staging, &destination) {
        let _ = fs::remove_file(&staging);
        return Err(io_err(&destination, e));
    }
    if !in_place {
        fs::remove_file(&source).map_err(|e| io_err(&source, e))?;
    }
    Ok(Outcome::Applied)
}

fn is_case_only(a: &str, b: &str) -> bool {
    a != b && a.to_lowercase() == b.to_lowercase()
}

fn staging_sibling(path: &Path, purpose: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}{}-{}", STAGING_PREFIX, purpose, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::fixtures;
    use crate::hasher::digest_bytes;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, bytes: &[u8]) {
        let abs = paths::absolute(root, rel);
        fs::create_dir_all(abs.parent().unwrap()).unwrap();
        fs::write(abs, bytes).unwrap();
    }

    fn delete_op(path: &str, keeper: &str, bytes: &[u8]) -> PlanOperation {
        PlanOperation::Delete {
            path: path.to_string(),
            duplicate_of: keeper.to_string(),
            digest: digest_bytes(bytes),
        }
    }

    #[test]
    fn test_delete_requires_matching_digests() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a.jpg", b"same");
        write(dir.path(), "deep/a.jpg", b"same");
        let settings = RecodeSettings::default();

        let applied = apply(dir.path(), &delete_op("a.jpg", "deep/a.jpg", b"same"), &settings).unwrap();
        assert_eq!(applied, Outcome::Applied);
        assert!(!dir.path().join("a.jpg").exists());

        let again = apply(dir.path(), &delete_op("a.jpg", "deep/a.jpg", b"same"), &settings).unwrap();
        assert!(matches!(again, Outcome::Skipped(_)));

        write(dir.path(), "b.jpg", b"edited");
        write(dir.path(), "deep/b.jpg", b"original");
        let err = apply(dir.path(), &delete_op("b.jpg", "deep/b.jpg", b"original"), &settings).unwrap_err();
        assert!(matches!(err, ExecutionError::Precondition(_)));
        assert!(dir.path().join("b.jpg").exists());
    }

    #[test]
    fn test_move_creates_parent_and_refuses_overwrite() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a.jpg", b"a");
        write(dir.path(), "b.jpg", b"b");
        let settings = RecodeSettings::default();

        let op = PlanOperation::Move {
            from: "a.jpg".to_string(),
            to: "img/new/a.jpg".to_string(),
        };
        assert_eq!(apply(dir.path(), &op, &settings).unwrap(), Outcome::Applied);
        assert!(dir.path().join("img/new/a.jpg").is_file());
        assert!(matches!(apply(dir.path(), &op, &settings).unwrap(), Outcome::Skipped(_)));

        let clash = PlanOperation::Rename {
            from: "b.jpg".to_string(),
            to: "img/new/a.jpg".to_string(),
        };
        assert!(matches!(
            apply(dir.path(), &clash, &settings),
            Err(ExecutionError::Precondition(_))
        ));
        assert_eq!(fs::read(dir.path().join("img/new/a.jpg")).unwrap(), b"a");
    }

    #[test]
    fn test_case_only_rename() {
        let dir = tempdir().unwrap();
        write(dir.path(), "Poster.JPG", b"p");
        let op = PlanOperation::Rename {
            from: "Poster.JPG".to_string(),
            to: "poster.jpg".to_string(),
        };
        assert_eq!(apply(dir.path(), &op, &RecodeSettings::default()).unwrap(), Outcome::Applied);
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["poster.jpg".to_string()]);
    }

    #[test]
    fn test_convert_replaces_source() {
        let dir = tempdir().unwrap();
        write(dir.path(), "logo.png", &fixtures::opaque_png_bytes(4, 4));
        let op = PlanOperation::ConvertFormat {
            path: "logo.png".to_string(),
            from_format: MediaFormat::Png,
            to_format: MediaFormat::Jpeg,
            target: "logo.jpg".to_string(),
        };
        assert_eq!(apply(dir.path(), &op, &RecodeSettings::default()).unwrap(), Outcome::Applied);
        assert!(!dir.path().join("logo.png").exists());
        let converted = classify_file(&dir.path().join("logo.jpg")).unwrap();
        assert_eq!(converted.actual_format, MediaFormat::Jpeg);
        assert!(matches!(
            apply(dir.path(), &op, &RecodeSettings::default()).unwrap(),
            Outcome::Skipped(_)
        ));
    }

    #[test]
    fn test_convert_in_place_when_name_already_says_jpg() {
        let dir = tempdir().unwrap();
        write(dir.path(), "logo.jpg", &fixtures::opaque_png_bytes(4, 4));
        let op = PlanOperation::ConvertFormat {
            path: "logo.jpg".to_string(),
            from_format: MediaFormat::Png,
            to_format: MediaFormat::Jpeg,
            target: "logo.jpg".to_string(),
        };
        assert_eq!(apply(dir.path(), &op, &RecodeSettings::default()).unwrap(), Outcome::Applied);
        let converted = classify_file(&dir.path().join("logo.jpg")).unwrap();
        assert_eq!(converted.actual_format, MediaFormat::Jpeg);
    }

    #[test]
    fn test_convert_rejects_changed_source() {
        let dir = tempdir().unwrap();
        write(dir.path(), "logo.png", &fixtures::jpeg_bytes(4, 4, 1));
        let op = PlanOperation::ConvertFormat {
            path: "logo.png".to_string(),
            from_format: MediaFormat::Png,
            to_format: MediaFormat::Jpeg,
            target: "logo.jpg".to_string(),
        };
        assert!(matches!(
            apply(dir.path(), &op, &RecodeSettings::default()),
            Err(ExecutionError::Precondition(_))
        ));
        assert!(!dir.path().join("logo.jpg").exists());
    }
}

use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use super::order::{order_transfers, Step, Transfer};
use super::{FormatFailure, FormatSummary, Plan, PlanOperation, PlanStats, PlanningOutcome};
use crate::analysis::placement::{KeepInPlace, KeywordPlacement, PlacementStrategy};
use crate::analysis::{Candidate, ConflictResolver, RankedMatcher, StoreSynchronizer, SyncInput};
use crate::classify::{derive_metadata, Classification, MediaFormat};
use crate::config::AppConfig;
use crate::error::{ClassifyError, PlanningError};
use crate::normalize::normalize;
use crate::paths;
use crate::scanner::ScanOutcome;
use crate::storage::{AssetRecord, PathMapper};

/// Turns a scan, its classifications and the store's records into a plan.
/// Never touches the filesystem or the store beyond reading.
pub struct Planner {
    resolver: ConflictResolver,
    mapper: PathMapper,
    prune_orphans: bool,
    placeholder_size: u32,
    placement: Box<dyn PlacementStrategy>,
    matcher: RankedMatcher,
}

impl Planner {
    pub fn new(config: &AppConfig) -> Self {
        let placement: Box<dyn PlacementStrategy> = if config.keyword_rules.is_empty() {
            Box::new(KeepInPlace)
        } else {
            Box::new(KeywordPlacement::new(&config.keyword_rules))
        };
        Self {
            resolver: ConflictResolver::new(config.conflict_scope),
            mapper: PathMapper::new(&config.path_prefix),
            prune_orphans: config.prune_orphans,
            placeholder_size: config.placeholder_size,
            placement,
            matcher: RankedMatcher::default_chain(&config.keyword_rules),
        }
    }

    pub fn with_placement(mut self, placement: Box<dyn PlacementStrategy>) -> Self {
        self.placement = placement;
        self
    }

    pub fn with_matcher(mut self, matcher: RankedMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// `classifications` runs parallel to `scan.files`.
    pub fn plan(
        &self,
        scan: &ScanOutcome,
        classifications: &[Result<Classification, ClassifyError>],
        records: &[AssetRecord],
    ) -> PlanningOutcome {
        let root = scan.root.as_path();
        let mut errors = Vec::new();
        let mut formats = FormatSummary::default();
        let mut candidates = Vec::with_capacity(scan.files.len());
        let mut frozen = Vec::new();

        for (file, classification) in scan.files.iter().zip(classifications) {
            let classification = match classification {
                Ok(classification) => classification,
                Err(e) => {
                    warn!("Leaving {} in place: {}", file.current_path, e);
                    formats.failures.push(FormatFailure {
                        path: file.current_path.clone(),
                        error: e.clone(),
                    });
                    frozen.push(file.current_path.clone());
                    continue;
                }
            };
            formats.record(file, classification);

            let canonical = normalize(&file.base_name, classification.target_format());
            if canonical.is_empty() {
                warn!("Leaving {} in place: name normalizes to nothing", file.current_path);
                errors.push(PlanningError::EmptyName {
                    path: file.current_path.clone(),
                });
                frozen.push(file.current_path.clone());
                continue;
            }

            let target_directory = self
                .placement
                .destination(file, &canonical)
                .unwrap_or_else(|| file.directory.clone());
            candidates.push(Candidate {
                record: file,
                classification: *classification,
                canonical,
                target_directory,
            });
        }

        let resolution = self.resolver.resolve(root, &candidates, &frozen);
        errors.extend(resolution.errors.iter().cloned());

        let mut moves: BTreeMap<String, String> = BTreeMap::new();
        let mut sources: BTreeMap<String, String> = BTreeMap::new();
        for survivor in &resolution.survivors {
            let current = &candidates[survivor.index].record.current_path;
            moves.insert(current.clone(), survivor.final_path.clone());
            sources.insert(survivor.final_path.clone(), current.clone());
        }
        for path in &frozen {
            moves.insert(path.clone(), path.clone());
        }
        let redirects: BTreeMap<String, String> = resolution
            .duplicates
            .iter()
            .filter_map(|duplicate| {
                let final_path = resolution.final_path(duplicate.survivor)?;
                Some((
                    candidates[duplicate.index].record.current_path.clone(),
                    final_path.to_string(),
                ))
            })
            .collect();
        let frozen_set: BTreeSet<String> = frozen.iter().cloned().collect();

        let sync = StoreSynchronizer::new(&self.mapper, &self.matcher, self.prune_orphans).synchronize(&SyncInput {
            records,
            moves: &moves,
            redirects: &redirects,
            frozen: &frozen_set,
        });
        errors.extend(sync.errors.iter().cloned());

        let mut operations = Vec::new();

        for duplicate in &resolution.duplicates {
            operations.push(PlanOperation::Delete {
                path: candidates[duplicate.index].record.current_path.clone(),
                duplicate_of: candidates[duplicate.survivor].record.current_path.clone(),
                digest: duplicate.digest.clone(),
            });
        }

        let transfers: Vec<Transfer<Option<(MediaFormat, MediaFormat)>>> = resolution
            .survivors
            .iter()
            .filter_map(|survivor| {
                let candidate = &candidates[survivor.index];
                let classification = candidate.classification;
                let recode = classification.needs_recode();
                if candidate.record.current_path == survivor.final_path && !recode {
                    return None;
                }
                Some(Transfer {
                    from: candidate.record.current_path.clone(),
                    to: survivor.final_path.clone(),
                    payload: recode.then_some((classification.actual_format, classification.target_format())),
                })
            })
            .collect();
        for step in order_transfers(transfers, paths::staging_name) {
            operations.push(match step {
                Step::Stage { from, to, .. } => PlanOperation::Rename { from, to },
                Step::Transfer(Transfer {
                    from,
                    to,
                    payload: Some((from_format, to_format)),
                }) => PlanOperation::ConvertFormat {
                    path: from,
                    from_format,
                    to_format,
                    target: to,
                },
                Step::Transfer(Transfer { from, to, payload: None }) => relocation(from, to),
            });
        }

        let updates: Vec<Transfer<i64>> = sync
            .updates
            .iter()
            .map(|update| Transfer {
                from: update.old_path.clone(),
                to: update.new_path.clone(),
                payload: update.id,
            })
            .collect();
        for step in order_transfers(updates, paths::staging_name) {
            let (id, old_path, new_path) = match step {
                Step::Stage { from, to, payload } => (payload, from, to),
                Step::Transfer(Transfer { from, to, payload }) => (payload, from, to),
            };
            operations.push(PlanOperation::UpdateAssetPath { id, old_path, new_path });
        }

        // Metadata is derived from the file as it is now; recoding keeps
        // dimensions and the placeholder is rendered from the same pixels.
        let derived: Vec<(String, Result<_, ClassifyError>)> = sync
            .untracked
            .par_iter()
            .filter_map(|final_path| {
                let current = sources.get(final_path)?;
                let metadata = derive_metadata(&paths::absolute(root, current), self.placeholder_size);
                Some((final_path.clone(), metadata))
            })
            .collect();
        for (final_path, metadata) in derived {
            match metadata {
                Ok(metadata) => operations.push(PlanOperation::CreateAssetRecord {
                    path: self.mapper.to_store(&final_path),
                    metadata,
                }),
                Err(e) => {
                    warn!("Could not derive metadata for {}: {}", final_path, e);
                    errors.push(PlanningError::MetadataFailed {
                        path: final_path,
                        cause: e.to_string(),
                    });
                }
            }
        }

        if self.prune_orphans {
            let mut orphans = sync.orphans.clone();
            orphans.sort_by_key(|record| record.id);
            for orphan in orphans {
                operations.push(PlanOperation::DeleteAssetRecord {
                    id: orphan.id,
                    path: orphan.path,
                });
            }
        }

        let stats = PlanStats {
            files_scanned: scan.files.len(),
            total_bytes: scan.total_bytes(),
            records: records.len(),
            frozen: frozen.len(),
            duplicates: resolution.duplicates.len(),
        };
        debug!(
            "Planned {} candidates, {} frozen, {} conflict groups",
            candidates.len(),
            stats.frozen,
            resolution.groups.len()
        );
        info!(
            "Plan ready: {} operations, {} planning errors",
            operations.len(),
            errors.len()
        );

        PlanningOutcome {
            root: scan.root.clone(),
            plan: Plan {
                operations,
                conflict_groups: resolution.groups,
                errors,
            },
            formats,
            scan_issues: scan.issues.clone(),
            stats,
        }
    }
}

fn relocation(from: String, to: String) -> PlanOperation {
    if paths::parent(&from) == paths::parent(&to) {
        PlanOperation::Rename { from, to }
    } else {
        PlanOperation::Move { from, to }
    }
}

//! Brings asset records in line with where files will end up.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use super::matcher::{MatchOutcome, RankedMatcher, TargetIndex};
use crate::error::PlanningError;
use crate::storage::{AssetRecord, PathMapper};

/// Where every file ends up after the filesystem operations run.
pub struct SyncInput<'a> {
    pub records: &'a [AssetRecord],
    /// Current path to final path of every surviving file, frozen files
    /// included as identity entries.
    pub moves: &'a BTreeMap<String, String>,
    /// Deleted duplicate to the final path of the file it duplicates.
    pub redirects: &'a BTreeMap<String, String>,
    /// Files staying untouched; never reported as untracked.
    pub frozen: &'a BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateReason {
    Followed,
    Deduplicated,
    Matched(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathUpdate {
    pub id: i64,
    /// Store paths, exactly as stored and as they will be stored.
    pub old_path: String,
    pub new_path: String,
    pub reason: UpdateReason,
}

#[derive(Debug, Default)]
pub struct SyncOutcome {
    pub present: Vec<i64>,
    pub updates: Vec<PathUpdate>,
    /// Records with no file and no match. Only acted on when pruning.
    pub orphans: Vec<AssetRecord>,
    /// Final relative paths with no record.
    pub untracked: Vec<String>,
    pub errors: Vec<PlanningError>,
}

enum Fate {
    Present(String),
    Follow(String, UpdateReason),
    Missing(String),
}

pub struct StoreSynchronizer<'a> {
    mapper: &'a PathMapper,
    matcher: &'a RankedMatcher,
    prune_orphans: bool,
}

impl<'a> StoreSynchronizer<'a> {
    pub fn new(mapper: &'a PathMapper, matcher: &'a RankedMatcher, prune_orphans: bool) -> Self {
        Self {
            mapper,
            matcher,
            prune_orphans,
        }
    }

    pub fn synchronize(&self, input: &SyncInput<'_>) -> SyncOutcome {
        let mut records: Vec<&AssetRecord> = input.records.iter().collect();
        records.sort_by(|a, b| a.path.cmp(&b.path).then(a.id.cmp(&b.id)));

        let finals: BTreeSet<&String> = input.moves.values().collect();
        let mut outcome = SyncOutcome::default();
        let mut fates = Vec::with_capacity(records.len());
        for record in records {
            let Some(rel) = self.mapper.to_relative(&record.path) else {
                warn!("Record {} path {} is outside the content root", record.id, record.path);
                outcome.errors.push(PlanningError::OutsideRoot {
                    id: record.id,
                    path: record.path.clone(),
                });
                continue;
            };
            let fate = if let Some(final_path) = input.moves.get(&rel) {
                if *final_path == rel {
                    Fate::Present(rel)
                } else {
                    Fate::Follow(final_path.clone(), UpdateReason::Followed)
                }
            } else if let Some(final_path) = input.redirects.get(&rel) {
                Fate::Follow(final_path.clone(), UpdateReason::Deduplicated)
            } else if finals.contains(&rel) {
                // Another file is renamed onto the path this record already holds.
                Fate::Present(rel)
            } else {
                Fate::Missing(rel)
            };
            fates.push((record, fate));
        }

        // Claims are settled strictest first, one pass per kind, fuzzy
        // matches last.
        let mut claimed: BTreeMap<String, i64> = BTreeMap::new();
        for (record, fate) in &fates {
            if let Fate::Present(rel) = fate {
                claimed.insert(rel.clone(), record.id);
                outcome.present.push(record.id);
            }
        }
        for pass in [UpdateReason::Followed, UpdateReason::Deduplicated] {
            for (record, fate) in &fates {
                if let Fate::Follow(final_path, reason) = fate {
                    if *reason == pass {
                        self.claim(record, final_path, pass.clone(), &mut claimed, &mut outcome);
                    }
                }
            }
        }

        let mut index = TargetIndex::new(
            input
                .moves
                .values()
                .filter(|path| !claimed.contains_key(*path))
                .cloned(),
        );
        for (record, fate) in &fates {
            let Fate::Missing(rel) = fate else {
                continue;
            };
            match self.matcher.resolve(rel, &index) {
                MatchOutcome::Found { path, .. } if path == *rel => {
                    index.remove(&path);
                    claimed.insert(path, record.id);
                    outcome.present.push(record.id);
                }
                MatchOutcome::Found { path, matcher } => {
                    index.remove(&path);
                    self.claim(record, &path, UpdateReason::Matched(matcher), &mut claimed, &mut outcome);
                }
                MatchOutcome::Ambiguous { matcher, candidates } => {
                    warn!(
                        "Record {} ({}) matches {} files by {}",
                        record.id,
                        record.path,
                        candidates.len(),
                        matcher
                    );
                    outcome.errors.push(PlanningError::AmbiguousReference {
                        id: record.id,
                        path: record.path.clone(),
                        matcher: matcher.to_string(),
                        candidates,
                    });
                }
                MatchOutcome::NotFound => {
                    if !self.prune_orphans {
                        outcome.errors.push(PlanningError::MissingReference {
                            id: record.id,
                            path: record.path.clone(),
                        });
                    }
                    outcome.orphans.push((*record).clone());
                }
            }
        }

        outcome.untracked = input
            .moves
            .iter()
            .filter(|(current, final_path)| !input.frozen.contains(*current) && !claimed.contains_key(*final_path))
            .map(|(_, final_path)| final_path.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        outcome.present.sort_unstable();

        debug!(
            "Store sync: {} present, {} updates, {} orphans, {} untracked, {} errors",
            outcome.present.len(),
            outcome.updates.len(),
            outcome.orphans.len(),
            outcome.untracked.len(),
            outcome.errors.len()
        );
        outcome
    }

    fn claim(
        &self,
        record: &AssetRecord,
        final_path: &str,
        reason: UpdateReason,
        claimed: &mut BTreeMap<String, i64>,
        outcome: &mut SyncOutcome,
    ) {
        if let Some(&holder) = claimed.get(final_path) {
            warn!(
                "Record {} would move to {}, already held by record {}",
                record.id, final_path, holder
            );
            outcome.errors.push(PlanningError::DuplicateReference {
                id: record.id,
                path: record.path.clone(),
                target: self.mapper.to_store(final_path),
                holder,
            });
            return;
        }
        claimed.insert(final_path.to_string(), record.id);
        outcome.updates.push(PathUpdate {
            id: record.id,
            old_path: record.path.clone(),
            new_path: self.mapper.to_store(final_path),
            reason,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, path: &str) -> AssetRecord {
        AssetRecord {
            id,
            path: path.to_string(),
            metadata: None,
        }
    }

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(a, b)| (a.to_string(), b.to_string())).collect()
    }

    fn run(
        records: &[AssetRecord],
        moves: &BTreeMap<String, String>,
        redirects: &BTreeMap<String, String>,
        prune: bool,
    ) -> SyncOutcome {
        let mapper = PathMapper::default();
        let matcher = RankedMatcher::default_chain(&[]);
        let frozen = BTreeSet::new();
        StoreSynchronizer::new(&mapper, &matcher, prune).synchronize(&SyncInput {
            records,
            moves,
            redirects,
            frozen: &frozen,
        })
    }

    #[test]
    fn test_present_followed_and_untracked() {
        let moves = map(&[
            ("img/a.jpg", "img/a.jpg"),
            ("img/poster.png", "img/poster.jpg"),
            ("img/new.jpg", "img/new.jpg"),
        ]);
        let records = vec![record(1, "/img/a.jpg"), record(2, "/img/poster.png")];
        let outcome = run(&records, &moves, &BTreeMap::new(), false);

        assert_eq!(outcome.present, vec![1]);
        assert_eq!(outcome.updates.len(), 1);
        assert_eq!(outcome.updates[0].old_path, "/img/poster.png");
        assert_eq!(outcome.updates[0].new_path, "/img/poster.jpg");
        assert_eq!(outcome.untracked, vec!["img/new.jpg".to_string()]);
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn test_duplicate_redirect_and_collision() {
        let moves = map(&[("a/deep/cafe.jpg", "a/deep/cafe.jpg")]);
        let redirects = map(&[("cafe.jpg", "a/deep/cafe.jpg")]);
        let records = vec![record(1, "/a/deep/cafe.jpg"), record(2, "/cafe.jpg")];
        let outcome = run(&records, &moves, &redirects, false);

        assert_eq!(outcome.present, vec![1]);
        assert!(outcome.updates.is_empty());
        assert_eq!(
            outcome.errors,
            vec![PlanningError::DuplicateReference {
                id: 2,
                path: "/cafe.jpg".to_string(),
                target: "/a/deep/cafe.jpg".to_string(),
                holder: 1,
            }]
        );
    }

    #[test]
    fn test_survivor_record_wins_over_duplicate_record() {
        // The duplicate's record sorts first by path but must not take the
        // survivor's final path from the survivor's own record.
        let moves = map(&[("img/uploads/Café Final.JPG", "img/uploads/cafe-final.jpg")]);
        let redirects = map(&[("img/cafe-final.jpg", "img/uploads/cafe-final.jpg")]);
        let records = vec![record(1, "/img/cafe-final.jpg"), record(2, "/img/uploads/Café Final.JPG")];
        let outcome = run(&records, &moves, &redirects, false);

        assert_eq!(
            outcome.updates,
            vec![PathUpdate {
                id: 2,
                old_path: "/img/uploads/Café Final.JPG".to_string(),
                new_path: "/img/uploads/cafe-final.jpg".to_string(),
                reason: UpdateReason::Followed,
            }]
        );
        assert_eq!(
            outcome.errors,
            vec![PlanningError::DuplicateReference {
                id: 1,
                path: "/img/cafe-final.jpg".to_string(),
                target: "/img/uploads/cafe-final.jpg".to_string(),
                holder: 2,
            }]
        );
    }

    #[test]
    fn test_missing_record_is_matched_or_reported() {
        let moves = map(&[("img/new/name.jpg", "img/new/name.jpg")]);
        let records = vec![record(1, "/img/old/name.jpg"), record(2, "/img/gone.jpg")];
        let outcome = run(&records, &moves, &BTreeMap::new(), false);

        assert_eq!(outcome.updates.len(), 1);
        assert_eq!(outcome.updates[0].reason, UpdateReason::Matched("relocated"));
        assert_eq!(outcome.updates[0].new_path, "/img/new/name.jpg");
        assert!(outcome.untracked.is_empty());
        assert_eq!(
            outcome.errors,
            vec![PlanningError::MissingReference {
                id: 2,
                path: "/img/gone.jpg".to_string()
            }]
        );
        assert_eq!(outcome.orphans.len(), 1);
    }

    #[test]
    fn test_prune_turns_missing_into_orphans_without_error() {
        let records = vec![record(7, "/img/gone.jpg")];
        let outcome = run(&records, &BTreeMap::new(), &BTreeMap::new(), true);
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.orphans[0].id, 7);
    }

    #[test]
    fn test_outside_root() {
        let records = vec![record(3, "https://cdn.example/x.jpg")];
        let outcome = run(&records, &BTreeMap::new(), &BTreeMap::new(), false);
        assert!(matches!(outcome.errors[0], PlanningError::OutsideRoot { id: 3, .. }));
    }

    #[test]
    fn test_record_already_at_final_path_of_renamed_file() {
        let moves = map(&[("img/Poster.JPG", "img/poster.jpg")]);
        let records = vec![record(1, "/img/poster.jpg")];
        let outcome = run(&records, &moves, &BTreeMap::new(), false);
        assert_eq!(outcome.present, vec![1]);
        assert!(outcome.updates.is_empty());
        assert!(outcome.untracked.is_empty());
    }

    #[test]
    fn test_follower_never_lands_on_a_held_path() {
        // The file Poster.JPG becomes poster.jpg while record 2 already
        // holds /img/poster.jpg.
        let moves = map(&[("img/Poster.JPG", "img/poster.jpg")]);
        let records = vec![record(1, "/img/Poster.JPG"), record(2, "/img/poster.jpg")];
        let outcome = run(&records, &moves, &BTreeMap::new(), true);

        assert_eq!(outcome.present, vec![2]);
        assert!(outcome.updates.is_empty());
        assert!(outcome.orphans.is_empty());
        assert!(outcome.untracked.is_empty());
        assert_eq!(
            outcome.errors,
            vec![PlanningError::DuplicateReference {
                id: 1,
                path: "/img/Poster.JPG".to_string(),
                target: "/img/poster.jpg".to_string(),
                holder: 2,
            }]
        );
    }
}

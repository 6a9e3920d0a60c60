//! Resolves canonical-name collisions.
//!
//! Candidates sharing a key are split into content classes by digest. Each
//! class keeps one representative; the rest are byte-identical duplicates and
//! get deleted. Representatives of different classes are numbered `-2`, `-3`,
//! ... skipping every key some other group or frozen file lays claim to.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, warn};

use super::Candidate;
use crate::config::ConflictScope;
use crate::error::PlanningError;
use crate::paths;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictGroup {
    pub target_path: String,
    /// Sorted by `path`.
    pub members: Vec<ConflictMember>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictMember {
    pub path: String,
    pub size_bytes: u64,
    pub digest: Option<String>,
    pub disposition: Disposition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Disposition {
    Keep { final_path: String },
    Delete { duplicate_of: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Survivor {
    /// Index into the candidate slice.
    pub index: usize,
    pub final_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Duplicate {
    pub index: usize,
    /// Candidate index of the representative that stays.
    pub survivor: usize,
    pub digest: String,
}

#[derive(Debug, Default)]
pub struct Resolution {
    /// Sorted by candidate index.
    pub survivors: Vec<Survivor>,
    /// Sorted by candidate index.
    pub duplicates: Vec<Duplicate>,
    /// Sorted by `target_path`.
    pub groups: Vec<ConflictGroup>,
    pub errors: Vec<PlanningError>,
}

impl Resolution {
    pub fn final_path(&self, index: usize) -> Option<&str> {
        self.survivors
            .binary_search_by_key(&index, |s| s.index)
            .ok()
            .map(|pos| self.survivors[pos].final_path.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConflictResolver {
    scope: ConflictScope,
}

impl ConflictResolver {
    pub fn new(scope: ConflictScope) -> Self {
        Self { scope }
    }

    /// Comparison key for the `n`th numbered variant of a candidate's name.
    fn key(&self, candidate: &Candidate<'_>, n: usize) -> String {
        let name = candidate.canonical.numbered(n).file_name();
        match self.scope {
            ConflictScope::Tree => name.to_lowercase(),
            ConflictScope::Directory => paths::join(&candidate.target_directory, &name).to_lowercase(),
        }
    }

    fn frozen_key(&self, path: &str) -> String {
        match self.scope {
            ConflictScope::Tree => paths::file_name(path).to_lowercase(),
            ConflictScope::Directory => path.to_lowercase(),
        }
    }

    /// `frozen` lists current paths of files that stay untouched but still
    /// occupy their name.
    pub fn resolve(&self, root: &Path, candidates: &[Candidate<'_>], frozen: &[String]) -> Resolution {
        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (index, candidate) in candidates.iter().enumerate() {
            groups.entry(self.key(candidate, 1)).or_default().push(index);
        }

        // Hash every contested file up front, in parallel. Uncontested files
        // are never read.
        let contested: Vec<usize> = groups
            .values()
            .filter(|members| members.len() > 1)
            .flatten()
            .copied()
            .collect();
        debug!("Hashing {} contested files", contested.len());
        contested.par_iter().for_each(|&index| {
            let _ = candidates[index].record.content_digest(root);
        });

        let frozen_keys: HashSet<String> = frozen.iter().map(|p| self.frozen_key(p)).collect();
        let reserved: HashSet<String> = groups.keys().cloned().collect();
        let mut taken: HashSet<String> = HashSet::new();
        let mut resolution = Resolution::default();

        for members in groups.values() {
            let classes = self.partition(root, candidates, members, &mut resolution.errors);
            let mut dispositions: Vec<(usize, Disposition)> = Vec::with_capacity(members.len());

            for class in &classes {
                let representative = class[0];
                let candidate = &candidates[representative];
                let mut n = 1;
                loop {
                    let key = self.key(candidate, n);
                    let blocked =
                        frozen_keys.contains(&key) || taken.contains(&key) || (n > 1 && reserved.contains(&key));
                    if !blocked {
                        taken.insert(key);
                        break;
                    }
                    n += 1;
                }

                let final_path = paths::join(
                    &candidate.target_directory,
                    &candidate.canonical.numbered(n).file_name(),
                );
                resolution.survivors.push(Survivor {
                    index: representative,
                    final_path: final_path.clone(),
                });
                dispositions.push((representative, Disposition::Keep { final_path }));

                for &duplicate in &class[1..] {
                    // Classes of more than one member only form from digests.
                    let Some(digest) = candidates[duplicate].record.cached_digest() else {
                        continue;
                    };
                    resolution.duplicates.push(Duplicate {
                        index: duplicate,
                        survivor: representative,
                        digest: digest.to_string(),
                    });
                    dispositions.push((
                        duplicate,
                        Disposition::Delete {
                            duplicate_of: candidate.record.current_path.clone(),
                        },
                    ));
                }
            }

            if members.len() > 1 {
                resolution.groups.push(self.describe_group(candidates, members, dispositions));
            }
        }

        resolution.survivors.sort_by_key(|s| s.index);
        resolution.duplicates.sort_by_key(|d| d.index);
        resolution.groups.sort_by(|a, b| a.target_path.cmp(&b.target_path));
        resolution
    }

    /// Splits one key group into content classes, each ordered with its
    /// representative first, the classes themselves ordered for numbering.
    fn partition(
        &self,
        root: &Path,
        candidates: &[Candidate<'_>],
        members: &[usize],
        errors: &mut Vec<PlanningError>,
    ) -> Vec<Vec<usize>> {
        if members.len() == 1 {
            return vec![members.to_vec()];
        }

        let mut by_digest: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut classes = Vec::new();
        for &index in members {
            let record = candidates[index].record;
            match record.content_digest(root) {
                Ok(digest) => by_digest.entry(digest.to_string()).or_default().push(index),
                Err(e) => {
                    warn!("Could not digest {}: {}", record.current_path, e);
                    errors.push(PlanningError::DigestFailed {
                        path: record.current_path.clone(),
                        cause: e.to_string(),
                    });
                    classes.push(vec![index]);
                }
            }
        }
        classes.extend(by_digest.into_values());

        for class in &mut classes {
            class.sort_by(|&a, &b| precedence(&candidates[a], &candidates[b]));
        }
        classes.sort_by(|a, b| {
            let (left, right) = (&candidates[a[0]], &candidates[b[0]]);
            right
                .is_at_base_target()
                .cmp(&left.is_at_base_target())
                .then_with(|| left.record.current_path.cmp(&right.record.current_path))
        });
        classes
    }

    fn describe_group(
        &self,
        candidates: &[Candidate<'_>],
        members: &[usize],
        dispositions: Vec<(usize, Disposition)>,
    ) -> ConflictGroup {
        let first = &candidates[members[0]];
        let target_path = match self.scope {
            ConflictScope::Tree => first.canonical.file_name(),
            ConflictScope::Directory => first.base_target(),
        };
        let mut members: Vec<ConflictMember> = dispositions
            .into_iter()
            .map(|(index, disposition)| {
                let record = candidates[index].record;
                ConflictMember {
                    path: record.current_path.clone(),
                    size_bytes: record.size_bytes,
                    digest: record.cached_digest().map(str::to_string),
                    disposition,
                }
            })
            .collect();
        members.sort_by(|a, b| a.path.cmp(&b.path));
        ConflictGroup { target_path, members }
    }
}

/// Which member of a content class stays: deepest directory, then a file
/// already carrying the canonical name, then path order.
fn precedence(a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
    b.record
        .depth()
        .cmp(&a.record.depth())
        .then_with(|| b.is_at_base_target().cmp(&a.is_at_base_target()))
        .then_with(|| a.record.current_path.cmp(&b.record.current_path))
}

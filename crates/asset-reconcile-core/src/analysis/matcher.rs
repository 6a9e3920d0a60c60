//! Re-homing of store references whose file is gone.
//!
//! A [`RankedMatcher`] asks each [`PathMatcher`] in turn. The first matcher
//! with exactly one candidate wins; a matcher with several candidates stops
//! the search as ambiguous.

use std::collections::BTreeSet;
use tracing::trace;

use super::placement::KeywordPlacement;
use crate::classify::MediaFormat;
use crate::config::KeywordRule;
use crate::normalize::normalize_stem;
use crate::paths;

/// Final paths not yet claimed by any record.
#[derive(Debug, Clone, Default)]
pub struct TargetIndex {
    paths: BTreeSet<String>,
}

impl TargetIndex {
    pub fn new<I: IntoIterator<Item = String>>(paths: I) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn remove(&mut self, path: &str) -> bool {
        self.paths.remove(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Found { path: String, matcher: &'static str },
    Ambiguous { matcher: &'static str, candidates: Vec<String> },
    NotFound,
}

pub trait PathMatcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Every indexed path this matcher accepts for `wanted`, in index order.
    fn candidates(&self, wanted: &str, index: &TargetIndex) -> Vec<String>;
}

/// Pieces of a relative path the matchers compare on.
struct Parts<'a> {
    directory: &'a str,
    file_name: &'a str,
    stem: &'a str,
    family: Option<MediaFormat>,
}

impl<'a> Parts<'a> {
    fn of(path: &'a str) -> Self {
        let file_name = paths::file_name(path);
        let (stem, extension) = paths::split_name(file_name);
        Self {
            directory: paths::parent(path),
            file_name,
            stem,
            family: MediaFormat::from_extension(extension),
        }
    }

    fn same_directory(&self, other: &Parts<'_>) -> bool {
        self.directory.eq_ignore_ascii_case(other.directory)
    }

    fn same_family(&self, other: &Parts<'_>) -> bool {
        self.family.is_some() && self.family == other.family
    }

    fn canonical_stem(&self) -> String {
        normalize_stem(self.stem)
    }
}

fn select<F>(index: &TargetIndex, mut accept: F) -> Vec<String>
where
    F: FnMut(&Parts<'_>) -> bool,
{
    index
        .iter()
        .filter(|path| accept(&Parts::of(path)))
        .map(str::to_string)
        .collect()
}

/// The same path. Listed first so a record pointing at a final path is
/// recognised as present.
pub struct Exact;

impl PathMatcher for Exact {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn candidates(&self, wanted: &str, index: &TargetIndex) -> Vec<String> {
        if index.contains(wanted) {
            vec![wanted.to_string()]
        } else {
            Vec::new()
        }
    }
}

pub struct CaseInsensitive;

impl PathMatcher for CaseInsensitive {
    fn name(&self) -> &'static str {
        "case_insensitive"
    }

    fn candidates(&self, wanted: &str, index: &TargetIndex) -> Vec<String> {
        let wanted = wanted.to_lowercase();
        index
            .iter()
            .filter(|path| path.to_lowercase() == wanted)
            .map(str::to_string)
            .collect()
    }
}

/// Same directory and stem, extension spelled differently within one family
/// (`jpg`/`jpeg`/`jpe`/`jfif`, `tif`/`tiff`).
pub struct ExtensionFamily;

impl PathMatcher for ExtensionFamily {
    fn name(&self) -> &'static str {
        "extension_family"
    }

    fn candidates(&self, wanted: &str, index: &TargetIndex) -> Vec<String> {
        let want = Parts::of(wanted);
        select(index, |found| {
            found.same_directory(&want) && found.stem.eq_ignore_ascii_case(want.stem) && found.same_family(&want)
        })
    }
}

/// A numbered variant of the wanted stem, as conflict resolution produces.
pub struct NumericSuffix;

impl PathMatcher for NumericSuffix {
    fn name(&self) -> &'static str {
        "numeric_suffix"
    }

    fn candidates(&self, wanted: &str, index: &TargetIndex) -> Vec<String> {
        let want = Parts::of(wanted);
        let bases = [want.stem.to_lowercase(), want.canonical_stem()];
        select(index, |found| {
            if !found.same_directory(&want) || !found.same_family(&want) {
                return false;
            }
            let stem = found.stem.to_lowercase();
            bases.iter().filter(|base| !base.is_empty()).any(|base| {
                stem.strip_prefix(base.as_str())
                    .and_then(|rest| rest.strip_prefix('-'))
                    .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
            })
        })
    }
}

/// Same directory, same name once normalized.
pub struct CanonicalName;

impl PathMatcher for CanonicalName {
    fn name(&self) -> &'static str {
        "canonical_name"
    }

    fn candidates(&self, wanted: &str, index: &TargetIndex) -> Vec<String> {
        let want = Parts::of(wanted);
        let stem = want.canonical_stem();
        if stem.is_empty() {
            return Vec::new();
        }
        select(index, |found| {
            found.same_directory(&want) && found.same_family(&want) && found.stem == stem
        })
    }
}

/// A file moved to another directory with its name intact, or only
/// normalized.
pub struct Relocated;

impl PathMatcher for Relocated {
    fn name(&self) -> &'static str {
        "relocated"
    }

    fn candidates(&self, wanted: &str, index: &TargetIndex) -> Vec<String> {
        let want = Parts::of(wanted);
        let stem = want.canonical_stem();
        select(index, |found| {
            found.file_name.eq_ignore_ascii_case(want.file_name)
                || (!stem.is_empty() && found.stem == stem && found.same_family(&want))
        })
    }
}

/// A file routed by a keyword rule: the canonical name inside the rule's
/// directory.
pub struct Keyword {
    placement: KeywordPlacement,
}

impl Keyword {
    pub fn new(rules: &[KeywordRule]) -> Self {
        Self {
            placement: KeywordPlacement::new(rules),
        }
    }
}

impl PathMatcher for Keyword {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn candidates(&self, wanted: &str, index: &TargetIndex) -> Vec<String> {
        let want = Parts::of(wanted);
        let stem = want.canonical_stem();
        let Some(directory) = self.placement.rule_for(&stem) else {
            return Vec::new();
        };
        select(index, |found| {
            found.directory.eq_ignore_ascii_case(directory) && found.stem == stem && found.same_family(&want)
        })
    }
}

pub struct RankedMatcher {
    matchers: Vec<Box<dyn PathMatcher>>,
}

impl RankedMatcher {
    pub fn new(matchers: Vec<Box<dyn PathMatcher>>) -> Self {
        Self { matchers }
    }

    /// Chain used by the planner, from strictest to loosest.
    pub fn default_chain(rules: &[KeywordRule]) -> Self {
        let mut matchers: Vec<Box<dyn PathMatcher>> = vec![
            Box::new(Exact),
            Box::new(CaseInsensitive),
            Box::new(ExtensionFamily),
            Box::new(NumericSuffix),
            Box::new(CanonicalName),
            Box::new(Relocated),
        ];
        if !rules.is_empty() {
            matchers.push(Box::new(Keyword::new(rules)));
        }
        Self::new(matchers)
    }

    pub fn resolve(&self, wanted: &str, index: &TargetIndex) -> MatchOutcome {
        for matcher in &self.matchers {
            let mut candidates = matcher.candidates(wanted, index);
            match candidates.len() {
                0 => continue,
                1 => {
                    let path = candidates.remove(0);
                    trace!("{} matched {} by {}", wanted, path, matcher.name());
                    return MatchOutcome::Found {
                        path,
                        matcher: matcher.name(),
                    };
                }
                _ => {
                    return MatchOutcome::Ambiguous {
                        matcher: matcher.name(),
                        candidates,
                    }
                }
            }
        }
        MatchOutcome::NotFound
    }
}

pub mod conflict;
pub mod matcher;
pub mod placement;
pub mod store_sync;

use crate::classify::Classification;
use crate::normalize::CanonicalName;
use crate::paths;
use crate::scanner::FileRecord;

pub use conflict::{ConflictGroup, ConflictMember, ConflictResolver, Disposition, Resolution};
pub use matcher::{MatchOutcome, PathMatcher, RankedMatcher, TargetIndex};
pub use placement::{KeepInPlace, KeywordPlacement, PlacementStrategy};
pub use store_sync::{StoreSynchronizer, SyncInput, SyncOutcome};

/// A classified, normalizable file on its way to a final path.
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub record: &'a FileRecord,
    pub classification: Classification,
    pub canonical: CanonicalName,
    pub target_directory: String,
}

impl Candidate<'_> {
    /// Final path if the canonical name needs no disambiguation.
    pub fn base_target(&self) -> String {
        paths::join(&self.target_directory, &self.canonical.file_name())
    }

    pub fn is_at_base_target(&self) -> bool {
        self.record.current_path == self.base_target()
    }
}

//! Where a file should live. The default leaves every file in its directory.

use crate::config::KeywordRule;
use crate::normalize::{normalize_stem, CanonicalName, SEPARATOR};
use crate::scanner::FileRecord;

pub trait PlacementStrategy: Send + Sync {
    /// Destination directory, or `None` to stay put.
    fn destination(&self, record: &FileRecord, canonical: &CanonicalName) -> Option<String>;
}

pub struct KeepInPlace;

impl PlacementStrategy for KeepInPlace {
    fn destination(&self, _record: &FileRecord, _canonical: &CanonicalName) -> Option<String> {
        None
    }
}

/// Ranked keyword rules; the first rule whose keyword appears as a whole
/// token sequence in the canonical stem wins.
#[derive(Debug, Clone, Default)]
pub struct KeywordPlacement {
    rules: Vec<(String, String)>,
}

impl KeywordPlacement {
    pub fn new(rules: &[KeywordRule]) -> Self {
        let rules = rules
            .iter()
            .filter_map(|rule| {
                let keyword = normalize_stem(&rule.keyword);
                let directory = rule.directory.trim_matches('/').to_string();
                if keyword.is_empty() {
                    None
                } else {
                    Some((keyword, directory))
                }
            })
            .collect();
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Directory of the first rule matching a canonical stem.
    pub fn rule_for(&self, stem: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|(keyword, _)| contains_tokens(stem, keyword))
            .map(|(_, directory)| directory.as_str())
    }
}

impl PlacementStrategy for KeywordPlacement {
    fn destination(&self, record: &FileRecord, canonical: &CanonicalName) -> Option<String> {
        let directory = self.rule_for(&canonical.stem)?;
        let already_inside = record.directory == directory
            || record
                .directory
                .strip_prefix(directory)
                .is_some_and(|rest| rest.starts_with('/'))
            || directory.is_empty() && record.directory.is_empty();
        if already_inside {
            None
        } else {
            Some(directory.to_string())
        }
    }
}

fn contains_tokens(stem: &str, keyword: &str) -> bool {
    let tokens: Vec<&str> = stem.split(SEPARATOR).collect();
    let wanted: Vec<&str> = keyword.split(SEPARATOR).collect();
    tokens.windows(wanted.len()).any(|w| w == wanted.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::MediaFormat;
    use crate::normalize::normalize;

    fn rules() -> KeywordPlacement {
        KeywordPlacement::new(&[
            KeywordRule {
                keyword: "Portrait".to_string(),
                directory: "/img/composers/".to_string(),
            },
            KeywordRule {
                keyword: "cover art".to_string(),
                directory: "img/covers".to_string(),
            },
        ])
    }

    #[test]
    fn test_keyword_must_be_whole_token() {
        let placement = rules();
        assert_eq!(placement.rule_for("bach-portrait"), Some("img/composers"));
        assert_eq!(placement.rule_for("portraits-of-bach"), None);
        assert_eq!(placement.rule_for("album-cover-art-2"), Some("img/covers"));
        assert_eq!(placement.rule_for("cover"), None);
    }

    #[test]
    fn test_destination_skips_files_already_inside() {
        let placement = rules();
        let outside = FileRecord::new("uploads/Bach Portrait.jpg", 1);
        let inside = FileRecord::new("img/composers/old/bach portrait.jpg", 1);
        let name = normalize("Bach Portrait", MediaFormat::Jpeg);

        assert_eq!(placement.destination(&outside, &name).as_deref(), Some("img/composers"));
        assert_eq!(placement.destination(&inside, &name), None);
        assert_eq!(KeepInPlace.destination(&outside, &name), None);
    }

    #[test]
    fn test_prefix_directory_is_not_inside() {
        let placement = rules();
        let sibling = FileRecord::new("img/composers-old/bach-portrait.jpg", 1);
        let name = normalize("bach-portrait", MediaFormat::Jpeg);
        assert_eq!(placement.destination(&sibling, &name).as_deref(), Some("img/composers"));
    }
}

//! Canonical file names.
//!
//! Pipeline for the stem, in order:
//! 1. Transliterate to ASCII, dropping diacritics (deunicode)
//! 2. Lowercase
//! 3. Runs of whitespace, `_`, `'` or `.` become one separator
//! 4. Everything outside `[a-z0-9-]` is dropped
//! 5. Separator runs collapse, leading and trailing separators are trimmed
//!
//! The extension comes from the detected format, never from the old name.

use deunicode::deunicode;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::classify::MediaFormat;

pub const SEPARATOR: char = '-';

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CanonicalName {
    pub stem: String,
    pub extension: String,
}

impl CanonicalName {
    /// An empty stem is a valid output; callers must reject it.
    pub fn is_empty(&self) -> bool {
        self.stem.is_empty()
    }

    /// `stem-n.ext` for n ≥ 2, the plain name for n ≤ 1.
    pub fn numbered(&self, n: usize) -> CanonicalName {
        if n <= 1 {
            return self.clone();
        }
        CanonicalName {
            stem: format!("{}{}{}", self.stem, SEPARATOR, n),
            extension: self.extension.clone(),
        }
    }

    pub fn file_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CanonicalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.stem, self.extension)
    }
}

pub fn normalize(base_name: &str, detected_format: MediaFormat) -> CanonicalName {
    CanonicalName {
        stem: normalize_stem(base_name),
        extension: detected_format.canonical_extension().to_string(),
    }
}

pub fn normalize_stem(raw: &str) -> String {
    let latin = deunicode(raw).to_lowercase();

    let mut out = String::with_capacity(latin.len());
    for c in latin.chars() {
        let mapped = if c.is_whitespace() || matches!(c, '_' | '\'' | '.') {
            SEPARATOR
        } else if c.is_ascii_lowercase() || c.is_ascii_digit() || c == SEPARATOR {
            c
        } else {
            continue;
        };
        if mapped == SEPARATOR && out.ends_with(SEPARATOR) {
            continue;
        }
        out.push(mapped);
    }

    out.trim_matches(SEPARATOR).to_string()
}

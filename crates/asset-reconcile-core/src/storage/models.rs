use serde::{Deserialize, Serialize};

/// Metadata the engine derives for records it creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetadata {
    pub width: u32,
    pub height: u32,
    pub aspect_ratio: f64,
    /// Low-resolution placeholder as a `data:` URI.
    pub placeholder: String,
}

/// A path-keyed record owned by the surrounding application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: i64,
    pub path: String,
    pub metadata: Option<DerivedMetadata>,
}

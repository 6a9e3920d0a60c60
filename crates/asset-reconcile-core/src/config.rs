use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// How far a canonical name has to be unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConflictScope {
    /// One canonical file name per content tree.
    #[default]
    Tree,
    /// One canonical file name per directory.
    Directory,
}

/// Recoding parameters for opaque PNGs turned into JPEGs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecodeSettings {
    pub jpeg_quality: u8,
    /// RGB colour partially transparent pixels are flattened onto.
    pub background: [u8; 3],
}

impl Default for RecodeSettings {
    fn default() -> Self {
        Self {
            jpeg_quality: 85,
            background: [255, 255, 255],
        }
    }
}

/// Routes files whose canonical stem contains `keyword` into `directory`, and
/// tells the matcher where to look for references to such files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub keyword: String,
    pub directory: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Location of the persisted asset store (SQLite database file).
    pub asset_store: String,
    pub extensions: Vec<String>,
    pub ignore_patterns: Vec<String>,
    pub report_dir: String,
    /// Worker threads for scanning and hashing. 0 lets rayon decide.
    pub concurrency: usize,
    pub conflict_scope: ConflictScope,
    /// Prefix store paths carry in front of the content-relative path.
    pub path_prefix: String,
    pub operation_timeout_secs: u64,
    /// Delete store records whose file is gone and cannot be matched.
    pub prune_orphans: bool,
    /// Longest edge of the placeholder thumbnail, in pixels.
    pub placeholder_size: u32,
    pub recode: RecodeSettings,
    pub keyword_rules: Vec<KeywordRule>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            asset_store: "assets.db".to_string(),
            extensions: ["jpg", "jpeg", "jpe", "jfif", "png", "gif", "webp", "bmp", "tif", "tiff"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ignore_patterns: Vec::new(),
            report_dir: "reports".to_string(),
            concurrency: 4,
            conflict_scope: ConflictScope::Tree,
            path_prefix: "/".to_string(),
            operation_timeout_secs: 30,
            prune_orphans: false,
            placeholder_size: 16,
            recode: RecodeSettings::default(),
            keyword_rules: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs.max(1))
    }
}

/// Load `Reconcile.toml` from the working directory (if present) and
/// `RECONCILE_*` environment variables on top of the built-in defaults.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    build(ConfigFile::with_name("Reconcile").required(false), environment())
}

/// Same as [`load_configuration`], reading an explicit file instead.
pub fn load_configuration_from(path: &Path) -> Result<AppConfig, ConfigError> {
    build(ConfigFile::from(path).required(true), environment())
}

/// `RECONCILE_ASSET_STORE`, `RECONCILE_PRUNE_ORPHANS=true` and so on. List
/// keys take comma-separated values.
fn environment() -> Environment {
    Environment::with_prefix("RECONCILE")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("extensions")
        .with_list_parse_key("ignore_patterns")
}

fn build<S>(file: S, env: Environment) -> Result<AppConfig, ConfigError>
where
    S: config::Source + Send + Sync + 'static,
{
    let builder = Config::builder().add_source(file).add_source(env).build()?;
    builder.try_deserialize::<AppConfig>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn env_of(vars: &[(&str, &str)]) -> Environment {
        let vars: config::Map<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        environment().source(Some(vars))
    }

    #[test]
    fn test_defaults_when_file_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Reconcile.toml");
        fs::write(&path, "").unwrap();

        let config = load_configuration_from(&path).unwrap();
        assert_eq!(config.conflict_scope, ConflictScope::Tree);
        assert_eq!(config.recode.jpeg_quality, 85);
        assert!(config.extensions.contains(&"jpeg".to_string()));
        assert!(!config.prune_orphans);
    }

    #[test]
    fn test_file_values_override_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(
            &path,
            r#"
conflict_scope = "directory"
path_prefix = "/media/"
concurrency = 2

[recode]
jpeg_quality = 70

[[keyword_rules]]
keyword = "portrait"
directory = "img/portraits"
"#,
        )
        .unwrap();

        let config = load_configuration_from(&path).unwrap();
        assert_eq!(config.conflict_scope, ConflictScope::Directory);
        assert_eq!(config.path_prefix, "/media/");
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.recode.jpeg_quality, 70);
        assert_eq!(config.recode.background, [255, 255, 255]);
        assert_eq!(config.keyword_rules.len(), 1);
        assert_eq!(config.keyword_rules[0].directory, "img/portraits");
    }

    #[test]
    fn test_operation_timeout_never_zero() {
        let config = AppConfig {
            operation_timeout_secs: 0,
            ..AppConfig::default()
        };
        assert_eq!(config.operation_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Reconcile.toml");
        fs::write(&path, "asset_store = \"file.db\"\nconcurrency = 2\n").unwrap();
        let env = env_of(&[
            ("RECONCILE_ASSET_STORE", "/srv/site/assets.db"),
            ("RECONCILE_PRUNE_ORPHANS", "true"),
            ("RECONCILE_CONFLICT_SCOPE", "directory"),
            ("RECONCILE_OPERATION_TIMEOUT_SECS", "5"),
            ("RECONCILE_EXTENSIONS", "jpg,png"),
            ("UNRELATED_ASSET_STORE", "ignored.db"),
        ]);

        let config = build(ConfigFile::from(path.as_path()).required(true), env).unwrap();
        assert_eq!(config.asset_store, "/srv/site/assets.db");
        assert!(config.prune_orphans);
        assert_eq!(config.conflict_scope, ConflictScope::Directory);
        assert_eq!(config.operation_timeout(), Duration::from_secs(5));
        assert_eq!(config.extensions, vec!["jpg".to_string(), "png".to_string()]);
        assert_eq!(config.concurrency, 2);
    }

    #[test]
    fn test_bad_environment_value_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Reconcile.toml");
        fs::write(&path, "").unwrap();
        let env = env_of(&[("RECONCILE_CONFLICT_SCOPE", "galaxy")]);
        assert!(build(ConfigFile::from(path.as_path()).required(true), env).is_err());
    }
}

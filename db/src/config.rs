//! Compendium configuration.
//!
//! Defines the YAML-serializable settings shared by the engine and the CLI:
//! where the database lives, which table prefix to use, and import and
//! query tuning. Every field has a default, so an empty file is valid.
//!
//! # Example YAML
//!
//! ```yaml
//! database: compendium.db
//! table_prefix: cmp_
//! batch_size: 500
//! default_limit: 50
//! export_dir: data/
//! ```

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LoadError, Result};

/// Table prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "cmp_";
/// Entries written between progress events during import.
pub const DEFAULT_BATCH_SIZE: usize = 500;
/// Search result cap when a caller gives none.
pub const DEFAULT_LIMIT: usize = 50;

/// Top-level compendium configuration.
///
/// # Examples
///
/// ```
/// use compendium_db::CompendiumConfig;
///
/// let config: CompendiumConfig = serde_yaml::from_str("table_prefix: dnd_").unwrap();
/// assert_eq!(config.table_prefix, "dnd_");
/// assert_eq!(config.batch_size, 500);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompendiumConfig {
    /// SQLite database file.
    pub database: PathBuf,
    /// Prefix applied to every table the engine creates.
    pub table_prefix: String,
    /// Progress reporting granularity during import.
    pub batch_size: usize,
    /// Result cap for searches without an explicit limit.
    pub default_limit: usize,
    /// Export directory imported when none is given on the command line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_dir: Option<PathBuf>,
}

impl Default for CompendiumConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("compendium.db"),
            table_prefix: DEFAULT_PREFIX.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            default_limit: DEFAULT_LIMIT,
            export_dir: None,
        }
    }
}

impl CompendiumConfig {
    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::LoadError::IoError) if the file cannot
    /// be read, [`YamlError`](crate::LoadError::YamlError) if parsing
    /// fails, or [`InvalidConfig`](crate::LoadError::InvalidConfig) if a
    /// value is out of range.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config: Self = serde_yaml::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// Checks value ranges and the table prefix shape.
    ///
    /// The prefix must be non-empty ASCII alphanumerics or underscores and
    /// must not start with a digit.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(LoadError::InvalidConfig("batch_size must be at least 1".into()));
        }
        if self.default_limit == 0 {
            return Err(LoadError::InvalidConfig(
                "default_limit must be at least 1".into(),
            ));
        }
        let prefix = &self.table_prefix;
        let well_formed = !prefix.is_empty()
            && prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !prefix.starts_with(|c: char| c.is_ascii_digit());
        if !well_formed {
            return Err(LoadError::InvalidConfig(format!(
                "table_prefix '{prefix}' must be ASCII alphanumerics or underscores"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config: CompendiumConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, CompendiumConfig::default());
        assert_eq!(config.database, PathBuf::from("compendium.db"));
        assert_eq!(config.table_prefix, DEFAULT_PREFIX);
        assert!(config.export_dir.is_none());
    }

    #[test]
    fn test_deserialize_complete() {
        let yaml = r#"
database: /var/lib/compendium.db
table_prefix: dnd_
batch_size: 100
default_limit: 20
export_dir: data/
"#;
        let config: CompendiumConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.database, PathBuf::from("/var/lib/compendium.db"));
        assert_eq!(config.table_prefix, "dnd_");
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.default_limit, 20);
        assert_eq!(config.export_dir, Some(PathBuf::from("data/")));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero_batch = CompendiumConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(zero_batch.validate(), Err(LoadError::InvalidConfig(_))));

        for prefix in ["", "cmp-", "1cmp_", "cmp; DROP"] {
            let config = CompendiumConfig {
                table_prefix: prefix.into(),
                ..Default::default()
            };
            assert!(config.validate().is_err(), "prefix {prefix:?} should fail");
        }
    }

    #[test]
    fn test_load_save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("compendium.yml");

        let original = CompendiumConfig {
            table_prefix: "test_".into(),
            export_dir: Some(PathBuf::from("export")),
            ..Default::default()
        };
        original.save(&path).unwrap();

        let loaded = CompendiumConfig::load(&path).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_load_rejects_invalid_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("compendium.yml");
        std::fs::write(&path, "table_prefix: \"bad prefix\"\n").unwrap();
        assert!(matches!(
            CompendiumConfig::load(&path),
            Err(LoadError::InvalidConfig(_))
        ));
    }
}

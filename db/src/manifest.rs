//! Import manifests recording which export files fed a compendium.
//!
//! While loading, every source file that parsed successfully is recorded
//! with its path relative to the export root, a SHA-256 checksum of its
//! bytes, and the number of entries it contributed. The engine stores the
//! manifest alongside the import timestamp so callers can tell whether an
//! export directory has changed since it was imported.
//!
//! # Examples
//!
//! ```
//! use compendium_core::ContentType;
//! use compendium_db::{ImportManifest, SourceFile};
//!
//! let mut manifest = ImportManifest::new("/data/export");
//! manifest.record(ContentType::Feat, vec![SourceFile {
//!     path: "feats.json".into(),
//!     checksum: ImportManifest::checksum(b"{}"),
//!     entries: 12,
//! }]);
//! assert_eq!(manifest.entry_count(ContentType::Feat), 12);
//! assert_eq!(manifest.file_count(), 1);
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use compendium_core::ContentType;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A single export file that contributed entries to a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Path relative to the export root, using `/` separators.
    pub path: String,
    /// SHA-256 hex digest of the file contents.
    pub checksum: String,
    /// Number of valid entries taken from the file for this stage.
    pub entries: usize,
}

/// Record of the export files read by one import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportManifest {
    /// Export root as given to the importer.
    pub root: String,
    /// RFC 3339 timestamp of when loading started.
    pub generated_at: String,
    /// Files read per content type. Class files appear under both the
    /// class and subclass stages.
    pub stages: BTreeMap<ContentType, Vec<SourceFile>>,
    /// The spell class override file, when present and well-formed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<SourceFile>,
}

impl ImportManifest {
    /// Creates an empty manifest for the given export root.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().display().to_string(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            stages: BTreeMap::new(),
            overrides: None,
        }
    }

    /// Records the files read for `ct`, replacing any previous record.
    pub fn record(&mut self, ct: ContentType, files: Vec<SourceFile>) {
        self.stages.insert(ct, files);
    }

    /// Files recorded for `ct`.
    pub fn files(&self, ct: ContentType) -> &[SourceFile] {
        self.stages.get(&ct).map(Vec::as_slice).unwrap_or_default()
    }

    /// Total entries contributed to `ct` across its files.
    pub fn entry_count(&self, ct: ContentType) -> usize {
        self.files(ct).iter().map(|f| f.entries).sum()
    }

    /// Number of distinct files across all stages, excluding the override file.
    pub fn file_count(&self) -> usize {
        self.stages
            .values()
            .flatten()
            .map(|f| f.path.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Computes the SHA-256 hex digest of `bytes`.
    pub fn checksum(bytes: &[u8]) -> String {
        format!("{:x}", Sha256::digest(bytes))
    }

    /// Returns the paths that differ between `self` and `other`.
    ///
    /// A path differs when it is present in only one manifest or its
    /// checksum changed. The override file is compared too. Paths are
    /// returned sorted and deduplicated.
    ///
    /// # Examples
    ///
    /// ```
    /// use compendium_core::ContentType;
    /// use compendium_db::{ImportManifest, SourceFile};
    ///
    /// let file = |sum: &str| SourceFile { path: "feats.json".into(), checksum: sum.into(), entries: 1 };
    /// let mut old = ImportManifest::new("x");
    /// old.record(ContentType::Feat, vec![file("aaa")]);
    /// let mut new = ImportManifest::new("x");
    /// new.record(ContentType::Feat, vec![file("bbb")]);
    ///
    /// assert_eq!(old.changed_files(&new), vec!["feats.json".to_string()]);
    /// assert!(old.changed_files(&old).is_empty());
    /// ```
    pub fn changed_files(&self, other: &ImportManifest) -> Vec<String> {
        let ours = self.checksums();
        let theirs = other.checksums();

        let mut changed = BTreeSet::new();
        for (path, sum) in &ours {
            if theirs.get(path) != Some(sum) {
                changed.insert(path.to_string());
            }
        }
        for path in theirs.keys() {
            if !ours.contains_key(path) {
                changed.insert(path.to_string());
            }
        }
        changed.into_iter().collect()
    }

    fn checksums(&self) -> BTreeMap<&str, &str> {
        self.stages
            .values()
            .flatten()
            .chain(self.overrides.iter())
            .map(|f| (f.path.as_str(), f.checksum.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(path: &str, checksum: &str, entries: usize) -> SourceFile {
        SourceFile {
            path: path.into(),
            checksum: checksum.into(),
            entries,
        }
    }

    #[test]
    fn test_checksum_is_stable_hex() {
        let sum = ImportManifest::checksum(b"hello");
        assert_eq!(sum.len(), 64);
        assert_eq!(sum, ImportManifest::checksum(b"hello"));
        assert_ne!(sum, ImportManifest::checksum(b"hello!"));
    }

    #[test]
    fn test_file_count_dedups_shared_class_files() {
        let mut manifest = ImportManifest::new("root");
        manifest.record(
            ContentType::Class,
            vec![source("class/class-wizard.json", "a", 1)],
        );
        manifest.record(
            ContentType::Subclass,
            vec![source("class/class-wizard.json", "a", 13)],
        );
        assert_eq!(manifest.file_count(), 1);
        assert_eq!(manifest.entry_count(ContentType::Subclass), 13);
        assert_eq!(manifest.entry_count(ContentType::Spell), 0);
    }

    #[test]
    fn test_changed_files_detects_added_and_removed() {
        let mut old = ImportManifest::new("root");
        old.record(ContentType::Feat, vec![source("feats.json", "a", 1)]);
        let mut new = ImportManifest::new("root");
        new.record(ContentType::Race, vec![source("races.json", "b", 1)]);
        new.overrides = Some(source("spells/sources.json", "c", 4));

        assert_eq!(
            old.changed_files(&new),
            vec!["feats.json", "races.json", "spells/sources.json"]
        );
    }

    #[test]
    fn test_json_round_trip_keys_by_type_name() {
        let mut manifest = ImportManifest::new("root");
        manifest.record(
            ContentType::OptionalFeature,
            vec![source("optionalfeatures.json", "a", 2)],
        );
        let json = serde_json::to_value(&manifest).unwrap();
        assert!(json["stages"].get("optional-feature").is_some());

        let back: ImportManifest = serde_json::from_value(json).unwrap();
        assert_eq!(back, manifest);
    }
}

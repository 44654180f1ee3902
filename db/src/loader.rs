//! Discovery and loading of content-export directories.
//!
//! An export directory holds one or more JSON files per content type. Each
//! [`ContentType`] has a fixed layout: either a list of well-known file
//! names, or every `<prefix>*.json` file inside a subdirectory.
//!
//! ```text
//! export/
//! ├── spells/spells-*.json      spell
//! ├── spells/sources.json       spell → class overrides
//! ├── items.json                item
//! ├── items-base.json           baseitem
//! ├── magicvariants.json        variant
//! ├── feats.json                feat
//! ├── backgrounds.json          background
//! ├── races.json                race, subrace
//! ├── class/class-*.json        class, subclass, classFeature, subclassFeature
//! ├── optionalfeatures.json     optionalfeature
//! └── conditionsdiseases.json   condition, disease
//! ```
//!
//! Loading never fails: missing files contribute nothing, unreadable or
//! malformed files are skipped with a warning, and entries without a name
//! or source are dropped. Only the spell stage distinguishes "directory
//! missing" so the importer can report it.
//!
//! # Example
//!
//! ```no_run
//! use compendium_core::ContentType;
//! use compendium_db::ExportDirectory;
//!
//! let export = ExportDirectory::new("data/");
//! let spells = export.load(ContentType::Spell);
//! println!("{} spells from {} files", spells.entries.len(), spells.files.len());
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use compendium_core::{ContentType, entry_key, merge_names};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::manifest::{ImportManifest, SourceFile};

/// Where a stage's files live inside the export root.
#[derive(Debug, Clone, Copy)]
enum Location {
    /// Fixed file names directly under the root.
    Files(&'static [&'static str]),
    /// Every `prefix*.json` file in a subdirectory.
    Prefixed {
        dir: &'static str,
        prefix: &'static str,
    },
}

#[derive(Debug, Clone, Copy)]
struct StageLayout {
    location: Location,
    /// Top-level array keys holding the stage's entries.
    keys: &'static [&'static str],
    /// Top-level array key holding per-level features to embed.
    feature_key: Option<&'static str>,
}

fn layout(ct: ContentType) -> StageLayout {
    match ct {
        ContentType::Spell => StageLayout {
            location: Location::Prefixed {
                dir: "spells",
                prefix: "spells-",
            },
            keys: &["spell"],
            feature_key: None,
        },
        ContentType::Item => StageLayout {
            location: Location::Files(&["items.json", "items-base.json", "magicvariants.json"]),
            keys: &["item", "baseitem", "variant"],
            feature_key: None,
        },
        ContentType::Feat => StageLayout {
            location: Location::Files(&["feats.json"]),
            keys: &["feat"],
            feature_key: None,
        },
        ContentType::Background => StageLayout {
            location: Location::Files(&["backgrounds.json"]),
            keys: &["background"],
            feature_key: None,
        },
        ContentType::Race => StageLayout {
            location: Location::Files(&["races.json"]),
            keys: &["race", "subrace"],
            feature_key: None,
        },
        ContentType::Class => StageLayout {
            location: Location::Prefixed {
                dir: "class",
                prefix: "class-",
            },
            keys: &["class"],
            feature_key: Some("classFeature"),
        },
        ContentType::Subclass => StageLayout {
            location: Location::Prefixed {
                dir: "class",
                prefix: "class-",
            },
            keys: &["subclass"],
            feature_key: Some("subclassFeature"),
        },
        ContentType::OptionalFeature => StageLayout {
            location: Location::Files(&["optionalfeatures.json"]),
            keys: &["optionalfeature"],
            feature_key: None,
        },
        ContentType::Condition => StageLayout {
            location: Location::Files(&["conditionsdiseases.json"]),
            keys: &["condition", "disease"],
            feature_key: None,
        },
    }
}

/// Relative path of the spell class override file.
pub const SPELL_SOURCES_FILE: &str = "spells/sources.json";

/// A raw export entry ready for storage.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceEntry {
    /// The entry exactly as it appeared in the export file.
    pub raw: Value,
    /// Embedded per-level features, for classes and subclasses only.
    pub features: Option<Vec<Value>>,
}

/// Everything loaded for one content type.
#[derive(Debug, Clone)]
pub struct StageSource {
    pub content_type: ContentType,
    /// Valid entries in file order, then array order within each file.
    pub entries: Vec<SourceEntry>,
    /// Files that parsed successfully.
    pub files: Vec<SourceFile>,
    /// Entries dropped for lacking a name or source.
    pub rejected: usize,
    /// The stage's subdirectory does not exist. Always `false` for
    /// stages located by fixed file names.
    pub missing: bool,
}

/// A content-export directory on disk.
#[derive(Debug, Clone)]
pub struct ExportDirectory {
    root: PathBuf,
}

impl ExportDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns `true` if the root exists and is a directory.
    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    /// Loads every entry for `ct`.
    ///
    /// Class and subclass entries get their matching feature lists
    /// attached: class features by (`className`, `classSource`), subclass
    /// features by (`className`, `subclassShortName`, `subclassSource`).
    /// The subclass key leaves out `classSource` so subclasses that point
    /// at a class reprinted in another sourcebook still find their
    /// features.
    pub fn load(&self, ct: ContentType) -> StageSource {
        let layout = layout(ct);
        let (paths, missing) = self.discover(layout.location);

        let mut entries = Vec::new();
        let mut features = Vec::new();
        let mut files = Vec::new();
        let mut rejected = 0;

        for path in paths {
            let Some((doc, checksum)) = read_json(&path) else {
                continue;
            };

            let mut taken = 0;
            for key in layout.keys {
                for raw in array_entries(&doc, key) {
                    match entry_key(raw) {
                        Ok(_) => {
                            entries.push(raw.clone());
                            taken += 1;
                        }
                        Err(err) => {
                            debug!(file = %path.display(), key, error = %err, "Dropping entry");
                            rejected += 1;
                        }
                    }
                }
            }
            if let Some(feature_key) = layout.feature_key {
                features.extend(array_entries(&doc, feature_key).cloned());
            }

            files.push(SourceFile {
                path: self.relative(&path),
                checksum,
                entries: taken,
            });
        }

        let entries = match layout.feature_key {
            Some(_) => attach_features(ct, entries, &features),
            None => entries
                .into_iter()
                .map(|raw| SourceEntry {
                    raw,
                    features: None,
                })
                .collect(),
        };

        debug!(
            stage = %ct,
            entries = entries.len(),
            files = files.len(),
            rejected,
            missing,
            "Loaded stage"
        );

        StageSource {
            content_type: ct,
            entries,
            files,
            rejected,
            missing,
        }
    }

    /// Reads `spells/sources.json` into a class override table.
    ///
    /// Returns the overrides and the file record; a missing or malformed
    /// file yields an empty table and no record.
    pub fn load_spell_overrides(&self) -> (SpellClassOverrides, Option<SourceFile>) {
        let path = self.root.join(SPELL_SOURCES_FILE);
        if !path.is_file() {
            return (SpellClassOverrides::default(), None);
        }
        let Some((doc, checksum)) = read_json(&path) else {
            return (SpellClassOverrides::default(), None);
        };

        match SpellClassOverrides::from_value(&doc) {
            Ok(overrides) => {
                let file = SourceFile {
                    path: SPELL_SOURCES_FILE.to_string(),
                    checksum,
                    entries: overrides.len(),
                };
                (overrides, Some(file))
            }
            Err(err) => {
                warn!(file = %path.display(), error = %err, "Ignoring malformed spell sources file");
                (SpellClassOverrides::default(), None)
            }
        }
    }

    /// Loads every stage and builds the manifest without storing anything.
    pub fn scan_manifest(&self) -> ImportManifest {
        let mut manifest = ImportManifest::new(&self.root);
        for ct in ContentType::ALL {
            manifest.record(ct, self.load(ct).files);
        }
        manifest.overrides = self.load_spell_overrides().1;
        manifest
    }

    fn discover(&self, location: Location) -> (Vec<PathBuf>, bool) {
        match location {
            Location::Files(names) => {
                let paths = names
                    .iter()
                    .map(|name| self.root.join(name))
                    .filter(|path| path.is_file())
                    .collect();
                (paths, false)
            }
            Location::Prefixed { dir, prefix } => {
                let dir = self.root.join(dir);
                let read = match std::fs::read_dir(&dir) {
                    Ok(read) => read,
                    Err(err) => {
                        debug!(dir = %dir.display(), error = %err, "Stage directory unavailable");
                        return (Vec::new(), true);
                    }
                };
                let mut paths: Vec<PathBuf> = read
                    .filter_map(|entry| entry.ok().map(|e| e.path()))
                    .filter(|path| {
                        path.is_file()
                            && path
                                .file_name()
                                .and_then(|n| n.to_str())
                                .is_some_and(|n| n.starts_with(prefix) && n.ends_with(".json"))
                    })
                    .collect();
                paths.sort();
                (paths, false)
            }
        }
    }

    fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Reads and parses a JSON file, returning the document and its checksum.
fn read_json(path: &Path) -> Option<(Value, String)> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(file = %path.display(), error = %err, "Skipping unreadable export file");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(doc) => Some((doc, ImportManifest::checksum(&bytes))),
        Err(err) => {
            warn!(file = %path.display(), error = %err, "Skipping malformed export file");
            None
        }
    }
}

fn array_entries<'a>(doc: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    doc.get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|v| v.is_object())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct FeatureRef {
    class_name: Option<String>,
    class_source: Option<String>,
    subclass_short_name: Option<String>,
    subclass_source: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct OwnerRef {
    name: Option<String>,
    source: Option<String>,
    short_name: Option<String>,
    class_name: Option<String>,
}

type FeatureIndex<'a> = HashMap<Vec<String>, Vec<&'a Value>>;

fn attach_features(ct: ContentType, entries: Vec<Value>, features: &[Value]) -> Vec<SourceEntry> {
    let mut index: FeatureIndex<'_> = HashMap::new();
    for feature in features {
        let Ok(r) = FeatureRef::deserialize(feature) else {
            continue;
        };
        let key = match ct {
            ContentType::Subclass => [r.class_name, r.subclass_short_name, r.subclass_source]
                .into_iter()
                .collect::<Option<Vec<_>>>(),
            _ => [r.class_name, r.class_source]
                .into_iter()
                .collect::<Option<Vec<_>>>(),
        };
        if let Some(key) = key {
            index.entry(key).or_default().push(feature);
        }
    }

    entries
        .into_iter()
        .map(|raw| {
            let owner = OwnerRef::deserialize(&raw).unwrap_or_default();
            let key = match ct {
                ContentType::Subclass => [owner.class_name, owner.short_name, owner.source]
                    .into_iter()
                    .collect::<Option<Vec<_>>>(),
                _ => [owner.name, owner.source]
                    .into_iter()
                    .collect::<Option<Vec<_>>>(),
            };
            let matched: Vec<Value> = key
                .and_then(|k| index.get(&k))
                .map(|found| found.iter().map(|v| (*v).clone()).collect())
                .unwrap_or_default();
            SourceEntry {
                raw,
                features: Some(matched),
            }
        })
        .collect()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OverrideClassRef {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct OverrideShape {
    class: Vec<OverrideClassRef>,
    class_variant: Vec<OverrideClassRef>,
}

/// Spell → class lists taken from `spells/sources.json`, keyed by record id
/// (`name|source`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpellClassOverrides {
    by_id: HashMap<String, Vec<String>>,
}

impl SpellClassOverrides {
    /// Builds overrides from a `sourceCode → spellName → {class, classVariant}`
    /// document. Class names are merged per key, first occurrence kept.
    pub fn from_value(doc: &Value) -> Result<Self, serde_json::Error> {
        let parsed: HashMap<String, HashMap<String, OverrideShape>> =
            HashMap::deserialize(doc)?;

        let mut by_id = HashMap::new();
        for (source, spells) in parsed {
            for (name, shape) in spells {
                let names = shape
                    .class
                    .into_iter()
                    .chain(shape.class_variant)
                    .filter_map(|c| c.name);
                let classes = merge_names(names);
                if !classes.is_empty() {
                    by_id.insert(format!("{name}|{source}"), classes);
                }
            }
        }
        Ok(Self { by_id })
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&[String]> {
        self.by_id.get(id).map(Vec::as_slice)
    }

    /// Iterates `(id, classes)` pairs sorted by id.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        let mut pairs: Vec<_> = self
            .by_id
            .iter()
            .map(|(id, classes)| (id.as_str(), classes.as_slice()))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        pairs.into_iter()
    }
}

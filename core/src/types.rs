//! Record, filter, and status types shared by every compendium crate.
//!
//! The central type is [`ContentType`], a closed enumeration of the nine
//! reference-data kinds. Each kind owns a static [`TypeDescriptor`] naming
//! its table, its derived filter columns, and the extra free-text columns
//! its full-text index covers. Everything type-specific dispatches through
//! an exhaustive `match` on [`ContentType`], so adding a kind is a compile
//! error until every descriptor, derivation, and projection handles it.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

/// The nine kinds of reference content held by a compendium.
///
/// Variants are declared in import order; [`ContentType::ALL`] preserves it.
///
/// # Examples
///
/// ```
/// use compendium_core::ContentType;
///
/// let ct: ContentType = "optional-feature".parse().unwrap();
/// assert_eq!(ct, ContentType::OptionalFeature);
/// assert_eq!(ct.to_string(), "optional-feature");
/// assert_eq!(ContentType::Spell.descriptor().table, "spells");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentType {
    Spell,
    Item,
    Feat,
    Background,
    Race,
    Class,
    Subclass,
    OptionalFeature,
    Condition,
}

impl ContentType {
    /// Every content type, in the order the ingest pipeline processes them.
    pub const ALL: [ContentType; 9] = [
        ContentType::Spell,
        ContentType::Item,
        ContentType::Feat,
        ContentType::Background,
        ContentType::Race,
        ContentType::Class,
        ContentType::Subclass,
        ContentType::OptionalFeature,
        ContentType::Condition,
    ];

    /// Stable lowercase name used in progress events, CLI arguments and JSON.
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Spell => "spell",
            ContentType::Item => "item",
            ContentType::Feat => "feat",
            ContentType::Background => "background",
            ContentType::Race => "race",
            ContentType::Class => "class",
            ContentType::Subclass => "subclass",
            ContentType::OptionalFeature => "optional-feature",
            ContentType::Condition => "condition",
        }
    }

    /// Returns the static storage descriptor for this type.
    pub fn descriptor(self) -> &'static TypeDescriptor {
        match self {
            ContentType::Spell => &SPELL,
            ContentType::Item => &ITEM,
            ContentType::Feat => &FEAT,
            ContentType::Background => &BACKGROUND,
            ContentType::Race => &RACE,
            ContentType::Class => &CLASS,
            ContentType::Subclass => &SUBCLASS,
            ContentType::OptionalFeature => &OPTIONAL_FEATURE,
            ContentType::Condition => &CONDITION,
        }
    }

    /// Inventory category a record of this type is filed under.
    ///
    /// Items are classified per record from their type code; every other
    /// kind maps to a fixed target.
    pub fn drop_target(self, derived: &Derived) -> DropTarget {
        match (self, derived) {
            (ContentType::Item, Derived::Item(item)) => item.character_type,
            (ContentType::Item, _) => DropTarget::Equipment,
            (ContentType::Spell, _) => DropTarget::Spell,
            (
                ContentType::Feat
                | ContentType::Background
                | ContentType::Race
                | ContentType::Class
                | ContentType::Subclass
                | ContentType::OptionalFeature
                | ContentType::Condition,
                _,
            ) => DropTarget::Feature,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown content type name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown content type: {0}")]
pub struct ParseContentTypeError(pub String);

impl FromStr for ContentType {
    type Err = ParseContentTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "spell" | "spells" => Ok(ContentType::Spell),
            "item" | "items" => Ok(ContentType::Item),
            "feat" | "feats" => Ok(ContentType::Feat),
            "background" | "backgrounds" => Ok(ContentType::Background),
            "race" | "races" => Ok(ContentType::Race),
            "class" | "classes" => Ok(ContentType::Class),
            "subclass" | "subclasses" => Ok(ContentType::Subclass),
            "optional-feature" | "optionalfeature" | "optional-features" => {
                Ok(ContentType::OptionalFeature)
            }
            "condition" | "conditions" => Ok(ContentType::Condition),
            _ => Err(ParseContentTypeError(s.to_string())),
        }
    }
}

/// SQLite affinity of a derived column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    /// Stored as `0`/`1`.
    Bool,
    /// JSON-encoded text.
    Json,
}

impl ColumnKind {
    /// SQL type name used in `CREATE TABLE`.
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnKind::Text | ColumnKind::Json => "TEXT",
            ColumnKind::Integer => "INTEGER",
            ColumnKind::Bool => "INTEGER NOT NULL DEFAULT 0",
        }
    }
}

/// A derived (filter-only) column on a base table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
}

const fn col(name: &'static str, kind: ColumnKind) -> Column {
    Column { name, kind }
}

/// Storage layout of one content type.
///
/// Column order here is the order the storage layer binds derived values
/// in; [`Derived`] projections must agree with it.
#[derive(Debug)]
pub struct TypeDescriptor {
    pub content_type: ContentType,
    /// Unprefixed base table name.
    pub table: &'static str,
    /// Derived columns, excluding `id`, `name`, `source`, `features` and `raw`.
    pub columns: &'static [Column],
    /// Extra base-table columns indexed for full-text search besides `name`
    /// and `source`.
    pub fts_extra: &'static [&'static str],
    /// Whether rows carry an embedded per-level feature list.
    pub has_features: bool,
}

impl TypeDescriptor {
    /// Returns `true` if the base table has a derived column named `name`.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// All columns indexed by the full-text shadow table.
    pub fn fts_columns(&self) -> Vec<&'static str> {
        let mut cols = vec!["name", "source"];
        cols.extend_from_slice(self.fts_extra);
        cols
    }
}

static SPELL: TypeDescriptor = TypeDescriptor {
    content_type: ContentType::Spell,
    table: "spells",
    columns: &[
        col("level", ColumnKind::Integer),
        col("school", ColumnKind::Text),
        col("casting_time", ColumnKind::Text),
        col("concentration", ColumnKind::Bool),
        col("ritual", ColumnKind::Bool),
        col("classes", ColumnKind::Json),
    ],
    fts_extra: &[],
    has_features: false,
};

static ITEM: TypeDescriptor = TypeDescriptor {
    content_type: ContentType::Item,
    table: "items",
    columns: &[
        col("item_type", ColumnKind::Text),
        col("character_type", ColumnKind::Text),
        col("rarity", ColumnKind::Text),
        col("requires_attunement", ColumnKind::Bool),
    ],
    fts_extra: &[],
    has_features: false,
};

static FEAT: TypeDescriptor = TypeDescriptor {
    content_type: ContentType::Feat,
    table: "feats",
    columns: &[col("prerequisite", ColumnKind::Text)],
    fts_extra: &[],
    has_features: false,
};

static BACKGROUND: TypeDescriptor = TypeDescriptor {
    content_type: ContentType::Background,
    table: "backgrounds",
    columns: &[],
    fts_extra: &[],
    has_features: false,
};

static RACE: TypeDescriptor = TypeDescriptor {
    content_type: ContentType::Race,
    table: "races",
    columns: &[col("subrace_of", ColumnKind::Text)],
    fts_extra: &["subrace_of"],
    has_features: false,
};

static CLASS: TypeDescriptor = TypeDescriptor {
    content_type: ContentType::Class,
    table: "classes",
    columns: &[],
    fts_extra: &[],
    has_features: true,
};

static SUBCLASS: TypeDescriptor = TypeDescriptor {
    content_type: ContentType::Subclass,
    table: "subclasses",
    columns: &[
        col("class_name", ColumnKind::Text),
        col("short_name", ColumnKind::Text),
    ],
    fts_extra: &["class_name"],
    has_features: true,
};

static OPTIONAL_FEATURE: TypeDescriptor = TypeDescriptor {
    content_type: ContentType::OptionalFeature,
    table: "optional_features",
    columns: &[col("feature_type", ColumnKind::Text)],
    fts_extra: &[],
    has_features: false,
};

static CONDITION: TypeDescriptor = TypeDescriptor {
    content_type: ContentType::Condition,
    table: "conditions",
    columns: &[],
    fts_extra: &[],
    has_features: false,
};

/// Character-sheet inventory category for a content record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropTarget {
    Weapon,
    Armor,
    #[default]
    Equipment,
    Spell,
    Feature,
}

impl DropTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            DropTarget::Weapon => "weapon",
            DropTarget::Armor => "armor",
            DropTarget::Equipment => "equipment",
            DropTarget::Spell => "spell",
            DropTarget::Feature => "feature",
        }
    }

    /// Parses a stored drop-target name; unknown names fall back to equipment.
    pub fn from_stored(s: &str) -> Self {
        match s {
            "weapon" => DropTarget::Weapon,
            "armor" => DropTarget::Armor,
            "spell" => DropTarget::Spell,
            "feature" => DropTarget::Feature,
            _ => DropTarget::Equipment,
        }
    }
}

/// Composite `name|source` key of a record.
///
/// # Examples
///
/// ```
/// use compendium_core::EntryKey;
///
/// let key = EntryKey::new("Fireball", "PHB");
/// assert_eq!(key.id(), "Fireball|PHB");
/// assert_eq!(EntryKey::parse_id("Fireball|PHB"), Some(key));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryKey {
    pub name: String,
    pub source: String,
}

impl EntryKey {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }

    pub fn id(&self) -> String {
        format!("{}|{}", self.name, self.source)
    }

    /// Splits an id on its last `|`. Names may themselves contain `|`.
    pub fn parse_id(id: &str) -> Option<Self> {
        let (name, source) = id.rsplit_once('|')?;
        if name.is_empty() || source.is_empty() {
            return None;
        }
        Some(Self::new(name, source))
    }
}

/// Derived columns of a spell.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpellColumns {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub school: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub casting_time: Option<String>,
    pub concentration: bool,
    pub ritual: bool,
    pub classes: Vec<String>,
}

/// Derived columns of an item.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemColumns {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,
    pub character_type: DropTarget,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rarity: Option<String>,
    pub requires_attunement: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatColumns {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prerequisite: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceColumns {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subrace_of: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubclassColumns {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionalFeatureColumns {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_type: Option<String>,
}

/// Type-specific derived columns, one variant per column layout.
///
/// Serialized untagged so the fields flatten into a [`ResultRecord`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Derived {
    Spell(SpellColumns),
    Item(ItemColumns),
    Feat(FeatColumns),
    Race(RaceColumns),
    Subclass(SubclassColumns),
    OptionalFeature(OptionalFeatureColumns),
    /// Backgrounds, classes and conditions have no derived columns.
    Plain,
}

/// A stored record as returned by search and retrieval.
///
/// `raw` is the original source object exactly as it appeared in the
/// export file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub id: String,
    pub name: String,
    pub source: String,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub drop_target: DropTarget,
    #[serde(flatten)]
    pub derived: Derived,
    pub raw: Value,
}

impl ResultRecord {
    /// Returns the spell columns, if this is a spell record.
    pub fn spell(&self) -> Option<&SpellColumns> {
        match &self.derived {
            Derived::Spell(cols) => Some(cols),
            _ => None,
        }
    }

    /// Returns the item columns, if this is an item record.
    pub fn item(&self) -> Option<&ItemColumns> {
        match &self.derived {
            Derived::Item(cols) => Some(cols),
            _ => None,
        }
    }

    /// Parent race name for subrace rows.
    pub fn subrace_of(&self) -> Option<&str> {
        match &self.derived {
            Derived::Race(cols) => cols.subrace_of.as_deref(),
            _ => None,
        }
    }
}

/// Facets applied to a search in addition to free text.
///
/// Empty lists and `None` values impose no restriction. Facets that do not
/// exist on the searched content type are ignored.
///
/// `classes` is matched as a substring of the JSON-encoded class list, so a
/// class name contained in another class name also matches that class.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterSet {
    pub sources: Vec<String>,
    pub levels: Vec<i64>,
    /// Full school names (e.g. `"Evocation"`).
    pub schools: Vec<String>,
    pub classes: Vec<String>,
    pub ritual: Option<bool>,
    pub concentration: Option<bool>,
    pub rarities: Vec<String>,
    pub requires_attunement: Option<bool>,
    pub item_types: Vec<String>,
    pub feature_types: Vec<String>,
}

impl FilterSet {
    pub fn is_empty(&self) -> bool {
        self == &FilterSet::default()
    }
}

/// Stage named in an [`ImportProgress`] event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStage {
    Content(ContentType),
    Done,
}

impl ImportStage {
    pub fn as_str(self) -> &'static str {
        match self {
            ImportStage::Content(ct) => ct.as_str(),
            ImportStage::Done => "done",
        }
    }
}

impl fmt::Display for ImportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ImportStage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A progress event emitted synchronously during import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportProgress {
    pub stage: ImportStage,
    pub current: usize,
    pub total: usize,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImportProgress {
    pub fn running(ct: ContentType, current: usize, total: usize) -> Self {
        Self {
            stage: ImportStage::Content(ct),
            current,
            total,
            done: false,
            error: None,
        }
    }

    pub fn finished(ct: ContentType, total: usize) -> Self {
        Self {
            stage: ImportStage::Content(ct),
            current: total,
            total,
            done: true,
            error: None,
        }
    }

    pub fn failed(ct: ContentType, error: impl Into<String>) -> Self {
        Self {
            stage: ImportStage::Content(ct),
            current: 0,
            total: 0,
            done: true,
            error: Some(error.into()),
        }
    }

    /// Terminal event, emitted once after the store has been marked ready.
    pub fn complete(total: usize) -> Self {
        Self {
            stage: ImportStage::Done,
            current: total,
            total,
            done: true,
            error: None,
        }
    }
}

/// Whether a compendium is populated, and with what.
///
/// `counts` is empty unless `imported` is `true`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompendiumStatus {
    pub imported: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imported_at: Option<String>,
    pub counts: BTreeMap<ContentType, usize>,
}

impl CompendiumStatus {
    pub fn count(&self, ct: ContentType) -> usize {
        self.counts.get(&ct).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_round_trips_through_str() {
        for ct in ContentType::ALL {
            assert_eq!(ct.as_str().parse::<ContentType>().unwrap(), ct);
            assert_eq!(ct.descriptor().content_type, ct);
        }
        assert!("wand".parse::<ContentType>().is_err());
    }

    #[test]
    fn test_content_type_serializes_kebab_case() {
        let json = serde_json::to_string(&ContentType::OptionalFeature).unwrap();
        assert_eq!(json, "\"optional-feature\"");
    }

    #[test]
    fn test_table_names_are_unique() {
        let mut tables: Vec<_> = ContentType::ALL
            .iter()
            .map(|ct| ct.descriptor().table)
            .collect();
        tables.sort_unstable();
        tables.dedup();
        assert_eq!(tables.len(), ContentType::ALL.len());
    }

    #[test]
    fn test_fts_columns_include_extras() {
        assert_eq!(
            ContentType::Race.descriptor().fts_columns(),
            vec!["name", "source", "subrace_of"]
        );
        assert_eq!(
            ContentType::Subclass.descriptor().fts_columns(),
            vec!["name", "source", "class_name"]
        );
        assert_eq!(ContentType::Feat.descriptor().fts_columns(), vec!["name", "source"]);
    }

    #[test]
    fn test_entry_key_parse_uses_last_separator() {
        let key = EntryKey::parse_id("Odd|Name|PHB").unwrap();
        assert_eq!(key.name, "Odd|Name");
        assert_eq!(key.source, "PHB");
        assert!(EntryKey::parse_id("NoSource").is_none());
        assert!(EntryKey::parse_id("Name|").is_none());
    }

    #[test]
    fn test_drop_target_for_non_items() {
        assert_eq!(
            ContentType::Spell.drop_target(&Derived::Plain),
            DropTarget::Spell
        );
        assert_eq!(
            ContentType::Feat.drop_target(&Derived::Plain),
            DropTarget::Feature
        );
        let item = Derived::Item(ItemColumns {
            character_type: DropTarget::Armor,
            ..Default::default()
        });
        assert_eq!(ContentType::Item.drop_target(&item), DropTarget::Armor);
    }

    #[test]
    fn test_result_record_flattens_derived_columns() {
        let record = ResultRecord {
            id: "Fireball|PHB".into(),
            name: "Fireball".into(),
            source: "PHB".into(),
            content_type: ContentType::Spell,
            drop_target: DropTarget::Spell,
            derived: Derived::Spell(SpellColumns {
                level: Some(3),
                school: Some("Evocation".into()),
                casting_time: Some("1 action".into()),
                ..Default::default()
            }),
            raw: serde_json::json!({"name": "Fireball"}),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "spell");
        assert_eq!(json["level"], 3);
        assert_eq!(json["castingTime"], "1 action");
        assert_eq!(json["concentration"], false);
        assert_eq!(json["dropTarget"], "spell");
    }

    #[test]
    fn test_plain_derived_flattens_to_nothing() {
        let record = ResultRecord {
            id: "Acolyte|PHB".into(),
            name: "Acolyte".into(),
            source: "PHB".into(),
            content_type: ContentType::Background,
            drop_target: DropTarget::Feature,
            derived: Derived::Plain,
            raw: serde_json::json!({}),
        };
        let json = serde_json::to_value(&record).unwrap();
        let keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys.len(), 6);
    }

    #[test]
    fn test_progress_stage_serializes_as_string() {
        let json = serde_json::to_value(ImportProgress::complete(3)).unwrap();
        assert_eq!(json["stage"], "done");
        assert_eq!(json["done"], true);
        assert!(json.get("error").is_none());

        let json = serde_json::to_value(ImportProgress::failed(ContentType::Spell, "x")).unwrap();
        assert_eq!(json["stage"], "spell");
        assert_eq!(json["error"], "x");
    }

    #[test]
    fn test_filter_set_deserializes_partial() {
        let filters: FilterSet = serde_json::from_str(r#"{"levels":[3],"ritual":true}"#).unwrap();
        assert_eq!(filters.levels, vec![3]);
        assert_eq!(filters.ritual, Some(true));
        assert!(filters.sources.is_empty());
        assert!(!filters.is_empty());
        assert!(FilterSet::default().is_empty());
    }
}

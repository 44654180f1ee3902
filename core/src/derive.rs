//! Derived filter columns computed from raw export payloads.
//!
//! Export files are maintained outside this system, so every shape read
//! here is partial: each derivation deserializes only the subtree it needs
//! into an all-optional struct and treats anything unexpected as absent.
//! The raw payload itself is never modified.
//!
//! # Examples
//!
//! ```
//! use compendium_core::{ContentType, Derived, derive_columns};
//! use serde_json::json;
//!
//! let raw = json!({
//!     "name": "Fireball",
//!     "source": "PHB",
//!     "level": 3,
//!     "school": "V",
//!     "time": [{"number": 1, "unit": "action"}],
//!     "duration": [{"type": "instant"}]
//! });
//! let Derived::Spell(spell) = derive_columns(ContentType::Spell, &raw) else {
//!     panic!("expected spell columns");
//! };
//! assert_eq!(spell.school.as_deref(), Some("Evocation"));
//! assert_eq!(spell.casting_time.as_deref(), Some("1 action"));
//! assert!(!spell.concentration);
//! ```

use std::collections::HashSet;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::types::{
    ContentType, Derived, DropTarget, FeatColumns, ItemColumns, OptionalFeatureColumns,
    RaceColumns, SpellColumns, SubclassColumns,
};

/// Computes the derived columns for a raw record of the given type.
pub fn derive_columns(ct: ContentType, raw: &Value) -> Derived {
    match ct {
        ContentType::Spell => Derived::Spell(SpellColumns {
            level: field::<i64>(raw, "level"),
            school: field::<String>(raw, "school").map(|code| school_name(&code)),
            casting_time: casting_time(raw),
            concentration: is_concentration(raw),
            ritual: is_ritual(raw),
            classes: spell_classes(raw),
        }),
        ContentType::Item => {
            let item_type = item_type_code(raw);
            Derived::Item(ItemColumns {
                character_type: item_drop_target(item_type.as_deref()),
                item_type,
                rarity: field::<String>(raw, "rarity")
                    .or_else(|| inherited::<String>(raw, "rarity")),
                requires_attunement: requires_attunement(raw),
            })
        }
        ContentType::Feat => Derived::Feat(FeatColumns {
            prerequisite: prerequisite_text(raw),
        }),
        ContentType::Race => Derived::Race(RaceColumns {
            subrace_of: field::<String>(raw, "raceName"),
        }),
        ContentType::Subclass => Derived::Subclass(SubclassColumns {
            class_name: field::<String>(raw, "className"),
            short_name: field::<String>(raw, "shortName"),
        }),
        ContentType::OptionalFeature => Derived::OptionalFeature(OptionalFeatureColumns {
            feature_type: feature_type(raw),
        }),
        ContentType::Background | ContentType::Class | ContentType::Condition => Derived::Plain,
    }
}

/// Reads `raw[key]` as `T`, treating a missing or mistyped value as absent.
fn field<T: DeserializeOwned>(raw: &Value, key: &str) -> Option<T> {
    let value = raw.get(key)?;
    match T::deserialize(value) {
        Ok(v) => Some(v),
        Err(err) => {
            debug!(key, error = %err, "Ignoring unexpected field shape");
            None
        }
    }
}

/// Reads `raw.inherits[key]`, used by magic item variants.
fn inherited<T: DeserializeOwned>(raw: &Value, key: &str) -> Option<T> {
    raw.get("inherits").and_then(|inherits| field(inherits, key))
}

/// Maps a one-letter school code to its full name.
///
/// Unrecognized codes pass through unchanged.
///
/// ```
/// use compendium_core::school_name;
///
/// assert_eq!(school_name("V"), "Evocation");
/// assert_eq!(school_name("Chronurgy"), "Chronurgy");
/// ```
pub fn school_name(code: &str) -> String {
    let name = match code {
        "A" => "Abjuration",
        "C" => "Conjuration",
        "D" => "Divination",
        "E" => "Enchantment",
        "V" => "Evocation",
        "I" => "Illusion",
        "N" => "Necromancy",
        "T" => "Transmutation",
        "P" => "Psionic",
        other => other,
    };
    name.to_string()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TimeShape {
    number: Option<Number>,
    unit: Option<String>,
}

/// Formats `time[0]` as `"<number> <unit>"`.
pub fn casting_time(raw: &Value) -> Option<String> {
    let first = field::<Vec<TimeShape>>(raw, "time")?.into_iter().next()?;
    match (first.number, first.unit) {
        (Some(number), Some(unit)) => Some(format!("{number} {unit}")),
        (None, Some(unit)) => Some(unit),
        (Some(number), None) => Some(number.to_string()),
        (None, None) => None,
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DurationShape {
    concentration: bool,
}

/// `true` if any duration entry requires concentration.
pub fn is_concentration(raw: &Value) -> bool {
    raw.get("duration")
        .and_then(Value::as_array)
        .map(|entries| {
            entries.iter().any(|entry| {
                DurationShape::deserialize(entry)
                    .map(|d| d.concentration)
                    .unwrap_or(false)
            })
        })
        .unwrap_or(false)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SpellMetaShape {
    ritual: bool,
}

/// `true` if `meta.ritual` is set.
pub fn is_ritual(raw: &Value) -> bool {
    field::<SpellMetaShape>(raw, "meta")
        .map(|meta| meta.ritual)
        .unwrap_or(false)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct NamedRef {
    pub(crate) name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SubclassRef {
    class: Option<NamedRef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SpellClassesShape {
    from_class_list: Vec<NamedRef>,
    from_class_list_variant: Vec<NamedRef>,
    from_subclass: Vec<SubclassRef>,
}

/// Class names that can cast a spell, merged from the direct class list,
/// the variant class list, and the subclass list, in that order.
pub fn spell_classes(raw: &Value) -> Vec<String> {
    let Some(shape) = field::<SpellClassesShape>(raw, "classes") else {
        return Vec::new();
    };
    let direct = shape.from_class_list.into_iter().filter_map(|c| c.name);
    let variant = shape
        .from_class_list_variant
        .into_iter()
        .filter_map(|c| c.name);
    let subclass = shape
        .from_subclass
        .into_iter()
        .filter_map(|s| s.class.and_then(|c| c.name));
    merge_names(direct.chain(variant).chain(subclass))
}

/// Deduplicates names, keeping the first occurrence of each.
///
/// ```
/// use compendium_core::merge_names;
///
/// let merged = merge_names(["Wizard", "Sorcerer", "Wizard", "Bard"].map(String::from));
/// assert_eq!(merged, vec!["Wizard", "Sorcerer", "Bard"]);
/// ```
pub fn merge_names(names: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .filter(|name| !name.is_empty() && seen.insert(name.clone()))
        .collect()
}

/// Item type code with any `|SOURCE` suffix removed.
fn item_type_code(raw: &Value) -> Option<String> {
    let code = field::<String>(raw, "type").or_else(|| inherited::<String>(raw, "type"))?;
    let code = code.split('|').next().unwrap_or_default().trim().to_string();
    (!code.is_empty()).then_some(code)
}

/// Classifies an item type code into an inventory drop target.
///
/// Melee and ranged weapons are weapons; light, medium, heavy armor and
/// shields are armor. Everything else, including unknown codes, is
/// equipment.
pub fn item_drop_target(type_code: Option<&str>) -> DropTarget {
    match type_code {
        Some("M" | "R") => DropTarget::Weapon,
        Some("LA" | "MA" | "HA" | "S") => DropTarget::Armor,
        _ => DropTarget::Equipment,
    }
}

/// `reqAttune` is `true` or a string describing who may attune.
fn requires_attunement(raw: &Value) -> bool {
    let value = raw
        .get("reqAttune")
        .or_else(|| raw.get("inherits").and_then(|i| i.get("reqAttune")));
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        _ => false,
    }
}

/// Primary optional-feature type code (`featureType[0]`).
fn feature_type(raw: &Value) -> Option<String> {
    match raw.get("featureType")? {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(|v| v.as_str().map(String::from)),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LevelPrereq {
    Plain(i64),
    Detailed {
        level: i64,
        #[serde(default)]
        class: Option<NamedRef>,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RacePrereq {
    name: Option<String>,
    subrace: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PrerequisiteShape {
    level: Option<LevelPrereq>,
    ability: Vec<Map<String, Value>>,
    race: Vec<RacePrereq>,
    spellcasting: bool,
    spellcasting2020: bool,
    proficiency: Vec<Map<String, Value>>,
}

/// Builds a human-readable prerequisite from a feat's `prerequisite` list.
///
/// Clauses are emitted per list entry in the order level, ability score,
/// race, spellcasting, proficiency, and joined with `", "`. Returns `None`
/// when the feat has no prerequisite.
///
/// ```
/// use compendium_core::prerequisite_text;
/// use serde_json::json;
///
/// let feat = json!({
///     "name": "Heavy Armor Master",
///     "prerequisite": [{"proficiency": [{"armor": "heavy"}]}]
/// });
/// assert_eq!(
///     prerequisite_text(&feat).as_deref(),
///     Some("Proficiency with heavy armor")
/// );
/// assert_eq!(prerequisite_text(&json!({"name": "Alert"})), None);
/// ```
pub fn prerequisite_text(raw: &Value) -> Option<String> {
    let entries = raw.get("prerequisite")?.as_array()?;
    let mut clauses = Vec::new();

    for entry in entries {
        let prereq = match PrerequisiteShape::deserialize(entry) {
            Ok(p) => p,
            Err(err) => {
                debug!(error = %err, "Skipping unparseable prerequisite entry");
                continue;
            }
        };

        match prereq.level {
            Some(LevelPrereq::Plain(level)) => clauses.push(format!("Level {level}")),
            Some(LevelPrereq::Detailed { level, class }) => {
                match class.and_then(|c| c.name) {
                    Some(class) => clauses.push(format!("Level {level} {class}")),
                    None => clauses.push(format!("Level {level}")),
                }
            }
            None => {}
        }

        let abilities: Vec<String> = prereq
            .ability
            .iter()
            .flat_map(|choice| choice.iter())
            .map(|(ability, score)| format!("{} {}", ability.to_uppercase(), score))
            .collect();
        if !abilities.is_empty() {
            clauses.push(abilities.join(" or "));
        }

        let races: Vec<String> = prereq
            .race
            .into_iter()
            .filter_map(|race| {
                let name = race.name?;
                Some(match race.subrace {
                    Some(subrace) => format!("{name} ({subrace})"),
                    None => name,
                })
            })
            .collect();
        if !races.is_empty() {
            clauses.push(races.join(" or "));
        }

        if prereq.spellcasting {
            clauses.push("The ability to cast at least one spell".to_string());
        }
        if prereq.spellcasting2020 {
            clauses.push("Spellcasting or Pact Magic feature".to_string());
        }

        for proficiency in &prereq.proficiency {
            for (kind, value) in proficiency {
                let Some(value) = value.as_str() else {
                    continue;
                };
                let clause = match kind.as_str() {
                    "armor" => format!("Proficiency with {value} armor"),
                    "weapon" => format!("Proficiency with {value} weapons"),
                    other => format!("Proficiency with {value} {other}"),
                };
                clauses.push(clause);
            }
        }
    }

    (!clauses.is_empty()).then(|| clauses.join(", "))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_school_codes() {
        assert_eq!(school_name("A"), "Abjuration");
        assert_eq!(school_name("N"), "Necromancy");
        assert_eq!(school_name("X"), "X");
    }

    #[test]
    fn test_casting_time_uses_first_entry() {
        let raw = json!({"time": [
            {"number": 1, "unit": "bonus"},
            {"number": 1, "unit": "action"}
        ]});
        assert_eq!(casting_time(&raw).as_deref(), Some("1 bonus"));
        assert_eq!(casting_time(&json!({"time": []})), None);
        assert_eq!(casting_time(&json!({})), None);
        assert_eq!(
            casting_time(&json!({"time": [{"number": 10, "unit": "minute"}]})).as_deref(),
            Some("10 minute")
        );
    }

    #[test]
    fn test_concentration_from_any_duration_entry() {
        let raw = json!({"duration": [
            {"type": "instant"},
            {"type": "timed", "concentration": true}
        ]});
        assert!(is_concentration(&raw));
        assert!(!is_concentration(&json!({"duration": [{"type": "timed", "concentration": false}]})));
        assert!(!is_concentration(&json!({"duration": "bogus"})));
    }

    #[test]
    fn test_ritual_from_meta() {
        assert!(is_ritual(&json!({"meta": {"ritual": true}})));
        assert!(!is_ritual(&json!({"meta": {}})));
        assert!(!is_ritual(&json!({})));
    }

    #[test]
    fn test_spell_classes_merge_three_locations() {
        let raw = json!({"classes": {
            "fromClassList": [{"name": "Wizard", "source": "PHB"}, {"name": "Sorcerer", "source": "PHB"}],
            "fromClassListVariant": [{"name": "Wizard", "source": "PHB"}, {"name": "Artificer", "source": "TCE"}],
            "fromSubclass": [{"class": {"name": "Cleric", "source": "PHB"}, "subclass": {"name": "Light"}}]
        }});
        assert_eq!(
            spell_classes(&raw),
            vec!["Wizard", "Sorcerer", "Artificer", "Cleric"]
        );
    }

    #[test]
    fn test_spell_classes_missing_is_empty() {
        assert!(spell_classes(&json!({"name": "Nothing"})).is_empty());
        assert!(spell_classes(&json!({"classes": 42})).is_empty());
    }

    #[test]
    fn test_item_drop_target_partition() {
        assert_eq!(item_drop_target(Some("M")), DropTarget::Weapon);
        assert_eq!(item_drop_target(Some("R")), DropTarget::Weapon);
        assert_eq!(item_drop_target(Some("HA")), DropTarget::Armor);
        assert_eq!(item_drop_target(Some("S")), DropTarget::Armor);
        assert_eq!(item_drop_target(Some("P")), DropTarget::Equipment);
        assert_eq!(item_drop_target(Some("??")), DropTarget::Equipment);
        assert_eq!(item_drop_target(None), DropTarget::Equipment);
    }

    #[test]
    fn test_item_columns() {
        let raw = json!({"name": "Longsword", "source": "PHB", "type": "M|XPHB", "rarity": "none"});
        let Derived::Item(item) = derive_columns(ContentType::Item, &raw) else {
            panic!("expected item");
        };
        assert_eq!(item.item_type.as_deref(), Some("M"));
        assert_eq!(item.character_type, DropTarget::Weapon);
        assert_eq!(item.rarity.as_deref(), Some("none"));
        assert!(!item.requires_attunement);
    }

    #[test]
    fn test_magic_variant_inherits_columns() {
        let raw = json!({
            "name": "+1 Armor",
            "inherits": {"source": "DMG", "rarity": "rare", "type": "HA", "reqAttune": "by a paladin"}
        });
        let Derived::Item(item) = derive_columns(ContentType::Item, &raw) else {
            panic!("expected item");
        };
        assert_eq!(item.rarity.as_deref(), Some("rare"));
        assert_eq!(item.character_type, DropTarget::Armor);
        assert!(item.requires_attunement);
    }

    #[test]
    fn test_prerequisite_clauses_in_order() {
        let raw = json!({"prerequisite": [{
            "level": {"level": 4, "class": {"name": "Fighter"}},
            "ability": [{"str": 13}],
            "race": [{"name": "Elf", "subrace": "High"}, {"name": "Half-Elf"}],
            "spellcasting": true,
            "proficiency": [{"weapon": "martial"}]
        }]});
        assert_eq!(
            prerequisite_text(&raw).as_deref(),
            Some(
                "Level 4 Fighter, STR 13, Elf (High) or Half-Elf, \
                 The ability to cast at least one spell, Proficiency with martial weapons"
            )
        );
    }

    #[test]
    fn test_prerequisite_plain_level_and_multiple_entries() {
        let raw = json!({"prerequisite": [{"level": 4}, {"race": [{"name": "Dwarf"}]}]});
        assert_eq!(prerequisite_text(&raw).as_deref(), Some("Level 4, Dwarf"));
    }

    #[test]
    fn test_prerequisite_empty_list_is_none() {
        assert_eq!(prerequisite_text(&json!({"prerequisite": []})), None);
        assert_eq!(prerequisite_text(&json!({"prerequisite": [{"other": true}]})), None);
    }

    #[test]
    fn test_race_and_subclass_columns() {
        let Derived::Race(race) = derive_columns(
            ContentType::Race,
            &json!({"name": "High", "raceName": "Elf", "raceSource": "PHB"}),
        ) else {
            panic!("expected race");
        };
        assert_eq!(race.subrace_of.as_deref(), Some("Elf"));

        let Derived::Subclass(sub) = derive_columns(
            ContentType::Subclass,
            &json!({"name": "Oath of Devotion", "shortName": "Devotion", "className": "Paladin"}),
        ) else {
            panic!("expected subclass");
        };
        assert_eq!(sub.class_name.as_deref(), Some("Paladin"));
        assert_eq!(sub.short_name.as_deref(), Some("Devotion"));
    }

    #[test]
    fn test_feature_type_takes_first_code() {
        let Derived::OptionalFeature(of) = derive_columns(
            ContentType::OptionalFeature,
            &json!({"name": "Agonizing Blast", "featureType": ["EI", "X"]}),
        ) else {
            panic!("expected optional feature");
        };
        assert_eq!(of.feature_type.as_deref(), Some("EI"));
    }

    #[test]
    fn test_plain_types() {
        for ct in [ContentType::Background, ContentType::Class, ContentType::Condition] {
            assert_eq!(derive_columns(ct, &json!({"name": "X"})), Derived::Plain);
        }
    }

    #[test]
    fn test_mistyped_level_is_absent() {
        let Derived::Spell(spell) =
            derive_columns(ContentType::Spell, &json!({"level": "three", "school": "V"}))
        else {
            panic!("expected spell");
        };
        assert_eq!(spell.level, None);
        assert_eq!(spell.school.as_deref(), Some("Evocation"));
    }
}

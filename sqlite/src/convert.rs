//! Conversion between compendium records and SQLite rows.
//!
//! Writes flatten a [`Derived`] projection into the descriptor's column
//! order; reads rebuild the projection from the same columns and parse
//! `raw` back into the original JSON object.

use compendium_core::{
    ContentType, Derived, DropTarget, EntryKey, FeatColumns, ItemColumns,
    OptionalFeatureColumns, RaceColumns, ResultRecord, SpellColumns, SubclassColumns,
};
use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{CachedStatement, Connection, Row, params_from_iter};
use serde_json::Value;

use crate::error::{CompendiumError, Result};
use crate::schema::table_name;

fn text(value: Option<&str>) -> SqlValue {
    value.map_or(SqlValue::Null, |s| SqlValue::Text(s.to_string()))
}

fn flag(value: bool) -> SqlValue {
    SqlValue::Integer(i64::from(value))
}

/// Flattens derived columns into SQL values in descriptor order.
pub(crate) fn derived_values(derived: &Derived) -> Result<Vec<SqlValue>> {
    let values = match derived {
        Derived::Spell(s) => vec![
            s.level.map_or(SqlValue::Null, SqlValue::Integer),
            text(s.school.as_deref()),
            text(s.casting_time.as_deref()),
            flag(s.concentration),
            flag(s.ritual),
            SqlValue::Text(serde_json::to_string(&s.classes)?),
        ],
        Derived::Item(i) => vec![
            text(i.item_type.as_deref()),
            SqlValue::Text(i.character_type.as_str().to_string()),
            text(i.rarity.as_deref()),
            flag(i.requires_attunement),
        ],
        Derived::Feat(f) => vec![text(f.prerequisite.as_deref())],
        Derived::Race(r) => vec![text(r.subrace_of.as_deref())],
        Derived::Subclass(s) => vec![text(s.class_name.as_deref()), text(s.short_name.as_deref())],
        Derived::OptionalFeature(o) => vec![text(o.feature_type.as_deref())],
        Derived::Plain => Vec::new(),
    };
    Ok(values)
}

/// Prepared `INSERT OR REPLACE` for one content type's table.
///
/// Built once per stage; each [`insert`](Self::insert) only binds values.
pub(crate) struct RowWriter<'conn> {
    stmt: CachedStatement<'conn>,
    ct: ContentType,
}

impl<'conn> RowWriter<'conn> {
    pub(crate) fn new(conn: &'conn Connection, prefix: &str, ct: ContentType) -> Result<Self> {
        let desc = ct.descriptor();
        let mut columns = vec!["id", "name", "source"];
        columns.extend(desc.columns.iter().map(|c| c.name));
        if desc.has_features {
            columns.push("features");
        }
        columns.push("raw");

        let placeholders = (1..=columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let stmt = conn.prepare_cached(&format!(
            "INSERT OR REPLACE INTO {} ({}) VALUES ({placeholders})",
            table_name(prefix, ct),
            columns.join(", ")
        ))?;
        Ok(Self { stmt, ct })
    }

    /// Inserts one record, replacing any row with the same id.
    pub(crate) fn insert(
        &mut self,
        key: &EntryKey,
        derived: &Derived,
        features: Option<&[Value]>,
        raw: &Value,
    ) -> Result<()> {
        let desc = self.ct.descriptor();
        let derived = derived_values(derived)?;
        if derived.len() != desc.columns.len() {
            return Err(CompendiumError::ConversionError(format!(
                "{} expects {} derived columns, got {}",
                self.ct,
                desc.columns.len(),
                derived.len()
            )));
        }

        let mut values = vec![
            SqlValue::Text(key.id()),
            SqlValue::Text(key.name.clone()),
            SqlValue::Text(key.source.clone()),
        ];
        values.extend(derived);
        if desc.has_features {
            values.push(SqlValue::Text(serde_json::to_string(features.unwrap_or_default())?));
        }
        values.push(SqlValue::Text(serde_json::to_string(raw)?));

        self.stmt.execute(params_from_iter(values))?;
        Ok(())
    }
}

/// Column list selected for result records, qualified with `alias`.
///
/// Order: `id`, `name`, `source`, derived columns, `raw`.
pub(crate) fn select_columns(ct: ContentType, alias: &str) -> String {
    let mut cols = vec![
        format!("{alias}.id"),
        format!("{alias}.name"),
        format!("{alias}.source"),
    ];
    cols.extend(
        ct.descriptor()
            .columns
            .iter()
            .map(|c| format!("{alias}.{}", c.name)),
    );
    cols.push(format!("{alias}.raw"));
    cols.join(", ")
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Rebuilds a [`ResultRecord`] from a row selected with [`select_columns`].
pub(crate) fn row_to_record(row: &Row<'_>, ct: ContentType) -> rusqlite::Result<ResultRecord> {
    let desc = ct.descriptor();
    let raw_idx = 3 + desc.columns.len();

    let derived = match ct {
        ContentType::Spell => {
            let classes: Option<String> = row.get(8)?;
            let classes = match classes.as_deref() {
                None | Some("") => Vec::new(),
                Some(_) => json_column(row, 8)?,
            };
            Derived::Spell(SpellColumns {
                level: row.get(3)?,
                school: row.get(4)?,
                casting_time: row.get(5)?,
                concentration: row.get(6)?,
                ritual: row.get(7)?,
                classes,
            })
        }
        ContentType::Item => Derived::Item(ItemColumns {
            item_type: row.get(3)?,
            character_type: row
                .get::<_, Option<String>>(4)?
                .map(|s| DropTarget::from_stored(&s))
                .unwrap_or_default(),
            rarity: row.get(5)?,
            requires_attunement: row.get(6)?,
        }),
        ContentType::Feat => Derived::Feat(FeatColumns {
            prerequisite: row.get(3)?,
        }),
        ContentType::Race => Derived::Race(RaceColumns {
            subrace_of: row.get(3)?,
        }),
        ContentType::Subclass => Derived::Subclass(SubclassColumns {
            class_name: row.get(3)?,
            short_name: row.get(4)?,
        }),
        ContentType::OptionalFeature => Derived::OptionalFeature(OptionalFeatureColumns {
            feature_type: row.get(3)?,
        }),
        ContentType::Background | ContentType::Class | ContentType::Condition => Derived::Plain,
    };

    Ok(ResultRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        source: row.get(2)?,
        content_type: ct,
        drop_target: ct.drop_target(&derived),
        derived,
        raw: json_column(row, raw_idx)?,
    })
}

/// Parses a stored `features` column; `NULL` reads as an empty list.
pub(crate) fn parse_features(stored: Option<String>) -> Result<Vec<Value>> {
    match stored {
        Some(text) if !text.is_empty() => Ok(serde_json::from_str(&text)?),
        _ => Ok(Vec::new()),
    }
}

//! Spell → class reconciliation.
//!
//! Primary spell records do not always carry class data. Two passes fix
//! the derived `classes` column after the spell stage:
//!
//! 1. [`apply_overrides`] overwrites `classes` for every spell named in the
//!    export's override file.
//! 2. [`repair_spell_classes`] rescans spells whose `classes` is still
//!    empty and recomputes it from the stored `raw` payload.
//!
//! Both passes only touch the derived column; `raw` is never rewritten.

use compendium_core::{ContentType, spell_classes};
use compendium_db::SpellClassOverrides;
use rusqlite::{Connection, params};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Result;
use crate::schema::table_name;

/// Outcome of a repair pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    /// Spell rows whose `classes` column was empty before the pass.
    pub scanned: usize,
    /// Rows that received a non-empty class list.
    pub repaired: usize,
}

impl RepairReport {
    /// Rows still without classes after the pass.
    pub fn still_empty(&self) -> usize {
        self.scanned - self.repaired
    }
}

/// Writes override class lists onto matching spell rows.
///
/// Returns the number of rows updated. Overrides naming spells that were
/// not imported are ignored.
pub(crate) fn apply_overrides(
    conn: &Connection,
    prefix: &str,
    overrides: &SpellClassOverrides,
) -> Result<usize> {
    if overrides.is_empty() {
        return Ok(0);
    }

    let mut stmt = conn.prepare(&format!(
        "UPDATE {} SET classes = ?1 WHERE id = ?2",
        table_name(prefix, ContentType::Spell)
    ))?;

    let mut patched = 0;
    for (id, classes) in overrides.iter() {
        let encoded = serde_json::to_string(classes)?;
        patched += stmt.execute(params![encoded, id])?;
    }

    debug!(overrides = overrides.len(), patched, "Applied spell class overrides");
    Ok(patched)
}

/// Recomputes `classes` from `raw` for spells where it is empty.
///
/// Rows whose payload still yields no classes are left alone, so a second
/// run scans the same rows and repairs none of them.
pub(crate) fn repair_spell_classes(conn: &Connection, prefix: &str) -> Result<RepairReport> {
    let table = table_name(prefix, ContentType::Spell);

    let candidates: Vec<(String, String)> = {
        let mut stmt = conn.prepare(&format!(
            "SELECT id, raw FROM {table} \
             WHERE classes IS NULL OR classes = '' OR classes = '[]' \
             ORDER BY id"
        ))?;
        stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?
    };

    let mut report = RepairReport {
        scanned: candidates.len(),
        repaired: 0,
    };

    let mut update = conn.prepare(&format!("UPDATE {table} SET classes = ?1 WHERE id = ?2"))?;
    for (id, raw) in candidates {
        let raw: Value = match serde_json::from_str(&raw) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(id, error = %err, "Stored spell payload is not valid JSON");
                continue;
            }
        };
        let classes = spell_classes(&raw);
        if classes.is_empty() {
            continue;
        }
        update.execute(params![serde_json::to_string(&classes)?, id])?;
        report.repaired += 1;
    }

    debug!(
        scanned = report.scanned,
        repaired = report.repaired,
        "Repaired spell classes"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::schema::generate_schema_sql;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(&generate_schema_sql("t_").unwrap()).unwrap();
        conn
    }

    fn insert_spell(conn: &Connection, id: &str, classes: Option<&str>, raw: &Value) {
        let (name, source) = id.split_once('|').unwrap();
        conn.execute(
            "INSERT INTO t_spells (id, name, source, classes, raw) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, name, source, classes, raw.to_string()],
        )
        .unwrap();
    }

    fn classes_of(conn: &Connection, id: &str) -> Option<String> {
        conn.query_row("SELECT classes FROM t_spells WHERE id = ?1", [id], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_overrides_patch_only_known_spells() {
        let conn = setup();
        insert_spell(&conn, "Light|PHB", Some("[]"), &json!({"name": "Light", "source": "PHB"}));

        let overrides = SpellClassOverrides::from_value(&json!({
            "PHB": {
                "Light": {"class": [{"name": "Bard"}, {"name": "Cleric"}]},
                "Missing": {"class": [{"name": "Wizard"}]}
            }
        }))
        .unwrap();

        assert_eq!(apply_overrides(&conn, "t_", &overrides).unwrap(), 1);
        assert_eq!(classes_of(&conn, "Light|PHB").as_deref(), Some(r#"["Bard","Cleric"]"#));
    }

    #[test]
    fn test_repair_fills_from_raw() {
        let conn = setup();
        let raw = json!({
            "name": "Shield", "source": "PHB",
            "classes": {"fromClassList": [{"name": "Sorcerer"}, {"name": "Wizard"}]}
        });
        insert_spell(&conn, "Shield|PHB", None, &raw);
        insert_spell(&conn, "Oddity|HB", Some("[]"), &json!({"name": "Oddity", "source": "HB"}));

        let first = repair_spell_classes(&conn, "t_").unwrap();
        assert_eq!(first, RepairReport { scanned: 2, repaired: 1 });
        assert_eq!(
            classes_of(&conn, "Shield|PHB").as_deref(),
            Some(r#"["Sorcerer","Wizard"]"#)
        );

        let second = repair_spell_classes(&conn, "t_").unwrap();
        assert_eq!(second, RepairReport { scanned: 1, repaired: 0 });
        assert_eq!(first.still_empty(), second.still_empty());
    }
}

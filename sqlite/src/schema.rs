//! SQL schema generation with customizable table prefixes.
//!
//! Each [`ContentType`] owns a base table and an FTS5 shadow index:
//!
//! - `{prefix}{table}` — `id` (`name|source`), `name`, `source`, the type's
//!   derived filter columns, an optional `features` list, and `raw`
//! - `{prefix}{table}_fts` — external-content FTS5 table over `name`,
//!   `source` and any extra text column, keyed on the base table's `rowid`
//!
//! plus `{prefix}meta`, a key/value table whose `imported_at` row marks the
//! store as populated.
//!
//! The FTS tables carry no triggers. Bulk loads finish with
//! [`generate_rebuild_sql`] and clears use [`generate_clear_sql`], which
//! resets the indexes with `delete-all`.
//!
//! # Custom prefix
//!
//! Prefixes must contain only ASCII alphanumeric characters and
//! underscores and must not start with a digit, allowing isolated compendiums (e.g. `cmp_`, `test_`) in
//! the same SQLite database.

use compendium_core::{ContentType, TypeDescriptor};

use crate::error::{CompendiumError, Result};

/// Meta key whose presence marks a completed import.
pub(crate) const META_IMPORTED_AT: &str = "imported_at";
/// Meta key holding the JSON import manifest.
pub(crate) const META_MANIFEST: &str = "manifest";

/// Validates that a table prefix contains only alphanumeric characters and
/// underscores and does not start with a digit.
pub(crate) fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() || prefix.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(CompendiumError::InvalidPrefix(prefix.to_string()));
    }
    if !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(CompendiumError::InvalidPrefix(prefix.to_string()));
    }
    Ok(())
}

/// Prefixed base table name for a content type.
pub(crate) fn table_name(prefix: &str, ct: ContentType) -> String {
    format!("{prefix}{}", ct.descriptor().table)
}

/// Prefixed FTS5 table name for a content type.
pub(crate) fn fts_name(prefix: &str, ct: ContentType) -> String {
    format!("{prefix}{}_fts", ct.descriptor().table)
}

pub(crate) fn meta_name(prefix: &str) -> String {
    format!("{prefix}meta")
}

fn table_sql(prefix: &str, desc: &TypeDescriptor) -> String {
    let table = table_name(prefix, desc.content_type);
    let fts = fts_name(prefix, desc.content_type);

    let mut columns = vec![
        "    id TEXT PRIMARY KEY".to_string(),
        "    name TEXT NOT NULL".to_string(),
        "    source TEXT NOT NULL".to_string(),
    ];
    columns.extend(
        desc.columns
            .iter()
            .map(|c| format!("    {} {}", c.name, c.kind.sql_type())),
    );
    if desc.has_features {
        columns.push("    features TEXT".to_string());
    }
    columns.push("    raw TEXT NOT NULL".to_string());

    format!(
        r#"
CREATE TABLE IF NOT EXISTS {table} (
{columns}
);
CREATE INDEX IF NOT EXISTS idx_{table}_name ON {table}(name);
CREATE VIRTUAL TABLE IF NOT EXISTS {fts} USING fts5(
    {fts_columns},
    content='{table}',
    content_rowid='rowid',
    tokenize='unicode61'
);
"#,
        columns = columns.join(",\n"),
        fts_columns = desc.fts_columns().join(", "),
    )
}

/// Generates the complete SQL schema for all tables with the given prefix.
///
/// Every statement uses `IF NOT EXISTS`, so the script is safe to run on
/// every open.
///
/// # Errors
///
/// Returns [`CompendiumError::InvalidPrefix`] if the prefix contains
/// characters other than alphanumerics and underscores, or if it is empty.
pub fn generate_schema_sql(prefix: &str) -> Result<String> {
    validate_prefix(prefix)?;

    let mut sql: String = ContentType::ALL
        .iter()
        .map(|ct| table_sql(prefix, ct.descriptor()))
        .collect();

    sql.push_str(&format!(
        r#"
CREATE TABLE IF NOT EXISTS {meta} (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#,
        meta = meta_name(prefix)
    ));

    Ok(sql)
}

/// Generates SQL deleting every base row, FTS entry and meta row.
pub fn generate_clear_sql(prefix: &str) -> Result<String> {
    validate_prefix(prefix)?;

    let mut sql = String::new();
    for ct in ContentType::ALL {
        let table = table_name(prefix, ct);
        let fts = fts_name(prefix, ct);
        sql.push_str(&format!(
            "DELETE FROM {table};\nINSERT INTO {fts}({fts}) VALUES('delete-all');\n"
        ));
    }
    sql.push_str(&format!("DELETE FROM {};\n", meta_name(prefix)));
    Ok(sql)
}

/// Generates SQL rebuilding every FTS index from its base table.
pub fn generate_rebuild_sql(prefix: &str) -> Result<String> {
    validate_prefix(prefix)?;

    Ok(ContentType::ALL
        .iter()
        .map(|ct| {
            let fts = fts_name(prefix, *ct);
            format!("INSERT INTO {fts}({fts}) VALUES('rebuild');\n")
        })
        .collect())
}

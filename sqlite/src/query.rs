//! Search and retrieval over stored compendium content.
//!
//! Provides [`CompendiumQuery`], a read-only view over one table prefix.
//! Free-text search goes through each type's FTS5 index joined back to the
//! base table on `rowid`; filters become extra `AND` predicates on the
//! derived columns. Results are ordered by name (then source), never by
//! relevance.
//!
//! # Example
//!
//! ```no_run
//! use compendium_core::{ContentType, FilterSet};
//! use compendium_sqlite::CompendiumQuery;
//! use rusqlite::Connection;
//!
//! let conn = Connection::open("compendium.db").unwrap();
//! let query = CompendiumQuery::new(&conn, "cmp_").unwrap();
//!
//! let filters = FilterSet { levels: vec![3], ..Default::default() };
//! for spell in query.search("fire", ContentType::Spell, &filters, 20, 0).unwrap() {
//!     println!("{} ({})", spell.name, spell.source);
//! }
//! ```

use compendium_core::{ContentType, FilterSet, ResultRecord, school_name};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde_json::Value;

use crate::convert::{parse_features, row_to_record, select_columns};
use crate::error::Result;
use crate::schema::{fts_name, table_name, validate_prefix};

/// Builds an FTS5 match expression from free text.
///
/// Quote characters are stripped, the text is split on whitespace, each
/// token becomes a quoted prefix query, and tokens are `AND`-ed. Returns
/// `None` when no token contains a letter or digit.
///
/// # Examples
///
/// ```
/// use compendium_sqlite::fts_match_expression;
///
/// assert_eq!(fts_match_expression("fire ball").as_deref(), Some(r#""fire"* AND "ball"*"#));
/// assert_eq!(fts_match_expression(r#"  "quoted"  "#).as_deref(), Some(r#""quoted"*"#));
/// assert_eq!(fts_match_expression(" - "), None);
/// ```
pub fn fts_match_expression(query: &str) -> Option<String> {
    let cleaned = query.replace('"', "");
    let tokens: Vec<String> = cleaned
        .split_whitespace()
        .filter(|t| t.chars().any(char::is_alphanumeric))
        .map(|t| format!("\"{t}\"*"))
        .collect();
    (!tokens.is_empty()).then(|| tokens.join(" AND "))
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Appends `column IN (...)` when `values` is non-empty and the type has
/// the column.
fn push_in_list<T: Clone + Into<SqlValue>>(
    ct: ContentType,
    column: &str,
    values: &[T],
    clauses: &mut Vec<String>,
    params: &mut Vec<SqlValue>,
) {
    if values.is_empty() || !ct.descriptor().has_column(column) {
        return;
    }
    clauses.push(format!("t.{column} IN ({})", placeholders(values.len())));
    params.extend(values.iter().cloned().map(Into::into));
}

fn push_flag(
    ct: ContentType,
    column: &str,
    value: Option<bool>,
    clauses: &mut Vec<String>,
    params: &mut Vec<SqlValue>,
) {
    let Some(value) = value else { return };
    if !ct.descriptor().has_column(column) {
        return;
    }
    clauses.push(format!("t.{column} = ?"));
    params.push(SqlValue::Integer(i64::from(value)));
}

/// Compiles a search into SQL and its positional parameters.
pub(crate) fn build_search_sql(
    prefix: &str,
    query: &str,
    ct: ContentType,
    filters: &FilterSet,
    limit: usize,
    offset: usize,
) -> (String, Vec<SqlValue>) {
    let table = table_name(prefix, ct);
    let mut sql = format!("SELECT {} FROM {table} t", select_columns(ct, "t"));
    let mut clauses = Vec::new();
    let mut params = Vec::new();

    match fts_match_expression(query) {
        Some(expr) => {
            let fts = fts_name(prefix, ct);
            sql.push_str(&format!(" JOIN {fts} ON {fts}.rowid = t.rowid"));
            clauses.push(format!("{fts} MATCH ?"));
            params.push(SqlValue::Text(expr));
        }
        None if ct == ContentType::Race => clauses.push("t.subrace_of IS NULL".to_string()),
        None => {}
    }

    if !filters.sources.is_empty() {
        clauses.push(format!("t.source IN ({})", placeholders(filters.sources.len())));
        params.extend(filters.sources.iter().cloned().map(SqlValue::Text));
    }
    push_in_list(ct, "level", &filters.levels, &mut clauses, &mut params);
    // Stored as full names; accept either the export's codes or names.
    let schools: Vec<String> = filters.schools.iter().map(|s| school_name(s)).collect();
    push_in_list(ct, "school", &schools, &mut clauses, &mut params);
    push_in_list(ct, "rarity", &filters.rarities, &mut clauses, &mut params);
    push_in_list(ct, "item_type", &filters.item_types, &mut clauses, &mut params);
    push_in_list(ct, "feature_type", &filters.feature_types, &mut clauses, &mut params);
    push_flag(ct, "ritual", filters.ritual, &mut clauses, &mut params);
    push_flag(ct, "concentration", filters.concentration, &mut clauses, &mut params);
    push_flag(
        ct,
        "requires_attunement",
        filters.requires_attunement,
        &mut clauses,
        &mut params,
    );

    // Substring match on the JSON list: "Ranger" also matches "Ranger (Revised)".
    if !filters.classes.is_empty() && ct.descriptor().has_column("classes") {
        let ors = vec!["t.classes LIKE ?"; filters.classes.len()].join(" OR ");
        clauses.push(format!("({ors})"));
        params.extend(
            filters
                .classes
                .iter()
                .map(|c| SqlValue::Text(format!("%{c}%"))),
        );
    }

    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY t.name, t.source LIMIT ? OFFSET ?");
    params.push(SqlValue::Integer(limit as i64));
    params.push(SqlValue::Integer(offset as i64));

    (sql, params)
}

/// Read-only query interface over one compendium table prefix.
pub struct CompendiumQuery<'a> {
    conn: &'a Connection,
    prefix: String,
}

impl<'a> CompendiumQuery<'a> {
    /// Creates a query interface for the given connection and table prefix.
    ///
    /// # Errors
    ///
    /// Returns [`CompendiumError::InvalidPrefix`](crate::CompendiumError::InvalidPrefix)
    /// if the prefix is invalid.
    pub fn new(conn: &'a Connection, prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        validate_prefix(&prefix)?;
        Ok(Self { conn, prefix })
    }

    /// Searches one content type.
    ///
    /// An empty (or punctuation-only) `query` lists the whole type, minus
    /// subraces for [`ContentType::Race`]. Filters naming columns the type
    /// does not have are ignored.
    pub fn search(
        &self,
        query: &str,
        ct: ContentType,
        filters: &FilterSet,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ResultRecord>> {
        let (sql, params) = build_search_sql(&self.prefix, query, ct, filters, limit, offset);
        self.collect(ct, &sql, params)
    }

    /// Fetches one record by `name|source` id.
    pub fn get_entry(&self, id: &str, ct: ContentType) -> Result<Option<ResultRecord>> {
        let sql = format!(
            "SELECT {} FROM {} t WHERE t.id = ?1",
            select_columns(ct, "t"),
            table_name(&self.prefix, ct)
        );
        let record = self
            .conn
            .query_row(&sql, params![id], |row| row_to_record(row, ct))
            .optional()?;
        Ok(record)
    }

    /// Distinct sources present for a content type, sorted.
    pub fn list_sources(&self, ct: ContentType) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT DISTINCT source FROM {} ORDER BY source",
            table_name(&self.prefix, ct)
        ))?;
        let sources = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sources)
    }

    /// Subrace rows whose parent race is `race_name`.
    pub fn list_subraces(&self, race_name: &str) -> Result<Vec<ResultRecord>> {
        let ct = ContentType::Race;
        let sql = format!(
            "SELECT {} FROM {} t WHERE t.subrace_of = ? ORDER BY t.name, t.source",
            select_columns(ct, "t"),
            table_name(&self.prefix, ct)
        );
        self.collect(ct, &sql, vec![SqlValue::Text(race_name.to_string())])
    }

    /// Subclasses of `class_name`, ordered by source then name.
    pub fn list_subclasses(&self, class_name: &str) -> Result<Vec<ResultRecord>> {
        let ct = ContentType::Subclass;
        let sql = format!(
            "SELECT {} FROM {} t WHERE t.class_name = ? ORDER BY t.source, t.name",
            select_columns(ct, "t"),
            table_name(&self.prefix, ct)
        );
        self.collect(ct, &sql, vec![SqlValue::Text(class_name.to_string())])
    }

    /// Feature entries gained at `level`.
    ///
    /// Class features come first, then those of `subclass_name` (matched by
    /// full or short name). When a class or subclass exists in several
    /// sources, the first source alphabetically is used.
    pub fn class_features_at_level(
        &self,
        class_name: &str,
        level: i64,
        subclass_name: Option<&str>,
    ) -> Result<Vec<Value>> {
        let class_features: Option<Option<String>> = self
            .conn
            .query_row(
                &format!(
                    "SELECT features FROM {} WHERE name = ?1 ORDER BY source LIMIT 1",
                    table_name(&self.prefix, ContentType::Class)
                ),
                params![class_name],
                |row| row.get(0),
            )
            .optional()?;

        let mut features = parse_features(class_features.flatten())?;

        if let Some(subclass) = subclass_name {
            let subclass_features: Option<Option<String>> = self
                .conn
                .query_row(
                    &format!(
                        "SELECT features FROM {} \
                         WHERE class_name = ?1 AND (name = ?2 OR short_name = ?2) \
                         ORDER BY source LIMIT 1",
                        table_name(&self.prefix, ContentType::Subclass)
                    ),
                    params![class_name, subclass],
                    |row| row.get(0),
                )
                .optional()?;
            features.extend(parse_features(subclass_features.flatten())?);
        }

        features.retain(|f| f.get("level").and_then(Value::as_i64) == Some(level));
        Ok(features)
    }

    fn collect(
        &self,
        ct: ContentType,
        sql: &str,
        params: Vec<SqlValue>,
    ) -> Result<Vec<ResultRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let records = stmt
            .query_map(params_from_iter(params), |row| row_to_record(row, ct))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

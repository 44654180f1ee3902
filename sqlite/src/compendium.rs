//! The compendium engine.
//!
//! [`Compendium`] owns one SQLite connection and a table prefix. Opening it
//! creates the schema if absent; everything else is an explicit method
//! call on the handle. There is no global state.
//!
//! # Example
//!
//! ```no_run
//! use compendium_core::{ContentType, FilterSet};
//! use compendium_sqlite::Compendium;
//!
//! let mut compendium = Compendium::open("compendium.db").unwrap();
//!
//! let report = compendium
//!     .import_compendium("data/", |p| println!("{} {}/{}", p.stage, p.current, p.total))
//!     .unwrap();
//! println!("imported {} records", report.total());
//!
//! let status = compendium.status().unwrap();
//! assert!(status.imported);
//!
//! let hits = compendium
//!     .search("fireball", ContentType::Spell, &FilterSet::default(), 50, 0)
//!     .unwrap();
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use compendium_core::{CompendiumStatus, ContentType, FilterSet, ImportProgress, ResultRecord};
use compendium_db::{
    CompendiumConfig, DEFAULT_BATCH_SIZE, DEFAULT_LIMIT, DEFAULT_PREFIX, ExportDirectory,
    ImportManifest,
};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::import::{self, ImportReport};
use crate::query::CompendiumQuery;
use crate::reconcile::{self, RepairReport};
use crate::schema::{
    META_IMPORTED_AT, META_MANIFEST, generate_clear_sql, generate_schema_sql, meta_name,
    table_name, validate_prefix,
};

/// A local, searchable store of reference content.
///
/// States: *empty* until an import completes, *ready* afterwards, and
/// *empty* again after [`clear`](Self::clear). The `imported_at` meta row
/// is the only marker of readiness.
pub struct Compendium {
    conn: Connection,
    prefix: String,
    batch_size: usize,
    default_limit: usize,
}

impl Compendium {
    /// Wraps an open connection and creates the schema if absent.
    ///
    /// # Errors
    ///
    /// Returns [`CompendiumError::InvalidPrefix`](crate::CompendiumError::InvalidPrefix)
    /// if the prefix contains invalid characters, or a database error if
    /// the schema cannot be created.
    pub fn new(conn: Connection, prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        validate_prefix(&prefix)?;
        let compendium = Self {
            conn,
            prefix,
            batch_size: DEFAULT_BATCH_SIZE,
            default_limit: DEFAULT_LIMIT,
        };
        compendium.ensure_schema()?;
        Ok(compendium)
    }

    /// Opens (or creates) a file-backed compendium with the default prefix.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_prefix(path, DEFAULT_PREFIX)
    }

    /// Opens (or creates) a file-backed compendium with WAL journaling.
    pub fn open_with_prefix(path: impl AsRef<Path>, prefix: impl Into<String>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        debug!(path = %path.display(), "Opened compendium database");
        Self::new(conn, prefix)
    }

    /// Opens an in-memory compendium, mostly useful for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?, DEFAULT_PREFIX)
    }

    /// Opens the database named by `config` with its prefix and tuning.
    pub fn from_config(config: &CompendiumConfig) -> Result<Self> {
        config.validate()?;
        let mut compendium = Self::open_with_prefix(&config.database, &config.table_prefix)?;
        compendium.batch_size = config.batch_size;
        compendium.default_limit = config.default_limit;
        Ok(compendium)
    }

    /// Sets how many rows are written between progress events.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Result cap used by callers that do not choose one.
    pub fn default_limit(&self) -> usize {
        self.default_limit
    }

    /// Creates every table, index and FTS table if absent.
    ///
    /// Safe to call any number of times.
    pub fn ensure_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(&generate_schema_sql(&self.prefix)?)?;
        Ok(())
    }

    /// Reports whether the store is populated and with how many rows.
    ///
    /// `counts` is empty unless `imported` is `true`, in which case it
    /// lists every content type.
    pub fn status(&self) -> Result<CompendiumStatus> {
        let Some(imported_at) = self.meta(META_IMPORTED_AT)? else {
            return Ok(CompendiumStatus::default());
        };

        let mut counts = BTreeMap::new();
        for ct in ContentType::ALL {
            let count: i64 = self.conn.query_row(
                &format!("SELECT COUNT(*) FROM {}", table_name(&self.prefix, ct)),
                [],
                |row| row.get(0),
            )?;
            counts.insert(ct, count as usize);
        }

        Ok(CompendiumStatus {
            imported: true,
            imported_at: Some(imported_at),
            counts,
        })
    }

    /// Replaces the store's contents with the export at `path`.
    ///
    /// Runs in a single transaction: on error nothing changes. `on_progress`
    /// is called synchronously for each stage and finally with a `done`
    /// event after the commit.
    pub fn import_compendium<F>(
        &mut self,
        path: impl AsRef<Path>,
        mut on_progress: F,
    ) -> Result<ImportReport>
    where
        F: FnMut(&ImportProgress),
    {
        let export = ExportDirectory::new(path.as_ref());
        if !export.exists() {
            warn!(root = %export.root().display(), "Export directory does not exist");
        }
        info!(root = %export.root().display(), "Importing compendium");

        let tx = self.conn.transaction()?;
        let report = import::run_import(&tx, &self.prefix, &export, self.batch_size, &mut on_progress)?;
        tx.commit()?;

        info!(
            total = report.total(),
            rejected = report.rejected,
            replaced = report.replaced,
            reconciled = report.reconciled,
            repaired = report.repair.repaired,
            "Import complete"
        );
        on_progress(&ImportProgress::complete(report.total()));
        Ok(report)
    }

    /// Deletes every row, index entry and meta row.
    pub fn clear(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(&generate_clear_sql(&self.prefix)?)?;
        tx.commit()?;
        info!(prefix = %self.prefix, "Cleared compendium");
        Ok(())
    }

    /// Runs the spell class repair pass on demand.
    pub fn repair_spell_classes(&mut self) -> Result<RepairReport> {
        let tx = self.conn.transaction()?;
        let report = reconcile::repair_spell_classes(&tx, &self.prefix)?;
        tx.commit()?;
        Ok(report)
    }

    /// The manifest stored by the last import, if any.
    pub fn manifest(&self) -> Result<Option<ImportManifest>> {
        match self.meta(META_MANIFEST)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Export files that differ from the last import.
    ///
    /// Scans `path` without storing anything and compares checksums with
    /// the stored manifest. Before any import every file found is reported.
    /// Paths are relative to the export root and sorted.
    pub fn changed_files(&self, path: impl AsRef<Path>) -> Result<Vec<String>> {
        let export = ExportDirectory::new(path.as_ref());
        let current = export.scan_manifest();
        let stored = self
            .manifest()?
            .unwrap_or_else(|| ImportManifest::new(export.root()));
        Ok(stored.changed_files(&current))
    }

    /// See [`CompendiumQuery::search`].
    pub fn search(
        &self,
        query: &str,
        ct: ContentType,
        filters: &FilterSet,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ResultRecord>> {
        self.query()?.search(query, ct, filters, limit, offset)
    }

    pub fn get_entry(&self, id: &str, ct: ContentType) -> Result<Option<ResultRecord>> {
        self.query()?.get_entry(id, ct)
    }

    pub fn list_sources(&self, ct: ContentType) -> Result<Vec<String>> {
        self.query()?.list_sources(ct)
    }

    pub fn list_subraces(&self, race_name: &str) -> Result<Vec<ResultRecord>> {
        self.query()?.list_subraces(race_name)
    }

    pub fn list_subclasses(&self, class_name: &str) -> Result<Vec<ResultRecord>> {
        self.query()?.list_subclasses(class_name)
    }

    pub fn class_features_at_level(
        &self,
        class_name: &str,
        level: i64,
        subclass_name: Option<&str>,
    ) -> Result<Vec<Value>> {
        self.query()?
            .class_features_at_level(class_name, level, subclass_name)
    }

    /// Returns a reference to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Consumes the engine and returns the underlying connection.
    pub fn into_connection(self) -> Connection {
        self.conn
    }

    /// Closes the connection, reporting any error SQLite returns.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, err)| err)?;
        Ok(())
    }

    fn query(&self) -> Result<CompendiumQuery<'_>> {
        CompendiumQuery::new(&self.conn, self.prefix.as_str())
    }

    fn meta(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                &format!("SELECT value FROM {} WHERE key = ?1", meta_name(&self.prefix)),
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }
}

//! Whole-directory import pipeline.
//!
//! Runs inside a caller-owned transaction:
//!
//! 1. clear every base table, FTS index and meta row
//! 2. for each [`ContentType`] in [`ContentType::ALL`] order, load the
//!    stage, derive columns and insert rows, reporting progress every
//!    `batch_size` rows and once at the end of the stage
//! 3. after spells, apply class overrides and run the repair pass
//! 4. rebuild every FTS index
//! 5. write the manifest and, last, `imported_at`
//!
//! A failure anywhere leaves the transaction to be rolled back, so the
//! store keeps whatever state it had before the import started.

use std::collections::{BTreeMap, HashSet};

use compendium_core::{ContentType, ImportProgress, derive_columns, entry_key};
use compendium_db::{ExportDirectory, ImportManifest, StageSource};
use rusqlite::{Connection, params};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::convert::RowWriter;
use crate::error::Result;
use crate::reconcile::{self, RepairReport};
use crate::schema::{
    META_IMPORTED_AT, META_MANIFEST, generate_clear_sql, generate_rebuild_sql, meta_name,
    table_name,
};

/// Summary of a completed import.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    /// Stored rows per content type, after duplicate ids collapsed.
    pub counts: BTreeMap<ContentType, usize>,
    /// Entries dropped for lacking a name or source.
    pub rejected: usize,
    /// Entries that overwrote an earlier entry with the same `name|source`.
    pub replaced: usize,
    /// Spell rows patched from the override file.
    pub reconciled: usize,
    /// Result of the repair pass that follows reconciliation.
    pub repair: RepairReport,
    /// Files read, with checksums.
    pub manifest: ImportManifest,
    /// Value written to the `imported_at` meta row.
    pub imported_at: String,
}

impl ImportReport {
    /// Total stored rows across all content types.
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

/// Imports `export` into the tables under `prefix`.
///
/// Does not emit the terminal `done` event; the caller sends it once the
/// surrounding transaction has committed.
pub(crate) fn run_import<F>(
    conn: &Connection,
    prefix: &str,
    export: &ExportDirectory,
    batch_size: usize,
    on_progress: &mut F,
) -> Result<ImportReport>
where
    F: FnMut(&ImportProgress),
{
    let batch_size = batch_size.max(1);
    conn.execute_batch(&generate_clear_sql(prefix)?)?;

    let mut manifest = ImportManifest::new(export.root());
    let mut counts = BTreeMap::new();
    let mut rejected = 0;
    let mut replaced = 0;
    let mut reconciled = 0;
    let mut repair = RepairReport::default();

    for ct in ContentType::ALL {
        let stage = export.load(ct);

        if ct == ContentType::Spell && stage.missing {
            let message = format!(
                "spells directory not found under {}",
                export.root().display()
            );
            warn!(root = %export.root().display(), "No spells directory in export");
            on_progress(&ImportProgress::failed(ct, message));
            manifest.record(ct, Vec::new());
            counts.insert(ct, 0);
            continue;
        }

        rejected += stage.rejected;
        let written = import_stage(conn, prefix, &stage, batch_size, on_progress)?;
        replaced += written.replaced;
        manifest.record(ct, stage.files);
        counts.insert(ct, written.stored);
        info!(stage = %ct, entries = written.stored, replaced = written.replaced, "Imported stage");

        if ct == ContentType::Spell {
            let (overrides, file) = export.load_spell_overrides();
            manifest.overrides = file;
            reconciled = reconcile::apply_overrides(conn, prefix, &overrides)?;
            repair = reconcile::repair_spell_classes(conn, prefix)?;
        }
    }

    conn.execute_batch(&generate_rebuild_sql(prefix)?)?;
    debug!("Rebuilt full-text indexes");

    let imported_at = chrono::Utc::now().to_rfc3339();
    let meta = meta_name(prefix);
    conn.execute(
        &format!("INSERT OR REPLACE INTO {meta} (key, value) VALUES (?1, ?2)"),
        params![META_MANIFEST, serde_json::to_string(&manifest)?],
    )?;
    conn.execute(
        &format!("INSERT OR REPLACE INTO {meta} (key, value) VALUES (?1, ?2)"),
        params![META_IMPORTED_AT, imported_at],
    )?;

    Ok(ImportReport {
        counts,
        rejected,
        replaced,
        reconciled,
        repair,
        manifest,
        imported_at,
    })
}

/// Row counts for one written stage.
struct StageWrite {
    stored: usize,
    replaced: usize,
}

/// Inserts one stage's entries.
///
/// An entry whose id was already written in this stage replaces the
/// earlier row; each such overwrite is logged and counted.
fn import_stage<F>(
    conn: &Connection,
    prefix: &str,
    stage: &StageSource,
    batch_size: usize,
    on_progress: &mut F,
) -> Result<StageWrite>
where
    F: FnMut(&ImportProgress),
{
    let ct = stage.content_type;
    let total = stage.entries.len();
    let mut writer = RowWriter::new(conn, prefix, ct)?;
    let mut seen = HashSet::with_capacity(total);
    let mut replaced = 0;

    for (i, entry) in stage.entries.iter().enumerate() {
        let key = match entry_key(&entry.raw) {
            Ok(key) => key,
            Err(err) => {
                debug!(stage = %ct, error = %err, "Skipping invalid entry");
                continue;
            }
        };
        let id = key.id();
        if !seen.insert(id.clone()) {
            replaced += 1;
            warn!(stage = %ct, id = %id, "Duplicate id, replacing earlier entry");
        }
        let derived = derive_columns(ct, &entry.raw);
        writer.insert(&key, &derived, entry.features.as_deref(), &entry.raw)?;

        let current = i + 1;
        if current % batch_size == 0 && current < total {
            on_progress(&ImportProgress::running(ct, current, total));
        }
    }
    on_progress(&ImportProgress::finished(ct, total));

    let stored: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", table_name(prefix, ct)),
        [],
        |row| row.get(0),
    )?;
    Ok(StageWrite {
        stored: stored as usize,
        replaced,
    })
}

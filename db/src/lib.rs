//! Export directory loading, configuration, and import manifests.
//!
//! This crate reads a content-export directory into validated raw entries
//! grouped by [`ContentType`](compendium_core::ContentType). It does not
//! touch the database; the SQLite engine consumes what it produces.
//!
//! # Quick start
//!
//! ```no_run
//! use compendium_core::ContentType;
//! use compendium_db::{CompendiumConfig, ExportDirectory};
//!
//! let config = CompendiumConfig::load("compendium.yml").unwrap();
//! let export = ExportDirectory::new(config.export_dir.unwrap_or_else(|| "data".into()));
//!
//! for ct in ContentType::ALL {
//!     let stage = export.load(ct);
//!     println!("{ct}: {} entries", stage.entries.len());
//! }
//!
//! let (overrides, _) = export.load_spell_overrides();
//! println!("{} spell class overrides", overrides.len());
//! ```

mod config;
mod error;
mod loader;
mod manifest;

pub use config::{CompendiumConfig, DEFAULT_BATCH_SIZE, DEFAULT_LIMIT, DEFAULT_PREFIX};
pub use error::{LoadError, Result};
pub use loader::{
    ExportDirectory, SPELL_SOURCES_FILE, SourceEntry, SpellClassOverrides, StageSource,
};
pub use manifest::{ImportManifest, SourceFile};

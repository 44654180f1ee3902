//! SQLite storage engine for the reference-content compendium.
//!
//! This crate turns a content-export directory into nine searchable tables
//! and answers faceted search and lookup queries against them.
//!
//! # Architecture
//!
//! - **`schema`** — SQL generation with customizable table prefixes
//! - **`convert`** — record ↔ row conversion for every content type
//! - **`import`** — whole-directory import with progress reporting
//! - **`reconcile`** — spell → class overrides and the repair pass
//! - **`query`** — full-text search, lookups and relationship scans
//! - **`compendium`** — the [`Compendium`] engine tying them together
//!
//! # Quick start
//!
//! ```no_run
//! use compendium_core::{ContentType, FilterSet};
//! use compendium_sqlite::Compendium;
//!
//! let mut compendium = Compendium::open("compendium.db").unwrap();
//! compendium.import_compendium("data/", |_| {}).unwrap();
//!
//! let spells = compendium
//!     .search("", ContentType::Spell, &FilterSet { levels: vec![3], ..Default::default() }, 50, 0)
//!     .unwrap();
//! println!("{} third-level spells", spells.len());
//!
//! if let Some(entry) = compendium.get_entry("Fireball|PHB", ContentType::Spell).unwrap() {
//!     println!("{}", entry.raw);
//! }
//! ```
//!
//! # Table prefix customization
//!
//! All table and index names are prefixed with a configurable string
//! (`cmp_` by default), allowing several isolated compendiums within the
//! same SQLite database. Prefixes must contain only alphanumeric
//! characters and underscores.

mod compendium;
mod convert;
mod error;
mod import;
mod query;
mod reconcile;
mod schema;

pub use compendium::Compendium;
pub use error::{CompendiumError, Result};
pub use import::ImportReport;
pub use query::{CompendiumQuery, fts_match_expression};
pub use reconcile::RepairReport;
pub use schema::{generate_clear_sql, generate_rebuild_sql, generate_schema_sql};

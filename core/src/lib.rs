//! Core types for the reference-content compendium.
//!
//! This crate defines the storage-independent model shared by the loader,
//! the SQLite engine, and the CLI:
//!
//! - [`ContentType`] — the closed set of nine content kinds, each with a
//!   static [`TypeDescriptor`] describing its table and filter columns.
//! - [`Derived`] — typed, per-kind filter columns computed at ingest
//!   ([`derive_columns`]).
//! - [`ResultRecord`] — a stored record plus its original raw payload.
//! - [`FilterSet`], [`ImportProgress`], [`CompendiumStatus`] — query,
//!   progress, and status shapes exposed to callers.
//!
//! Entry validation ([`entry_key`]) rejects raw entries that lack a name
//! or source before anything is stored.
//!
//! # Example
//!
//! ```
//! use compendium_core::*;
//! use serde_json::json;
//!
//! let raw = json!({"name": "Longsword", "source": "PHB", "type": "M"});
//! let key = entry_key(&raw).unwrap();
//! let derived = derive_columns(ContentType::Item, &raw);
//!
//! assert_eq!(key.id(), "Longsword|PHB");
//! assert_eq!(ContentType::Item.drop_target(&derived), DropTarget::Weapon);
//! ```

mod derive;
mod types;
mod validate;

pub use derive::{
    casting_time, derive_columns, is_concentration, is_ritual, item_drop_target, merge_names,
    prerequisite_text, school_name, spell_classes,
};
pub use types::*;
pub use validate::{ValidationError, entry_key};

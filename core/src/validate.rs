//! Entry validation at ingest time.
//!
//! Every stored record needs a non-empty `name` and a `source`. Magic item
//! variants carry their source under `inherits.source` and subraces may
//! only name `raceSource`, so those are accepted as fallbacks.
//!
//! # Examples
//!
//! ```
//! use compendium_core::{ValidationError, entry_key};
//! use serde_json::json;
//!
//! let key = entry_key(&json!({"name": "Fireball", "source": "PHB"})).unwrap();
//! assert_eq!(key.id(), "Fireball|PHB");
//!
//! let err = entry_key(&json!({"source": "PHB"})).unwrap_err();
//! assert_eq!(err, ValidationError::MissingName);
//! ```

use serde_json::Value;
use thiserror::Error;

use crate::types::EntryKey;

/// Reasons a raw export entry is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The entry is not a JSON object.
    #[error("entry is not an object")]
    NotAnObject,
    /// `name` is absent, not a string, or blank.
    #[error("entry has no name")]
    MissingName,
    /// No `source`, `inherits.source`, or `raceSource` string.
    #[error("entry '{0}' has no source")]
    MissingSource(String),
}

/// Extracts and checks the composite key of a raw entry.
pub fn entry_key(raw: &Value) -> Result<EntryKey, ValidationError> {
    let obj = raw.as_object().ok_or(ValidationError::NotAnObject)?;

    let name = obj
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or(ValidationError::MissingName)?;

    let source = non_empty_str(obj.get("source"))
        .or_else(|| non_empty_str(obj.get("inherits").and_then(|i| i.get("source"))))
        .or_else(|| non_empty_str(obj.get("raceSource")))
        .ok_or_else(|| ValidationError::MissingSource(name.to_string()))?;

    Ok(EntryKey::new(name, source))
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_rejects_non_object() {
        assert_eq!(entry_key(&json!("Fireball")), Err(ValidationError::NotAnObject));
    }

    #[test]
    fn test_rejects_blank_name() {
        assert_eq!(
            entry_key(&json!({"name": "  ", "source": "PHB"})),
            Err(ValidationError::MissingName)
        );
        assert_eq!(
            entry_key(&json!({"name": 7, "source": "PHB"})),
            Err(ValidationError::MissingName)
        );
    }

    #[test]
    fn test_source_fallbacks() {
        let variant = json!({"name": "+1 Weapon", "inherits": {"source": "DMG"}});
        assert_eq!(entry_key(&variant).unwrap().source, "DMG");

        let subrace = json!({"name": "High", "raceName": "Elf", "raceSource": "PHB"});
        assert_eq!(entry_key(&subrace).unwrap().source, "PHB");
    }

    #[test]
    fn test_missing_source() {
        assert_eq!(
            entry_key(&json!({"name": "Orphan"})),
            Err(ValidationError::MissingSource("Orphan".into()))
        );
    }

    #[test]
    fn test_name_is_trimmed() {
        let key = entry_key(&json!({"name": " Light ", "source": "XGE"})).unwrap();
        assert_eq!(key.id(), "Light|XGE");
    }
}

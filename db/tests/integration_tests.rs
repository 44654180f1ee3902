use std::path::Path;

use compendium_core::ContentType;
use compendium_db::{CompendiumConfig, ExportDirectory};
use serde_json::{Value, json};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn write_json(root: &Path, rel: &str, doc: &Value) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, serde_json::to_vec_pretty(doc).unwrap()).unwrap();
}

fn sample_export(root: &Path) {
    write_json(
        root,
        "spells/spells-phb.json",
        &json!({"spell": [
            {"name": "Fireball", "source": "PHB", "level": 3, "school": "V",
             "classes": {"fromClassList": [{"name": "Wizard", "source": "PHB"}]}},
            {"name": "Light", "source": "PHB", "level": 0, "school": "V"}
        ]}),
    );
    write_json(
        root,
        "spells/sources.json",
        &json!({"PHB": {"Light": {"class": [{"name": "Bard"}, {"name": "Cleric"}]}}}),
    );
    write_json(
        root,
        "feats.json",
        &json!({"feat": [{"name": "Alert", "source": "PHB"}]}),
    );
    write_json(
        root,
        "class/class-wizard.json",
        &json!({
            "class": [{"name": "Wizard", "source": "PHB"}],
            "subclass": [
                {"name": "School of Evocation", "shortName": "Evocation", "source": "PHB",
                 "className": "Wizard", "classSource": "PHB"},
                {"name": "Bladesinging", "shortName": "Bladesinging", "source": "TCE",
                 "className": "Wizard", "classSource": "PHB"}
            ],
            "classFeature": [
                {"name": "Arcane Recovery", "source": "PHB", "className": "Wizard", "classSource": "PHB", "level": 1}
            ],
            "subclassFeature": [
                {"name": "Sculpt Spells", "source": "PHB", "className": "Wizard", "classSource": "PHB",
                 "subclassShortName": "Evocation", "subclassSource": "PHB", "level": 2}
            ]
        }),
    );
}

// ---------------------------------------------------------------------------
// Export loading
// ---------------------------------------------------------------------------

#[test]
fn test_full_export_load() {
    let dir = std::env::temp_dir().join("cmp_db_integ_export");
    std::fs::remove_dir_all(&dir).ok();
    sample_export(&dir);

    let export = ExportDirectory::new(&dir);
    assert!(export.exists());

    let spells = export.load(ContentType::Spell);
    assert_eq!(spells.entries.len(), 2);
    assert!(!spells.missing);

    let classes = export.load(ContentType::Class);
    assert_eq!(classes.entries.len(), 1);
    assert_eq!(classes.entries[0].features.as_ref().unwrap().len(), 1);

    let subclasses = export.load(ContentType::Subclass);
    assert_eq!(subclasses.entries.len(), 2);
    let evocation = &subclasses.entries[0];
    assert_eq!(evocation.features.as_ref().unwrap()[0]["name"], "Sculpt Spells");
    let bladesinging = &subclasses.entries[1];
    assert!(bladesinging.features.as_ref().unwrap().is_empty());

    for ct in [
        ContentType::Item,
        ContentType::Background,
        ContentType::Race,
        ContentType::OptionalFeature,
        ContentType::Condition,
    ] {
        assert!(export.load(ct).entries.is_empty(), "{ct} should be empty");
    }

    let (overrides, file) = export.load_spell_overrides();
    assert_eq!(overrides.get("Light|PHB").unwrap(), ["Bard", "Cleric"]);
    assert_eq!(file.unwrap().path, "spells/sources.json");

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_raw_entries_are_untouched() {
    let dir = std::env::temp_dir().join("cmp_db_integ_raw");
    std::fs::remove_dir_all(&dir).ok();
    let feat = json!({
        "name": "Alert", "source": "PHB", "page": 165,
        "entries": ["Always on the lookout for danger."],
        "_copy": {"name": "Other", "source": "XPHB"}
    });
    write_json(&dir, "feats.json", &json!({"feat": [feat.clone()]}));

    let stage = ExportDirectory::new(&dir).load(ContentType::Feat);
    assert_eq!(stage.entries[0].raw, feat);

    std::fs::remove_dir_all(&dir).ok();
}

// ---------------------------------------------------------------------------
// Manifest workflow
// ---------------------------------------------------------------------------

#[test]
fn test_manifest_tracks_changes() {
    let dir = std::env::temp_dir().join("cmp_db_integ_manifest");
    std::fs::remove_dir_all(&dir).ok();
    sample_export(&dir);

    let export = ExportDirectory::new(&dir);
    let before = export.scan_manifest();
    assert_eq!(before.entry_count(ContentType::Spell), 2);
    assert_eq!(before.entry_count(ContentType::Subclass), 2);
    assert_eq!(before.file_count(), 3);
    assert!(before.overrides.is_some());

    // A rescan of an untouched export matches; an edited file does not.
    assert!(before.changed_files(&export.scan_manifest()).is_empty());

    write_json(
        &dir,
        "feats.json",
        &json!({"feat": [{"name": "Alert", "source": "PHB"}, {"name": "Lucky", "source": "PHB"}]}),
    );
    let after = export.scan_manifest();
    assert_eq!(before.changed_files(&after), vec!["feats.json".to_string()]);

    std::fs::remove_dir_all(&dir).ok();
}

// ---------------------------------------------------------------------------
// Config workflow
// ---------------------------------------------------------------------------

#[test]
fn test_config_workflow() {
    let dir = std::env::temp_dir().join("cmp_db_integ_config");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("compendium.yml");

    let yaml = r#"
database: dnd.db
table_prefix: dnd_
export_dir: data
"#;
    std::fs::write(&path, yaml).unwrap();

    let config = CompendiumConfig::load(&path).unwrap();
    assert_eq!(config.table_prefix, "dnd_");
    assert_eq!(config.batch_size, 500);
    assert_eq!(config.default_limit, 50);

    let path2 = dir.join("compendium2.yml");
    config.save(&path2).unwrap();
    let reloaded = CompendiumConfig::load(&path2).unwrap();
    assert_eq!(reloaded, config);

    std::fs::remove_dir_all(&dir).ok();
}

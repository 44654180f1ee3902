use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use compendium_core::{CompendiumStatus, ContentType, FilterSet, ImportProgress};
use compendium_db::CompendiumConfig;
use compendium_sqlite::Compendium;
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

#[derive(Debug, Parser)]
#[command(name = "compendium")]
#[command(about = "Import, search and inspect a local reference-content compendium")]
struct Cli {
    /// Database file path (overrides the config file).
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Table prefix (overrides the config file).
    #[arg(long, global = true)]
    prefix: Option<String>,
    /// YAML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replace the store's contents with an export directory.
    Import(ImportArgs),
    /// Show whether the store is populated and row counts per type.
    Status(StatusArgs),
    /// Delete every stored row and the import marker.
    Clear,
    /// Full-text and faceted search over one content type.
    Search(SearchArgs),
    /// Fetch one record by id (`name|source`).
    Get(GetArgs),
    /// List distinct sources for a content type.
    Sources(SourcesArgs),
    /// List the subraces of a base race.
    Subraces(SubracesArgs),
    /// List the subclasses of a class.
    Subclasses(SubclassesArgs),
    /// List class (and optionally subclass) features gained at a level.
    Features(FeaturesArgs),
    /// Re-run the spell class repair pass.
    Repair,
}

#[derive(Debug, Args)]
struct ImportArgs {
    /// Export directory (defaults to `export_dir` from the config file).
    path: Option<PathBuf>,
    /// Rows written between progress events.
    #[arg(long)]
    batch_size: Option<usize>,
    /// Suppress progress lines on stderr.
    #[arg(long)]
    quiet: bool,
}

#[derive(Debug, Args)]
struct StatusArgs {
    /// Also list files in this export directory that changed since the last import.
    #[arg(long, value_name = "DIR")]
    changed: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct SearchArgs {
    /// Search text; empty lists everything.
    #[arg(default_value = "")]
    query: String,
    /// Content type to search.
    #[arg(long = "type", value_parser = parse_content_type)]
    content_type: ContentType,
    /// Source codes to include (comma-separated).
    #[arg(long, value_delimiter = ',')]
    source: Vec<String>,
    /// Spell levels to include (comma-separated).
    #[arg(long, value_delimiter = ',')]
    level: Vec<i64>,
    /// Spell schools to include, as codes (`V`) or names (`Evocation`), comma-separated.
    #[arg(long, value_delimiter = ',')]
    school: Vec<String>,
    /// Class names; spells must list at least one (comma-separated).
    #[arg(long, value_delimiter = ',')]
    class: Vec<String>,
    /// Only ritual (`true`) or non-ritual (`false`) spells.
    #[arg(long)]
    ritual: Option<bool>,
    /// Only concentration (`true`) or non-concentration (`false`) spells.
    #[arg(long)]
    concentration: Option<bool>,
    /// Item rarities to include (comma-separated).
    #[arg(long, value_delimiter = ',')]
    rarity: Vec<String>,
    /// Only items that do (`true`) or do not (`false`) require attunement.
    #[arg(long)]
    attunement: Option<bool>,
    /// Item type codes to include (comma-separated).
    #[arg(long, value_delimiter = ',')]
    item_type: Vec<String>,
    /// Optional feature type codes to include (comma-separated).
    #[arg(long, value_delimiter = ',')]
    feature_type: Vec<String>,
    /// Maximum number of results (defaults to `default_limit`).
    #[arg(long)]
    limit: Option<usize>,
    /// Number of results to skip.
    #[arg(long, default_value_t = 0)]
    offset: usize,
}

impl SearchArgs {
    fn filters(&self) -> FilterSet {
        FilterSet {
            sources: self.source.clone(),
            levels: self.level.clone(),
            schools: self.school.clone(),
            classes: self.class.clone(),
            ritual: self.ritual,
            concentration: self.concentration,
            rarities: self.rarity.clone(),
            requires_attunement: self.attunement,
            item_types: self.item_type.clone(),
            feature_types: self.feature_type.clone(),
        }
    }
}

#[derive(Debug, Args)]
struct GetArgs {
    /// Record id, e.g. `Fireball|PHB`.
    id: String,
    /// Content type of the record.
    #[arg(long = "type", value_parser = parse_content_type)]
    content_type: ContentType,
}

#[derive(Debug, Args)]
struct SourcesArgs {
    /// Content type to list sources for.
    #[arg(long = "type", value_parser = parse_content_type)]
    content_type: ContentType,
}

#[derive(Debug, Args)]
struct SubracesArgs {
    /// Base race name.
    race: String,
}

#[derive(Debug, Args)]
struct SubclassesArgs {
    /// Class name.
    class: String,
}

#[derive(Debug, Args)]
struct FeaturesArgs {
    /// Class name.
    class: String,
    /// Character level.
    level: i64,
    /// Subclass name or short name.
    #[arg(long)]
    subclass: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let config = resolve_config(&cli)?;
    debug!(db = %config.database.display(), prefix = %config.table_prefix, "Resolved config");

    match cli.command {
        Command::Import(args) => run_import(config, args),
        Command::Status(args) => run_status(&config, args),
        Command::Clear => run_clear(&config),
        Command::Search(args) => run_search(&config, args),
        Command::Get(args) => run_get(&config, args),
        Command::Sources(args) => run_sources(&config, args),
        Command::Subraces(args) => run_subraces(&config, args),
        Command::Subclasses(args) => run_subclasses(&config, args),
        Command::Features(args) => run_features(&config, args),
        Command::Repair => run_repair(&config),
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn run_import(mut config: CompendiumConfig, args: ImportArgs) -> Result<(), String> {
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    let path = args
        .path
        .or_else(|| config.export_dir.clone())
        .ok_or_else(|| "Specify an export directory or set export_dir in the config".to_string())?;

    let mut compendium = open(&config)?;
    let quiet = args.quiet;
    let report = compendium
        .import_compendium(&path, |progress| {
            if !quiet {
                eprintln!("{}", format_progress(progress));
            }
        })
        .map_err(|e| format!("Import from '{}' failed: {e}", path.display()))?;

    print_json(&report)
}

/// `status` output, with the change list when `--changed` was given.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusOutput {
    #[serde(flatten)]
    status: CompendiumStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    changed_files: Option<Vec<String>>,
}

fn run_status(config: &CompendiumConfig, args: StatusArgs) -> Result<(), String> {
    let compendium = open(config)?;
    let status = compendium
        .status()
        .map_err(|e| format!("Failed to read status: {e}"))?;
    let changed_files = args
        .changed
        .map(|dir| {
            compendium
                .changed_files(&dir)
                .map_err(|e| format!("Failed to compare '{}': {e}", dir.display()))
        })
        .transpose()?;

    print_json(&StatusOutput {
        status,
        changed_files,
    })
}

fn run_clear(config: &CompendiumConfig) -> Result<(), String> {
    let mut compendium = open(config)?;
    compendium
        .clear()
        .map_err(|e| format!("Clear failed: {e}"))?;
    eprintln!(
        "Cleared compendium with prefix '{}' in '{}'.",
        config.table_prefix,
        config.database.display()
    );
    Ok(())
}

fn run_search(config: &CompendiumConfig, args: SearchArgs) -> Result<(), String> {
    let compendium = open(config)?;
    let limit = args.limit.unwrap_or(compendium.default_limit());
    let results = compendium
        .search(&args.query, args.content_type, &args.filters(), limit, args.offset)
        .map_err(|e| format!("Search failed: {e}"))?;
    print_json(&results)
}

fn run_get(config: &CompendiumConfig, args: GetArgs) -> Result<(), String> {
    let compendium = open(config)?;
    let entry = compendium
        .get_entry(&args.id, args.content_type)
        .map_err(|e| format!("Lookup failed: {e}"))?
        .ok_or_else(|| format!("No {} with id '{}'", args.content_type, args.id))?;
    print_json(&entry)
}

fn run_sources(config: &CompendiumConfig, args: SourcesArgs) -> Result<(), String> {
    let compendium = open(config)?;
    let sources = compendium
        .list_sources(args.content_type)
        .map_err(|e| format!("Failed to list sources: {e}"))?;
    print_json(&sources)
}

fn run_subraces(config: &CompendiumConfig, args: SubracesArgs) -> Result<(), String> {
    let compendium = open(config)?;
    let subraces = compendium
        .list_subraces(&args.race)
        .map_err(|e| format!("Failed to list subraces: {e}"))?;
    print_json(&subraces)
}

fn run_subclasses(config: &CompendiumConfig, args: SubclassesArgs) -> Result<(), String> {
    let compendium = open(config)?;
    let subclasses = compendium
        .list_subclasses(&args.class)
        .map_err(|e| format!("Failed to list subclasses: {e}"))?;
    print_json(&subclasses)
}

fn run_features(config: &CompendiumConfig, args: FeaturesArgs) -> Result<(), String> {
    let compendium = open(config)?;
    let features = compendium
        .class_features_at_level(&args.class, args.level, args.subclass.as_deref())
        .map_err(|e| format!("Failed to list features: {e}"))?;
    print_json(&features)
}

fn run_repair(config: &CompendiumConfig) -> Result<(), String> {
    let mut compendium = open(config)?;
    let report = compendium
        .repair_spell_classes()
        .map_err(|e| format!("Repair failed: {e}"))?;
    print_json(&report)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Loads the config file if one was given, then applies flag overrides.
fn resolve_config(cli: &Cli) -> Result<CompendiumConfig, String> {
    let mut config = match &cli.config {
        Some(path) => CompendiumConfig::load(path)
            .map_err(|e| format!("Failed to load config '{}': {e}", path.display()))?,
        None => CompendiumConfig::default(),
    };
    if let Some(db) = &cli.db {
        config.database = db.clone();
    }
    if let Some(prefix) = &cli.prefix {
        config.table_prefix = prefix.clone();
    }
    config
        .validate()
        .map_err(|e| format!("Invalid configuration: {e}"))?;
    Ok(config)
}

fn open(config: &CompendiumConfig) -> Result<Compendium, String> {
    Compendium::from_config(config)
        .map_err(|e| format!("Failed to open database '{}': {e}", config.database.display()))
}

fn parse_content_type(s: &str) -> Result<ContentType, String> {
    s.parse::<ContentType>().map_err(|e| e.to_string())
}

fn format_progress(progress: &ImportProgress) -> String {
    match &progress.error {
        Some(err) => format!("[{}] error: {err}", progress.stage),
        None if progress.done => format!("[{}] done ({})", progress.stage, progress.total),
        None => format!("[{}] {}/{}", progress.stage, progress.current, progress.total),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| format!("Failed to serialize output: {e}"))?;
    println!("{json}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use compendium_core::ImportStage;

    #[test]
    fn test_parse_content_type_aliases() {
        assert_eq!(parse_content_type("spells").unwrap(), ContentType::Spell);
        assert_eq!(
            parse_content_type("optional-feature").unwrap(),
            ContentType::OptionalFeature
        );
        assert!(parse_content_type("monster").is_err());
    }

    #[test]
    fn test_format_progress() {
        let running = ImportProgress::running(ContentType::Spell, 500, 1200);
        assert_eq!(format_progress(&running), "[spell] 500/1200");

        let finished = ImportProgress::finished(ContentType::Item, 40);
        assert_eq!(format_progress(&finished), "[item] done (40)");

        let failed = ImportProgress::failed(ContentType::Spell, "missing");
        assert_eq!(format_progress(&failed), "[spell] error: missing");

        let complete = ImportProgress::complete(7);
        assert_eq!(complete.stage, ImportStage::Done);
        assert_eq!(format_progress(&complete), "[done] done (7)");
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::parse_from([
            "compendium",
            "--db",
            "/tmp/x.db",
            "--prefix",
            "alt_",
            "status",
        ]);
        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.database, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.table_prefix, "alt_");
    }

    #[test]
    fn test_invalid_prefix_rejected() {
        let cli = Cli::parse_from(["compendium", "--prefix", "bad-prefix", "status"]);
        assert!(resolve_config(&cli).is_err());
    }

    #[test]
    fn test_search_flags_build_filters() {
        let cli = Cli::parse_from([
            "compendium",
            "search",
            "fire",
            "--type",
            "spell",
            "--level",
            "1,3",
            "--class",
            "Wizard",
            "--ritual",
            "false",
        ]);
        let Command::Search(args) = cli.command else {
            panic!("expected search command");
        };
        let filters = args.filters();
        assert_eq!(args.query, "fire");
        assert_eq!(filters.levels, vec![1, 3]);
        assert_eq!(filters.classes, vec!["Wizard".to_string()]);
        assert_eq!(filters.ritual, Some(false));
        assert!(filters.rarities.is_empty());
    }
}

// 🗂️ BIN Catalog CLI - schema setup, bulk item import, listings

use anyhow::{Context, Result};
use bin_catalog::identity::{resolve_actor, EnvIdentity};
use bin_catalog::store::IdTypeCatalog;
use bin_catalog::{
    db, in_transaction, init_logging, open_database, register_id_type, CatalogConfig, Page,
    SqliteStore, Status, DEFAULT_ID_TYPES,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "bin-catalog", version, about = "BIN catalog consistency engine")]
struct Cli {
    /// YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database (overrides database.path)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the schema and seed owner identification types
    Init {
        /// Id type codes to seed (defaults to CC, CE, NIT, PA)
        #[arg(long = "id-type")]
        id_types: Vec<String>,
    },

    /// Bulk-add plan items from the first column of a CSV file
    ImportItems {
        #[arg(long)]
        plan: String,

        #[arg(long)]
        file: PathBuf,

        /// Skip the first row
        #[arg(long)]
        has_headers: bool,
    },

    /// List BINs
    Bins {
        /// A or I
        #[arg(long)]
        status: Option<String>,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Audit trail of one entity
    History {
        /// bin, subtype, agency, plan, plan_item, validation
        entity_type: String,
        entity_id: String,
    },

    /// Row counts per table
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = CatalogConfig::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database.path = db;
    }
    init_logging(&config.logging);

    match cli.command {
        Command::Init { id_types } => run_init(&config, &id_types),
        Command::ImportItems {
            plan,
            file,
            has_headers,
        } => run_import_items(&config, &plan, &file, has_headers),
        Command::Bins {
            status,
            offset,
            limit,
        } => run_bins(&config, status.as_deref(), Page::new(offset, limit)),
        Command::History {
            entity_type,
            entity_id,
        } => run_history(&config, &entity_type, &entity_id),
        Command::Stats => run_stats(&config),
    }
}

fn run_init(config: &CatalogConfig, id_types: &[String]) -> Result<()> {
    println!("🔧 Setting up catalog database...");
    let conn = open_database(&config.database.path)?;
    println!("✓ Schema ready at {}", config.database.path.display());

    if id_types.is_empty() {
        for (code, description) in DEFAULT_ID_TYPES {
            register_id_type(&conn, code, Some(description))?;
        }
    } else {
        for code in id_types {
            register_id_type(&conn, code.trim(), None)?;
        }
    }

    let codes = SqliteStore::new(&conn).id_type_codes()?;
    println!("✓ Owner id types: {}", codes.join(", "));
    info!(id_types = codes.len(), "catalog initialised");
    Ok(())
}

/// First column of every record, in file order
fn read_item_values(path: &Path, has_headers: bool) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(has_headers)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;

    let mut values = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read CSV record {}", line + 1))?;
        values.push(record.get(0).unwrap_or_default().to_string());
    }
    Ok(values)
}

fn run_import_items(config: &CatalogConfig, plan: &str, file: &Path, has_headers: bool) -> Result<()> {
    println!("📂 Loading items from {}...", file.display());
    let values = read_item_values(file, has_headers)?;
    println!("✓ Read {} values", values.len());

    let actor = resolve_actor(&EnvIdentity, &config.default_actor);
    let mut conn = open_database(&config.database.path)?;

    let summary = in_transaction(&mut conn, config.engine_settings(), |engine| {
        engine.bulk_add_plan_items(plan, &values, &actor)
    })
    .with_context(|| format!("Bulk import into plan {} failed", plan))?;

    println!("\n💾 {}", summary.summary());
    if !summary.invalid_values.is_empty() {
        println!("   invalid: {}", summary.invalid_values.join(", "));
    }
    if !summary.duplicate_values.is_empty() {
        println!("   duplicates: {}", summary.duplicate_values.join(", "));
    }
    Ok(())
}

fn run_bins(config: &CatalogConfig, status: Option<&str>, page: Page) -> Result<()> {
    let status = status.map(Status::parse).transpose()?;
    let mut conn = open_database(&config.database.path)?;

    let bins = in_transaction(&mut conn, config.engine_settings(), |engine| {
        engine.list_bins(status, page)
    })?;

    if bins.is_empty() {
        println!("No BINs found");
        return Ok(());
    }

    println!("{:<10} {:<4} {:<7} {}", "BIN", "EXT", "STATUS", "DESCRIPTION");
    for bin in bins {
        let ext = match bin.extension_digits {
            Some(digits) if bin.uses_extension => format!("Y{}", digits),
            _ => "N".to_string(),
        };
        println!(
            "{:<10} {:<4} {:<7} {}",
            bin.bin,
            ext,
            bin.status.as_str(),
            bin.description.unwrap_or_default()
        );
    }
    Ok(())
}

fn run_history(config: &CatalogConfig, entity_type: &str, entity_id: &str) -> Result<()> {
    let conn = open_database(&config.database.path)?;
    let events = SqliteStore::new(&conn).events_for_entity(entity_type, entity_id)?;

    if events.is_empty() {
        println!("No events for {} {}", entity_type, entity_id);
    }
    for event in events {
        println!(
            "{}  {:<22} {:<12} {}",
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.actor,
            event.data
        );
    }
    Ok(())
}

fn run_stats(config: &CatalogConfig) -> Result<()> {
    let conn = open_database(&config.database.path)?;
    println!("📊 {}", config.database.path.display());
    for (table, count) in db::table_counts(&conn)? {
        println!("   {:<18} {}", table, count);
    }
    Ok(())
}

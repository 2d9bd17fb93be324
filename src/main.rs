use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::Level;

use seiscomp_inventory::{load_file, save_file, EntityId, EntityKind, Inventory, Loaded};

/// Inspect, validate and normalize SeisComP inventory XML
#[derive(Parser, Debug)]
#[command(name = "seiscomp-inventory")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log codec and graph events to stderr (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a file and report every invariant violation
    Validate {
        file: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the network/station/location/stream tree and the equipment catalog
    Tree { file: PathBuf },

    /// Load and re-save a file in canonical form
    Normalize {
        input: PathBuf,

        /// Write here instead of overwriting the input
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Do not keep a .xml.bak copy of the file being replaced
        #[arg(long)]
        no_backup: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Validate { file, json } => run_validate(&file, json),
        Command::Tree { file } => run_tree(&file),
        Command::Normalize {
            input,
            output,
            no_backup,
        } => run_normalize(&input, output.as_deref(), !no_backup),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn load(path: &Path) -> Result<Loaded> {
    load_file(path).with_context(|| format!("Failed to load {}", path.display()))
}

fn run_validate(path: &Path, json: bool) -> Result<()> {
    let loaded = load(path)?;

    if json {
        let report = serde_json::json!({
            "file": path.display().to_string(),
            "version": loaded.document.header.version.to_string(),
            "entities": loaded.document.inventory.len(),
            "violations": loaded.violations,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("🔍 Validating {}", path.display());
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        println!("✓ Schema: {}", loaded.document.header.version);
        println!("✓ Entities: {}", loaded.document.inventory.len());

        if loaded.violations.is_empty() {
            println!("\n✅ No violations found");
        } else {
            println!("\n❌ {} violation(s):", loaded.violations.len());
            for violation in &loaded.violations {
                let label = violation
                    .entity
                    .and_then(|id| loaded.document.inventory.label(id))
                    .unwrap_or_default();
                println!("   • {} {}", label, violation);
            }
        }
    }

    if !loaded.violations.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}

fn run_tree(path: &Path) -> Result<()> {
    let loaded = load(path)?;
    let inventory = &loaded.document.inventory;

    println!("📡 {}", path.display());
    for &network in inventory.networks() {
        print_subtree(inventory, network, 1);
    }

    println!("\n🔧 Sensors ({})", inventory.sensors().len());
    for &id in inventory.sensors() {
        println!("   {}", inventory.label(id).unwrap_or_default());
    }
    println!("💾 Dataloggers ({})", inventory.dataloggers().len());
    for &id in inventory.dataloggers() {
        println!("   {}", inventory.label(id).unwrap_or_default());
    }
    Ok(())
}

fn print_subtree(inventory: &Inventory, id: EntityId, depth: usize) {
    let epoch = inventory
        .get(id)
        .and_then(|e| e.epoch())
        .map(|e| format!("  [{}]", e))
        .unwrap_or_default();
    println!(
        "{}{}{}",
        "   ".repeat(depth),
        inventory.label(id).unwrap_or_default(),
        epoch
    );

    // Streams are listed band/instrument/orientation first
    let children = match inventory.kind(id) {
        Some(EntityKind::Location) => inventory.streams_in_display_order(id).unwrap_or_default(),
        _ => inventory.children(id).map(<[EntityId]>::to_vec).unwrap_or_default(),
    };
    for child in children {
        print_subtree(inventory, child, depth + 1);
    }
}

fn run_normalize(input: &Path, output: Option<&Path>, backup: bool) -> Result<()> {
    let loaded = load(input)?;
    let target = output.unwrap_or(input);

    save_file(&loaded.document, target, backup)
        .with_context(|| format!("Failed to save {}", target.display()))?;

    println!(
        "✓ Wrote {} entities to {}",
        loaded.document.inventory.len(),
        target.display()
    );
    if !loaded.violations.is_empty() {
        println!(
            "⚠️  {} violation(s) carried over; run `validate` for details",
            loaded.violations.len()
        );
    }
    Ok(())
}

//! GTNH Recipe Planner
//!
//! Command-line front end: plans builds against the catalog and inventory
//! stored in one SQLite database.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tracing_subscriber::EnvFilter;

use gtnh_planner::catalog::{Catalog, CatalogAccessor};
use gtnh_planner::config::{Config, DEFAULT_CONFIG_FILE, QuantityArg};
use gtnh_planner::models::{Item, StorageAssignment, StorageUnit, Unit, format_qty};
use gtnh_planner::{BuildTracker, PlanError, PlanOptions, db, report, sample};

#[derive(Parser)]
#[command(name = "gtnh-planner")]
#[command(about = "Recipe resolution and build planner for GregTech: New Horizons")]
struct Cli {
    /// Path to the SQLite database (overrides the config file)
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Path to the TOML config file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize empty database with schema
    Init,

    /// Load the sample catalog and stock the sample storages
    LoadSample,

    /// List all items in the catalog
    Items,

    /// List storage units and their contents
    Storages,

    /// Show the recipes producing an item
    Recipes {
        /// Item id, key or name
        item: String,
    },

    /// Plan how to build an item
    Plan {
        /// Item id, key or name (e.g. "Iron Rod")
        item: String,

        /// Quantity, e.g. 16 or 1000L
        qty: QuantityArg,

        /// Ignore the inventory and plan from scratch
        #[arg(long)]
        no_inventory: bool,

        /// Allowed machine tier; repeat for several
        #[arg(long = "tier")]
        tiers: Vec<String>,

        /// Allow recipes that need the 6x6 crafting grid
        #[arg(long)]
        unlock_6x6: bool,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,

        /// Also print the resolution tree
        #[arg(long)]
        tree: bool,
    },

    /// Plan, then show which steps the current inventory already satisfies
    Status {
        /// Item id, key or name (e.g. "Iron Rod")
        item: String,

        /// Quantity, e.g. 16 or 1000L
        qty: QuantityArg,

        /// Ignore the inventory and plan from scratch
        #[arg(long)]
        no_inventory: bool,

        /// Allowed machine tier; repeat for several
        #[arg(long = "tier")]
        tiers: Vec<String>,

        /// Allow recipes that need the 6x6 crafting grid
        #[arg(long)]
        unlock_6x6: bool,
    },

    /// Set the quantity of an item in a storage unit
    Stock {
        /// Storage name; created if it does not exist
        storage: String,

        /// Item id, key or name
        item: String,

        qty: QuantityArg,

        /// Keep this stock out of planning
        #[arg(long)]
        locked: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "gtnh_planner=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load_or_default(&cli.config)?;
    let database = cli.database.clone().unwrap_or_else(|| config.database());

    let conn = Connection::open(&database)
        .with_context(|| format!("failed to open database {}", database.display()))?;
    db::init_schema(&conn)?;

    match cli.command {
        Commands::Init => {
            println!("Database initialized at: {}", database.display());
        }

        Commands::LoadSample => {
            sample::load_sample_data(&conn)?;
            println!("Sample data loaded successfully!");
        }

        Commands::Items => {
            let catalog = db::load_catalog(&conn)?;
            let mut items: Vec<&Item> = catalog.items().collect();
            if items.is_empty() {
                println!("No items in database. Run 'load-sample' first.");
                return Ok(());
            }
            items.sort_by_key(|i| i.name.to_lowercase());
            println!("{:>6} {:<30} {:<10} {}", "ID", "Item", "Kind", "Machine");
            println!("{}", "-".repeat(60));
            for item in items {
                let machine = item
                    .machine
                    .as_ref()
                    .map(|m| format!("{} {}", m.tier, m.machine_type))
                    .unwrap_or_default();
                println!("{:>6} {:<30} {:<10} {}", item.id, item.name, item.kind.as_str(), machine);
            }
        }

        Commands::Storages => {
            let catalog = db::load_catalog(&conn)?;
            for storage in db::list_storages(&conn)? {
                let mut flags = Vec::new();
                if storage.locked {
                    flags.push("locked");
                }
                if !storage.allow_planner_use {
                    flags.push("planner disabled");
                }
                let flags = if flags.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", flags.join(", "))
                };
                println!("{} (priority {}){}", storage.name, storage.priority, flags);

                for entry in db::storage_contents(&conn, storage.id)? {
                    let qty = entry.qty_count.or(entry.qty_liters).unwrap_or(0);
                    let unit = if entry.qty_liters.is_some() { Unit::Liters } else { Unit::Count };
                    let locked = if entry.locked == Some(true) { " (locked)" } else { "" };
                    println!(
                        "  {} {}{}",
                        format_qty(qty, unit),
                        catalog.item_name(entry.item_id),
                        locked
                    );
                }
            }
        }

        Commands::Recipes { item } => {
            let catalog = db::load_catalog(&conn)?;
            let item = find_item(&catalog, &item)?;
            let recipes = catalog.get_recipes_for_output(item.id);
            if recipes.is_empty() {
                println!("No recipes produce {}", item.name);
            }
            for recipe in recipes {
                let machine = recipe
                    .machine_item_id
                    .map(|id| format!(" on {}", catalog.item_name(id)))
                    .unwrap_or_default();
                let grid = recipe
                    .grid_size
                    .as_deref()
                    .map(|grid| format!(", {} grid", grid.trim()))
                    .unwrap_or_default();
                let station = recipe
                    .station_item_id
                    .map(|id| format!(" at {}", catalog.item_name(id)))
                    .unwrap_or_default();
                let circuit = recipe.circuit.map(|n| format!(", circuit {}", n)).unwrap_or_default();
                println!(
                    "#{} {} ({}{}{}{}{})",
                    recipe.id,
                    recipe.name,
                    recipe.method.as_str(),
                    machine,
                    grid,
                    station,
                    circuit
                );
                for line in &recipe.inputs {
                    let unit = catalog.get_item(line.item_id).map(Item::unit).unwrap_or(Unit::Count);
                    let tool = if line.consumed { "" } else { " (not consumed)" };
                    println!("  in  {} {}{}", format_qty(line.qty, unit), catalog.item_name(line.item_id), tool);
                }
                for line in &recipe.outputs {
                    let unit = catalog.get_item(line.item_id).map(Item::unit).unwrap_or(Unit::Count);
                    let chance = line.chance.map(|c| format!(" ({}%)", c)).unwrap_or_default();
                    println!("  out {} {}{}", format_qty(line.qty, unit), catalog.item_name(line.item_id), chance);
                }
            }
        }

        Commands::Plan {
            item,
            qty,
            no_inventory,
            tiers,
            unlock_6x6,
            json,
            tree,
        } => {
            let catalog = db::load_catalog(&conn)?;
            let item = find_item(&catalog, &item)?;
            let qty = qty.qty_for(&item.name, item.unit())?;
            let options = plan_options(&config, no_inventory, tiers, unlock_6x6);
            let ledger = db::snapshot_ledger(&conn)?;
            let plan = gtnh_planner::plan(&catalog, &ledger, item.id, qty, &options)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
                return Ok(());
            }
            if tree {
                println!("Resolution tree:\n");
                println!("{}", report::format_plan_tree(&plan.root, 0));
            }
            println!("{}", report::summarize_plan(&plan));
        }

        Commands::Status {
            item,
            qty,
            no_inventory,
            tiers,
            unlock_6x6,
        } => {
            let catalog = db::load_catalog(&conn)?;
            let item = find_item(&catalog, &item)?;
            let qty = qty.qty_for(&item.name, item.unit())?;
            let options = plan_options(&config, no_inventory, tiers, unlock_6x6);
            let ledger = db::snapshot_ledger(&conn)?;
            let plan = gtnh_planner::plan(&catalog, &ledger, item.id, qty, &options)?;

            let tracker = BuildTracker::attach(&plan, &conn);
            print!("{}", report::format_status(&tracker.status()?));
        }

        Commands::Stock {
            storage,
            item,
            qty,
            locked,
        } => {
            let catalog = db::load_catalog(&conn)?;
            let item = find_item(&catalog, &item)?;
            let qty = qty.qty_for(&item.name, item.unit())?;

            let storage_id = match db::find_storage(&conn, &storage)? {
                Some(existing) => existing.id,
                None => {
                    let id = db::create_storage(
                        &conn,
                        &StorageUnit {
                            id: 0,
                            name: storage.clone(),
                            slot_count: None,
                            liter_capacity: None,
                            priority: 0,
                            allow_planner_use: true,
                            locked: false,
                        },
                    )?;
                    println!("Created storage '{}'", storage);
                    id
                }
            };

            let (qty_count, qty_liters) = match item.unit() {
                Unit::Count => (Some(qty), None),
                Unit::Liters => (None, Some(qty)),
            };
            db::upsert_assignment(
                &conn,
                &StorageAssignment {
                    storage_id,
                    item_id: item.id,
                    qty_count,
                    qty_liters,
                    locked: locked.then_some(true),
                    allow_planner_use: None,
                },
            )?;
            println!("{}: {} {}", storage, format_qty(qty, item.unit()), item.name);
        }
    }

    Ok(())
}

fn find_item<'c>(catalog: &'c Catalog, query: &str) -> Result<&'c Item, PlanError> {
    catalog
        .find_item(query)
        .ok_or_else(|| PlanError::UnknownItemName(query.to_string()))
}

/// Config file values with command-line overrides applied
fn plan_options(config: &Config, no_inventory: bool, tiers: Vec<String>, unlock_6x6: bool) -> PlanOptions {
    let mut options = config.planner.clone();
    if no_inventory {
        options.use_inventory = false;
    }
    if unlock_6x6 {
        options.crafting_6x6_unlocked = true;
    }
    if !tiers.is_empty() {
        options.enabled_tiers = Some(tiers.into_iter().collect::<BTreeSet<_>>());
    }
    options
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_plan_and_status_arguments_documented() {
        let cli = Cli::command();
        for name in ["plan", "status"] {
            let command = cli.find_subcommand(name).unwrap();
            for arg in command.get_arguments().filter(|a| a.get_id() != "help") {
                assert!(arg.get_help().is_some(), "{name} {} has no help", arg.get_id());
            }
        }
    }

    #[test]
    fn test_unlock_flag_overrides_config() {
        let config = Config::default();
        assert!(!plan_options(&config, false, Vec::new(), false).crafting_6x6_unlocked);
        let options = plan_options(&config, true, vec!["LV".to_string()], true);
        assert!(options.crafting_6x6_unlocked);
        assert!(!options.use_inventory);
        assert_eq!(options.enabled_tiers, Some(BTreeSet::from(["LV".to_string()])));
    }
}

//! Small GregTech-flavoured sample dataset for trying the planner without a
//! full pack export.

use anyhow::Result;
use rusqlite::Connection;

use crate::db;
use crate::models::{
    ContainerTransform, FluidContainer, Item, ItemId, ItemKind, MachineMetadata, MachineRef,
    Method, Recipe, RecipeLine, StorageAssignment, StorageUnit, TransformKind,
};

pub const IRON_ORE: ItemId = 1;
pub const IRON_DUST: ItemId = 2;
pub const IRON_INGOT: ItemId = 3;
pub const IRON_ROD: ItemId = 4;
pub const IRON_PLATE: ItemId = 5;
pub const STICK: ItemId = 6;
pub const HARD_HAMMER: ItemId = 7;
pub const MACHINE_CASING: ItemId = 8;
pub const WATER: ItemId = 9;
pub const EMPTY_CELL: ItemId = 10;
pub const WATER_CELL: ItemId = 11;
pub const STONE_DUST: ItemId = 12;
pub const CONCRETE: ItemId = 13;
pub const TIN_DUST: ItemId = 14;
pub const IRON_FRAME_BOX: ItemId = 15;
pub const LATHE_LV: ItemId = 20;
pub const MACERATOR_LV: ItemId = 21;
pub const MIXER_LV: ItemId = 22;
pub const FURNACE: ItemId = 23;
pub const EXTENDED_CRAFTING_TABLE: ItemId = 24;

fn item(id: ItemId, name: &str, kind: ItemKind) -> Item {
    Item {
        id,
        key: name.to_lowercase().replace(' ', "_"),
        name: name.to_string(),
        kind,
        material: None,
        machine: None,
        container: None,
        stack_size: 64,
    }
}

fn machine(id: ItemId, name: &str, machine_type: &str, tier: &str) -> Item {
    Item {
        machine: Some(MachineRef {
            machine_type: machine_type.to_string(),
            tier: tier.to_string(),
        }),
        stack_size: 1,
        ..item(id, name, ItemKind::Machine)
    }
}

fn consumed(item_id: ItemId, qty: u64) -> RecipeLine {
    RecipeLine {
        item_id,
        qty,
        chance: None,
        consumed: true,
    }
}

fn chance(item_id: ItemId, qty: u64, percent: f64) -> RecipeLine {
    RecipeLine {
        chance: Some(percent),
        ..consumed(item_id, qty)
    }
}

fn tool(item_id: ItemId) -> RecipeLine {
    RecipeLine {
        consumed: false,
        ..consumed(item_id, 1)
    }
}

fn recipe(
    id: i64,
    name: &str,
    method: Method,
    machine: Option<ItemId>,
    inputs: Vec<RecipeLine>,
    outputs: Vec<RecipeLine>,
) -> Recipe {
    Recipe {
        id,
        name: name.to_string(),
        method,
        machine_item_id: machine,
        grid_size: None,
        station_item_id: None,
        circuit: None,
        inputs,
        outputs,
    }
}

fn crafting(id: i64, name: &str, inputs: Vec<RecipeLine>, outputs: Vec<RecipeLine>) -> Recipe {
    Recipe {
        grid_size: Some("3x3".to_string()),
        ..recipe(id, name, Method::Crafting, None, inputs, outputs)
    }
}

fn metadata(machine_type: &str, tier: &str, slots: (u32, u32), tanks: (u32, u32)) -> MachineMetadata {
    MachineMetadata {
        machine_type: machine_type.to_string(),
        tier: tier.to_string(),
        input_slots: slots.0,
        output_slots: slots.1,
        input_tanks: tanks.0,
        output_tanks: tanks.1,
    }
}

/// Replace the catalog with the sample content and stock the sample storages
pub fn load_sample_data(conn: &Connection) -> Result<()> {
    db::clear_catalog(conn)?;

    let mut items = vec![
        Item {
            material: Some("Iron".to_string()),
            ..item(IRON_ORE, "Iron Ore", ItemKind::Raw)
        },
        Item {
            material: Some("Iron".to_string()),
            ..item(IRON_DUST, "Iron Dust", ItemKind::Material)
        },
        Item {
            material: Some("Iron".to_string()),
            ..item(IRON_INGOT, "Iron Ingot", ItemKind::Material)
        },
        item(IRON_ROD, "Iron Rod", ItemKind::Component),
        item(IRON_PLATE, "Iron Plate", ItemKind::Component),
        item(STICK, "Stick", ItemKind::Raw),
        Item {
            stack_size: 1,
            ..item(HARD_HAMMER, "Hard Hammer", ItemKind::Component)
        },
        item(MACHINE_CASING, "LV Machine Casing", ItemKind::Component),
        item(WATER, "Water", ItemKind::Fluid),
        item(EMPTY_CELL, "Empty Cell", ItemKind::Component),
        Item {
            container: Some(FluidContainer {
                fluid_id: WATER,
                amount_l: 1000,
            }),
            ..item(WATER_CELL, "Water Cell", ItemKind::Component)
        },
        item(STONE_DUST, "Stone Dust", ItemKind::Raw),
        item(CONCRETE, "Concrete", ItemKind::Fluid),
        item(TIN_DUST, "Tin Dust", ItemKind::Material),
        item(IRON_FRAME_BOX, "Iron Frame Box", ItemKind::Component),
        item(EXTENDED_CRAFTING_TABLE, "Extended Crafting Table", ItemKind::Component),
    ];
    items.extend([
        machine(LATHE_LV, "Basic Lathe", "Lathe", "LV"),
        machine(MACERATOR_LV, "Basic Macerator", "Macerator", "LV"),
        machine(MIXER_LV, "Basic Mixer", "Mixer", "LV"),
        machine(FURNACE, "Electric Furnace", "Furnace", "LV"),
    ]);
    for item in &items {
        db::upsert_item(conn, item)?;
    }

    for meta in [
        metadata("Lathe", "LV", (1, 2), (0, 0)),
        metadata("Macerator", "LV", (1, 1), (0, 0)),
        metadata("Mixer", "LV", (6, 1), (1, 1)),
        metadata("Furnace", "LV", (1, 1), (0, 0)),
    ] {
        db::upsert_machine_metadata(conn, &meta)?;
    }

    let recipes = vec![
        // Two output lines, so it never fits the single-slot LV macerator
        recipe(
            1,
            "Macerate Iron Ore",
            Method::Machine,
            Some(MACERATOR_LV),
            vec![consumed(IRON_ORE, 1)],
            vec![consumed(IRON_DUST, 2), chance(TIN_DUST, 1, 10.0)],
        ),
        crafting(
            2,
            "Crush Iron Ore",
            vec![consumed(IRON_ORE, 1)],
            vec![consumed(IRON_DUST, 1)],
        ),
        recipe(
            3,
            "Smelt Iron Dust",
            Method::Machine,
            Some(FURNACE),
            vec![consumed(IRON_DUST, 1)],
            vec![consumed(IRON_INGOT, 1)],
        ),
        recipe(
            4,
            "Lathe Iron Rod",
            Method::Machine,
            Some(LATHE_LV),
            vec![consumed(IRON_INGOT, 1)],
            vec![consumed(IRON_ROD, 1), consumed(IRON_DUST, 1)],
        ),
        crafting(
            5,
            "Craft Hard Hammer",
            vec![consumed(IRON_INGOT, 6), consumed(STICK, 2)],
            vec![consumed(HARD_HAMMER, 1)],
        ),
        crafting(
            6,
            "Hammer Iron Plate",
            vec![consumed(IRON_INGOT, 2), tool(HARD_HAMMER)],
            vec![consumed(IRON_PLATE, 1)],
        ),
        crafting(
            7,
            "Assemble LV Machine Casing",
            vec![consumed(IRON_PLATE, 8), tool(HARD_HAMMER)],
            vec![consumed(MACHINE_CASING, 1)],
        ),
        Recipe {
            circuit: Some(1),
            ..recipe(
                8,
                "Mix Concrete",
                Method::Machine,
                Some(MIXER_LV),
                vec![consumed(STONE_DUST, 1), consumed(WATER, 1000)],
                vec![consumed(CONCRETE, 1000)],
            )
        },
        Recipe {
            grid_size: Some("6x6".to_string()),
            station_item_id: Some(EXTENDED_CRAFTING_TABLE),
            ..recipe(
                9,
                "Craft Iron Frame Box",
                Method::Crafting,
                None,
                vec![consumed(IRON_ROD, 8)],
                vec![consumed(IRON_FRAME_BOX, 1)],
            )
        },
    ];
    for recipe in &recipes {
        db::insert_recipe(conn, recipe)?;
    }

    db::insert_container_transform(
        conn,
        &ContainerTransform {
            id: 1,
            priority: 0,
            container_item_id: WATER_CELL,
            empty_item_id: EMPTY_CELL,
            content_item_id: WATER,
            content_qty: 1000,
            kind: TransformKind::Bidirectional,
            empty_consumed: false,
        },
    )?;

    stock_sample_storages(conn)?;
    Ok(())
}

fn stock_sample_storages(conn: &Connection) -> Result<()> {
    let main = match db::find_storage(conn, db::MAIN_STORAGE_NAME)? {
        Some(storage) => storage.id,
        None => db::create_storage(conn, &storage(db::MAIN_STORAGE_NAME, 0, false))?,
    };
    let ore_chest = match db::find_storage(conn, "Ore Chest")? {
        Some(storage) => storage.id,
        None => db::create_storage(conn, &storage("Ore Chest", 5, false))?,
    };
    let vault = match db::find_storage(conn, "Vault")? {
        Some(storage) => storage.id,
        None => db::create_storage(conn, &storage("Vault", 10, true))?,
    };

    let stock = [
        (main, IRON_INGOT, 3, None),
        (main, WATER_CELL, 2, None),
        (main, STICK, 4, None),
        (ore_chest, IRON_ORE, 32, None),
        (vault, IRON_INGOT, 64, None),
        (vault, STICK, 16, Some(false)),
    ];
    for (storage_id, item_id, qty, locked) in stock {
        db::upsert_assignment(
            conn,
            &StorageAssignment {
                storage_id,
                item_id,
                qty_count: Some(qty),
                qty_liters: None,
                locked,
                allow_planner_use: None,
            },
        )?;
    }
    Ok(())
}

fn storage(name: &str, priority: i64, locked: bool) -> StorageUnit {
    StorageUnit {
        id: 0,
        name: name.to_string(),
        slot_count: Some(27),
        liter_capacity: None,
        priority,
        allow_planner_use: true,
        locked,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::plan;
    use crate::catalog::CatalogAccessor;
    use crate::models::Producer;
    use crate::resolver::PlanOptions;

    fn sample_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        load_sample_data(&conn).unwrap();
        conn
    }

    #[test]
    fn test_sample_loads_twice_without_duplicates() {
        let conn = sample_db();
        load_sample_data(&conn).unwrap();
        let catalog = db::load_catalog(&conn).unwrap();
        assert_eq!(catalog.get_recipes_for_output(IRON_ROD).len(), 1);
        assert_eq!(db::list_storages(&conn).unwrap().len(), 3);
        assert_eq!(db::snapshot_ledger(&conn).unwrap().available(IRON_INGOT), 3);
    }

    #[test]
    fn test_macerator_recipe_pruned_by_output_slots() {
        let conn = sample_db();
        let catalog = db::load_catalog(&conn).unwrap();
        let ledger = db::snapshot_ledger(&conn).unwrap();
        let plan = plan(&catalog, &ledger, IRON_DUST, 2, &PlanOptions::default()).unwrap();

        let producer = &plan.steps.last().unwrap().producer;
        assert!(matches!(producer, Producer::Recipe { recipe_id: 2, .. }));
    }

    #[test]
    fn test_casing_plan_reuses_hammer_and_skips_locked_ingots() {
        let conn = sample_db();
        let catalog = db::load_catalog(&conn).unwrap();
        let ledger = db::snapshot_ledger(&conn).unwrap();
        let plan = plan(&catalog, &ledger, MACHINE_CASING, 1, &PlanOptions::default()).unwrap();

        let hammers = plan
            .steps
            .iter()
            .filter(|s| s.item_id == HARD_HAMMER)
            .count();
        assert_eq!(hammers, 1);
        let usage = plan.inventory_usage();
        let ingots = usage.iter().find(|u| u.item_id == IRON_INGOT).unwrap();
        assert_eq!(ingots.total, 3);
        assert!(ingots.draws.iter().all(|d| d.storage_name == db::MAIN_STORAGE_NAME));
        assert!(plan.shopping_list.get(IRON_ORE).is_none());
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn test_concrete_uses_water_cells() {
        let conn = sample_db();
        let catalog = db::load_catalog(&conn).unwrap();
        let ledger = db::snapshot_ledger(&conn).unwrap();
        let plan = plan(&catalog, &ledger, CONCRETE, 2000, &PlanOptions::default()).unwrap();

        assert_eq!(plan.steps[0].producer.label(), "Emptying");
        assert_eq!(plan.steps[0].batches, 2);
        assert_eq!(plan.shopping_list.get(STONE_DUST).map(|e| e.qty), Some(2));
        let mix = plan.steps.last().unwrap();
        assert_eq!(mix.producer.circuit(), Some(1));
        assert!(mix.describe().ends_with("[LV Mixer] (circuit 1)"));
    }

    #[test]
    fn test_frame_box_needs_unlocked_6x6_grid() {
        let conn = sample_db();
        let catalog = db::load_catalog(&conn).unwrap();
        let ledger = db::snapshot_ledger(&conn).unwrap();

        let locked = plan(&catalog, &ledger, IRON_FRAME_BOX, 1, &PlanOptions::default()).unwrap();
        assert!(locked.steps.is_empty());
        assert_eq!(locked.missing_recipes, vec!["Iron Frame Box".to_string()]);

        let options = PlanOptions {
            crafting_6x6_unlocked: true,
            ..PlanOptions::default()
        };
        let unlocked = plan(&catalog, &ledger, IRON_FRAME_BOX, 1, &options).unwrap();
        let step = unlocked.steps.last().unwrap();
        assert_eq!(step.item_id, IRON_FRAME_BOX);
        assert_eq!(step.producer.station().as_deref(), Some("6x6 at Extended Crafting Table"));
        assert_eq!(
            step.describe(),
            "Craft Iron Frame Box x1 -> 1 Iron Frame Box [6x6 at Extended Crafting Table]"
        );
    }
}

//! Database schema and operations
//!
//! One SQLite file holds the content catalog and the inventory. The planner
//! only reads it (`load_catalog`, `snapshot_ledger`); the storage write
//! functions at the bottom are the inventory's own write path.

use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OptionalExtension, Row};

use crate::catalog::Catalog;
use crate::error::PlanError;
use crate::ledger::{Ledger, LedgerRow, LedgerSource};
use crate::models::{
    ContainerTransform, FluidContainer, Item, ItemId, ItemKind, MachineMetadata, MachineRef,
    Method, Recipe, RecipeId, RecipeLine, StorageAssignment, StorageId, StorageUnit,
    TransformId, TransformKind, Unit,
};

pub const MAIN_STORAGE_NAME: &str = "Main Storage";

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Content catalog
        CREATE TABLE IF NOT EXISTS items (
            id INTEGER PRIMARY KEY,
            key TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            material TEXT,
            machine_type TEXT,
            machine_tier TEXT,
            container_fluid_id INTEGER,
            container_amount_l INTEGER,
            stack_size INTEGER NOT NULL DEFAULT 64
        );

        CREATE TABLE IF NOT EXISTS machine_metadata (
            machine_type TEXT NOT NULL,
            tier TEXT NOT NULL,
            input_slots INTEGER NOT NULL DEFAULT 1,
            output_slots INTEGER NOT NULL DEFAULT 1,
            input_tanks INTEGER NOT NULL DEFAULT 0,
            output_tanks INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (machine_type, tier)
        );

        CREATE TABLE IF NOT EXISTS recipes (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            method TEXT NOT NULL DEFAULT 'machine',
            machine_item_id INTEGER,
            grid_size TEXT,
            station_item_id INTEGER,
            circuit INTEGER
        );

        -- direction is 'in' or 'out'; chance is 0-100, NULL means always
        CREATE TABLE IF NOT EXISTS recipe_lines (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            recipe_id INTEGER NOT NULL,
            direction TEXT NOT NULL,
            item_id INTEGER NOT NULL,
            qty INTEGER NOT NULL,
            chance REAL,
            consumed INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS item_container_transforms (
            id INTEGER PRIMARY KEY,
            priority INTEGER NOT NULL DEFAULT 0,
            container_item_id INTEGER NOT NULL,
            empty_item_id INTEGER NOT NULL,
            content_item_id INTEGER NOT NULL,
            content_qty INTEGER NOT NULL,
            kind TEXT NOT NULL DEFAULT 'bidirectional',
            empty_consumed INTEGER NOT NULL DEFAULT 0
        );

        -- Inventory
        CREATE TABLE IF NOT EXISTS storage_units (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            slot_count INTEGER,
            liter_capacity INTEGER,
            priority INTEGER NOT NULL DEFAULT 0,
            allow_planner_use INTEGER NOT NULL DEFAULT 1,
            locked INTEGER NOT NULL DEFAULT 0
        );

        -- NULL flags inherit from the storage unit
        CREATE TABLE IF NOT EXISTS storage_assignments (
            storage_id INTEGER NOT NULL,
            item_id INTEGER NOT NULL,
            qty_count INTEGER,
            qty_liters INTEGER,
            locked INTEGER,
            allow_planner_use INTEGER,
            PRIMARY KEY (storage_id, item_id)
        );

        CREATE INDEX IF NOT EXISTS idx_recipe_lines_recipe ON recipe_lines(recipe_id);
        CREATE INDEX IF NOT EXISTS idx_recipe_lines_item ON recipe_lines(item_id, direction);
        CREATE INDEX IF NOT EXISTS idx_storage_assignments_item ON storage_assignments(item_id);
        "#,
    )?;

    // Databases created before crafting grids were tracked
    for (column, decl) in [
        ("grid_size", "TEXT"),
        ("station_item_id", "INTEGER"),
        ("circuit", "INTEGER"),
    ] {
        if !has_column(conn, "recipes", column)? {
            conn.execute_batch(&format!("ALTER TABLE recipes ADD COLUMN {column} {decl}"))?;
        }
    }

    let storages: i64 = conn.query_row("SELECT COUNT(*) FROM storage_units", [], |row| row.get(0))?;
    if storages == 0 {
        conn.execute(
            "INSERT INTO storage_units (name, priority, allow_planner_use, locked) VALUES (?1, 0, 1, 0)",
            [MAIN_STORAGE_NAME],
        )?;
    }
    Ok(())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

fn to_sql_qty(qty: u64) -> i64 {
    i64::try_from(qty).unwrap_or(i64::MAX)
}

fn from_sql_qty(qty: i64) -> u64 {
    u64::try_from(qty).unwrap_or(0)
}

// --- Catalog ---------------------------------------------------------------

/// Insert or replace an item
pub fn upsert_item(conn: &Connection, item: &Item) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO items
            (id, key, name, kind, material, machine_type, machine_tier,
             container_fluid_id, container_amount_l, stack_size)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        (
            item.id,
            &item.key,
            &item.name,
            item.kind.as_str(),
            &item.material,
            item.machine.as_ref().map(|m| m.machine_type.as_str()),
            item.machine.as_ref().map(|m| m.tier.as_str()),
            item.container.as_ref().map(|c| c.fluid_id),
            item.container.as_ref().map(|c| to_sql_qty(c.amount_l)),
            item.stack_size,
        ),
    )
    .with_context(|| format!("failed to save item '{}'", item.name))?;
    Ok(())
}

/// Insert or replace machine metadata for one (type, tier)
pub fn upsert_machine_metadata(conn: &Connection, meta: &MachineMetadata) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO machine_metadata
            (machine_type, tier, input_slots, output_slots, input_tanks, output_tanks)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        (
            &meta.machine_type,
            &meta.tier,
            meta.input_slots,
            meta.output_slots,
            meta.input_tanks,
            meta.output_tanks,
        ),
    )?;
    Ok(())
}

/// Insert a recipe with all its lines. Returns the recipe id.
pub fn insert_recipe(conn: &Connection, recipe: &Recipe) -> Result<RecipeId> {
    conn.execute(
        "INSERT INTO recipes (id, name, method, machine_item_id, grid_size, station_item_id, circuit)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        (
            recipe.id,
            &recipe.name,
            recipe.method.as_str(),
            recipe.machine_item_id,
            &recipe.grid_size,
            recipe.station_item_id,
            recipe.circuit,
        ),
    )
    .with_context(|| format!("failed to save recipe '{}'", recipe.name))?;

    for line in &recipe.inputs {
        insert_recipe_line(conn, recipe.id, "in", line)?;
    }
    for line in &recipe.outputs {
        insert_recipe_line(conn, recipe.id, "out", line)?;
    }
    Ok(recipe.id)
}

/// Insert one input (`"in"`) or output (`"out"`) line
pub fn insert_recipe_line(
    conn: &Connection,
    recipe_id: RecipeId,
    direction: &str,
    line: &RecipeLine,
) -> Result<()> {
    if direction != "in" && direction != "out" {
        bail!("recipe line direction must be 'in' or 'out', got '{}'", direction);
    }
    conn.execute(
        "INSERT INTO recipe_lines (recipe_id, direction, item_id, qty, chance, consumed)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        (
            recipe_id,
            direction,
            line.item_id,
            to_sql_qty(line.qty),
            line.chance,
            line.consumed,
        ),
    )?;
    Ok(())
}

pub fn insert_container_transform(conn: &Connection, transform: &ContainerTransform) -> Result<TransformId> {
    conn.execute(
        "INSERT INTO item_container_transforms
            (id, priority, container_item_id, empty_item_id, content_item_id, content_qty, kind, empty_consumed)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        (
            transform.id,
            transform.priority,
            transform.container_item_id,
            transform.empty_item_id,
            transform.content_item_id,
            to_sql_qty(transform.content_qty),
            transform.kind.as_str(),
            transform.empty_consumed,
        ),
    )?;
    Ok(transform.id)
}

/// Clear all catalog content, leaving the inventory untouched
pub fn clear_catalog(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DELETE FROM item_container_transforms;
        DELETE FROM recipe_lines;
        DELETE FROM recipes;
        DELETE FROM machine_metadata;
        DELETE FROM items;
        "#,
    )?;
    Ok(())
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<(Item, String)> {
    let kind: String = row.get(3)?;
    let machine_type: Option<String> = row.get(5)?;
    let machine_tier: Option<String> = row.get(6)?;
    let fluid_id: Option<ItemId> = row.get(7)?;
    let amount_l: Option<i64> = row.get(8)?;

    let item = Item {
        id: row.get(0)?,
        key: row.get(1)?,
        name: row.get(2)?,
        kind: ItemKind::parse(&kind).unwrap_or(ItemKind::Component),
        material: row.get(4)?,
        machine: machine_type.zip(machine_tier).map(|(machine_type, tier)| MachineRef { machine_type, tier }),
        container: fluid_id.zip(amount_l).map(|(fluid_id, amount)| FluidContainer {
            fluid_id,
            amount_l: from_sql_qty(amount),
        }),
        stack_size: row.get(9)?,
    };
    Ok((item, kind))
}

/// Read the whole catalog into memory
pub fn load_catalog(conn: &Connection) -> Result<Catalog> {
    let mut stmt = conn.prepare(
        "SELECT id, key, name, kind, material, machine_type, machine_tier,
                container_fluid_id, container_amount_l, stack_size
         FROM items ORDER BY id",
    )?;
    let rows = stmt.query_map([], item_from_row)?;
    let mut items = Vec::new();
    for row in rows {
        let (item, kind) = row?;
        if ItemKind::parse(&kind).is_none() {
            tracing::warn!(item = %item.name, kind = %kind, "unknown item kind, treating as component");
        }
        items.push(item);
    }

    let mut stmt = conn.prepare(
        "SELECT machine_type, tier, input_slots, output_slots, input_tanks, output_tanks
         FROM machine_metadata",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(MachineMetadata {
            machine_type: row.get(0)?,
            tier: row.get(1)?,
            input_slots: row.get(2)?,
            output_slots: row.get(3)?,
            input_tanks: row.get(4)?,
            output_tanks: row.get(5)?,
        })
    })?;
    let mut machines = Vec::new();
    for row in rows {
        machines.push(row?);
    }

    let mut stmt = conn.prepare(
        "SELECT id, name, method, machine_item_id, grid_size, station_item_id, circuit
         FROM recipes ORDER BY id",
    )?;
    let rows = stmt.query_map([], |row| {
        let method: String = row.get(2)?;
        Ok(Recipe {
            id: row.get(0)?,
            name: row.get(1)?,
            method: Method::parse(&method),
            machine_item_id: row.get(3)?,
            grid_size: row.get(4)?,
            station_item_id: row.get(5)?,
            circuit: row.get(6)?,
            inputs: Vec::new(),
            outputs: Vec::new(),
        })
    })?;
    let mut recipes = Vec::new();
    let mut positions: BTreeMap<RecipeId, usize> = BTreeMap::new();
    for row in rows {
        let recipe = row?;
        positions.insert(recipe.id, recipes.len());
        recipes.push(recipe);
    }

    let mut stmt = conn.prepare(
        "SELECT recipe_id, direction, item_id, qty, chance, consumed
         FROM recipe_lines ORDER BY recipe_id, id",
    )?;
    let rows = stmt.query_map([], |row| {
        let qty: i64 = row.get(3)?;
        Ok((
            row.get::<_, RecipeId>(0)?,
            row.get::<_, String>(1)?,
            RecipeLine {
                item_id: row.get(2)?,
                qty: from_sql_qty(qty),
                chance: row.get(4)?,
                consumed: row.get(5)?,
            },
        ))
    })?;
    for row in rows {
        let (recipe_id, direction, line) = row?;
        let Some(recipe) = positions.get(&recipe_id).and_then(|&at| recipes.get_mut(at)) else {
            tracing::warn!(recipe_id, "recipe line for unknown recipe");
            continue;
        };
        match direction.as_str() {
            "in" => recipe.inputs.push(line),
            "out" => recipe.outputs.push(line),
            other => tracing::warn!(recipe_id, direction = other, "unknown recipe line direction"),
        }
    }

    let mut stmt = conn.prepare(
        "SELECT id, priority, container_item_id, empty_item_id, content_item_id, content_qty, kind, empty_consumed
         FROM item_container_transforms ORDER BY id",
    )?;
    let rows = stmt.query_map([], |row| {
        let content_qty: i64 = row.get(5)?;
        let kind: String = row.get(6)?;
        Ok(ContainerTransform {
            id: row.get(0)?,
            priority: row.get(1)?,
            container_item_id: row.get(2)?,
            empty_item_id: row.get(3)?,
            content_item_id: row.get(4)?,
            content_qty: from_sql_qty(content_qty),
            kind: TransformKind::parse(&kind).unwrap_or(TransformKind::Bidirectional),
            empty_consumed: row.get(7)?,
        })
    })?;
    let mut transforms = Vec::new();
    for row in rows {
        transforms.push(row?);
    }

    tracing::debug!(
        items = items.len(),
        recipes = recipes.len(),
        machines = machines.len(),
        transforms = transforms.len(),
        "loaded catalog"
    );
    Ok(Catalog::new(items, recipes, machines, transforms))
}

// --- Inventory -------------------------------------------------------------

fn storage_from_row(row: &Row<'_>) -> rusqlite::Result<StorageUnit> {
    let liter_capacity: Option<i64> = row.get(3)?;
    Ok(StorageUnit {
        id: row.get(0)?,
        name: row.get(1)?,
        slot_count: row.get(2)?,
        liter_capacity: liter_capacity.map(from_sql_qty),
        priority: row.get(4)?,
        allow_planner_use: row.get(5)?,
        locked: row.get(6)?,
    })
}

/// All storage units, Main Storage first, then by name
pub fn list_storages(conn: &Connection) -> Result<Vec<StorageUnit>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, slot_count, liter_capacity, priority, allow_planner_use, locked
         FROM storage_units
         ORDER BY CASE WHEN name = ?1 THEN 0 ELSE 1 END, LOWER(name), id",
    )?;
    let rows = stmt.query_map([MAIN_STORAGE_NAME], storage_from_row)?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

pub fn find_storage(conn: &Connection, name: &str) -> Result<Option<StorageUnit>> {
    let storage = conn
        .query_row(
            "SELECT id, name, slot_count, liter_capacity, priority, allow_planner_use, locked
             FROM storage_units WHERE name = ?1 COLLATE NOCASE",
            [name],
            storage_from_row,
        )
        .optional()?;
    Ok(storage)
}

/// Create a storage unit; the id on `storage` is ignored
pub fn create_storage(conn: &Connection, storage: &StorageUnit) -> Result<StorageId> {
    conn.execute(
        "INSERT INTO storage_units (name, slot_count, liter_capacity, priority, allow_planner_use, locked)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        (
            &storage.name,
            storage.slot_count,
            storage.liter_capacity.map(to_sql_qty),
            storage.priority,
            storage.allow_planner_use,
            storage.locked,
        ),
    )
    .with_context(|| format!("failed to create storage '{}'", storage.name))?;
    Ok(conn.last_insert_rowid())
}

/// Insert or replace the quantity and flags of one item in one storage
pub fn upsert_assignment(conn: &Connection, assignment: &StorageAssignment) -> Result<()> {
    conn.execute(
        "INSERT INTO storage_assignments (storage_id, item_id, qty_count, qty_liters, locked, allow_planner_use)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(storage_id, item_id) DO UPDATE SET
            qty_count = excluded.qty_count,
            qty_liters = excluded.qty_liters,
            locked = excluded.locked,
            allow_planner_use = excluded.allow_planner_use",
        (
            assignment.storage_id,
            assignment.item_id,
            assignment.qty_count.map(to_sql_qty),
            assignment.qty_liters.map(to_sql_qty),
            assignment.locked,
            assignment.allow_planner_use,
        ),
    )?;
    Ok(())
}

pub fn delete_assignment(conn: &Connection, storage_id: StorageId, item_id: ItemId) -> Result<()> {
    conn.execute(
        "DELETE FROM storage_assignments WHERE storage_id = ?1 AND item_id = ?2",
        (storage_id, item_id),
    )?;
    Ok(())
}

/// Contents of one storage unit
pub fn storage_contents(conn: &Connection, storage_id: StorageId) -> Result<Vec<StorageAssignment>> {
    let mut stmt = conn.prepare(
        "SELECT storage_id, item_id, qty_count, qty_liters, locked, allow_planner_use
         FROM storage_assignments WHERE storage_id = ?1 ORDER BY item_id",
    )?;
    let rows = stmt.query_map([storage_id], |row| {
        let qty_count: Option<i64> = row.get(2)?;
        let qty_liters: Option<i64> = row.get(3)?;
        Ok(StorageAssignment {
            storage_id: row.get(0)?,
            item_id: row.get(1)?,
            qty_count: qty_count.map(from_sql_qty),
            qty_liters: qty_liters.map(from_sql_qty),
            locked: row.get(4)?,
            allow_planner_use: row.get(5)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Add `delta` to an item's quantity in a storage, clamping at zero.
/// Returns the new quantity.
pub fn adjust_quantity(conn: &Connection, storage_id: StorageId, item_id: ItemId, delta: i64) -> Result<u64> {
    let kind: String = conn
        .query_row("SELECT kind FROM items WHERE id = ?1", [item_id], |row| row.get(0))
        .optional()?
        .with_context(|| format!("unknown item #{}", item_id))?;
    let column = match ItemKind::parse(&kind).map(|k| k.unit()) {
        Some(Unit::Liters) => "qty_liters",
        _ => "qty_count",
    };

    let current: Option<i64> = conn
        .query_row(
            &format!(
                "SELECT {} FROM storage_assignments WHERE storage_id = ?1 AND item_id = ?2",
                column
            ),
            (storage_id, item_id),
            |row| row.get(0),
        )
        .optional()?
        .flatten();
    let updated = current.unwrap_or(0).saturating_add(delta).max(0);

    conn.execute(
        &format!(
            "INSERT INTO storage_assignments (storage_id, item_id, {column})
             VALUES (?1, ?2, ?3)
             ON CONFLICT(storage_id, item_id) DO UPDATE SET {column} = excluded.{column}"
        ),
        (storage_id, item_id, updated),
    )?;
    Ok(from_sql_qty(updated))
}

/// Read a point-in-time inventory snapshot with effective policy flags
pub fn snapshot_ledger(conn: &Connection) -> Result<Ledger> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.name, s.priority, s.allow_planner_use, s.locked,
                a.item_id, a.qty_count, a.qty_liters, a.allow_planner_use, a.locked, i.kind
         FROM storage_assignments a
         JOIN storage_units s ON s.id = a.storage_id
         JOIN items i ON i.id = a.item_id",
    )?;
    let rows = stmt.query_map([], |row| {
        let storage_allow: bool = row.get(3)?;
        let storage_locked: bool = row.get(4)?;
        let qty_count: Option<i64> = row.get(6)?;
        let qty_liters: Option<i64> = row.get(7)?;
        let allow: Option<bool> = row.get(8)?;
        let locked: Option<bool> = row.get(9)?;
        let kind: String = row.get(10)?;

        let unit = ItemKind::parse(&kind).map(|k| k.unit()).unwrap_or(Unit::Count);
        let qty = match unit {
            Unit::Count => qty_count,
            Unit::Liters => qty_liters,
        };
        Ok(LedgerRow {
            storage_id: row.get(0)?,
            storage_name: row.get(1)?,
            priority: row.get(2)?,
            allow_planner_use: allow.unwrap_or(storage_allow),
            locked: locked.unwrap_or(storage_locked),
            item_id: row.get(5)?,
            unit,
            qty: qty.map(from_sql_qty).unwrap_or(0),
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(Ledger::new(results))
}

impl LedgerSource for Connection {
    fn snapshot_ledger(&self) -> Result<Ledger, PlanError> {
        snapshot_ledger(self)
            .context("failed to read inventory")
            .map_err(PlanError::from)
    }
}

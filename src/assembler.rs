//! Plan assembler
//!
//! Flattens a resolution tree into an aggregated shopping list and a
//! post-ordered list of build steps: a step always comes after the steps that
//! produce its inputs.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::catalog::CatalogAccessor;
use crate::error::{PlanError, PlanWarning};
use crate::ledger::Ledger;
use crate::models::{
    Byproduct, Draw, ItemId, LeafReason, NodeKind, PlanNode, Producer, Unit, format_qty,
};
use crate::resolver::{PlanOptions, resolve};
use crate::transform::{LatentContent, latent_contents};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShoppingEntry {
    pub item_id: ItemId,
    pub item_name: String,
    pub unit: Unit,
    pub qty: u64,
}

/// Unresolved requirements, one entry per item, ordered by name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ShoppingList {
    entries: Vec<ShoppingEntry>,
}

impl ShoppingList {
    fn from_totals(totals: BTreeMap<ItemId, ShoppingEntry>) -> Self {
        let mut entries: Vec<ShoppingEntry> = totals.into_values().collect();
        entries.sort_by(|a, b| {
            a.item_name
                .to_lowercase()
                .cmp(&b.item_name.to_lowercase())
                .then(a.item_id.cmp(&b.item_id))
        });
        Self { entries }
    }

    pub fn entries(&self) -> &[ShoppingEntry] {
        &self.entries
    }

    pub fn get(&self, item_id: ItemId) -> Option<&ShoppingEntry> {
        self.entries.iter().find(|e| e.item_id == item_id)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// One input of a build step and where it comes from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepInput {
    pub item_id: ItemId,
    pub item_name: String,
    pub unit: Unit,
    pub qty: u64,
    /// False for catalysts and tools: needed present, never depleted
    pub consumed: bool,
    pub chance: Option<f64>,
    pub from_credits: u64,
    /// Storages debited for this input; for tools, where they are found
    pub draws: Vec<Draw>,
    /// Earlier step producing the rest of this input
    pub produced_by: Option<usize>,
    /// Amount that ends up on the shopping list
    pub missing: u64,
    /// Tool already secured by an earlier step
    pub reused: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildStep {
    pub index: usize,
    pub item_id: ItemId,
    pub item_name: String,
    pub unit: Unit,
    pub producer: Producer,
    pub batches: u64,
    pub per_batch: u64,
    /// Total produced, surplus included
    pub output: u64,
    pub surplus: u64,
    pub inputs: Vec<StepInput>,
    pub byproducts: Vec<Byproduct>,
    pub depends_on: Vec<usize>,
    pub warnings: Vec<PlanWarning>,
}

impl BuildStep {
    /// e.g. "Lathe Test x2 -> 2 Iron Rod [LV Lathe]", with the crafting
    /// station or programmed circuit when the recipe has one
    pub fn describe(&self) -> String {
        let mut text = format!(
            "{} x{} -> {} {}",
            self.producer.label(),
            self.batches,
            format_qty(self.output, self.unit),
            self.item_name
        );
        if let Some(machine) = self.producer.machine() {
            text.push_str(&format!(" [{} {}]", machine.tier, machine.machine_type));
        }
        if let Some(station) = self.producer.station() {
            text.push_str(&format!(" [{}]", station));
        }
        if let Some(circuit) = self.producer.circuit() {
            text.push_str(&format!(" (circuit {})", circuit));
        }
        text
    }
}

/// Flatten a resolution tree in post-order.
pub fn flatten(root: &PlanNode) -> (ShoppingList, Vec<BuildStep>) {
    let mut totals = BTreeMap::new();
    let mut steps = Vec::new();
    visit(root, &mut totals, &mut steps);
    (ShoppingList::from_totals(totals), steps)
}

/// Returns the index of the step producing `node`, if one was emitted
fn visit(
    node: &PlanNode,
    totals: &mut BTreeMap<ItemId, ShoppingEntry>,
    steps: &mut Vec<BuildStep>,
) -> Option<usize> {
    let production = match &node.kind {
        NodeKind::Leaf { missing, .. } => {
            let entry = totals
                .entry(node.item_id)
                .or_insert_with(|| ShoppingEntry {
                    item_id: node.item_id,
                    item_name: node.item_name.clone(),
                    unit: node.unit,
                    qty: 0,
                });
            entry.qty = entry.qty.saturating_add(*missing);
            return None;
        }
        NodeKind::Stocked | NodeKind::Reused => return None,
        NodeKind::Produced(production) => production,
    };

    let mut inputs = Vec::with_capacity(production.inputs.len());
    let mut depends_on = Vec::new();
    for (input, child) in production.inputs.iter().zip(&node.children) {
        let produced_by = visit(child, totals, steps);
        depends_on.extend(produced_by);
        inputs.push(StepInput {
            item_id: input.item_id,
            item_name: input.item_name.clone(),
            unit: input.unit,
            qty: input.qty,
            consumed: input.consumed,
            chance: input.chance,
            from_credits: child.from_credits,
            draws: child.allocation.draws.clone(),
            produced_by,
            missing: child.missing(),
            reused: child.kind == NodeKind::Reused,
        });
    }
    depends_on.sort_unstable();
    depends_on.dedup();

    let index = steps.len();
    steps.push(BuildStep {
        index,
        item_id: node.item_id,
        item_name: node.item_name.clone(),
        unit: node.unit,
        producer: production.producer.clone(),
        batches: production.batches,
        per_batch: production.per_batch,
        output: production.total_output(),
        surplus: production.surplus,
        inputs,
        byproducts: production.byproducts.clone(),
        depends_on,
        warnings: node.warnings.clone(),
    });
    Some(index)
}

/// Per-item inventory drawn by a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryUsage {
    pub item_id: ItemId,
    pub item_name: String,
    pub unit: Unit,
    pub total: u64,
    /// Merged per storage, in consumption order
    pub draws: Vec<Draw>,
}

/// A fully assembled plan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    pub target_id: ItemId,
    pub target_name: String,
    pub unit: Unit,
    pub qty: u64,
    pub root: PlanNode,
    pub shopping_list: ShoppingList,
    pub steps: Vec<BuildStep>,
    pub warnings: Vec<PlanWarning>,
    /// Non-base items that had no usable recipe
    pub missing_recipes: Vec<String>,
    /// Content that full containers left in storage could still release
    pub releasable: Vec<LatentContent>,
}

impl Plan {
    pub fn assemble(root: PlanNode) -> Self {
        let (shopping_list, steps) = flatten(&root);

        let mut warnings: Vec<PlanWarning> = Vec::new();
        for warning in root.all_warnings() {
            if !warnings.contains(&warning) {
                warnings.push(warning);
            }
        }

        let mut missing_recipes: Vec<String> = Vec::new();
        root.walk(&mut |node| {
            if let NodeKind::Leaf {
                reason: LeafReason::NoRecipe,
                ..
            } = node.kind
            {
                if !missing_recipes.contains(&node.item_name) {
                    missing_recipes.push(node.item_name.clone());
                }
            }
        });
        missing_recipes.sort_by_key(|name| name.to_lowercase());

        Self {
            target_id: root.item_id,
            target_name: root.item_name.clone(),
            unit: root.unit,
            qty: root.requested,
            root,
            shopping_list,
            steps,
            warnings,
            missing_recipes,
            releasable: Vec::new(),
        }
    }

    pub fn is_buildable_from_stock(&self) -> bool {
        self.shopping_list.is_empty()
    }

    pub fn warning_messages(&self) -> Vec<String> {
        self.warnings.iter().map(ToString::to_string).collect()
    }

    /// What the plan takes out of storage. Tools are checked for presence
    /// only and are not counted.
    pub fn inventory_usage(&self) -> Vec<InventoryUsage> {
        let mut usage: BTreeMap<ItemId, InventoryUsage> = BTreeMap::new();
        self.root.walk(&mut |node| {
            if node.catalyst || node.allocation.draws.is_empty() {
                return;
            }
            let entry = usage.entry(node.item_id).or_insert_with(|| InventoryUsage {
                item_id: node.item_id,
                item_name: node.item_name.clone(),
                unit: node.unit,
                total: 0,
                draws: Vec::new(),
            });
            for draw in &node.allocation.draws {
                entry.total = entry.total.saturating_add(draw.qty);
                match entry.draws.iter_mut().find(|d| d.storage_id == draw.storage_id) {
                    Some(existing) => existing.qty = existing.qty.saturating_add(draw.qty),
                    None => entry.draws.push(draw.clone()),
                }
            }
        });

        let mut usage: Vec<InventoryUsage> = usage.into_values().collect();
        usage.sort_by(|a, b| {
            a.item_name
                .to_lowercase()
                .cmp(&b.item_name.to_lowercase())
                .then(a.item_id.cmp(&b.item_id))
        });
        usage
    }
}

/// Resolve and assemble in one call
pub fn plan<C: CatalogAccessor + ?Sized>(
    catalog: &C,
    ledger: &Ledger,
    target: ItemId,
    qty: u64,
    options: &PlanOptions,
) -> Result<Plan, PlanError> {
    let root = resolve(catalog, ledger, target, qty, options)?;
    let mut plan = Plan::assemble(root);

    if options.use_inventory {
        let spent: BTreeMap<ItemId, u64> = plan
            .inventory_usage()
            .into_iter()
            .map(|usage| (usage.item_id, usage.total))
            .collect();
        plan.releasable = latent_contents(catalog, ledger, |id| {
            spent.get(&id).copied().unwrap_or(0)
        });
    }

    tracing::info!(
        target = %plan.target_name,
        steps = plan.steps.len(),
        shopping = plan.shopping_list.len(),
        warnings = plan.warnings.len(),
        releasable = plan.releasable.len(),
        "assembled plan"
    );
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::catalog::fixtures::*;
    use crate::ledger::{LedgerRow, row};
    use crate::models::{ContainerTransform, ItemKind, TransformDirection, TransformKind};

    const ROD: ItemId = 1;
    const INGOT: ItemId = 2;
    const LATHE: ItemId = 3;

    fn lathe_catalog() -> Catalog {
        Catalog::new(
            vec![
                item(ROD, "Iron Rod", ItemKind::Component),
                item(INGOT, "Iron Ingot", ItemKind::Material),
                machine_item(LATHE, "Basic Lathe", "Lathe", "LV"),
            ],
            vec![machine_recipe(1, "Lathe Test", LATHE, vec![line(INGOT, 1)], vec![line(ROD, 1)])],
            vec![metadata("Lathe", "LV", 1, 1)],
            vec![],
        )
    }

    fn main_storage(item_id: ItemId, qty: u64) -> LedgerRow {
        LedgerRow {
            storage_name: "Main Storage".to_string(),
            ..row(1, 0, item_id, qty)
        }
    }

    #[test]
    fn test_iron_rod_from_stocked_ingot() {
        let ledger = Ledger::new(vec![main_storage(INGOT, 1)]);
        let plan = plan(&lathe_catalog(), &ledger, ROD, 1, &PlanOptions::default()).unwrap();

        assert_eq!(plan.steps.len(), 1);
        let step = &plan.steps[0];
        assert_eq!(step.producer.label(), "Lathe Test");
        let machine = step.producer.machine().unwrap();
        assert_eq!((machine.input_slots, machine.output_slots), (1, 1));
        assert_eq!(step.inputs[0].draws.len(), 1);
        assert_eq!(step.inputs[0].draws[0].storage_name, "Main Storage");
        assert_eq!(step.inputs[0].draws[0].qty, 1);
        assert!(plan.shopping_list.is_empty());
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn test_iron_rod_with_empty_ledger() {
        let plan = plan(&lathe_catalog(), &Ledger::empty(), ROD, 1, &PlanOptions::default()).unwrap();

        assert_eq!(plan.steps.len(), 1);
        let entry = plan.shopping_list.get(INGOT).unwrap();
        assert_eq!(entry.item_name, "Iron Ingot");
        assert_eq!(entry.qty, 1);
        assert_eq!(plan.shopping_list.len(), 1);
        assert_eq!(plan.missing_recipes, vec!["Iron Ingot".to_string()]);
    }

    #[test]
    fn test_target_fully_stocked_has_no_steps() {
        let ledger = Ledger::new(vec![main_storage(ROD, 4)]);
        let plan = plan(&lathe_catalog(), &ledger, ROD, 4, &PlanOptions::default()).unwrap();
        assert!(plan.steps.is_empty());
        assert!(plan.is_buildable_from_stock());
        assert_eq!(plan.inventory_usage()[0].total, 4);
    }

    #[test]
    fn test_water_cell_emptied_before_recipe_using_water() {
        let catalog = Catalog::new(
            vec![
                item(1, "Water", ItemKind::Fluid),
                item(2, "Empty Cell", ItemKind::Component),
                item(3, "Water Cell", ItemKind::Component),
                item(4, "Clay", ItemKind::Component),
            ],
            vec![recipe(1, "Wet Clay", vec![line(1, 1000)], vec![line(4, 1)])],
            vec![],
            vec![ContainerTransform {
                id: 1,
                priority: 0,
                container_item_id: 3,
                empty_item_id: 2,
                content_item_id: 1,
                content_qty: 1000,
                kind: TransformKind::Bidirectional,
                empty_consumed: false,
            }],
        );
        let ledger = Ledger::new(vec![main_storage(3, 1)]);
        let plan = plan(&catalog, &ledger, 4, 1, &PlanOptions::default()).unwrap();

        assert_eq!(plan.steps.len(), 2);
        assert!(matches!(
            plan.steps[0].producer,
            Producer::Transform {
                direction: TransformDirection::Empty,
                ..
            }
        ));
        assert_eq!(plan.steps[0].byproducts[0].item_name, "Empty Cell");
        assert_eq!(plan.steps[1].producer.label(), "Wet Clay");
        assert_eq!(plan.steps[1].depends_on, vec![0]);
        assert_eq!(plan.steps[1].inputs[0].produced_by, Some(0));
        assert!(plan.shopping_list.is_empty());
    }

    #[test]
    fn test_unused_water_cells_reported_as_releasable() {
        let catalog = Catalog::new(
            vec![
                item(1, "Water", ItemKind::Fluid),
                item(2, "Empty Cell", ItemKind::Component),
                item(3, "Water Cell", ItemKind::Component),
                item(4, "Clay", ItemKind::Component),
            ],
            vec![recipe(1, "Wet Clay", vec![line(1, 1000)], vec![line(4, 1)])],
            vec![],
            vec![ContainerTransform {
                id: 1,
                priority: 0,
                container_item_id: 3,
                empty_item_id: 2,
                content_item_id: 1,
                content_qty: 1000,
                kind: TransformKind::EmptyOnly,
                empty_consumed: false,
            }],
        );
        let ledger = Ledger::new(vec![main_storage(3, 3)]);

        let one_cell = plan(&catalog, &ledger, 4, 1, &PlanOptions::default()).unwrap();
        assert_eq!(one_cell.releasable.len(), 1);
        assert_eq!(one_cell.releasable[0].content_item_id, 1);
        assert_eq!(one_cell.releasable[0].qty, 2000);
        let containers: Vec<_> = one_cell.releasable[0]
            .containers
            .iter()
            .map(|c| (c.item_id, c.qty))
            .collect();
        assert_eq!(containers, vec![(3, 2)]);
        let summary = crate::report::summarize_plan(&one_cell).to_string();
        assert!(summary.contains("Releasable by emptying:\n  2000 L Water (2 Water Cell)\n"));

        let all_cells = plan(&catalog, &ledger, 4, 3, &PlanOptions::default()).unwrap();
        assert!(all_cells.releasable.is_empty());

        let options = PlanOptions {
            use_inventory: false,
            ..PlanOptions::default()
        };
        let offline = plan(&catalog, &ledger, 4, 1, &options).unwrap();
        assert!(offline.releasable.is_empty());
    }

    fn tree_catalog() -> Catalog {
        Catalog::new(
            vec![
                item(1, "Circuit", ItemKind::Component),
                item(2, "Board", ItemKind::Component),
                item(3, "Wire", ItemKind::Component),
                item(4, "Copper", ItemKind::Raw),
                item(5, "Resin", ItemKind::Raw),
                item(6, "Soldering Iron", ItemKind::Raw),
            ],
            vec![
                recipe(1, "Assemble Circuit", vec![line(2, 1), line(3, 2), tool(6, 1)], vec![line(1, 1)]),
                recipe(2, "Press Board", vec![line(5, 1), line(3, 1)], vec![line(2, 1)]),
                recipe(3, "Draw Wire", vec![line(4, 1)], vec![line(3, 2)]),
            ],
            vec![],
            vec![],
        )
    }

    #[test]
    fn test_steps_follow_their_dependencies() {
        let plan = plan(&tree_catalog(), &Ledger::empty(), 1, 2, &PlanOptions::default()).unwrap();

        assert_eq!(plan.steps.last().map(|s| s.item_id), Some(1));
        for step in &plan.steps {
            assert!(step.depends_on.iter().all(|dep| *dep < step.index));
            for input in &step.inputs {
                if let Some(dep) = input.produced_by {
                    assert_eq!(plan.steps[dep].item_id, input.item_id);
                }
            }
        }
    }

    #[test]
    fn test_shopping_list_merges_branches_and_sorts_by_name() {
        let plan = plan(&tree_catalog(), &Ledger::empty(), 1, 2, &PlanOptions::default()).unwrap();

        let names: Vec<_> = plan
            .shopping_list
            .entries()
            .iter()
            .map(|e| (e.item_name.as_str(), e.qty))
            .collect();
        // One batch of wire for the boards, two for the circuits.
        assert_eq!(names, vec![("Copper", 3), ("Resin", 2), ("Soldering Iron", 1)]);
    }

    #[test]
    fn test_tool_inputs_are_marked_not_consumed() {
        let plan = plan(&tree_catalog(), &Ledger::empty(), 1, 2, &PlanOptions::default()).unwrap();
        let circuit = plan.steps.last().unwrap();
        let iron = circuit.inputs.iter().find(|i| i.item_id == 6).unwrap();
        assert!(!iron.consumed);
        assert_eq!(iron.qty, 1);
    }

    #[test]
    fn test_assembly_is_deterministic() {
        let ledger = Ledger::new(vec![row(2, 5, 3, 1), row(1, 5, 3, 1), row(3, 0, 4, 2)]);
        let a = plan(&tree_catalog(), &ledger, 1, 3, &PlanOptions::default()).unwrap();
        let b = plan(&tree_catalog(), &ledger, 1, 3, &PlanOptions::default()).unwrap();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_inventory_usage_merges_draws_per_storage() {
        let ledger = Ledger::new(vec![row(1, 0, 3, 1), row(2, 9, 3, 2), row(3, 0, 6, 1)]);
        let plan = plan(&tree_catalog(), &ledger, 1, 2, &PlanOptions::default()).unwrap();

        let usage = plan.inventory_usage();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].item_name, "Wire");
        assert_eq!(usage[0].total, 3);
        let storages: Vec<_> = usage[0].draws.iter().map(|d| (d.storage_id, d.qty)).collect();
        assert_eq!(storages, vec![(2, 2), (1, 1)]);
    }

    #[test]
    fn test_plan_rejects_invalid_request() {
        assert!(matches!(
            plan(&tree_catalog(), &Ledger::empty(), 1, 0, &PlanOptions::default()),
            Err(PlanError::InvalidQuantity)
        ));
    }
}

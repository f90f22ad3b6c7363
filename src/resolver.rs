//! Dependency resolver
//!
//! Recursively expands a target item and quantity into a tree of recipe and
//! transform applications. For each demand the resolver draws, in order, on
//! byproduct credits from earlier steps, then the ledger (through the
//! allocator), then the best producer. Items without a usable producer become
//! shopping-list leaves; they never abort planning.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::allocator::Allocator;
use crate::catalog::CatalogAccessor;
use crate::error::{PlanError, PlanWarning};
use crate::ledger::Ledger;
use crate::models::{
    AllocationResult, Byproduct, Item, ItemId, LeafReason, MachineInfo, MachineMetadata, NodeKind,
    PlanNode, Producer, Production, ProductionInput, Recipe, RecipeLine, Unit,
};
use crate::transform::{self, TransformMatch};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PlanOptions {
    /// When false the ledger is treated as empty
    pub use_inventory: bool,
    /// Machine tiers allowed for machine-bound recipes; `None` allows all
    pub enabled_tiers: Option<BTreeSet<String>>,
    /// When false, crafting recipes on the 6x6 grid are never chosen
    pub crafting_6x6_unlocked: bool,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            use_inventory: true,
            enabled_tiers: None,
            crafting_6x6_unlocked: false,
        }
    }
}

impl PlanOptions {
    pub fn tier_enabled(&self, tier: &str) -> bool {
        self.enabled_tiers
            .as_ref()
            .is_none_or(|tiers| tiers.contains(tier))
    }
}

/// Byproduct credits available to later demands in the same pass.
///
/// Threaded through the recursion by value so no node holds a reference to
/// shared state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credits(BTreeMap<ItemId, u64>);

impl Credits {
    pub fn get(&self, item_id: ItemId) -> u64 {
        self.0.get(&item_id).copied().unwrap_or(0)
    }

    pub fn add(&mut self, item_id: ItemId, qty: u64) {
        if qty > 0 {
            let entry = self.0.entry(item_id).or_default();
            *entry = entry.saturating_add(qty);
        }
    }

    /// Remove up to `qty` and return what was actually taken
    pub fn take(&mut self, item_id: ItemId, qty: u64) -> u64 {
        let Some(available) = self.0.get_mut(&item_id) else {
            return 0;
        };
        let taken = (*available).min(qty);
        *available -= taken;
        if *available == 0 {
            self.0.remove(&item_id);
        }
        taken
    }

    pub fn iter(&self) -> impl Iterator<Item = (ItemId, u64)> + '_ {
        self.0.iter().map(|(id, qty)| (*id, *qty))
    }
}

/// Resolve `qty` of `target` against a catalog and a ledger snapshot.
///
/// The ledger is only read. Fails fast on a zero quantity or an unknown
/// target, and aborts with `QuantityOverflow` when scaling a recipe would
/// exceed `u64`; every other anomaly is annotated on the returned tree.
pub fn resolve<C: CatalogAccessor + ?Sized>(
    catalog: &C,
    ledger: &Ledger,
    target: ItemId,
    qty: u64,
    options: &PlanOptions,
) -> Result<PlanNode, PlanError> {
    if qty == 0 {
        return Err(PlanError::InvalidQuantity);
    }
    let target_item = catalog
        .get_item(target)
        .ok_or(PlanError::UnknownItem(target))?;

    let empty = Ledger::empty();
    let ledger = if options.use_inventory { ledger } else { &empty };

    let mut resolver = Resolver {
        catalog,
        options,
        allocator: Allocator::new(ledger),
        path: Vec::new(),
        secured_tools: BTreeMap::new(),
    };
    let (root, leftover) = resolver.demand(target, qty, false, Credits::default())?;

    info!(
        target = %target_item.name,
        qty,
        use_inventory = options.use_inventory,
        leftover_credits = leftover.iter().count(),
        "resolved plan"
    );
    Ok(root)
}

enum Candidate<'a> {
    Transform(TransformMatch<'a>),
    Recipe {
        recipe: &'a Recipe,
        per_batch: u64,
        machine: Option<MachineInfo>,
    },
}

impl Candidate<'_> {
    /// Single ordering over every producer kind. Transforms first by
    /// `(priority DESC, id ASC)`, then recipes preferring an exact quantity
    /// match over scaling, lowest recipe id breaking ties.
    fn rank(&self, outstanding: u64) -> (u8, i64, i64) {
        match self {
            Candidate::Transform(m) => (0, m.transform.priority.saturating_neg(), m.transform.id),
            Candidate::Recipe {
                recipe, per_batch, ..
            } => (1, i64::from(*per_batch != outstanding), recipe.id),
        }
    }
}

#[derive(Debug)]
enum Exclusion {
    TierDisabled(String),
    OverCapacity,
    MissingMetadata(PlanWarning),
}

type Resolved = Result<(PlanNode, Credits), PlanError>;
type Applied = Result<(Production, Vec<PlanNode>, Credits), PlanError>;

fn overflow(item: &Item) -> PlanError {
    PlanError::QuantityOverflow(item.name.clone())
}

struct Resolver<'a, C: CatalogAccessor + ?Sized> {
    catalog: &'a C,
    options: &'a PlanOptions,
    allocator: Allocator<'a>,
    /// Items currently being expanded, root first
    path: Vec<ItemId>,
    /// Tools already present or planned, by quantity
    secured_tools: BTreeMap<ItemId, u64>,
}

impl<'a, C: CatalogAccessor + ?Sized> Resolver<'a, C> {
    fn demand(
        &mut self,
        item_id: ItemId,
        qty: u64,
        catalyst: bool,
        mut credits: Credits,
    ) -> Resolved {
        let Some(item) = self.catalog.get_item(item_id) else {
            let mut node = PlanNode {
                item_name: format!("item #{}", item_id),
                unit: Unit::Count,
                ..empty_node(item_id, qty, catalyst)
            };
            node.kind = NodeKind::Leaf {
                missing: qty,
                reason: LeafReason::NoRecipe,
            };
            return Ok((node, credits));
        };

        if catalyst {
            return self.tool(item, qty, credits);
        }

        let mut node = new_node(item, qty, false);
        node.from_credits = credits.take(item_id, qty);
        node.allocation = self.allocator.allocate(item_id, qty - node.from_credits);
        let outstanding = node.allocation.unmet;

        if outstanding == 0 {
            debug!(item = %item.name, qty, "covered by credits and inventory");
            return Ok((node, credits));
        }
        self.produce(item, outstanding, node, credits)
    }

    /// Non-consumed inputs only need to be present once across the plan.
    ///
    /// Stock found for a tool is reserved: it stays in storage, but consumed
    /// demands later in the pass cannot draw it.
    fn tool(&mut self, item: &'a Item, qty: u64, credits: Credits) -> Resolved {
        let mut node = new_node(item, qty, true);
        let secured = self.secured_tools.get(&item.id).copied().unwrap_or(0);
        if secured >= qty {
            node.kind = NodeKind::Reused;
            return Ok((node, credits));
        }

        let needed = qty - secured;
        node.from_credits = credits.get(item.id).min(needed);
        node.allocation = self.allocator.reserve(item.id, needed - node.from_credits);
        let shortfall = node.allocation.unmet;
        self.secured_tools.insert(item.id, qty);

        if shortfall == 0 {
            debug!(item = %item.name, qty, "tool present");
            return Ok((node, credits));
        }
        self.produce(item, shortfall, node, credits)
    }

    fn produce(
        &mut self,
        item: &'a Item,
        outstanding: u64,
        mut node: PlanNode,
        credits: Credits,
    ) -> Resolved {
        if item.is_base() {
            node.kind = NodeKind::Leaf {
                missing: outstanding,
                reason: LeafReason::Base,
            };
            return Ok((node, credits));
        }

        if self.path.contains(&item.id) {
            let mut path: Vec<String> = self.path.iter().map(|id| self.name_of(*id)).collect();
            path.push(item.name.clone());
            let warning = PlanWarning::CycleDetected {
                item_id: item.id,
                item_name: item.name.clone(),
                path,
            };
            warn!(%warning, "cycle detected");
            node.warnings.push(warning);
            node.kind = NodeKind::Leaf {
                missing: outstanding,
                reason: LeafReason::Cycle,
            };
            return Ok((node, credits));
        }

        let Some(candidate) = self.select(item, outstanding, &credits, &mut node.warnings) else {
            debug!(item = %item.name, outstanding, "no usable recipe");
            node.kind = NodeKind::Leaf {
                missing: outstanding,
                reason: LeafReason::NoRecipe,
            };
            return Ok((node, credits));
        };

        self.path.push(item.id);
        let applied = match candidate {
            Candidate::Transform(m) => self.apply_transform(item, outstanding, m, credits),
            Candidate::Recipe {
                recipe,
                per_batch,
                machine,
            } => self.apply_recipe(item, outstanding, recipe, per_batch, machine, credits),
        };
        self.path.pop();
        let (production, children, credits) = applied?;

        debug!(
            item = %item.name,
            producer = %production.producer.label(),
            batches = production.batches,
            surplus = production.surplus,
            "planned production"
        );
        node.kind = NodeKind::Produced(production);
        node.children = children;
        Ok((node, credits))
    }

    fn select(
        &self,
        item: &Item,
        outstanding: u64,
        credits: &Credits,
        warnings: &mut Vec<PlanWarning>,
    ) -> Option<Candidate<'a>> {
        let mut candidates: Vec<Candidate<'a>> =
            transform::candidates(self.catalog, item.id, outstanding, |id| {
                credits.get(id).saturating_add(self.allocator.remaining(id))
            })
            .into_iter()
            .map(Candidate::Transform)
            .collect();

        for recipe in self.catalog.get_recipes_for_output(item.id) {
            let per_batch = recipe.output_qty(item.id);
            if per_batch == 0 {
                continue;
            }
            if recipe.needs_6x6_grid() && !self.options.crafting_6x6_unlocked {
                debug!(recipe = %recipe.name, "6x6 crafting grid not unlocked");
                continue;
            }
            match self.machine_for(recipe) {
                Ok(machine) => candidates.push(Candidate::Recipe {
                    recipe,
                    per_batch,
                    machine,
                }),
                Err(Exclusion::MissingMetadata(warning)) => {
                    warn!(%warning, "recipe excluded");
                    if !warnings.contains(&warning) {
                        warnings.push(warning);
                    }
                }
                Err(reason) => {
                    debug!(recipe = %recipe.name, ?reason, "recipe excluded");
                }
            }
        }

        candidates.into_iter().min_by_key(|c| c.rank(outstanding))
    }

    /// Resolve the machine of a machine-bound recipe and check the recipe
    /// fits it. Non-machine recipes pass with no machine.
    fn machine_for(&self, recipe: &Recipe) -> Result<Option<MachineInfo>, Exclusion> {
        let Some(machine_item_id) = recipe.machine_item_id.filter(|_| recipe.is_machine_bound())
        else {
            return Ok(None);
        };

        let machine_item = self.catalog.get_item(machine_item_id);
        let machine_ref = machine_item.and_then(|i| i.machine.as_ref());
        let Some(machine_ref) = machine_ref else {
            return Err(Exclusion::MissingMetadata(PlanWarning::MissingMachineMetadata {
                recipe_id: recipe.id,
                recipe_name: recipe.name.clone(),
                machine: self.name_of(machine_item_id),
            }));
        };

        if !self.options.tier_enabled(&machine_ref.tier) {
            return Err(Exclusion::TierDisabled(machine_ref.tier.clone()));
        }

        let Some(meta) = self
            .catalog
            .get_machine_metadata(&machine_ref.machine_type, &machine_ref.tier)
        else {
            return Err(Exclusion::MissingMetadata(PlanWarning::MissingMachineMetadata {
                recipe_id: recipe.id,
                recipe_name: recipe.name.clone(),
                machine: format!("{} {}", machine_ref.tier, machine_ref.machine_type),
            }));
        };

        if !self.fits(recipe, meta) {
            return Err(Exclusion::OverCapacity);
        }

        Ok(Some(MachineInfo {
            item_id: machine_item_id,
            name: self.name_of(machine_item_id),
            machine_type: meta.machine_type.clone(),
            tier: meta.tier.clone(),
            input_slots: meta.input_slots,
            output_slots: meta.output_slots,
            input_tanks: meta.input_tanks,
            output_tanks: meta.output_tanks,
        }))
    }

    /// Declared line counts against the machine's slots and tanks
    fn fits(&self, recipe: &Recipe, meta: &MachineMetadata) -> bool {
        let (in_slots, in_tanks) = self.count_lines(&recipe.inputs);
        let (out_slots, out_tanks) = self.count_lines(&recipe.outputs);
        in_slots <= meta.input_slots
            && in_tanks <= meta.input_tanks
            && out_slots <= meta.output_slots
            && out_tanks <= meta.output_tanks
    }

    fn count_lines(&self, lines: &[RecipeLine]) -> (u32, u32) {
        lines.iter().fold((0, 0), |(slots, tanks), line| match self.unit_of(line.item_id) {
            Unit::Count => (slots + 1, tanks),
            Unit::Liters => (slots, tanks + 1),
        })
    }

    fn apply_recipe(
        &mut self,
        item: &'a Item,
        outstanding: u64,
        recipe: &'a Recipe,
        per_batch: u64,
        machine: Option<MachineInfo>,
        mut credits: Credits,
    ) -> Applied {
        let batches = outstanding.div_ceil(per_batch);
        let surplus = batches
            .checked_mul(per_batch)
            .ok_or_else(|| overflow(item))?
            - outstanding;

        // Duplicate lines are merged before anything is drawn.
        let mut inputs: Vec<ProductionInput> = Vec::new();
        for line in recipe.inputs.iter().filter(|l| l.qty > 0) {
            let qty = if line.consumed {
                line.qty.checked_mul(batches).ok_or_else(|| overflow(item))?
            } else {
                line.qty
            };
            if let Some(existing) = inputs
                .iter_mut()
                .find(|i| i.item_id == line.item_id && i.consumed == line.consumed)
            {
                existing.qty = existing.qty.checked_add(qty).ok_or_else(|| overflow(item))?;
                continue;
            }
            inputs.push(ProductionInput {
                item_id: line.item_id,
                item_name: self.name_of(line.item_id),
                unit: self.unit_of(line.item_id),
                qty,
                consumed: line.consumed,
                chance: line.chance,
            });
        }

        let mut children = Vec::with_capacity(inputs.len());
        for input in &inputs {
            let (child, rest) = self.demand(input.item_id, input.qty, !input.consumed, credits)?;
            credits = rest;
            children.push(child);
        }

        // Outputs only exist once the step has run, so credit them after the
        // inputs are resolved.
        let mut byproducts = Vec::new();
        for line in recipe.outputs.iter().filter(|l| l.item_id != item.id && l.qty > 0) {
            let qty = line.qty.checked_mul(batches).ok_or_else(|| overflow(item))?;
            let credited = line.is_guaranteed();
            if credited {
                credits.add(line.item_id, qty);
            }
            byproducts.push(Byproduct {
                item_id: line.item_id,
                item_name: self.name_of(line.item_id),
                unit: self.unit_of(line.item_id),
                qty,
                chance: line.chance,
                credited,
            });
        }
        credits.add(item.id, surplus);

        let production = Production {
            producer: Producer::Recipe {
                recipe_id: recipe.id,
                name: recipe.name.clone(),
                method: recipe.method.clone(),
                machine,
                grid_size: recipe.grid_size.clone(),
                station_item_id: recipe.station_item_id,
                station_name: recipe.station_item_id.map(|id| self.name_of(id)),
                circuit: recipe.circuit,
            },
            batches,
            per_batch,
            covered: outstanding,
            surplus,
            inputs,
            byproducts,
        };
        Ok((production, children, credits))
    }

    fn apply_transform(
        &mut self,
        item: &'a Item,
        outstanding: u64,
        m: TransformMatch<'a>,
        mut credits: Credits,
    ) -> Applied {
        let per_batch = m.per_batch();
        let surplus = m
            .batches
            .checked_mul(per_batch)
            .ok_or_else(|| overflow(item))?
            - outstanding;

        let inputs: Vec<ProductionInput> = m
            .inputs()
            .ok_or_else(|| overflow(item))?
            .into_iter()
            .map(|(item_id, qty)| ProductionInput {
                item_id,
                item_name: self.name_of(item_id),
                unit: self.unit_of(item_id),
                qty,
                consumed: true,
                chance: None,
            })
            .collect();

        let mut children = Vec::with_capacity(inputs.len());
        for input in &inputs {
            let (child, rest) = self.demand(input.item_id, input.qty, false, credits)?;
            credits = rest;
            children.push(child);
        }

        let mut byproducts = Vec::new();
        if let Some((empty_id, qty)) = m.byproduct() {
            credits.add(empty_id, qty);
            byproducts.push(Byproduct {
                item_id: empty_id,
                item_name: self.name_of(empty_id),
                unit: self.unit_of(empty_id),
                qty,
                chance: None,
                credited: true,
            });
        }
        credits.add(item.id, surplus);

        let production = Production {
            producer: Producer::Transform {
                transform_id: m.transform.id,
                direction: m.direction,
                container_item_id: m.transform.container_item_id,
            },
            batches: m.batches,
            per_batch,
            covered: outstanding,
            surplus,
            inputs,
            byproducts,
        };
        Ok((production, children, credits))
    }

    fn name_of(&self, item_id: ItemId) -> String {
        self.catalog
            .get_item(item_id)
            .map(|i| i.name.clone())
            .unwrap_or_else(|| format!("item #{}", item_id))
    }

    fn unit_of(&self, item_id: ItemId) -> Unit {
        self.catalog
            .get_item(item_id)
            .map(Item::unit)
            .unwrap_or(Unit::Count)
    }
}

fn empty_node(item_id: ItemId, qty: u64, catalyst: bool) -> PlanNode {
    PlanNode {
        item_id,
        item_name: String::new(),
        unit: Unit::Count,
        requested: qty,
        catalyst,
        from_credits: 0,
        allocation: AllocationResult {
            item_id,
            ..AllocationResult::default()
        },
        kind: NodeKind::Stocked,
        children: Vec::new(),
        warnings: Vec::new(),
    }
}

fn new_node(item: &Item, qty: u64, catalyst: bool) -> PlanNode {
    PlanNode {
        item_name: item.name.clone(),
        unit: item.unit(),
        ..empty_node(item.id, qty, catalyst)
    }
}

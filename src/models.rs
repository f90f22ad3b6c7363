//! Data models for catalog content, inventory and plan results

use std::fmt;

use serde::Serialize;

use crate::error::PlanWarning;

pub type ItemId = i64;
pub type RecipeId = i64;
pub type StorageId = i64;
pub type TransformId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Raw,
    Material,
    Component,
    Machine,
    Fluid,
    Gas,
}

impl ItemKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "raw" | "base" => Some(Self::Raw),
            "material" => Some(Self::Material),
            "component" | "item" => Some(Self::Component),
            "machine" => Some(Self::Machine),
            "fluid" => Some(Self::Fluid),
            "gas" => Some(Self::Gas),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Material => "material",
            Self::Component => "component",
            Self::Machine => "machine",
            Self::Fluid => "fluid",
            Self::Gas => "gas",
        }
    }

    /// Fluids and gases are measured in liters, everything else is counted.
    pub fn unit(&self) -> Unit {
        match self {
            Self::Fluid | Self::Gas => Unit::Liters,
            _ => Unit::Count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Count,
    Liters,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Count => write!(f, "count"),
            Unit::Liters => write!(f, "L"),
        }
    }
}

/// Format a quantity with its unit, e.g. `12` or `1000 L`.
pub fn format_qty(qty: u64, unit: Unit) -> String {
    match unit {
        Unit::Count => qty.to_string(),
        Unit::Liters => format!("{} L", qty),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MachineRef {
    pub machine_type: String,
    pub tier: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FluidContainer {
    pub fluid_id: ItemId,
    pub amount_l: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Item {
    pub id: ItemId,
    pub key: String,
    pub name: String,
    pub kind: ItemKind,
    pub material: Option<String>,
    pub machine: Option<MachineRef>,
    pub container: Option<FluidContainer>,
    pub stack_size: u32,
}

impl Item {
    pub fn unit(&self) -> Unit {
        self.kind.unit()
    }

    /// Base items are never crafted; they always go to the shopping list.
    pub fn is_base(&self) -> bool {
        self.kind == ItemKind::Raw
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MachineMetadata {
    pub machine_type: String,
    pub tier: String,
    pub input_slots: u32,
    pub output_slots: u32,
    pub input_tanks: u32,
    pub output_tanks: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Machine,
    Crafting,
    Other(String),
}

impl Method {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "machine" => Self::Machine,
            "crafting" => Self::Crafting,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Machine => "machine",
            Self::Crafting => "crafting",
            Self::Other(value) => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecipeLine {
    pub item_id: ItemId,
    pub qty: u64,
    /// 0-100; informational only, never changes planned quantities.
    pub chance: Option<f64>,
    /// Catalysts and tools are present during the recipe but not depleted.
    pub consumed: bool,
}

impl RecipeLine {
    pub fn is_guaranteed(&self) -> bool {
        self.chance.is_none_or(|c| c >= 100.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recipe {
    pub id: RecipeId,
    pub name: String,
    pub method: Method,
    pub machine_item_id: Option<ItemId>,
    /// Crafting grid, e.g. "3x3" or "6x6"
    pub grid_size: Option<String>,
    /// Block the crafting grid belongs to
    pub station_item_id: Option<ItemId>,
    /// Programmed circuit configuration
    pub circuit: Option<u32>,
    pub inputs: Vec<RecipeLine>,
    pub outputs: Vec<RecipeLine>,
}

impl Recipe {
    /// Total quantity of `item_id` produced by one batch.
    pub fn output_qty(&self, item_id: ItemId) -> u64 {
        self.outputs
            .iter()
            .filter(|line| line.item_id == item_id)
            .map(|line| line.qty)
            .sum()
    }

    pub fn is_machine_bound(&self) -> bool {
        self.method == Method::Machine && self.machine_item_id.is_some()
    }

    /// Crafting on the 6x6 grid, which has to be unlocked in game first
    pub fn needs_6x6_grid(&self) -> bool {
        self.method == Method::Crafting
            && self.grid_size.as_deref().is_some_and(|grid| grid.trim() == "6x6")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    Bidirectional,
    EmptyOnly,
    FillOnly,
}

impl TransformKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "bidirectional" => Some(Self::Bidirectional),
            "empty_only" => Some(Self::EmptyOnly),
            "fill_only" => Some(Self::FillOnly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bidirectional => "bidirectional",
            Self::EmptyOnly => "empty_only",
            Self::FillOnly => "fill_only",
        }
    }

    pub fn allows(&self, direction: TransformDirection) -> bool {
        matches!(
            (self, direction),
            (Self::Bidirectional, _)
                | (Self::EmptyOnly, TransformDirection::Empty)
                | (Self::FillOnly, TransformDirection::Fill)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformDirection {
    /// Full container -> content + empty container
    Empty,
    /// Empty container + content -> full container
    Fill,
}

impl fmt::Display for TransformDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformDirection::Empty => write!(f, "Emptying"),
            TransformDirection::Fill => write!(f, "Filling"),
        }
    }
}

/// e.g. "Water Cell -> Water (1000 L) + Empty Cell"
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerTransform {
    pub id: TransformId,
    pub priority: i64,
    pub container_item_id: ItemId,
    pub empty_item_id: ItemId,
    pub content_item_id: ItemId,
    pub content_qty: u64,
    pub kind: TransformKind,
    /// The empty container is destroyed when emptied (no byproduct).
    pub empty_consumed: bool,
}

impl ContainerTransform {
    /// The item this transform yields when run in `direction`.
    pub fn output_item(&self, direction: TransformDirection) -> ItemId {
        match direction {
            TransformDirection::Empty => self.content_item_id,
            TransformDirection::Fill => self.container_item_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageUnit {
    pub id: StorageId,
    pub name: String,
    pub slot_count: Option<u32>,
    pub liter_capacity: Option<u64>,
    /// Higher is consumed first
    pub priority: i64,
    pub allow_planner_use: bool,
    /// Visible in reports, never consumed
    pub locked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageAssignment {
    pub storage_id: StorageId,
    pub item_id: ItemId,
    pub qty_count: Option<u64>,
    pub qty_liters: Option<u64>,
    /// Per-assignment overrides; `None` inherits from the storage unit.
    pub locked: Option<bool>,
    pub allow_planner_use: Option<bool>,
}

/// Quantity drawn from one storage unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Draw {
    pub storage_id: StorageId,
    pub storage_name: String,
    pub qty: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WithholdReason {
    PlannerUseDisabled,
    Locked,
}

/// Stock the allocator saw but was not allowed to touch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Withheld {
    pub storage_id: StorageId,
    pub storage_name: String,
    pub qty: u64,
    pub reason: WithholdReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct AllocationResult {
    pub item_id: ItemId,
    pub requested: u64,
    pub draws: Vec<Draw>,
    pub withheld: Vec<Withheld>,
    pub unmet: u64,
}

impl AllocationResult {
    pub fn drawn(&self) -> u64 {
        self.draws.iter().map(|d| d.qty).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.unmet == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MachineInfo {
    pub item_id: ItemId,
    pub name: String,
    pub machine_type: String,
    pub tier: String,
    pub input_slots: u32,
    pub output_slots: u32,
    pub input_tanks: u32,
    pub output_tanks: u32,
}

/// What produced a node: a catalog recipe or a container transform.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Producer {
    Recipe {
        recipe_id: RecipeId,
        name: String,
        method: Method,
        machine: Option<MachineInfo>,
        grid_size: Option<String>,
        station_item_id: Option<ItemId>,
        station_name: Option<String>,
        circuit: Option<u32>,
    },
    Transform {
        transform_id: TransformId,
        direction: TransformDirection,
        container_item_id: ItemId,
    },
}

impl Producer {
    pub fn label(&self) -> String {
        match self {
            Producer::Recipe { name, .. } => name.clone(),
            Producer::Transform { direction, .. } => direction.to_string(),
        }
    }

    pub fn machine(&self) -> Option<&MachineInfo> {
        match self {
            Producer::Recipe { machine, .. } => machine.as_ref(),
            Producer::Transform { .. } => None,
        }
    }

    /// Where a crafting recipe is made, e.g. "6x6 at Extended Crafting Table"
    pub fn station(&self) -> Option<String> {
        let Producer::Recipe {
            grid_size,
            station_name,
            ..
        } = self
        else {
            return None;
        };
        match (grid_size.as_deref().map(str::trim), station_name.as_deref()) {
            (Some(grid), Some(station)) => Some(format!("{} at {}", grid, station)),
            (Some(grid), None) => Some(format!("{} grid", grid)),
            (None, Some(station)) => Some(station.to_string()),
            (None, None) => None,
        }
    }

    pub fn circuit(&self) -> Option<u32> {
        match self {
            Producer::Recipe { circuit, .. } => *circuit,
            Producer::Transform { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductionInput {
    pub item_id: ItemId,
    pub item_name: String,
    pub unit: Unit,
    pub qty: u64,
    pub consumed: bool,
    pub chance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Byproduct {
    pub item_id: ItemId,
    pub item_name: String,
    pub unit: Unit,
    pub qty: u64,
    pub chance: Option<f64>,
    /// Whether later demands in the same plan may draw on it
    pub credited: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Production {
    pub producer: Producer,
    pub batches: u64,
    pub per_batch: u64,
    /// Portion of the node's demand covered by this production
    pub covered: u64,
    /// Partial-batch overproduction of the node's item
    pub surplus: u64,
    /// One entry per child node, in the same order
    pub inputs: Vec<ProductionInput>,
    pub byproducts: Vec<Byproduct>,
}

impl Production {
    pub fn total_output(&self) -> u64 {
        self.batches.saturating_mul(self.per_batch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafReason {
    /// Raw resource, never crafted
    Base,
    /// No usable recipe or transform
    NoRecipe,
    /// Item is already being expanded higher up the tree
    Cycle,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    /// Fully covered by byproduct credits and inventory
    Stocked,
    /// Tool already secured by an earlier step
    Reused,
    /// Goes to the shopping list
    Leaf { missing: u64, reason: LeafReason },
    Produced(Production),
}

/// A node of the resolution tree
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanNode {
    pub item_id: ItemId,
    pub item_name: String,
    pub unit: Unit,
    pub requested: u64,
    /// Requirement-to-have rather than requirement-to-consume
    pub catalyst: bool,
    pub from_credits: u64,
    /// Ledger draws; for catalysts the stock reserved for presence, which is
    /// never decremented
    pub allocation: AllocationResult,
    pub kind: NodeKind,
    pub children: Vec<PlanNode>,
    pub warnings: Vec<PlanWarning>,
}

impl PlanNode {
    pub fn missing(&self) -> u64 {
        match &self.kind {
            NodeKind::Leaf { missing, .. } => *missing,
            _ => 0,
        }
    }

    pub fn production(&self) -> Option<&Production> {
        match &self.kind {
            NodeKind::Produced(production) => Some(production),
            _ => None,
        }
    }

    /// Depth-first pre-order walk over this node and all descendants
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a PlanNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    pub fn all_warnings(&self) -> Vec<PlanWarning> {
        let mut warnings = Vec::new();
        self.walk(&mut |node| warnings.extend(node.warnings.iter().cloned()));
        warnings
    }
}

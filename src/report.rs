//! Plain-text rendering of plans and checklists

use std::collections::BTreeMap;
use std::fmt;

use crate::assembler::{InventoryUsage, Plan, ShoppingEntry};
use crate::models::{LeafReason, NodeKind, PlanNode, Unit, format_qty};
use crate::tracker::{StepState, StepStatus};

/// Format a resolution tree as an indented outline
pub fn format_plan_tree(node: &PlanNode, indent: usize) -> String {
    let mut output = String::new();
    let prefix = "  ".repeat(indent);
    let qty = format_qty(node.requested, node.unit);
    let tool = if node.catalyst { " (tool)" } else { "" };

    let mut sources = Vec::new();
    if node.from_credits > 0 {
        sources.push(format!("{} from byproducts", format_qty(node.from_credits, node.unit)));
    }
    for draw in &node.allocation.draws {
        sources.push(format!("{} from {}", format_qty(draw.qty, node.unit), draw.storage_name));
    }

    let how = match &node.kind {
        NodeKind::Stocked => "in stock".to_string(),
        NodeKind::Reused => "already secured".to_string(),
        NodeKind::Leaf { missing, reason } => {
            let why = match reason {
                LeafReason::Base => "base",
                LeafReason::NoRecipe => "no recipe",
                LeafReason::Cycle => "cycle",
            };
            format!("buy {} ({})", format_qty(*missing, node.unit), why)
        }
        NodeKind::Produced(p) => {
            let mut text = format!("{} x{}", p.producer.label(), p.batches);
            if let Some(machine) = p.producer.machine() {
                text.push_str(&format!(" on {} {}", machine.tier, machine.machine_type));
            }
            if p.surplus > 0 {
                text.push_str(&format!(", {} spare", format_qty(p.surplus, node.unit)));
            }
            text
        }
    };

    output.push_str(&format!("{}{} {}{}: {}", prefix, qty, node.item_name, tool, how));
    if !sources.is_empty() {
        output.push_str(&format!(" [{}]", sources.join(", ")));
    }
    output.push('\n');

    for warning in &node.warnings {
        output.push_str(&format!("{}  ! {}\n", prefix, warning));
    }
    if let Some(production) = node.production() {
        for byproduct in &production.byproducts {
            let note = if byproduct.credited { "" } else { " (chance)" };
            output.push_str(&format!(
                "{}  + {} {}{}\n",
                prefix,
                format_qty(byproduct.qty, byproduct.unit),
                byproduct.item_name,
                note
            ));
        }
    }
    for child in &node.children {
        output.push_str(&format_plan_tree(child, indent + 1));
    }

    output
}

/// Summary of an assembled plan
#[derive(Debug)]
pub struct PlanSummary {
    pub target: String,
    pub qty: u64,
    pub unit: Unit,
    pub steps: Vec<String>,
    /// Machine label and the number of steps run on it
    pub machines: Vec<(String, usize)>,
    pub shopping: Vec<ShoppingEntry>,
    pub inventory: Vec<InventoryUsage>,
    /// e.g. "2000 L Water (2 Water Cell)"
    pub releasable: Vec<String>,
    pub warnings: Vec<String>,
}

pub fn summarize_plan(plan: &Plan) -> PlanSummary {
    let mut machines: BTreeMap<String, usize> = BTreeMap::new();
    for step in &plan.steps {
        if let Some(machine) = step.producer.machine() {
            *machines
                .entry(format!("{} ({} {})", machine.name, machine.tier, machine.machine_type))
                .or_default() += 1;
        }
    }

    PlanSummary {
        target: plan.target_name.clone(),
        qty: plan.qty,
        unit: plan.unit,
        steps: plan.steps.iter().map(|s| s.describe()).collect(),
        machines: machines.into_iter().collect(),
        shopping: plan.shopping_list.entries().to_vec(),
        inventory: plan.inventory_usage(),
        releasable: plan
            .releasable
            .iter()
            .map(|latent| {
                let containers: Vec<String> = latent
                    .containers
                    .iter()
                    .map(|c| format!("{} {}", c.qty, c.item_name))
                    .collect();
                format!(
                    "{} {} ({})",
                    format_qty(latent.qty, latent.unit),
                    latent.content_name,
                    containers.join(", ")
                )
            })
            .collect(),
        warnings: plan.warning_messages(),
    }
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Plan Summary ===")?;
        writeln!(f, "Target: {} {}", format_qty(self.qty, self.unit), self.target)?;
        writeln!(f)?;

        writeln!(f, "Build steps:")?;
        if self.steps.is_empty() {
            writeln!(f, "  (nothing to build)")?;
        }
        for (i, step) in self.steps.iter().enumerate() {
            writeln!(f, "  {:>2}. {}", i + 1, step)?;
        }
        writeln!(f)?;

        if !self.machines.is_empty() {
            writeln!(f, "Machines used:")?;
            for (name, count) in &self.machines {
                writeln!(f, "  {}x {}", count, name)?;
            }
            writeln!(f)?;
        }

        writeln!(f, "Shopping list:")?;
        if self.shopping.is_empty() {
            writeln!(f, "  (everything is in stock)")?;
        }
        for entry in &self.shopping {
            writeln!(f, "  {} {}", format_qty(entry.qty, entry.unit), entry.item_name)?;
        }

        if !self.inventory.is_empty() {
            writeln!(f)?;
            writeln!(f, "Taken from storage:")?;
            for usage in &self.inventory {
                let storages: Vec<String> = usage
                    .draws
                    .iter()
                    .map(|d| format!("{} from {}", format_qty(d.qty, usage.unit), d.storage_name))
                    .collect();
                writeln!(
                    f,
                    "  {} {} ({})",
                    format_qty(usage.total, usage.unit),
                    usage.item_name,
                    storages.join(", ")
                )?;
            }
        }

        if !self.releasable.is_empty() {
            writeln!(f)?;
            writeln!(f, "Releasable by emptying:")?;
            for line in &self.releasable {
                writeln!(f, "  {}", line)?;
            }
        }

        if !self.warnings.is_empty() {
            writeln!(f)?;
            writeln!(f, "Warnings:")?;
            for warning in &self.warnings {
                writeln!(f, "  {}", warning)?;
            }
        }

        Ok(())
    }
}

/// One checklist line per step
pub fn format_status(status: &[StepStatus<'_>]) -> String {
    let mut output = String::new();
    for entry in status {
        let mark = match entry.state {
            StepState::Satisfied => "x",
            StepState::Pending => " ",
        };
        output.push_str(&format!("[{}] {:>2}. {}\n", mark, entry.step.index + 1, entry.step.describe()));
    }
    let done = status.iter().filter(|s| s.state.is_satisfied()).count();
    output.push_str(&format!("{}/{} steps satisfied\n", done, status.len()));
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::plan;
    use crate::catalog::Catalog;
    use crate::catalog::fixtures::*;
    use crate::ledger::{Ledger, row};
    use crate::models::ItemKind;
    use crate::resolver::PlanOptions;
    use crate::tracker::BuildTracker;

    fn rod_plan(ledger: &Ledger) -> Plan {
        let catalog = Catalog::new(
            vec![
                item(1, "Iron Rod", ItemKind::Component),
                item(2, "Iron Ingot", ItemKind::Raw),
                machine_item(3, "Basic Lathe", "Lathe", "LV"),
            ],
            vec![machine_recipe(1, "Lathe Test", 3, vec![line(2, 1)], vec![line(1, 2)])],
            vec![metadata("Lathe", "LV", 1, 1)],
            vec![],
        );
        plan(&catalog, ledger, 1, 3, &PlanOptions::default()).unwrap()
    }

    #[test]
    fn test_tree_shows_producer_and_leaves() {
        let plan = rod_plan(&Ledger::empty());
        let tree = format_plan_tree(&plan.root, 0);
        assert_eq!(
            tree,
            "3 Iron Rod: Lathe Test x2 on LV Lathe, 1 spare\n  2 Iron Ingot: buy 2 (base)\n"
        );
    }

    #[test]
    fn test_summary_lists_shopping_and_storage_draws() {
        let plan = rod_plan(&Ledger::new(vec![row(1, 0, 2, 1)]));
        let text = summarize_plan(&plan).to_string();
        assert!(text.contains("Target: 3 Iron Rod"));
        assert!(text.contains(" 1. Lathe Test x2 -> 4 Iron Rod [LV Lathe]"));
        assert!(text.contains("1x Basic Lathe (LV Lathe)"));
        assert!(text.contains("  1 Iron Ingot\n"));
        assert!(text.contains("1 Iron Ingot (1 from Storage 1)"));
    }

    #[test]
    fn test_status_marks_satisfied_steps() {
        let plan = rod_plan(&Ledger::empty());
        let tracker = BuildTracker::attach(&plan, Ledger::new(vec![row(1, 0, 2, 2)]));
        let text = format_status(&tracker.status().unwrap());
        assert_eq!(text, "[x]  1. Lathe Test x2 -> 4 Iron Rod [LV Lathe]\n1/1 steps satisfied\n");
    }
}

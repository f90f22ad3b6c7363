//! Build checklist over assembled steps
//!
//! A step is either pending or satisfied. State is never stored: every call
//! re-evaluates the steps against a fresh ledger snapshot, so inventory edits
//! made elsewhere advance the checklist on the next call.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::assembler::{BuildStep, Plan};
use crate::error::PlanError;
use crate::ledger::{Ledger, LedgerSource};
use crate::models::ItemId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    Pending,
    Satisfied,
}

impl StepState {
    pub fn is_satisfied(self) -> bool {
        self == StepState::Satisfied
    }
}

/// Satisfied when the allocatable stock already holds the step's output, or
/// holds everything the step needs to run. Tools count by presence.
pub fn step_state(step: &BuildStep, ledger: &Ledger) -> StepState {
    let wanted = step.output.saturating_sub(step.surplus);
    if wanted > 0 && ledger.available(step.item_id) >= wanted {
        return StepState::Satisfied;
    }

    let mut consumed: BTreeMap<ItemId, u64> = BTreeMap::new();
    let mut tools: BTreeMap<ItemId, u64> = BTreeMap::new();
    for input in &step.inputs {
        if input.consumed {
            let qty = consumed.entry(input.item_id).or_default();
            *qty = qty.saturating_add(input.qty);
        } else {
            let qty = tools.entry(input.item_id).or_default();
            *qty = (*qty).max(input.qty);
        }
    }
    for (item_id, tool_qty) in tools {
        let qty = consumed.entry(item_id).or_default();
        *qty = qty.saturating_add(tool_qty);
    }

    if consumed
        .iter()
        .all(|(item_id, qty)| ledger.available(*item_id) >= *qty)
    {
        StepState::Satisfied
    } else {
        StepState::Pending
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepStatus<'a> {
    pub step: &'a BuildStep,
    pub state: StepState,
}

/// Checklist attached to one assembled plan and a live ledger source.
pub struct BuildTracker<S: LedgerSource> {
    steps: Vec<BuildStep>,
    source: S,
}

impl<S: LedgerSource> BuildTracker<S> {
    pub fn new(steps: Vec<BuildStep>, source: S) -> Self {
        Self { steps, source }
    }

    pub fn attach(plan: &Plan, source: S) -> Self {
        Self::new(plan.steps.clone(), source)
    }

    pub fn steps(&self) -> &[BuildStep] {
        &self.steps
    }

    /// Current state of every step, read against a fresh snapshot
    pub fn status(&self) -> Result<Vec<StepStatus<'_>>, PlanError> {
        let ledger = self.source.snapshot_ledger()?;
        Ok(self.status_against(&ledger))
    }

    pub fn status_against(&self, ledger: &Ledger) -> Vec<StepStatus<'_>> {
        let status: Vec<StepStatus<'_>> = self
            .steps
            .iter()
            .map(|step| StepStatus {
                step,
                state: step_state(step, ledger),
            })
            .collect();
        debug!(
            satisfied = status.iter().filter(|s| s.state.is_satisfied()).count(),
            total = status.len(),
            "recomputed build status"
        );
        status
    }

    pub fn is_complete(&self) -> Result<bool, PlanError> {
        Ok(self.status()?.iter().all(|s| s.state.is_satisfied()))
    }
}

//! Point-in-time inventory snapshot
//!
//! The ledger is read once per planning pass and never written by the
//! engine. Rows carry the effective policy flags (storage defaults with any
//! per-assignment override applied) and a single quantity in the item's unit.

use serde::Serialize;

use crate::error::PlanError;
use crate::models::{ItemId, StorageId, Unit};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerRow {
    pub storage_id: StorageId,
    pub storage_name: String,
    pub priority: i64,
    pub allow_planner_use: bool,
    pub locked: bool,
    pub item_id: ItemId,
    pub unit: Unit,
    pub qty: u64,
}

impl LedgerRow {
    /// Whether the planner may draw from this row at all
    pub fn allocatable(&self) -> bool {
        self.allow_planner_use && !self.locked && self.qty > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Ledger {
    rows: Vec<LedgerRow>,
}

impl Ledger {
    /// Build a ledger from rows in any order. Rows are sorted by
    /// `(item_id, priority DESC, storage_id ASC)` so allocation never depends on
    /// the order the snapshot was read in.
    pub fn new(mut rows: Vec<LedgerRow>) -> Self {
        rows.sort_by(|a, b| {
            a.item_id
                .cmp(&b.item_id)
                .then(b.priority.cmp(&a.priority))
                .then(a.storage_id.cmp(&b.storage_id))
        });
        Self { rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[LedgerRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All rows holding `item_id`, in consumption order
    pub fn rows_for(&self, item_id: ItemId) -> &[LedgerRow] {
        let start = self.rows.partition_point(|r| r.item_id < item_id);
        let end = self.rows.partition_point(|r| r.item_id <= item_id);
        &self.rows[start..end]
    }

    /// Quantity the planner is allowed to use
    pub fn available(&self, item_id: ItemId) -> u64 {
        self.rows_for(item_id)
            .iter()
            .filter(|r| r.allocatable())
            .map(|r| r.qty)
            .sum()
    }

    /// Quantity physically held, including locked and reserved storages
    pub fn held(&self, item_id: ItemId) -> u64 {
        self.rows_for(item_id).iter().map(|r| r.qty).sum()
    }
}

/// Anything that can hand out a fresh ledger snapshot.
pub trait LedgerSource {
    fn snapshot_ledger(&self) -> Result<Ledger, PlanError>;
}

impl LedgerSource for Ledger {
    fn snapshot_ledger(&self) -> Result<Ledger, PlanError> {
        Ok(self.clone())
    }
}

impl<T: LedgerSource + ?Sized> LedgerSource for &T {
    fn snapshot_ledger(&self) -> Result<Ledger, PlanError> {
        (**self).snapshot_ledger()
    }
}

#[cfg(test)]
pub(crate) fn row(
    storage_id: StorageId,
    priority: i64,
    item_id: ItemId,
    qty: u64,
) -> LedgerRow {
    LedgerRow {
        storage_id,
        storage_name: format!("Storage {}", storage_id),
        priority,
        allow_planner_use: true,
        locked: false,
        item_id,
        unit: Unit::Count,
        qty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_sorted_by_priority_then_storage() {
        let ledger = Ledger::new(vec![row(3, 0, 1, 5), row(1, 0, 1, 5), row(2, 10, 1, 5), row(9, 99, 0, 1)]);
        let ids: Vec<_> = ledger.rows_for(1).iter().map(|r| r.storage_id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
        assert_eq!(ledger.rows_for(0).len(), 1);
        assert!(ledger.rows_for(42).is_empty());
    }

    #[test]
    fn test_available_excludes_locked_and_disallowed() {
        let mut locked = row(2, 0, 7, 4);
        locked.locked = true;
        let mut reserved = row(3, 0, 7, 3);
        reserved.allow_planner_use = false;
        let ledger = Ledger::new(vec![row(1, 0, 7, 2), locked, reserved]);

        assert_eq!(ledger.available(7), 2);
        assert_eq!(ledger.held(7), 9);
    }

    #[test]
    fn test_snapshot_of_ledger_is_a_copy() {
        let ledger = Ledger::new(vec![row(1, 0, 1, 1)]);
        let source: &dyn LedgerSource = &ledger;
        assert_eq!(source.snapshot_ledger().unwrap(), ledger);
    }
}

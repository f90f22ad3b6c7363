//! Container fill/empty transforms
//!
//! Transforms are matched greedily: candidates are ordered by
//! `(priority DESC, id ASC)` and the resolver applies only the first
//! feasible one for a demand. The ledger is only read: transforms tell the
//! resolver which extra steps to insert, and the latent-content pre-pass
//! reports what stored full containers could release.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::catalog::CatalogAccessor;
use crate::ledger::Ledger;
use crate::models::{ContainerTransform, Item, ItemId, TransformDirection, Unit};

/// A transform applied a whole number of times
#[derive(Debug, Clone, PartialEq)]
pub struct TransformMatch<'c> {
    pub transform: &'c ContainerTransform,
    pub direction: TransformDirection,
    pub batches: u64,
}

impl TransformMatch<'_> {
    /// Quantity of the requested item produced by one application
    pub fn per_batch(&self) -> u64 {
        match self.direction {
            TransformDirection::Empty => self.transform.content_qty,
            TransformDirection::Fill => 1,
        }
    }

    pub fn output_item(&self) -> ItemId {
        self.transform.output_item(self.direction)
    }

    /// Items consumed by all applications, in display order. `None` when a
    /// quantity does not fit in a `u64`.
    pub fn inputs(&self) -> Option<Vec<(ItemId, u64)>> {
        let t = self.transform;
        match self.direction {
            TransformDirection::Empty => Some(vec![(t.container_item_id, self.batches)]),
            TransformDirection::Fill => Some(vec![
                (t.content_item_id, t.content_qty.checked_mul(self.batches)?),
                (t.empty_item_id, self.batches),
            ]),
        }
    }

    /// Empty containers left behind by emptying
    pub fn byproduct(&self) -> Option<(ItemId, u64)> {
        let t = self.transform;
        match self.direction {
            TransformDirection::Empty if !t.empty_consumed => Some((t.empty_item_id, self.batches)),
            _ => None,
        }
    }
}

/// Content that stored full containers could release
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LatentContent {
    pub content_item_id: ItemId,
    pub content_name: String,
    pub unit: Unit,
    pub qty: u64,
    pub containers: Vec<HeldContainer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeldContainer {
    pub item_id: ItemId,
    pub item_name: String,
    pub qty: u64,
}

/// Forward pre-pass over the ledger: for every allocatable full container,
/// what emptying it would release. `spent(item)` is subtracted from the
/// container stock first, so a finished plan can report only what it leaves
/// behind.
pub fn latent_contents<C: CatalogAccessor + ?Sized>(
    catalog: &C,
    ledger: &Ledger,
    spent: impl Fn(ItemId) -> u64,
) -> Vec<LatentContent> {
    let mut latent: BTreeMap<ItemId, LatentContent> = BTreeMap::new();
    let mut seen = None;
    for row in ledger.rows() {
        if seen == Some(row.item_id) {
            continue;
        }
        seen = Some(row.item_id);
        let available = ledger.available(row.item_id).saturating_sub(spent(row.item_id));
        if available == 0 {
            continue;
        }
        for transform in ordered(catalog.get_emptying_transforms_from(row.item_id)) {
            let content = catalog.get_item(transform.content_item_id);
            let entry = latent
                .entry(transform.content_item_id)
                .or_insert_with(|| LatentContent {
                    content_item_id: transform.content_item_id,
                    content_name: name_or_id(content, transform.content_item_id),
                    unit: content.map(Item::unit).unwrap_or(Unit::Liters),
                    qty: 0,
                    containers: Vec::new(),
                });
            entry.qty = entry
                .qty
                .saturating_add(available.saturating_mul(transform.content_qty));
            entry.containers.push(HeldContainer {
                item_id: row.item_id,
                item_name: name_or_id(catalog.get_item(row.item_id), row.item_id),
                qty: available,
            });
        }
    }
    latent.into_values().collect()
}

/// Feasible transforms yielding `item_id`, best first.
///
/// Emptying needs the full `outstanding` covered by containers already
/// held (`held` reports credits plus allocatable stock). Filling is always
/// feasible; its inputs are resolved like any other demand.
pub fn candidates<'c, C: CatalogAccessor + ?Sized>(
    catalog: &'c C,
    item_id: ItemId,
    outstanding: u64,
    held: impl Fn(ItemId) -> u64,
) -> Vec<TransformMatch<'c>> {
    let mut matches = Vec::new();
    if outstanding == 0 {
        return matches;
    }

    for transform in catalog.get_container_transforms_for(item_id, TransformDirection::Empty) {
        if transform.content_qty == 0 {
            continue;
        }
        let batches = outstanding.div_ceil(transform.content_qty);
        if held(transform.container_item_id) >= batches {
            matches.push(TransformMatch {
                transform,
                direction: TransformDirection::Empty,
                batches,
            });
        }
    }

    for transform in catalog.get_container_transforms_for(item_id, TransformDirection::Fill) {
        if transform.content_qty == 0 {
            continue;
        }
        matches.push(TransformMatch {
            transform,
            direction: TransformDirection::Fill,
            batches: outstanding,
        });
    }

    matches.sort_by(|a, b| {
        b.transform
            .priority
            .cmp(&a.transform.priority)
            .then(a.transform.id.cmp(&b.transform.id))
    });
    matches
}

fn name_or_id(item: Option<&Item>, item_id: ItemId) -> String {
    item.map(|i| i.name.clone())
        .unwrap_or_else(|| format!("item #{}", item_id))
}

fn ordered(mut transforms: Vec<&ContainerTransform>) -> Vec<&ContainerTransform> {
    transforms.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
    transforms
}

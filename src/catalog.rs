//! Read-only content catalog
//!
//! Loaded once per session (see `db::load_catalog`) and shared immutably with
//! every planning pass.

use std::collections::BTreeMap;

use crate::models::{
    ContainerTransform, Item, ItemId, MachineMetadata, Recipe, RecipeId, TransformDirection,
};

/// Lookups the planner needs from the content catalog.
pub trait CatalogAccessor {
    fn get_item(&self, item_id: ItemId) -> Option<&Item>;

    /// Recipes with at least one output line for `item_id`, ordered by id
    fn get_recipes_for_output(&self, item_id: ItemId) -> Vec<&Recipe>;

    fn get_machine_metadata(&self, machine_type: &str, tier: &str) -> Option<&MachineMetadata>;

    /// Transforms that yield `item_id` when run in `direction`
    fn get_container_transforms_for(
        &self,
        item_id: ItemId,
        direction: TransformDirection,
    ) -> Vec<&ContainerTransform>;

    /// Transforms that consume `item_id` as their full container when emptied
    fn get_emptying_transforms_from(&self, container_item_id: ItemId) -> Vec<&ContainerTransform>;
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    items: BTreeMap<ItemId, Item>,
    recipes: BTreeMap<RecipeId, Recipe>,
    producers: BTreeMap<ItemId, Vec<RecipeId>>,
    machines: BTreeMap<(String, String), MachineMetadata>,
    transforms: Vec<ContainerTransform>,
}

impl Catalog {
    pub fn new(
        items: Vec<Item>,
        recipes: Vec<Recipe>,
        machines: Vec<MachineMetadata>,
        transforms: Vec<ContainerTransform>,
    ) -> Self {
        let mut producers: BTreeMap<ItemId, Vec<RecipeId>> = BTreeMap::new();
        for recipe in &recipes {
            for line in &recipe.outputs {
                let ids = producers.entry(line.item_id).or_default();
                if !ids.contains(&recipe.id) {
                    ids.push(recipe.id);
                }
            }
        }
        for ids in producers.values_mut() {
            ids.sort_unstable();
        }

        Self {
            items: items.into_iter().map(|i| (i.id, i)).collect(),
            recipes: recipes.into_iter().map(|r| (r.id, r)).collect(),
            producers,
            machines: machines
                .into_iter()
                .map(|m| ((m.machine_type.clone(), m.tier.clone()), m))
                .collect(),
            transforms,
        }
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn recipes(&self) -> impl Iterator<Item = &Recipe> {
        self.recipes.values()
    }

    pub fn machine_metadata(&self) -> impl Iterator<Item = &MachineMetadata> {
        self.machines.values()
    }

    pub fn transforms(&self) -> &[ContainerTransform] {
        &self.transforms
    }

    /// Look an item up by numeric id, key, or display name (case-insensitive).
    pub fn find_item(&self, query: &str) -> Option<&Item> {
        let query = query.trim();
        if let Ok(id) = query.parse::<ItemId>() {
            if let Some(item) = self.items.get(&id) {
                return Some(item);
            }
        }
        self.items
            .values()
            .find(|i| i.key == query)
            .or_else(|| self.items.values().find(|i| i.name.eq_ignore_ascii_case(query)))
    }

    pub fn item_name(&self, item_id: ItemId) -> String {
        self.items
            .get(&item_id)
            .map(|i| i.name.clone())
            .unwrap_or_else(|| format!("item #{}", item_id))
    }
}

impl CatalogAccessor for Catalog {
    fn get_item(&self, item_id: ItemId) -> Option<&Item> {
        self.items.get(&item_id)
    }

    fn get_recipes_for_output(&self, item_id: ItemId) -> Vec<&Recipe> {
        self.producers
            .get(&item_id)
            .map(|ids| ids.iter().filter_map(|id| self.recipes.get(id)).collect())
            .unwrap_or_default()
    }

    fn get_machine_metadata(&self, machine_type: &str, tier: &str) -> Option<&MachineMetadata> {
        self.machines
            .get(&(machine_type.to_string(), tier.to_string()))
    }

    fn get_container_transforms_for(
        &self,
        item_id: ItemId,
        direction: TransformDirection,
    ) -> Vec<&ContainerTransform> {
        self.transforms
            .iter()
            .filter(|t| t.kind.allows(direction) && t.output_item(direction) == item_id)
            .collect()
    }

    fn get_emptying_transforms_from(&self, container_item_id: ItemId) -> Vec<&ContainerTransform> {
        self.transforms
            .iter()
            .filter(|t| {
                t.kind.allows(TransformDirection::Empty) && t.container_item_id == container_item_id
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Small in-memory catalogs shared by the engine tests

    use crate::models::*;

    pub fn item(id: ItemId, name: &str, kind: ItemKind) -> Item {
        Item {
            id,
            key: name.to_ascii_lowercase().replace(' ', "_"),
            name: name.to_string(),
            kind,
            material: None,
            machine: None,
            container: None,
            stack_size: 64,
        }
    }

    pub fn machine_item(id: ItemId, name: &str, machine_type: &str, tier: &str) -> Item {
        Item {
            machine: Some(MachineRef {
                machine_type: machine_type.to_string(),
                tier: tier.to_string(),
            }),
            ..item(id, name, ItemKind::Machine)
        }
    }

    pub fn metadata(machine_type: &str, tier: &str, input_slots: u32, output_slots: u32) -> MachineMetadata {
        MachineMetadata {
            machine_type: machine_type.to_string(),
            tier: tier.to_string(),
            input_slots,
            output_slots,
            input_tanks: 0,
            output_tanks: 0,
        }
    }

    pub fn line(item_id: ItemId, qty: u64) -> RecipeLine {
        RecipeLine {
            item_id,
            qty,
            chance: None,
            consumed: true,
        }
    }

    pub fn tool(item_id: ItemId, qty: u64) -> RecipeLine {
        RecipeLine {
            consumed: false,
            chance: Some(0.0),
            ..line(item_id, qty)
        }
    }

    pub fn recipe(id: RecipeId, name: &str, inputs: Vec<RecipeLine>, outputs: Vec<RecipeLine>) -> Recipe {
        Recipe {
            id,
            name: name.to_string(),
            method: Method::Crafting,
            machine_item_id: None,
            grid_size: None,
            station_item_id: None,
            circuit: None,
            inputs,
            outputs,
        }
    }

    pub fn machine_recipe(
        id: RecipeId,
        name: &str,
        machine_item_id: ItemId,
        inputs: Vec<RecipeLine>,
        outputs: Vec<RecipeLine>,
    ) -> Recipe {
        Recipe {
            method: Method::Machine,
            machine_item_id: Some(machine_item_id),
            ..recipe(id, name, inputs, outputs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::models::{ItemKind, TransformKind};

    fn sample() -> Catalog {
        let transform = ContainerTransform {
            id: 1,
            priority: 0,
            container_item_id: 3,
            empty_item_id: 4,
            content_item_id: 2,
            content_qty: 1000,
            kind: TransformKind::EmptyOnly,
            empty_consumed: false,
        };
        Catalog::new(
            vec![
                item(1, "Iron Rod", ItemKind::Component),
                item(2, "Water", ItemKind::Fluid),
                item(3, "Water Cell", ItemKind::Component),
                item(4, "Empty Cell", ItemKind::Component),
            ],
            vec![
                recipe(20, "Rod B", vec![], vec![line(1, 2)]),
                recipe(10, "Rod A", vec![], vec![line(1, 1), line(1, 1)]),
            ],
            vec![metadata("Lathe", "LV", 1, 1)],
            vec![transform],
        )
    }

    #[test]
    fn test_recipes_for_output_ordered_by_id_without_duplicates() {
        let catalog = sample();
        let ids: Vec<_> = catalog.get_recipes_for_output(1).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![10, 20]);
        assert!(catalog.get_recipes_for_output(2).is_empty());
    }

    #[test]
    fn test_transform_lookup_respects_kind() {
        let catalog = sample();
        assert_eq!(catalog.get_container_transforms_for(2, TransformDirection::Empty).len(), 1);
        assert!(catalog.get_container_transforms_for(3, TransformDirection::Fill).is_empty());
        assert_eq!(catalog.get_emptying_transforms_from(3).len(), 1);
    }

    #[test]
    fn test_find_item_by_id_key_or_name() {
        let catalog = sample();
        assert_eq!(catalog.find_item("2").map(|i| i.id), Some(2));
        assert_eq!(catalog.find_item("water_cell").map(|i| i.id), Some(3));
        assert_eq!(catalog.find_item("empty cell").map(|i| i.id), Some(4));
        assert!(catalog.find_item("Lava").is_none());
    }

    #[test]
    fn test_machine_metadata_lookup() {
        let catalog = sample();
        assert_eq!(catalog.get_machine_metadata("Lathe", "LV").map(|m| m.input_slots), Some(1));
        assert!(catalog.get_machine_metadata("Lathe", "MV").is_none());
    }
}

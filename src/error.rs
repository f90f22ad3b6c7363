//! Error and warning types for the planning engine

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::models::{ItemId, RecipeId, Unit};

/// Request-level failures. Planning aborts before resolution and no partial
/// plan is returned.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("requested quantity must be positive")]
    InvalidQuantity,

    #[error("quantities needed for {0} exceed the supported range")]
    QuantityOverflow(String),

    #[error("unknown item #{0}")]
    UnknownItem(ItemId),

    #[error("no item matches '{0}'")]
    UnknownItemName(String),

    #[error("{item} is measured in {expected}, not {given}")]
    UnitMismatch {
        item: String,
        expected: Unit,
        given: Unit,
    },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Structural anomalies recovered in place. The affected node carries the
/// warning and the rest of the plan is still produced.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanWarning {
    #[error("cyclic dependency: {} requires itself via {}", item_name, path.join(" -> "))]
    CycleDetected {
        item_id: ItemId,
        item_name: String,
        path: Vec<String>,
    },

    #[error("recipe '{recipe_name}' needs machine metadata for {machine} that is not defined")]
    MissingMachineMetadata {
        recipe_id: RecipeId,
        recipe_name: String,
        machine: String,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid quantity '{0}' (expected e.g. 16, 1000L or 1000 L)")]
    Quantity(String),
}

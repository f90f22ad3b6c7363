//! GTNH Recipe Planner
//!
//! Resolves a target item into ordered build steps and a shopping list, using
//! the recipes and machines of a content catalog and the stock held in
//! storage units. Storage policy decides which stock the planner may use.

pub mod allocator;
pub mod assembler;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod models;
pub mod report;
pub mod resolver;
pub mod sample;
pub mod tracker;
pub mod transform;

pub use assembler::{BuildStep, Plan, ShoppingList, flatten, plan};
pub use catalog::{Catalog, CatalogAccessor};
pub use error::{PlanError, PlanWarning};
pub use ledger::{Ledger, LedgerSource};
pub use resolver::{PlanOptions, resolve};
pub use tracker::{BuildTracker, StepState};

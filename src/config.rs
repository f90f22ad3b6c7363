//! Configuration file and command-line value parsing
//!
//! The optional TOML file looks like:
//!
//! ```toml
//! database = "gtnh_planner.db"
//!
//! [planner]
//! use_inventory = true
//! enabled_tiers = ["ULV", "LV", "MV"]
//! crafting_6x6_unlocked = false
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use regex::Regex;
use serde::Deserialize;

use crate::error::{ConfigError, PlanError};
use crate::models::Unit;
use crate::resolver::PlanOptions;

pub const DEFAULT_CONFIG_FILE: &str = "gtnh-planner.toml";
pub const DEFAULT_DATABASE: &str = "gtnh_planner.db";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database: Option<PathBuf>,
    pub planner: PlanOptions,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Like `load`, but a missing file yields the defaults
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn database(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE))
    }
}

/// A quantity typed on the command line: `64`, `1000L` or `1000 L`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantityArg {
    pub qty: u64,
    /// `Some(Liters)` when a liter suffix was given
    pub unit: Option<Unit>,
}

impl QuantityArg {
    /// Check the quantity against the unit of the item it is for
    pub fn qty_for(&self, item_name: &str, unit: Unit) -> Result<u64, PlanError> {
        match self.unit {
            Some(given) if given != unit => Err(PlanError::UnitMismatch {
                item: item_name.to_string(),
                expected: unit,
                given,
            }),
            _ => Ok(self.qty),
        }
    }
}

impl FromStr for QuantityArg {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::Quantity(s.to_string());
        let re = Regex::new(r"^\s*(\d+)\s*([lL])?\s*$").map_err(|_| invalid())?;
        let caps = re.captures(s).ok_or_else(invalid)?;
        let qty = caps[1].parse::<u64>().map_err(|_| invalid())?;
        let unit = caps.get(2).map(|_| Unit::Liters);
        Ok(Self { qty, unit })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::io::Write;

    use super::*;

    #[test]
    fn test_quantity_forms() {
        let plain: QuantityArg = "64".parse().unwrap();
        assert_eq!(plain, QuantityArg { qty: 64, unit: None });

        for text in ["1000L", "1000 L", " 1000l "] {
            let q: QuantityArg = text.parse().unwrap();
            assert_eq!(q.qty, 1000);
            assert_eq!(q.unit, Some(Unit::Liters));
        }

        assert!("".parse::<QuantityArg>().is_err());
        assert!("-3".parse::<QuantityArg>().is_err());
        assert!("2.5kL".parse::<QuantityArg>().is_err());
    }

    #[test]
    fn test_liter_suffix_rejected_for_counted_items() {
        let q: QuantityArg = "4L".parse().unwrap();
        assert!(q.qty_for("Iron Rod", Unit::Count).is_err());
        assert_eq!(q.qty_for("Water", Unit::Liters).unwrap(), 4);
        let plain: QuantityArg = "4".parse().unwrap();
        assert_eq!(plain.qty_for("Water", Unit::Liters).unwrap(), 4);
    }

    #[test]
    fn test_load_full_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "database = \"packs/gtnh.db\"\n\n[planner]\nuse_inventory = false\nenabled_tiers = [\"LV\", \"MV\"]\ncrafting_6x6_unlocked = true"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.database(), PathBuf::from("packs/gtnh.db"));
        assert!(!config.planner.use_inventory);
        assert_eq!(
            config.planner.enabled_tiers,
            Some(BTreeSet::from(["LV".to_string(), "MV".to_string()]))
        );
        assert!(config.planner.crafting_6x6_unlocked);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[planner]\nenabled_tiers = [\"LV\"]").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.database(), PathBuf::from(DEFAULT_DATABASE));
        assert!(config.planner.use_inventory);
        assert!(!config.planner.crafting_6x6_unlocked);
    }

    #[test]
    fn test_missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert!(matches!(
            Config::load(&dir.path().join("absent.toml")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_malformed_config_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[planner]\nuse_inventory = \"sometimes\"").unwrap();
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }
}

//! Index costing configuration

use serde::{Deserialize, Serialize};

/// Distinct ratio assumed for non-unique indexes without real statistics.
pub const DEFAULT_UNIFORM_DISTINCT_RATIO: f64 = 0.90;

/// Null ratio assumed for indexes without real statistics.
pub const DEFAULT_UNIFORM_NULL_RATIO: f64 = 0.03;

/// Knobs for the costed index scan rule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CosterConfig {
    /// Turns the costed index scan rule on or off
    pub enabled: bool,

    /// Distinct ratio for synthesized non-unique statistics
    pub uniform_distinct_ratio: f64,

    /// Null ratio for synthesized statistics
    pub uniform_null_ratio: f64,

    /// Index id that wins late ties
    pub primary_index_name: String,

    /// Upper bound on indexes costed per table, 0 for no limit
    pub max_index_candidates: usize,
}

impl Default for CosterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            uniform_distinct_ratio: DEFAULT_UNIFORM_DISTINCT_RATIO,
            uniform_null_ratio: DEFAULT_UNIFORM_NULL_RATIO,
            primary_index_name: "primary".to_string(),
            max_index_candidates: 0,
        }
    }
}

impl CosterConfig {
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Self, crate::IdxError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| crate::IdxError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), crate::IdxError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), crate::IdxError> {
        for (name, ratio) in [
            ("uniform_distinct_ratio", self.uniform_distinct_ratio),
            ("uniform_null_ratio", self.uniform_null_ratio),
        ] {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(crate::IdxError::Config(format!(
                    "{name} must be within [0, 1], got {ratio}"
                )));
            }
        }
        if self.primary_index_name.is_empty() {
            return Err(crate::IdxError::Config(
                "primary_index_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

use dicelog_config::RetentionConfig;

use crate::error::{Error, Result};

/// Per-category capacities applied by one pipeline pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionLimits {
    pub records: usize,
    pub participants: usize,
    pub dice_users: usize,
    pub color_map: usize,
}

impl RetentionLimits {
    /// Reject a zero capacity, which would empty every collection it covers.
    pub fn check(&self) -> Result<()> {
        for (name, value) in [
            ("records_limit", self.records),
            ("participants_limit", self.participants),
            ("dice_users_limit", self.dice_users),
            ("color_map_limit", self.color_map),
        ] {
            if value == 0 {
                return Err(Error::ZeroLimit { name });
            }
        }
        Ok(())
    }
}

impl Default for RetentionLimits {
    fn default() -> Self {
        Self::from(&RetentionConfig::default())
    }
}

impl From<&RetentionConfig> for RetentionLimits {
    fn from(cfg: &RetentionConfig) -> Self {
        Self {
            records: cfg.records_limit,
            participants: cfg.participants_limit,
            dice_users: cfg.dice_users_limit,
            color_map: cfg.color_map_limit,
        }
    }
}

//! Configuration for the bundled features.
//!
//! Values are validated when they are set, so a feature never has to re-check its inputs
//! before turning them into instruction operands.

/// Settings of the crate capacity feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrateCapacityConfig {
    factor: i16,
}

impl CrateCapacityConfig {
    /// Factor used when none is configured.
    pub const DEFAULT_FACTOR: i32 = 2;

    /// Create a configuration multiplying crate capacity by `factor`, clamped to `1..=32767`
    /// so it can be pushed with `sipush`.
    #[must_use]
    pub fn new(factor: i32) -> Self {
        let clamped = factor.clamp(1, i32::from(i16::MAX));
        CrateCapacityConfig {
            factor: i16::try_from(clamped).unwrap_or(i16::MAX),
        }
    }

    /// The effective factor.
    #[must_use]
    pub fn factor(&self) -> i16 {
        self.factor
    }
}

impl Default for CrateCapacityConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_FACTOR)
    }
}

/// Which features to apply.
///
/// All features are enabled by default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureConfig {
    /// Ignore altars, hostile creatures and dens when founding settlements, terraforming and
    /// planning structures
    pub no_holy_ground: bool,

    /// Apply the surface mining slope rules of non-PvP servers on PvP servers
    pub pvp_surface_mining_slope: bool,

    /// Make sending and receiving mail free
    pub no_mail_cost: bool,

    /// Multiply the capacity of crates; `None` leaves it unchanged
    pub crate_capacity: Option<CrateCapacityConfig>,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            no_holy_ground: true,
            pvp_surface_mining_slope: true,
            no_mail_cost: true,
            crate_capacity: Some(CrateCapacityConfig::default()),
        }
    }
}

impl FeatureConfig {
    /// Create the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A configuration with every feature disabled.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            no_holy_ground: false,
            pvp_surface_mining_slope: false,
            no_mail_cost: false,
            crate_capacity: None,
        }
    }

    /// Returns true if at least one feature is enabled.
    #[must_use]
    pub fn any_enabled(&self) -> bool {
        self.no_holy_ground
            || self.pvp_surface_mining_slope
            || self.no_mail_cost
            || self.crate_capacity.is_some()
    }

    /// Enable or disable the holy ground feature.
    #[must_use]
    pub fn with_no_holy_ground(mut self, enabled: bool) -> Self {
        self.no_holy_ground = enabled;
        self
    }

    /// Enable or disable the PvP mining slope feature.
    #[must_use]
    pub fn with_pvp_surface_mining_slope(mut self, enabled: bool) -> Self {
        self.pvp_surface_mining_slope = enabled;
        self
    }

    /// Enable or disable the mail cost feature.
    #[must_use]
    pub fn with_no_mail_cost(mut self, enabled: bool) -> Self {
        self.no_mail_cost = enabled;
        self
    }

    /// Multiply crate capacity by `factor` (clamped to `1..=32767`).
    #[must_use]
    pub fn with_crate_factor(mut self, factor: i32) -> Self {
        self.crate_capacity = Some(CrateCapacityConfig::new(factor));
        self
    }

    /// Leave crate capacity unchanged.
    #[must_use]
    pub fn without_crate_capacity(mut self) -> Self {
        self.crate_capacity = None;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_factor_is_clamped() {
        assert_eq!(CrateCapacityConfig::default().factor(), 2);
        assert_eq!(CrateCapacityConfig::new(0).factor(), 1);
        assert_eq!(CrateCapacityConfig::new(-40).factor(), 1);
        assert_eq!(CrateCapacityConfig::new(40_000).factor(), 32767);
        assert_eq!(CrateCapacityConfig::new(32767).factor(), 32767);
    }

    #[test]
    fn presets() {
        assert!(FeatureConfig::default().any_enabled());
        assert!(!FeatureConfig::disabled().any_enabled());

        let config = FeatureConfig::disabled()
            .with_no_mail_cost(true)
            .with_crate_factor(5);
        assert!(config.no_mail_cost);
        assert!(!config.no_holy_ground);
        assert_eq!(config.crate_capacity.map(|c| c.factor()), Some(5));
        assert_eq!(config.without_crate_capacity().crate_capacity, None);
    }
}

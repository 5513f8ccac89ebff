//! Ready-made patches for the Wurm Unlimited server.
//!
//! Each feature is a [`Feature`]: a named producer of [`PatchRequest`]s against host types under
//! `com/wurmonline/server/`. Features never compute game values themselves; configuration
//! reaches the host only as literal operands of the emitted instructions.
//!
//! # Key Components
//!
//! - [`Feature`] - The trait every feature implements
//! - [`FeatureSet`] - The features enabled by a [`FeatureConfig`]
//! - [`NoHolyGround`], [`PvpSurfaceMiningSlope`], [`NoMailCost`], [`CrateCapacity`] - The
//!   bundled features
//!
//! # Usage Examples
//!
//! ```rust
//! use classweave::features::{FeatureConfig, FeatureSet};
//!
//! let set = FeatureSet::from_config(&FeatureConfig::disabled().with_crate_factor(3));
//! assert_eq!(set.names(), vec!["crate-capacity"]);
//!
//! let requests = set.requests()?;
//! assert_eq!(requests[0].type_name, "com/wurmonline/server/items/Item");
//! # Ok::<(), classweave::Error>(())
//! ```

mod config;
mod crate_capacity;
mod holy_ground;
mod mail_cost;
mod mining_slope;

use std::fmt;

use log::info;

pub use config::{CrateCapacityConfig, FeatureConfig};
pub use crate_capacity::CrateCapacity;
pub use holy_ground::NoHolyGround;
pub use mail_cost::NoMailCost;
pub use mining_slope::PvpSurfaceMiningSlope;

use crate::{
    file::TypeStore,
    patch::{ApplyResult, PatchApplication, PatchRequest},
    Result,
};

const SERVER_PACKAGE: &str = "com/wurmonline/server";

/// Internal name of a server type given relative to the server package, e.g. `items/Item`.
pub(crate) fn server_type(path: &str) -> String {
    format!("{SERVER_PACKAGE}/{path}")
}

/// Descriptor of a server type given relative to the server package.
pub(crate) fn server_descriptor(path: &str) -> String {
    format!("L{SERVER_PACKAGE}/{path};")
}

/// A named group of patches.
pub trait Feature {
    /// Unique name for logging.
    fn name(&self) -> &'static str;

    /// The requests implementing the feature, in application order.
    ///
    /// # Errors
    /// Returns builder errors if a replacement sequence cannot be built.
    fn requests(&self) -> Result<Vec<PatchRequest>>;
}

/// An ordered collection of features.
#[derive(Default)]
pub struct FeatureSet {
    features: Vec<Box<dyn Feature>>,
}

impl fmt::Debug for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureSet")
            .field("features", &self.names())
            .finish()
    }
}

impl FeatureSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The features enabled by `config`.
    #[must_use]
    pub fn from_config(config: &FeatureConfig) -> Self {
        let mut set = FeatureSet::new();
        if config.no_holy_ground {
            set.push(NoHolyGround);
        }
        if config.pvp_surface_mining_slope {
            set.push(PvpSurfaceMiningSlope);
        }
        if config.no_mail_cost {
            set.push(NoMailCost);
        }
        if let Some(crates) = config.crate_capacity {
            set.push(CrateCapacity::new(crates));
        }
        set
    }

    /// Append a feature.
    pub fn push(&mut self, feature: impl Feature + 'static) {
        self.features.push(Box::new(feature));
    }

    /// Names of the features, in order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.features.iter().map(|feature| feature.name()).collect()
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Returns true if no feature is enabled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// The requests of every feature, in order.
    ///
    /// # Errors
    /// Returns the first error of [`Feature::requests`].
    pub fn requests(&self) -> Result<Vec<PatchRequest>> {
        let mut requests = Vec::new();
        for feature in &self.features {
            requests.extend(feature.requests()?);
        }
        Ok(requests)
    }

    /// Apply every feature through `application`.
    ///
    /// # Errors
    /// Returns the errors of [`FeatureSet::requests`]. Failures of single requests are reported
    /// in the returned results instead.
    pub fn apply<S: TypeStore>(
        &self,
        application: &mut PatchApplication<S>,
    ) -> Result<Vec<ApplyResult>> {
        let requests = self.requests()?;
        info!(
            "applying {} requests for features {}",
            requests.len(),
            self.names().join(", ")
        );
        Ok(application.apply(&requests))
    }
}

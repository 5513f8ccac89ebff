//! Crate capacity.
//!
//! `Item.getRemainingCrateSpace` computes the free space as a `sipush` capacity literal minus
//! the current count: 150 for small crates, 300 for large ones. The factor is multiplied in
//! right behind each literal.

use crate::{
    assembly::opcodes::SIPUSH,
    features::{config::CrateCapacityConfig, server_type, Feature},
    patch::{Anchor, IntOp, MethodSelector, PatchBuilder, PatchRequest},
    Result,
};

/// Capacities of the small and the large crate.
pub const CRATE_CAPACITIES: [i32; 2] = [150, 300];

/// Multiply the capacity of crates.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrateCapacity {
    config: CrateCapacityConfig,
}

impl CrateCapacity {
    /// Create the feature from its configuration.
    #[must_use]
    pub fn new(config: CrateCapacityConfig) -> Self {
        CrateCapacity { config }
    }

    /// The effective factor.
    #[must_use]
    pub fn factor(&self) -> i16 {
        self.config.factor()
    }
}

impl Feature for CrateCapacity {
    fn name(&self) -> &'static str {
        "crate-capacity"
    }

    fn requests(&self) -> Result<Vec<PatchRequest>> {
        let scale = PatchBuilder::consuming(1)
            .push_int(i32::from(self.factor()))?
            .int_op(IntOp::Mul)?
            .build()?;

        // One anchor for both literals, so a factor equal to a capacity is never rescaled.
        Ok(vec![PatchRequest::new(
            &server_type("items/Item"),
            MethodSelector::method("getRemainingCrateSpace", "()I"),
        )
        .insert_after(Anchor::any_literal(SIPUSH, &CRATE_CAPACITIES), scale)])
    }
}

//! Surface mining slope rules on PvP servers.

use log::debug;

use crate::{
    features::{server_type, Feature},
    patch::{MethodSelector, PatchBuilder, PatchRequest},
    Result,
};

/// Reads of the `PVPSERVER` flag in the slope check see `false`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PvpSurfaceMiningSlope;

impl Feature for PvpSurfaceMiningSlope {
    fn name(&self) -> &'static str {
        "pvp-surface-mining-slope"
    }

    fn requests(&self) -> Result<Vec<PatchRequest>> {
        let not_pvp = PatchBuilder::new().push_bool(false)?.build_value(1)?;
        let request = PatchRequest::new(
            &server_type("behaviours/TileRockBehaviour"),
            MethodSelector::by_name("cannotMineSlope"),
        )
        .replace_field("PVPSERVER", not_pvp);

        debug!("{}: {} operations", self.name(), request.operations.len());
        Ok(vec![request])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::{MemberTarget, PatchOperation};

    #[test]
    fn replaces_the_flag_read() {
        let requests = PvpSurfaceMiningSlope.requests().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].type_name,
            "com/wurmonline/server/behaviours/TileRockBehaviour"
        );
        assert_eq!(requests[0].method, MethodSelector::by_name("cannotMineSlope"));
        assert!(matches!(
            &requests[0].operations[..],
            [PatchOperation::ReplaceField { target: MemberTarget::Name(name), .. }] if name == "PVPSERVER"
        ));
    }
}

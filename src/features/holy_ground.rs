//! Settlement founding, terraforming and structure planning near altars.
//!
//! Each blocking check is a call whose result the host tests: `checkBlocking*` report whether
//! the site is clear, `get*Altar` return the altar or `null`. The calls are replaced by the
//! answer that lets the action proceed. Every (method, call) pair is a request of its own, so a
//! server build missing one of the calls still gets the others patched.

use crate::{
    features::{server_descriptor, server_type, Feature},
    patch::{MethodSelector, PatchBuilder, PatchRequest, Sequence},
    Result,
};

const CLEAR_CHECKS: [&str; 2] = ["checkBlockingCreatures", "checkBlockingItems"];
const ALTAR_LOOKUPS: [&str; 2] = ["getEvilAltar", "getGoodAltar"];

/// Ignore altars, hostile creatures and dens.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHolyGround;

impl NoHolyGround {
    fn altar_guarded() -> [(String, MethodSelector); 2] {
        let creature = server_descriptor("creatures/Creature");
        let item = server_descriptor("items/Item");
        [
            (
                server_type("behaviours/Terraforming"),
                MethodSelector::method("isAltarBlocking", &format!("({creature}II)Z")),
            ),
            (
                server_type("behaviours/MethodsStructure"),
                MethodSelector::method("canPlanStructureAt", &format!("({creature}{item}III)Z")),
            ),
        ]
    }
}

impl Feature for NoHolyGround {
    fn name(&self) -> &'static str {
        "no-holy-ground"
    }

    fn requests(&self) -> Result<Vec<PatchRequest>> {
        let clear: Sequence = PatchBuilder::new().push_bool(true)?.build_value(1)?;
        let no_altar: Sequence = PatchBuilder::new().push_null()?.build_value(1)?;

        let founding = server_type("questions/VillageFoundationQuestion");
        let mut requests: Vec<PatchRequest> = CLEAR_CHECKS
            .iter()
            .map(|check| {
                PatchRequest::new(&founding, MethodSelector::method("answersFail", "()Z"))
                    .replace_call(*check, clear.clone())
            })
            .collect();

        for (type_name, method) in Self::altar_guarded() {
            for lookup in ALTAR_LOOKUPS {
                requests.push(
                    PatchRequest::new(&type_name, method.clone())
                        .replace_call(lookup, no_altar.clone()),
                );
            }
        }
        Ok(requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::{MemberTarget, PatchOperation};

    #[test]
    fn one_request_per_method_and_call() {
        let requests = NoHolyGround.requests().unwrap();
        assert_eq!(requests.len(), 6);

        let targets: Vec<(String, String)> = requests
            .iter()
            .map(|request| match &request.operations[..] {
                [PatchOperation::ReplaceCall {
                    target: MemberTarget::Name(name),
                    ..
                }] => (request.type_name.clone(), name.clone()),
                other => panic!("unexpected operations {other:?}"),
            })
            .collect();
        assert_eq!(
            targets[0],
            (
                "com/wurmonline/server/questions/VillageFoundationQuestion".to_string(),
                "checkBlockingCreatures".to_string()
            )
        );
        assert_eq!(
            targets[5],
            (
                "com/wurmonline/server/behaviours/MethodsStructure".to_string(),
                "getGoodAltar".to_string()
            )
        );
        assert_eq!(
            requests[2].method,
            MethodSelector::method(
                "isAltarBlocking",
                "(Lcom/wurmonline/server/creatures/Creature;II)Z"
            )
        );
    }
}

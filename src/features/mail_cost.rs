//! Free mail.
//!
//! Sending is priced by `MailSendConfirmQuestion.getCostForItem`, whose body becomes
//! `return 0`. Returned and rejected mail is priced through the `pcost` local of the receive
//! question, which starts at a fixed default; it is reset to zero in front of every
//! `getTemplateId` call that precedes its use.

use crate::{
    features::{server_descriptor, server_type, Feature},
    patch::{Anchor, MethodSelector, PatchBuilder, PatchRequest, ValueKind},
    Result,
};

/// Debug name of the postage local in the receive question.
const POSTAGE_LOCAL: &str = "pcost";

/// Sending and receiving mail costs nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMailCost;

impl Feature for NoMailCost {
    fn name(&self) -> &'static str {
        "no-mail-cost"
    }

    fn requests(&self) -> Result<Vec<PatchRequest>> {
        let item = server_descriptor("items/Item");
        let mail = server_descriptor("items/WurmMail");

        let free = PatchBuilder::new()
            .push_int(0)?
            .return_value(ValueKind::Int)?
            .build()?;
        let send = PatchRequest::new(
            &server_type("questions/MailSendConfirmQuestion"),
            MethodSelector::method("getCostForItem", &format!("({item}F)I")),
        )
        .set_body(free);

        let reset = PatchBuilder::new()
            .push_int(0)?
            .store_local(ValueKind::Int, POSTAGE_LOCAL)?
            .build()?;
        let receive = server_type("questions/MailReceiveQuestion");
        let receive_methods = [
            MethodSelector::method("answer", "(Ljava/util/Properties;)V"),
            MethodSelector::method(
                "addItem",
                &format!("(Ljava/lang/String;{item}{mail}Z)Ljava/lang/String;"),
            ),
        ];

        let mut requests = vec![send];
        requests.extend(receive_methods.into_iter().map(|method| {
            PatchRequest::new(&receive, method)
                .insert_before(Anchor::call_site("getTemplateId"), reset.clone())
        }));
        Ok(requests)
    }
}

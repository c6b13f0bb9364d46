//! Confirmation checkpoints answered by the client through
//! `session/request_permission`.

use std::future::Future;
use std::pin::Pin;

use serde_json::{json, Value};
use tracing::{info, warn};

use super::connection::Connection;
use crate::events::tool_kind::tool_kind;
use crate::models::confirmation::{ConfirmationResult, PendingAction};
use crate::models::mode::ConfirmationPolicy;
use crate::session::Confirmer;
use crate::Result;

/// Run the action once.
pub const ALLOW_ONCE: &str = "allow_once";
/// Run it and stop asking for the rest of the session.
pub const ALWAYS_APPROVE: &str = "always_approve";
/// Run it and only ask for high-risk actions from now on.
pub const APPROVE_LOW_RISK: &str = "approve_low_risk";
/// Refuse the action.
pub const REJECT_ONCE: &str = "reject_once";

const REJECT_REASON: &str = "User rejected the actions";

/// [`Confirmer`] that asks the ACP client.
#[derive(Debug, Clone)]
pub struct PermissionConfirmer {
    connection: Connection,
}

impl PermissionConfirmer {
    /// Confirmer sending requests on `connection`.
    #[must_use]
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }
}

impl Confirmer for PermissionConfirmer {
    fn confirm<'a>(
        &'a self,
        session_id: &'a str,
        pending: &'a [PendingAction],
    ) -> Pin<Box<dyn Future<Output = Result<ConfirmationResult>> + Send + 'a>> {
        Box::pin(async move {
            let params = permission_params(session_id, pending);
            let response = self
                .connection
                .request("session/request_permission", params)
                .await?;
            let result = decision_from_response(&response);
            info!(session_id, decision = ?result.decision, "permission answered");
            Ok(result)
        })
    }
}

/// Parameters of the permission request covering every pending action.
#[must_use]
pub fn permission_params(session_id: &str, pending: &[PendingAction]) -> Value {
    let first = pending.first();
    let title = match pending {
        [single] => single.title.clone(),
        many => {
            let titles: Vec<&str> = many.iter().map(|action| action.title.as_str()).collect();
            format!("{} actions: {}", many.len(), titles.join(", "))
        }
    };
    let kind = first.map(|action| tool_kind(&action.tool_name, action.arguments.as_object()));
    let raw_input = match pending {
        [single] => single.arguments.clone(),
        many => Value::Array(many.iter().map(|action| action.arguments.clone()).collect()),
    };

    json!({
        "sessionId": session_id,
        "toolCall": {
            "toolCallId": first.map(|action| action.tool_call_id.as_str()).unwrap_or_default(),
            "title": title,
            "kind": kind,
            "status": "pending",
            "rawInput": raw_input,
        },
        "options": [
            {"optionId": ALLOW_ONCE, "name": "Yes, proceed", "kind": "allow_once"},
            {"optionId": ALWAYS_APPROVE, "name": "Always proceed (don't ask again)", "kind": "allow_always"},
            {"optionId": APPROVE_LOW_RISK, "name": "Auto-approve low/medium risk, ask for high risk", "kind": "allow_always"},
            {"optionId": REJECT_ONCE, "name": "Reject", "kind": "reject_once"},
        ],
    })
}

/// Map the client's answer to a decision. A cancelled request, an unknown
/// option or a malformed answer defers.
#[must_use]
pub fn decision_from_response(response: &Value) -> ConfirmationResult {
    let outcome = response.get("outcome");
    let kind = outcome
        .and_then(|outcome| outcome.get("outcome"))
        .and_then(Value::as_str);
    let option_id = outcome
        .and_then(|outcome| outcome.get("optionId"))
        .and_then(Value::as_str);

    match (kind, option_id) {
        (Some("selected"), Some(ALLOW_ONCE)) => ConfirmationResult::accept(),
        (Some("selected"), Some(ALWAYS_APPROVE)) => {
            ConfirmationResult::accept().with_policy(ConfirmationPolicy::NeverConfirm)
        }
        (Some("selected"), Some(APPROVE_LOW_RISK)) => {
            ConfirmationResult::accept().with_policy(ConfirmationPolicy::confirm_risky())
        }
        (Some("selected"), Some(REJECT_ONCE)) => ConfirmationResult::reject(REJECT_REASON),
        (Some("cancelled"), _) => ConfirmationResult::defer(),
        _ => {
            warn!(%response, "unrecognized permission outcome, deferring");
            ConfirmationResult::defer()
        }
    }
}

use crate::domain::conflict::ResolveOutcome;
use crate::domain::coordination::FanInOutcome;
use crate::domain::lock::AcquireOutcome;
use crate::domain::message::DeliveryReceipt;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Structured success/failure envelope handed to tool-layer adapters.
///
/// Every business outcome of the substrate (contention, absence, timeout,
/// invalid input) maps to a response with a readable message; nothing here
/// is an error and no internal state leaks across the boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ApiResponse {
    pub fn ok(message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

impl From<AcquireOutcome> for ApiResponse {
    fn from(outcome: AcquireOutcome) -> Self {
        if outcome.acquired {
            Self::ok("lock acquired", None)
        } else {
            let holder = outcome
                .held_by
                .map(|a| a.0)
                .unwrap_or_else(|| "another agent".to_string());
            Self::failed(format!("resource is locked by {holder}; retry after release or expiry"))
        }
    }
}

impl From<ResolveOutcome> for ApiResponse {
    fn from(outcome: ResolveOutcome) -> Self {
        match outcome {
            ResolveOutcome::Resolved { final_content } => Self::ok(
                "conflict resolved",
                Some(json!({ "final_content": final_content })),
            ),
            ResolveOutcome::AlreadyResolved => Self::ok("conflict was already resolved", None),
            ResolveOutcome::ManualContentRequired => Self::failed(
                "manual resolution requires content; conflict held for manual review",
            ),
            ResolveOutcome::NotFound => Self::failed("no conflict with that id"),
        }
    }
}

impl From<DeliveryReceipt> for ApiResponse {
    fn from(receipt: DeliveryReceipt) -> Self {
        if receipt.timed_out {
            Self::ok(
                "no reply before the timeout",
                Some(json!({ "delivered": receipt.delivered, "timed_out": true })),
            )
        } else {
            let message = if receipt.delivered {
                "message delivered"
            } else {
                "message accepted; target session has no handler"
            };
            Self::ok(
                message,
                Some(json!({
                    "delivered": receipt.delivered,
                    "reply": receipt.reply,
                    "timed_out": false,
                })),
            )
        }
    }
}

impl From<FanInOutcome> for ApiResponse {
    fn from(outcome: FanInOutcome) -> Self {
        match outcome {
            FanInOutcome::NotFound => Self::failed("no coordination group with that id"),
            FanInOutcome::Finished { status, aggregated } => Self::ok(
                "fan-in finished",
                Some(json!({ "status": status, "aggregated": aggregated })),
            ),
        }
    }
}

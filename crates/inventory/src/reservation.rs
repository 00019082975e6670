//! Batch reservation wire types.
//!
//! A batch is a list of independent debit attempts. Each attempt produces
//! exactly one outcome, in input order; a failed attempt never undoes an
//! earlier successful one.

use serde::{Deserialize, Serialize};

use stockbill_core::ProductId;

use crate::product::DebitError;

/// One debit attempt inside a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRequest {
    pub product_id: ProductId,
    pub quantity: i64,
}

/// Ordered debit attempts, optionally tagged with an idempotency key.
///
/// When a key is present the inventory side remembers every applied line as
/// `(key, line index)` and never applies it twice. The invoicing side uses the
/// invoice id as the key, so resubmitting a partially failed close only
/// debits the lines that did not go through the first time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationBatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub items: Vec<ReservationRequest>,
}

impl ReservationBatch {
    pub fn new(items: Vec<ReservationRequest>) -> Self {
        Self {
            idempotency_key: None,
            items,
        }
    }

    pub fn keyed(key: impl Into<String>, items: Vec<ReservationRequest>) -> Self {
        Self {
            idempotency_key: Some(key.into()),
            items,
        }
    }
}

/// Machine-readable denial reason.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    NotFound,
    InsufficientBalance,
    InvalidQuantity,
    /// The key already applied this line with a different product or quantity.
    IdempotencyMismatch,
}

impl From<&DebitError> for DenialReason {
    fn from(value: &DebitError) -> Self {
        match value {
            DebitError::NotFound(_) => DenialReason::NotFound,
            DebitError::InsufficientBalance { .. } => DenialReason::InsufficientBalance,
            DebitError::InvalidQuantity(_) => DenialReason::InvalidQuantity,
        }
    }
}

/// Result of one attempt. `new_balance` is the balance after the attempt
/// (unchanged on denial, 0 when the product does not exist).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationOutcome {
    pub success: bool,
    pub product_id: ProductId,
    pub new_balance: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<DenialReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// The line had already been applied under the same idempotency key.
    #[serde(default)]
    pub replayed: bool,
}

impl ReservationOutcome {
    pub fn applied(product_id: ProductId, new_balance: i64) -> Self {
        Self {
            success: true,
            product_id,
            new_balance,
            error_reason: None,
            error_message: None,
            replayed: false,
        }
    }

    pub fn denied(product_id: ProductId, current_balance: i64, error: &DebitError) -> Self {
        Self {
            success: false,
            product_id,
            new_balance: current_balance,
            error_reason: Some(DenialReason::from(error)),
            error_message: Some(error.to_string()),
            replayed: false,
        }
    }

    /// Denial for a keyed line whose content differs from what the key
    /// already applied. Nothing is debited.
    pub fn mismatched(product_id: ProductId, current_balance: i64, line: usize) -> Self {
        Self {
            success: false,
            product_id,
            new_balance: current_balance,
            error_reason: Some(DenialReason::IdempotencyMismatch),
            error_message: Some(format!(
                "line {line} was already applied under this key with a different item"
            )),
            replayed: false,
        }
    }

    /// Same outcome, flagged as answered from the idempotency journal.
    pub fn as_replay(&self) -> Self {
        Self {
            replayed: true,
            ..self.clone()
        }
    }
}

/// True when every outcome in the batch succeeded.
pub fn all_succeeded(outcomes: &[ReservationOutcome]) -> bool {
    outcomes.iter().all(|o| o.success)
}

//! Earnings record created when a delivery completes.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One completed delivery in the ledger. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct EarningsRecord {
    /// Unique record identifier.
    pub id: String,
    /// Item description of the delivered order.
    pub items: String,
    /// Dropoff address of the delivered order.
    pub dropoff: String,
    /// Amount earned.
    pub amount: f64,
    /// Local date and time the delivery was confirmed.
    pub completed_at: NaiveDateTime,
}

impl EarningsRecord {
    /// Construct a new record with a generated identifier.
    #[must_use]
    pub fn new(items: String, dropoff: String, amount: f64, completed_at: NaiveDateTime) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            items,
            dropoff,
            amount,
            completed_at,
        }
    }
}

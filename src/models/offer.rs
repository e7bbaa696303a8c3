//! Delivery offer model and pay parsing.

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// A delivery opportunity surfaced to the driver. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Offer {
    /// Unique identifier assigned by the feed or backend.
    pub id: String,
    /// Pickup address.
    pub pickup: String,
    /// Dropoff address.
    pub dropoff: String,
    /// Display distance, e.g. `"2.4 mi"`.
    pub distance: String,
    /// Display pay, e.g. `"$8.50"`.
    pub pay: String,
    /// Item description.
    pub items: String,
    /// Urgency label, e.g. `"Standard"` or `"Urgent"`.
    pub urgency: String,
    /// Chat counterpart (customer or merchant) for this order.
    pub counterpart_id: String,
}

impl Offer {
    /// Numeric value of [`pay`](Self::pay).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Malformed` if the pay string holds no number.
    pub fn pay_amount(&self) -> Result<f64> {
        parse_pay(&self.pay)
    }
}

/// Parse a display pay string such as `"$8.50"`, `"€1,204.00"` or `"12"`.
///
/// Currency symbols, whitespace and thousands separators are stripped.
///
/// # Errors
///
/// Returns `AppError::Malformed` if nothing numeric remains or the value is
/// negative or not finite.
pub fn parse_pay(display: &str) -> Result<f64> {
    let digits: String = display
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();

    let amount: f64 = digits
        .parse()
        .map_err(|_| AppError::Malformed(format!("pay {display:?} is not a number")))?;

    if !amount.is_finite() || amount < 0.0 {
        return Err(AppError::Malformed(format!(
            "pay {display:?} is out of range"
        )));
    }
    Ok(amount)
}

use serde::Serialize;
use roam_shared::{DateRange, Vehicle};

/// Server-side price for a rental. Client-supplied totals are never used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceQuote {
    pub days: i64,
    pub subtotal_cents: i64,
    pub service_fee_cents: i64,
    pub total_cents: i64,
    pub currency: String,
}

impl PriceQuote {
    /// `days * price_per_day + service_fee`. Returns `None` on overflow.
    pub fn compute(vehicle: &Vehicle, range: &DateRange, service_fee_cents: i64) -> Option<Self> {
        let days = range.days();
        let subtotal_cents = days.checked_mul(vehicle.price_per_day_cents)?;
        let total_cents = subtotal_cents.checked_add(service_fee_cents)?;

        Some(Self {
            days,
            subtotal_cents,
            service_fee_cents,
            total_cents,
            currency: vehicle.currency.clone(),
        })
    }
}

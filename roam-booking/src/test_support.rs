use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use roam_core::ManualClock;
use roam_shared::{Booking, BookingStatus, DateRange, Masked, Vehicle, VehicleSnapshot};

use crate::webhook::{SignatureVerifier, VerifiedPaymentEvent};

pub fn date_range(start: &str, end: &str) -> DateRange {
    DateRange::new(start.parse().unwrap(), end.parse().unwrap()).unwrap()
}

pub fn instant(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

pub fn vehicle(price_per_day_cents: i64) -> Vehicle {
    Vehicle {
        id: Uuid::new_v4(),
        host_id: "host-1".to_string(),
        price_per_day_cents,
        currency: "USD".to_string(),
        active: true,
    }
}

pub fn booking_on(vehicle_id: Uuid, start: &str, end: &str, status: BookingStatus) -> Booking {
    let range = date_range(start, end);
    let now = Utc::now();
    Booking {
        id: Uuid::new_v4(),
        vehicle_id,
        vehicle: VehicleSnapshot {
            host_id: "host-1".to_string(),
            price_per_day_cents: 4500,
            currency: "USD".to_string(),
        },
        renter_id: format!("renter-{}", Uuid::new_v4().simple()),
        start_date: range.start,
        end_date: range.end,
        total_cents: range.days() * 4500,
        status,
        idempotency_key: Uuid::new_v4().to_string(),
        payment_authorization_id: None,
        version: 1,
        created_at: now,
        updated_at: now,
    }
}

/// A webhook event that went through real signing and verification.
pub fn signed_event(
    event_type: &str,
    authorization_id: &str,
    booking_id: Option<Uuid>,
    amount_cents: Option<i64>,
) -> VerifiedPaymentEvent {
    let clock = Arc::new(ManualClock::new(instant("2024-07-01T00:00:00Z")));
    let verifier = SignatureVerifier::new(Masked::new("whsec_test".to_string()), Duration::from_secs(300), clock);

    let mut metadata = serde_json::Map::new();
    if let Some(id) = booking_id {
        metadata.insert("booking_id".to_string(), json!(id.to_string()));
    }
    let mut object = json!({"id": authorization_id, "status": "succeeded", "metadata": metadata});
    if let Some(amount) = amount_cents {
        object["amount"] = json!(amount);
    }
    let body = json!({
        "id": format!("evt_{}", Uuid::new_v4().simple()),
        "type": event_type,
        "data": {"object": object}
    })
    .to_string();

    let header = verifier.sign(instant("2024-07-01T00:00:00Z").timestamp(), body.as_bytes());
    verifier.verify(Some(&header), body.as_bytes()).unwrap()
}

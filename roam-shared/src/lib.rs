pub mod models;
pub mod pii;

pub use models::booking::{Booking, BookingStatus, DateRange, DateRangeError, NewBooking, VehicleSnapshot};
pub use models::vehicle::Vehicle;
pub use pii::Masked;

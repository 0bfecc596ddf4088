pub mod app_config;
pub mod database;
pub mod booking_repo;
pub mod vehicle_repo;
pub mod redis_repo;
pub mod memory;

pub use database::DbClient;
pub use booking_repo::PgBookingStore;
pub use vehicle_repo::PgVehicleCatalog;
pub use redis_repo::RedisClient;
pub use memory::{InMemoryBookingStore, InMemoryRateWindowStore, InMemoryVehicleCatalog};

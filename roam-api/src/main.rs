use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use roam_api::{app, state::build_reaper, worker::start_sweep_scheduler, AppState, Backends, SweepTrigger};
use roam_booking::SandboxPaymentGateway;
use roam_core::{Clock, SystemClock};
use roam_shared::Vehicle;
use roam_store::app_config::{Config, StorageBackend};
use roam_store::{
    DbClient, InMemoryBookingStore, InMemoryRateWindowStore, InMemoryVehicleCatalog, PgBookingStore,
    PgVehicleCatalog, RedisClient,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roam_api=debug,roam_booking=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Roam API on port {}", config.server.port);

    let backends = connect_backends(&config).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Sweep scheduler
    let sweeps = SweepTrigger::new();
    let reaper = Arc::new(build_reaper(&config, &backends, clock.clone()));
    tokio::spawn(start_sweep_scheduler(
        reaper,
        sweeps.clone(),
        config.reaper.interval(),
        config.reaper.max_age(),
    ));

    let app_state = AppState::build(&config, &backends, clock, sweeps);
    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

async fn connect_backends(config: &Config) -> anyhow::Result<Backends> {
    let gateway = Arc::new(SandboxPaymentGateway::new());

    match config.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            let vehicles = Arc::new(InMemoryVehicleCatalog::new());
            for seed in &config.storage.seed_vehicles {
                vehicles
                    .insert(Vehicle {
                        id: seed.id,
                        host_id: seed.host_id.clone(),
                        price_per_day_cents: seed.price_per_day_cents,
                        currency: seed.currency.clone(),
                        active: true,
                    })
                    .await;
            }
            tracing::info!("Seeded {} vehicles", config.storage.seed_vehicles.len());

            Ok(Backends {
                bookings: Arc::new(InMemoryBookingStore::new()),
                vehicles,
                rate_windows: Arc::new(InMemoryRateWindowStore::new()),
                gateway,
            })
        }
        StorageBackend::Postgres => {
            // Database Connection
            let db = DbClient::new(&config.database.url, config.database.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;

            // Redis Connection
            let redis = RedisClient::new(&config.redis.url)
                .await
                .context("Failed to create Redis client")?;
            if let Err(e) = redis.ping().await {
                // Rate limiting fails open, so a cold Redis is not fatal.
                tracing::warn!("Redis not reachable at startup: {}", e);
            }

            Ok(Backends {
                bookings: Arc::new(PgBookingStore::new(db.pool.clone())),
                vehicles: Arc::new(PgVehicleCatalog::new(db.pool.clone())),
                rate_windows: Arc::new(redis),
                gateway,
            })
        }
    }
}

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info};
use roam_booking::StaleReservationReaper;

/// Wakes the sweep scheduler outside its regular interval.
#[derive(Clone, Default)]
pub struct SweepTrigger {
    notify: Arc<Notify>,
}

impl SweepTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        // Stores a permit if the scheduler is mid-sweep, so the request is not lost.
        self.notify.notify_one();
    }

    async fn requested(&self) {
        self.notify.notified().await;
    }
}

pub async fn start_sweep_scheduler(
    reaper: Arc<StaleReservationReaper>,
    trigger: SweepTrigger,
    every: Duration,
    max_age: Duration,
) {
    let every = every.max(Duration::from_secs(1));
    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Sweep scheduler started: every {:?}, max age {:?}", every, max_age);

    loop {
        tokio::select! {
            _ = ticker.tick() => info!("Running scheduled sweep"),
            _ = trigger.requested() => info!("Running on-demand sweep"),
        }

        match reaper.sweep(max_age).await {
            Ok(expired) => info!("Sweep finished, {} bookings expired", expired),
            Err(e) => error!("Sweep failed: {}", e),
        }
    }
}

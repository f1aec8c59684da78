//! Client liveness tracking.
//!
//! The UI pings `/_/heartbeat` every few seconds. A single background task
//! samples the time since the last ping on a fixed tick and, once it exceeds
//! the timeout, requests shutdown through the shared [`Shutdown`] handle and
//! exits. The inhibit flag suspends that check entirely.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::lifecycle::Shutdown;

pub struct Heartbeat {
    last_beat: Mutex<Instant>,
    inhibit: AtomicBool,
    timeout: Duration,
    tick: Duration,
}

impl Heartbeat {
    pub fn new(timeout: Duration, tick: Duration) -> Self {
        Self {
            last_beat: Mutex::new(Instant::now()),
            inhibit: AtomicBool::new(false),
            timeout,
            tick,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// Record a liveness signal.
    pub fn beat(&self) {
        let now = Instant::now();
        *self.last_beat.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn elapsed(&self) -> Duration {
        let last = *self.last_beat.lock().unwrap_or_else(PoisonError::into_inner);
        last.elapsed()
    }

    pub fn is_inhibited(&self) -> bool {
        self.inhibit.load(Ordering::SeqCst)
    }

    /// Toggle the inhibit flag. Clearing it restarts the countdown from now.
    pub fn set_inhibit(&self, on: bool) {
        if on {
            self.inhibit.store(true, Ordering::SeqCst);
            info!("heartbeat timeout inhibited");
            return;
        }
        // Reset before clearing so the monitor never sees a stale deadline.
        self.beat();
        if self.inhibit.swap(false, Ordering::SeqCst) {
            info!("heartbeat timeout resumed");
        }
    }

    pub fn is_expired(&self) -> bool {
        !self.is_inhibited() && self.elapsed() > self.timeout
    }

    /// Run the periodic evaluator until shutdown starts or the timeout fires.
    pub async fn monitor(self: Arc<Self>, shutdown: Shutdown) {
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        debug!(
            timeout_secs = self.timeout.as_secs_f64(),
            tick_secs = self.tick.as_secs_f64(),
            "heartbeat monitor started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("heartbeat monitor stopping");
                    return;
                }
                _ = ticker.tick() => {
                    if self.is_expired() {
                        warn!(
                            timeout_secs = self.timeout.as_secs(),
                            "no heartbeat within timeout, shutting down server"
                        );
                        shutdown.request("heartbeat timeout");
                        return;
                    }
                }
            }
        }
    }
}

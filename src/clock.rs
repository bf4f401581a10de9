//! Tick source with standby detection.
//!
//! The clock task ticks once a second and measures the gap since the
//! previous tick with a monotonic instant. A gap noticeably longer than the
//! tick interval means the process was not scheduled for that long, which is
//! used as a proxy for "host was suspended / came back from standby". The
//! consumer compares the reported gap against [`IDLE_TOLERANCE`].

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Interval between ticks.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Tick gap beyond which the node is considered to have been suspended.
pub const IDLE_TOLERANCE: Duration = Duration::from_secs(5);

/// Capacity of the clock event channel. Ticks are droppable when the
/// consumer lags; missed-tick signals are not.
const EVENT_CHANNEL_CAPACITY: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockEvent {
    /// An ordinary tick fired on schedule.
    Tick,
    /// Ticks were missed; `gap` is how far behind schedule the tick fired.
    MissedTicks { gap: Duration },
}

/// Handle for the background ticker task.
pub struct Clock {
    task: JoinHandle<()>,
}

impl Clock {
    /// Spawn the system ticker. Events arrive on the returned receiver;
    /// dropping the receiver stops the task on its next tick.
    pub fn spawn() -> (Self, mpsc::Receiver<ClockEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let task = tokio::spawn(run_ticker(tx));
        (Self { task }, rx)
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for Clock {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_ticker(tx: mpsc::Sender<ClockEvent>) {
    let mut interval = tokio::time::interval(TICK_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
    // The first tick completes immediately; use it to initialize the baseline.
    interval.tick().await;
    let mut last_tick = Instant::now();

    loop {
        interval.tick().await;
        let now = Instant::now();
        let gap = now.saturating_duration_since(last_tick);
        last_tick = now;

        let missed = gap.saturating_sub(TICK_INTERVAL);
        if missed > Duration::ZERO {
            warn!(gap_ms = gap.as_millis() as u64, "tick arrived late");
            if tx.send(ClockEvent::MissedTicks { gap: missed }).await.is_err() {
                break;
            }
        } else if tx.try_send(ClockEvent::Tick).is_err() {
            // Full channel: drop the tick. A closed channel ends the task.
            if tx.is_closed() {
                debug!("clock receiver dropped, ticker exiting");
                break;
            }
        }
    }
}

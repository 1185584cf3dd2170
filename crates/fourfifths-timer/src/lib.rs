//! Owned, cancelable timers for fourfifths rooms.
//!
//! Rooms need two kinds of timers: the readiness countdown (periodic, a few
//! ticks, cancelable) and the pause between rounds (one-shot). Timer tasks
//! never touch room state. They only report firings as [`TimerFired`]
//! messages tagged with the owner key (a room id) and the [`TimerId`] of the
//! handle that scheduled them; whoever owns the rooms drains the receiver
//! and decides whether the firing is still relevant.
//!
//! # Ownership
//!
//! Scheduling returns a [`TimerHandle`]. Dropping the handle aborts the
//! task, so a room cancels a timer simply by replacing the state that holds
//! it. A firing can still be in the channel when its handle is dropped, so
//! the receiver must compare `fired.timer` with the handle it currently
//! owns before acting on it.
//!
//! ```ignore
//! let (timers, mut fired_rx) = TimerService::new();
//! let handle = timers.every(room_id.clone(), Duration::from_secs(1));
//! while let Some(fired) = fired_rx.recv().await {
//!     registry.handle_timer(fired);
//! }
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::{self, Instant};
use tracing::{trace, warn};

// ---------------------------------------------------------------------------
// Identity and firings
// ---------------------------------------------------------------------------

/// Unique id of one scheduled timer. Never reused within a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

impl TimerId {
    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// A timer went off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerFired<K> {
    /// Key of whatever scheduled the timer (a room id in practice).
    pub owner: K,
    /// Which timer fired.
    pub timer: TimerId,
    /// 1 for the first firing; periodic timers count up from there.
    pub tick: u64,
}

/// Receiving end of a [`TimerService`].
pub type TimerReceiver<K> = mpsc::UnboundedReceiver<TimerFired<K>>;

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Owned handle to a running timer. Dropping it cancels the timer.
pub struct TimerHandle {
    id: TimerId,
    abort: AbortHandle,
}

impl TimerHandle {
    /// The id carried by this timer's firings.
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Returns `true` if `fired` was produced by this timer.
    pub fn owns<K>(&self, fired: &TimerFired<K>) -> bool {
        fired.timer == self.id
    }

    /// Cancels the timer. Equivalent to dropping the handle.
    pub fn cancel(self) {}
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.abort.abort();
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle").field("id", &self.id).finish()
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Schedules timers whose firings are delivered through one channel.
///
/// Cheap to clone; clones share the id counter and the channel. Scheduling
/// spawns a Tokio task, so it must be called from within a runtime.
pub struct TimerService<K> {
    tx: mpsc::UnboundedSender<TimerFired<K>>,
    next_id: Arc<AtomicU64>,
}

impl<K> Clone for TimerService<K> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<K> TimerService<K>
where
    K: Clone + fmt::Display + Send + 'static,
{
    /// Creates a service and the receiver its firings arrive on.
    pub fn new() -> (Self, TimerReceiver<K>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let service = Self {
            tx,
            next_id: Arc::new(AtomicU64::new(1)),
        };
        (service, rx)
    }

    /// Fires every `period`, starting one period from now, until the
    /// handle is dropped.
    pub fn every(&self, owner: K, period: Duration) -> TimerHandle {
        let id = self.next_id();
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            let mut ticker = Ticker::new(period);
            loop {
                let info = ticker.wait().await;
                trace!(%owner, timer = %id, tick = info.tick, "periodic timer fired");
                let fired = TimerFired {
                    owner: owner.clone(),
                    timer: id,
                    tick: info.tick,
                };
                if tx.send(fired).is_err() {
                    break;
                }
            }
        });
        TimerHandle {
            id,
            abort: task.abort_handle(),
        }
    }

    /// Fires once after `delay`.
    pub fn after(&self, owner: K, delay: Duration) -> TimerHandle {
        let id = self.next_id();
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            time::sleep(delay).await;
            trace!(%owner, timer = %id, "one-shot timer fired");
            let _ = tx.send(TimerFired {
                owner,
                timer: id,
                tick: 1,
            });
        });
        TimerHandle {
            id,
            abort: task.abort_handle(),
        }
    }

    fn next_id(&self) -> TimerId {
        TimerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

// ---------------------------------------------------------------------------
// Ticker
// ---------------------------------------------------------------------------

/// Information about one tick, returned by [`Ticker::wait`].
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Monotonically increasing tick number (starts at 1).
    pub tick: u64,
    /// `true` if this tick fired more than 10% of a period late.
    pub overrun: bool,
    /// Whole periods skipped because of the overrun (0 normally).
    pub ticks_skipped: u64,
}

/// Fixed-period ticker on Tokio's clock.
///
/// A late tick is reported once and the next deadline is scheduled from
/// the moment it fired, so a stalled runtime never produces a burst of
/// back-to-back ticks.
pub struct Ticker {
    period: Duration,
    next_tick: Instant,
    tick_count: u64,
}

impl Ticker {
    /// Creates a ticker whose first tick is one `period` from now.
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next_tick: Instant::now() + period,
            tick_count: 0,
        }
    }

    /// Waits until the next tick is due.
    pub async fn wait(&mut self) -> TickInfo {
        let due = self.next_tick;
        time::sleep_until(due).await;

        let now = Instant::now();
        self.tick_count += 1;

        let late_by = now.saturating_duration_since(due);
        let overrun = late_by > self.period / 10;
        let mut ticks_skipped = 0u64;

        self.next_tick = if overrun {
            let period_ns = self.period.as_nanos().max(1);
            ticks_skipped = (late_by.as_nanos() / period_ns) as u64;
            warn!(
                tick = self.tick_count,
                skipped = ticks_skipped,
                late_ms = late_by.as_secs_f64() * 1000.0,
                "timer overrun, skipping ahead"
            );
            now + self.period
        } else {
            due + self.period
        };

        TickInfo {
            tick: self.tick_count,
            overrun,
            ticks_skipped,
        }
    }

    /// Ticks fired so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// The fixed period.
    pub fn period(&self) -> Duration {
        self.period
    }
}

//! Integration tests for the ticker and the timer service.
//!
//! Uses `start_paused = true` so Tokio's clock only moves when every task
//! is idle; sleeps then resolve instantly and deterministically.

use std::time::Duration;

use fourfifths_timer::{Ticker, TimerService};
use tokio::time::{timeout, Instant};

const SECOND: Duration = Duration::from_secs(1);

// =========================================================================
// Ticker
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_ticker_fires_after_one_period() {
    let start = Instant::now();
    let mut ticker = Ticker::new(SECOND);

    let info = ticker.wait().await;
    assert_eq!(info.tick, 1);
    assert!(!info.overrun);
    assert_eq!(info.ticks_skipped, 0);
    assert_eq!(start.elapsed(), SECOND);
}

#[tokio::test(start_paused = true)]
async fn test_ticker_counts_monotonically() {
    let mut ticker = Ticker::new(Duration::from_millis(50));
    for expected in 1..=5 {
        assert_eq!(ticker.wait().await.tick, expected);
    }
    assert_eq!(ticker.tick_count(), 5);
    assert_eq!(ticker.period(), Duration::from_millis(50));
}

#[tokio::test(start_paused = true)]
async fn test_ticker_does_not_drift() {
    let start = Instant::now();
    let mut ticker = Ticker::new(SECOND);
    for _ in 0..5 {
        ticker.wait().await;
    }
    assert_eq!(start.elapsed(), 5 * SECOND);
}

#[tokio::test(start_paused = true)]
async fn test_ticker_reports_overrun_and_skips_ahead() {
    let mut ticker = Ticker::new(SECOND);

    // Stall for 3.5 periods before polling the first tick.
    tokio::time::advance(Duration::from_millis(3_500)).await;
    let info = ticker.wait().await;
    assert!(info.overrun);
    assert_eq!(info.ticks_skipped, 2);

    // The next tick is one full period after the late one, not a burst.
    let before = Instant::now();
    let info = ticker.wait().await;
    assert!(!info.overrun);
    assert_eq!(info.tick, 2);
    assert_eq!(before.elapsed(), SECOND);
}

// =========================================================================
// TimerService::every
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_every_fires_with_increasing_ticks() {
    let (timers, mut rx) = TimerService::<String>::new();
    let handle = timers.every("R1".to_string(), SECOND);

    for expected in 1..=3 {
        let fired = rx.recv().await.expect("timer should fire");
        assert_eq!(fired.owner, "R1");
        assert_eq!(fired.timer, handle.id());
        assert_eq!(fired.tick, expected);
        assert!(handle.owns(&fired));
    }
}

#[tokio::test(start_paused = true)]
async fn test_dropping_periodic_handle_stops_firings() {
    let (timers, mut rx) = TimerService::<String>::new();
    let handle = timers.every("R1".to_string(), SECOND);

    rx.recv().await.expect("first tick");
    drop(handle);

    let next = timeout(Duration::from_secs(10), rx.recv()).await;
    assert!(next.is_err(), "cancelled timer must stay silent");
}

// =========================================================================
// TimerService::after
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_after_fires_once_after_delay() {
    let (timers, mut rx) = TimerService::<String>::new();
    let start = Instant::now();
    let _handle = timers.after("R2".to_string(), Duration::from_secs(10));

    let fired = rx.recv().await.expect("one-shot should fire");
    assert_eq!(fired.owner, "R2");
    assert_eq!(fired.tick, 1);
    assert_eq!(start.elapsed(), Duration::from_secs(10));

    let again = timeout(Duration::from_secs(60), rx.recv()).await;
    assert!(again.is_err(), "one-shot fires exactly once");
}

#[tokio::test(start_paused = true)]
async fn test_cancel_before_deadline_suppresses_firing() {
    let (timers, mut rx) = TimerService::<String>::new();
    let handle = timers.after("R3".to_string(), Duration::from_secs(10));

    tokio::time::advance(Duration::from_secs(5)).await;
    handle.cancel();

    let fired = timeout(Duration::from_secs(30), rx.recv()).await;
    assert!(fired.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_timer_ids_are_unique_across_clones() {
    let (timers, _rx) = TimerService::<String>::new();
    let other = timers.clone();

    let a = timers.after("R".to_string(), SECOND);
    let b = other.after("R".to_string(), SECOND);
    let c = timers.every("R".to_string(), SECOND);

    assert_ne!(a.id(), b.id());
    assert_ne!(b.id(), c.id());
    assert_ne!(a.id(), c.id());
}

#[tokio::test(start_paused = true)]
async fn test_firing_from_other_timer_is_not_owned() {
    let (timers, mut rx) = TimerService::<String>::new();
    let first = timers.after("R".to_string(), SECOND);
    let second = timers.after("R".to_string(), 2 * SECOND);

    let fired = rx.recv().await.unwrap();
    assert!(first.owns(&fired));
    assert!(!second.owns(&fired));
}

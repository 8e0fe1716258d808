//! Timer-driven helpers shared by the cluster checks and the fault scheduler.
//!
//! Both helpers sleep on the tokio timer between evaluations and never spin,
//! so they behave the same on a paused test clock.

use std::{future::Future, time::Duration};

use tokio::time::Instant;

/// Poll `condition` every `poll_interval` until it returns `true` or
/// `timeout` elapses.
///
/// The condition is always evaluated at least once, and once more at the
/// deadline. Returns the elapsed time on success and `Err(elapsed)` on
/// timeout.
///
/// # Example
///
/// ```ignore
/// use bft_chaos::testing::wait_for;
/// use std::time::Duration;
///
/// wait_for(
///     || cluster.node("ptr_0").map_or(false, |n| n.height() >= 5),
///     Duration::from_secs(60),
///     Duration::from_secs(1),
/// )
/// .await
/// .expect("ptr_0 should reach height 5");
/// ```
pub async fn wait_for<F>(
    mut condition: F,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<Duration, Duration>
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    let deadline = start + timeout;
    loop {
        if condition() {
            return Ok(start.elapsed());
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(start.elapsed());
        }
        tokio::time::sleep_until((now + poll_interval).min(deadline)).await;
    }
}

/// Run `f` every `tick` until `duration` has elapsed, then return.
///
/// `f` receives the time elapsed since the first call. Ticks missed because
/// `f` ran long are skipped rather than bunched up.
pub async fn execute_every<F, Fut>(tick: Duration, duration: Duration, mut f: F)
where
    F: FnMut(Duration) -> Fut,
    Fut: Future<Output = ()>,
{
    let start = Instant::now();
    let mut interval = tokio::time::interval_at(start + tick, tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let elapsed = start.elapsed();
        if elapsed > duration {
            return;
        }
        f(elapsed).await;
    }
}

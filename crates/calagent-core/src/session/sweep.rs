//! Recurring token expiry sweep.
//!
//! The sweep only pre-empts round trips with a stale token; a 401 from the
//! backend stays the authority on validity.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// What the sweep should do after a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    Continue,
    Stop,
}

/// Spawns a task that runs `check` every `interval` until it returns
/// [`SweepOutcome::Stop`] or `cancel` fires.
///
/// The first check runs one full interval after spawning.
pub fn spawn_sweep<F>(interval: Duration, cancel: CancellationToken, mut check: F) -> JoinHandle<()>
where
    F: FnMut() -> SweepOutcome + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if check() == SweepOutcome::Stop {
                        break;
                    }
                }
            }
        }
        tracing::trace!("expiry sweep stopped");
    })
}

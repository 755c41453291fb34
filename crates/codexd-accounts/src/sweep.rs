//! Background refresh sweep for near-expiry accounts.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::lifecycle;
use crate::refresh::Refresher;
use crate::store::Store;
use crate::clock;

const SWEEP_BASE: Duration = Duration::from_secs(15 * 60);
const SWEEP_JITTER: i64 = 3 * 60;
const SWEEP_FLOOR: Duration = Duration::from_secs(60);

/// Spawn the periodic sweep. Abort the returned handle on shutdown.
pub fn spawn(store: Arc<Store>, refresher: Arc<Refresher>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(next_interval()).await;
            run_once(&store, &refresher).await;
        }
    })
}

/// Base interval with uniform jitter, clamped to the floor.
fn next_interval() -> Duration {
    let jitter = rand::rng().random_range(-SWEEP_JITTER..=SWEEP_JITTER);
    let secs = (SWEEP_BASE.as_secs() as i64 + jitter).max(SWEEP_FLOOR.as_secs() as i64);
    Duration::from_secs(secs as u64)
}

/// One pass: refresh every enabled account close to expiry. Individual
/// failures are absorbed; the next tick retries.
pub async fn run_once(store: &Store, refresher: &Refresher) {
    let now = clock::now_ts();
    let due: Vec<String> = store
        .read_accounts()
        .await
        .into_iter()
        .filter(|a| {
            !a.disabled
                && a.refresh_token().is_some()
                && lifecycle::is_near_expiry(a, now, lifecycle::NEAR_EXPIRY_WINDOW)
        })
        .map(|a| a.id)
        .collect();

    if due.is_empty() {
        return;
    }
    debug!(count = due.len(), "sweep refreshing near-expiry accounts");
    for id in due {
        if let Err(err) = refresher.refresh(&id).await {
            debug!(account = %id, %err, "sweep refresh failed");
        }
    }
}

//! Retention sweeper
//!
//! Periodically purges task records whose retention window has ended. Reads
//! already hide expired records; the sweeper only reclaims their storage.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

use crate::store::StateStore;

/// Starts a background task that purges expired task records every `interval`
pub fn spawn_sweeper(states: Arc<dyn StateStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            debug!("Sweeping expired task records");

            match states.purge_expired(Utc::now()).await {
                Ok(0) => {}
                Ok(removed) => info!("Removed {} expired task record(s)", removed),
                Err(e) => warn!("Failed to purge expired task records: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStateStore;
    use probe_core::domain::job::{JobHandle, JobKind};
    use probe_core::domain::task::{StateUpdate, TaskRecord};

    #[tokio::test]
    async fn test_sweeper_purges_expired_records() {
        let states = Arc::new(InMemoryStateStore::new(chrono::Duration::zero()));
        let handle = JobHandle::new();
        states
            .insert(TaskRecord::pending(handle, JobKind::ApiCase, 1))
            .await
            .unwrap();
        states.apply(handle, StateUpdate::Cancelled).await.unwrap();

        let sweeper = spawn_sweeper(states.clone(), Duration::from_millis(50));
        time::sleep(Duration::from_millis(300)).await;
        sweeper.abort();

        assert_eq!(states.len().await, 0);
    }
}

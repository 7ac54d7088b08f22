//! Periodic policy reload.
//!
//! Bounds how stale a replica's evaluator cache can get: writes made through
//! other instances become visible within one interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use gatekeep_infra::PolicyEvaluator;

/// Background reload task; aborted when dropped.
#[derive(Debug)]
pub struct ReloadHandle {
    task: JoinHandle<()>,
}

impl ReloadHandle {
    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ReloadHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawn a task reloading `evaluator` every `interval`. Must be called from
/// within a tokio runtime. Failed reloads are logged and retried on the next
/// tick.
pub fn spawn_auto_reload(evaluator: Arc<dyn PolicyEvaluator>, interval: Duration) -> ReloadHandle {
    let period = interval.max(Duration::from_millis(1));
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match evaluator.reload().await {
                Ok(()) => debug!("policy auto-reload complete"),
                Err(error) => warn!(%error, "policy auto-reload failed"),
            }
        }
    });
    ReloadHandle { task }
}

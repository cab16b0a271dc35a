use crate::monitor::{JourneyMonitor, JourneyView};
use raillink_shared::LiveEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

/// Drives a `JourneyMonitor` from the live feed plus an animation ticker.
/// Exactly one background task exists per animator; stopping (or dropping)
/// aborts it, and starting a replacement is how tracking restarts.
pub struct TrainAnimator {
    monitor: Arc<RwLock<JourneyMonitor>>,
    task: Option<JoinHandle<()>>,
}

impl TrainAnimator {
    pub fn start(
        monitor: JourneyMonitor,
        events: broadcast::Receiver<LiveEvent>,
        tick_interval: Duration,
    ) -> Self {
        let monitor = Arc::new(RwLock::new(monitor));
        let task = tokio::spawn(run(monitor.clone(), events, tick_interval));
        Self {
            monitor,
            task: Some(task),
        }
    }

    pub async fn view(&self) -> JourneyView {
        self.monitor.read().await.view()
    }

    pub fn monitor(&self) -> Arc<RwLock<JourneyMonitor>> {
        self.monitor.clone()
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for TrainAnimator {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(
    monitor: Arc<RwLock<JourneyMonitor>>,
    mut events: broadcast::Receiver<LiveEvent>,
    tick_interval: Duration,
) {
    let mut ticker = tokio::time::interval(tick_interval);
    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(LiveEvent::TrainPosition(event)) => {
                    monitor.write().await.apply_position(&event);
                }
                Ok(LiveEvent::CoachPosition(event)) => {
                    monitor.write().await.apply_coach(event);
                }
                // Deviation alerts belong to the alert center, not the map.
                Ok(LiveEvent::RouteDeviation(_)) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Live feed lagged, {} events skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = ticker.tick() => {
                monitor.write().await.tick();
            }
        }
    }
}

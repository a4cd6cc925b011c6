use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::events::SyncEvent;

/// Whether the client is currently being looked at. Polled on every tick.
pub trait Visibility: Send + Sync {
    fn is_visible(&self) -> bool;
}

/// Visibility flag flipped by the UI (terminal focus in the binary).
#[derive(Debug, Clone)]
pub struct VisibilityFlag(Arc<AtomicBool>);

impl VisibilityFlag {
    pub fn new(visible: bool) -> Self {
        Self(Arc::new(AtomicBool::new(visible)))
    }

    pub fn set(&self, visible: bool) {
        self.0.store(visible, Ordering::Relaxed);
    }
}

impl Visibility for VisibilityFlag {
    fn is_visible(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Emits [`SyncEvent::Tick`] every `interval` while the client is visible.
///
/// Manual refreshes go straight to the session and never touch the timer.
pub struct SyncScheduler {
    interval: Duration,
    visibility: Arc<dyn Visibility>,
}

impl SyncScheduler {
    pub fn new(interval: Duration, visibility: Arc<dyn Visibility>) -> Self {
        Self {
            interval,
            visibility,
        }
    }

    pub fn should_refresh(&self) -> bool {
        self.visibility.is_visible()
    }

    /// Runs until the event receiver is dropped.
    pub fn spawn(self, events: mpsc::UnboundedSender<SyncEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; startup loads are issued separately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !self.should_refresh() {
                    crate::debug_log!("scheduler: Skipping tick, client hidden");
                    continue;
                }
                if events.send(SyncEvent::Tick).is_err() {
                    break;
                }
            }
        })
    }
}

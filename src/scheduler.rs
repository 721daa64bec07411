use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::time::{Instant, sleep_until};
use tracing::debug;

use crate::config::BlurConfig;
use crate::engine::BlurEngine;

/// Change notifications the host wires into the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeEvent {
    /// Nodes were inserted or removed somewhere in the tree.
    Mutation,
    /// A tracked attribute (class, style, played state) changed.
    Attribute,
    /// The viewport scrolled.
    Scroll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Idle,
    ScanPending,
}

/// Drives scans off change notifications without ever blocking the notifier.
///
/// Mutation and attribute events share one frame-aligned deadline: the first
/// event while idle arms it, later events coalesce into the same scan. Scroll
/// events get a separate trailing quiet-period so continuous scrolling
/// produces one scan at the end instead of a storm.
pub struct Reconciler {
    engine: Arc<Mutex<BlurEngine>>,
    events: mpsc::UnboundedReceiver<ChangeEvent>,
    frame_interval: Duration,
    scroll_debounce: Duration,
    startup_delay: Duration,
}

impl Reconciler {
    pub fn new(
        engine: Arc<Mutex<BlurEngine>>,
        events: mpsc::UnboundedReceiver<ChangeEvent>,
        config: &BlurConfig,
    ) -> Self {
        Self {
            engine,
            events,
            frame_interval: config.frame_interval(),
            scroll_debounce: config.scroll_debounce(),
            startup_delay: config.startup_delay(),
        }
    }

    /// Run until the event channel closes. The first scan waits out the
    /// startup delay so the host's initial paint settles.
    pub async fn run(mut self) {
        tokio::time::sleep(self.startup_delay).await;
        self.scan().await;

        let mut state = ScanState::Idle;
        let mut frame_deadline: Option<Instant> = None;
        let mut scroll_deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                event = self.events.recv() => {
                    match event {
                        None => break,
                        Some(ChangeEvent::Scroll) => {
                            // Trailing debounce: every scroll pushes the
                            // deadline out again.
                            scroll_deadline = Some(Instant::now() + self.scroll_debounce);
                        }
                        Some(_) => {
                            if state == ScanState::Idle {
                                state = ScanState::ScanPending;
                                frame_deadline = Some(Instant::now() + self.frame_interval);
                            }
                        }
                    }
                }
                _ = sleep_option(frame_deadline), if frame_deadline.is_some() => {
                    frame_deadline = None;
                    state = ScanState::Idle;
                    self.scan().await;
                }
                _ = sleep_option(scroll_deadline), if scroll_deadline.is_some() => {
                    scroll_deadline = None;
                    self.scan().await;
                }
            }
        }
    }

    async fn scan(&self) {
        let summary = self.engine.lock().await.scan().await;
        debug!(?summary, "reconciliation pass complete");
    }
}

async fn sleep_option(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

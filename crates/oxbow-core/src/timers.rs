// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background timer scheduler.
//!
//! Durable timers are bookmarks with a due time; nothing fires them by
//! itself. The scheduler polls the persistence backend on a fixed
//! interval and resumes whatever has come due, in batches, until a
//! shutdown is requested.

use crate::runtime::Engine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Timer scheduler settings.
#[derive(Debug, Clone)]
pub struct TimerSchedulerConfig {
    /// How often to scan for due timers.
    pub poll_interval: Duration,
    /// Maximum due timers resumed per scan.
    pub batch_size: u32,
}

impl Default for TimerSchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            batch_size: 32,
        }
    }
}

/// Handle to the background scan task.
///
/// Dropping the handle detaches the task; call [`TimerScheduler::shutdown`]
/// for an orderly stop that waits for an in-flight scan to finish.
pub struct TimerScheduler {
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl TimerScheduler {
    /// Spawn the scan loop on the current tokio runtime.
    pub fn spawn(engine: Engine, config: TimerSchedulerConfig) -> Self {
        let shutdown = Arc::new(Notify::new());
        let notify = shutdown.clone();
        let handle = tokio::spawn(async move {
            info!(
                poll_ms = config.poll_interval.as_millis() as u64,
                batch = config.batch_size,
                "timer scheduler started"
            );
            loop {
                tokio::select! {
                    _ = notify.notified() => {
                        info!("timer scheduler stopping");
                        break;
                    }
                    _ = tokio::time::sleep(config.poll_interval) => {
                        match engine.fire_due_timers(config.batch_size).await {
                            Ok(0) => {}
                            Ok(fired) => debug!(fired, "resumed due timers"),
                            Err(err) => error!(error = %err, "timer scan failed"),
                        }
                    }
                }
            }
        });
        TimerScheduler { shutdown, handle }
    }

    /// A handle that can request shutdown from elsewhere, e.g. a signal
    /// handler.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Stop the scan loop and wait for the task to exit.
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        if let Err(err) = self.handle.await {
            error!(error = %err, "timer scheduler task panicked");
        }
    }
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use crate::timers::TimerSchedulerConfig;
use std::time::Duration;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// SQLite connection URL for the persistence backend.
    pub database_url: String,
    /// How often the timer scheduler scans for due timers.
    pub timer_poll_interval: Duration,
    /// Maximum due timers resumed per scan.
    pub timer_batch_size: u32,
    /// Node budget for a single scheduler tick.
    pub max_nodes_per_tick: usize,
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `OXBOW_DATABASE_URL`: SQLite connection string
    ///
    /// Optional (with defaults):
    /// - `OXBOW_TIMER_POLL_MS`: timer scan interval in milliseconds (default: 1000)
    /// - `OXBOW_TIMER_BATCH`: due timers resumed per scan (default: 32)
    /// - `OXBOW_MAX_NODES_PER_TICK`: per-tick node budget (default: 10000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("OXBOW_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("OXBOW_DATABASE_URL"))?;

        let poll_ms: u64 = std::env::var("OXBOW_TIMER_POLL_MS")
            .unwrap_or_else(|_| "1000".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("OXBOW_TIMER_POLL_MS", "must be a duration in milliseconds")
            })?;

        let timer_batch_size: u32 = std::env::var("OXBOW_TIMER_BATCH")
            .unwrap_or_else(|_| "32".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("OXBOW_TIMER_BATCH", "must be a positive integer"))?;

        let max_nodes_per_tick: usize = std::env::var("OXBOW_MAX_NODES_PER_TICK")
            .unwrap_or_else(|_| "10000".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("OXBOW_MAX_NODES_PER_TICK", "must be a positive integer")
            })?;

        Ok(Self {
            database_url,
            timer_poll_interval: Duration::from_millis(poll_ms),
            timer_batch_size,
            max_nodes_per_tick,
        })
    }

    /// Timer scheduler settings derived from this configuration.
    pub fn timer_scheduler_config(&self) -> TimerSchedulerConfig {
        TimerSchedulerConfig {
            poll_interval: self.timer_poll_interval,
            batch_size: self.timer_batch_size,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

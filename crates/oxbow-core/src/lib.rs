// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Durable workflow execution engine.
//!
//! Workflows are directed graphs of activities compiled by `oxbow-dsl`.
//! The engine executes an instance in ticks: each tick runs runnable
//! branches node by node until everything is waiting on the outside
//! world, then persists the whole instance. Waits are recorded as
//! bookmarks keyed by activity kind and correlation; an external trigger
//! or a due timer consumes its bookmark and the next tick picks up where
//! the instance left off. State lives entirely in storage, so a process
//! restart loses nothing.
//!
//! ```text
//!  triggers / signals          timer scan
//!          |                       |
//!          v                       v
//!   +-------------------------------------+
//!   |              Dispatcher             |
//!   |  lease -> load -> tick -> save      |
//!   +------------------+------------------+
//!          |           |
//!          v           v
//!    +-----------+  +-------------------+
//!    | Scheduler |  |    Persistence    |
//!    | run_tick  |  | memory / sqlite   |
//!    +-----+-----+  +-------------------+
//!          |
//!          v
//!    +-----------+
//!    | Activity  |
//!    | registry  |
//!    +-----------+
//! ```
//!
//! Entry points: build an [`Engine`] with [`Engine::builder`], register
//! activities and definitions, then [`Engine::start_instance`] and
//! [`Engine::deliver_trigger`]. Spawn a [`timers::TimerScheduler`] to
//! fire durable timers in the background.

#![deny(missing_docs)]

pub mod activity;
pub mod config;
mod dispatcher;
pub mod error;
mod forks;
pub mod instance;
pub mod persistence;
pub mod runtime;
mod scheduler;
pub mod timers;
pub mod variables;

pub use activity::{
    Activity, ActivityContext, ActivityError, ActivityExecution, ActivityRegistry, DynActivity,
    Suspension,
};
pub use config::{ConfigError, EngineConfig};
pub use error::{EngineError, Result};
pub use instance::{
    Bookmark, Branch, BranchState, InstanceSettings, InstanceStatus, WorkflowInstance,
};
pub use persistence::{
    BookmarkKey, InstanceSummary, ListInstancesFilter, MemoryPersistence, Persistence,
    SqlitePersistence,
};
pub use runtime::{Clock, Engine, EngineBuilder, ManualClock, SystemClock};
pub use timers::{TimerScheduler, TimerSchedulerConfig};
pub use variables::Variables;

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Engine assembly and the public facade.

use crate::activity::ActivityRegistry;
use crate::config::EngineConfig;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::instance::{InstanceSettings, WorkflowInstance};
use crate::persistence::{InstanceSummary, ListInstancesFilter, Persistence};
use anyhow::bail;
use chrono::{DateTime, Duration, Utc};
use oxbow_dsl::WorkflowDefinition;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Source of the current time.
///
/// The engine never calls `Utc::now()` directly; everything that needs a
/// timestamp goes through the clock, so tests can drive timers and
/// suspensions deterministically.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        ManualClock {
            now: RwLock::new(start),
        }
    }

    /// Jump to an absolute instant.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write().expect("clock lock poisoned") = now;
    }

    /// Move forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.write().expect("clock lock poisoned");
        *now += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().expect("clock lock poisoned")
    }
}

impl fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualClock").field("now", &self.now()).finish()
    }
}

/// Builder for [`Engine`].
///
/// Persistence is the only required piece; activities, definitions,
/// settings and the clock all have workable defaults.
#[derive(Default)]
pub struct EngineBuilder {
    persistence: Option<Arc<dyn Persistence>>,
    registry: ActivityRegistry,
    definitions: HashMap<String, Arc<WorkflowDefinition>>,
    settings: InstanceSettings,
    clock: Option<Arc<dyn Clock>>,
}

impl EngineBuilder {
    /// Set the persistence backend (required).
    pub fn persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Set the activity registry.
    pub fn activities(mut self, registry: ActivityRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Register a workflow definition. Definition IDs must be unique;
    /// a duplicate fails the build.
    pub fn definition(mut self, definition: WorkflowDefinition) -> Self {
        self.definitions
            .insert(definition.id().to_string(), Arc::new(definition));
        self
    }

    /// Default settings applied to new instances.
    pub fn settings(mut self, settings: InstanceSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Override the clock. Tests pass a [`ManualClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Apply engine-wide values from loaded configuration.
    pub fn config(mut self, config: &EngineConfig) -> Self {
        self.settings.max_nodes_per_tick = config.max_nodes_per_tick;
        self
    }

    /// Assemble the engine.
    pub fn build(self) -> anyhow::Result<Engine> {
        let Some(persistence) = self.persistence else {
            bail!("persistence is required");
        };

        // Every referenced activity kind must be resolvable at dispatch
        // time; catching it here beats faulting instances later.
        for definition in self.definitions.values() {
            for node in definition.nodes() {
                if let oxbow_dsl::NodeDef::Activity(activity) = node {
                    if self.registry.get(&activity.kind).is_none() {
                        bail!(
                            "definition '{}' references unregistered activity kind '{}'",
                            definition.id(),
                            activity.kind
                        );
                    }
                }
            }
        }

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let dispatcher = Arc::new(Dispatcher::new(
            persistence,
            self.registry,
            self.definitions,
            self.settings,
            clock,
        ));
        Ok(Engine { dispatcher })
    }
}

impl fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("persistence", &self.persistence.as_ref().map(|_| "..."))
            .field("activities", &self.registry.kinds())
            .field("definitions", &self.definitions.keys())
            .finish()
    }
}

/// The workflow engine.
///
/// Cheap to clone; clones share the dispatcher, so per-instance
/// serialization holds across every handle in the process.
#[derive(Clone)]
pub struct Engine {
    dispatcher: Arc<Dispatcher>,
}

impl Engine {
    /// Start building an engine.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Create an instance of a registered definition and run it until it
    /// suspends or finishes. Returns the new instance's ID.
    pub async fn start_instance(&self, definition_id: &str) -> Result<Uuid> {
        self.dispatcher.start_instance(definition_id, None).await
    }

    /// Deliver an external trigger: resume every matching bookmark and
    /// start every definition whose entry trigger matches. Returns the
    /// instances touched.
    pub async fn deliver_trigger(
        &self,
        activity_kind: &str,
        correlation: &str,
        payload: Value,
    ) -> Result<Vec<Uuid>> {
        self.dispatcher
            .deliver_trigger(activity_kind, correlation, payload)
            .await
    }

    /// Deliver a named signal. Shorthand for a `ReceiveSignal` trigger.
    pub async fn signal(&self, name: &str, payload: Value) -> Result<Vec<Uuid>> {
        self.deliver_trigger("ReceiveSignal", name, payload).await
    }

    /// Cancel a non-terminal instance.
    pub async fn cancel_instance(&self, instance_id: Uuid) -> Result<()> {
        self.dispatcher.cancel_instance(instance_id).await
    }

    /// Load an instance's current persisted state.
    pub async fn instance(&self, instance_id: Uuid) -> Result<WorkflowInstance> {
        self.dispatcher
            .persistence()
            .load_instance(instance_id)
            .await
    }

    /// List instances matching a filter.
    pub async fn list_instances(&self, filter: ListInstancesFilter) -> Result<Vec<InstanceSummary>> {
        self.dispatcher.persistence().list_instances(filter).await
    }

    /// Resume up to `limit` due timers. Returns how many fired. The
    /// [`TimerScheduler`](crate::timers::TimerScheduler) calls this on a
    /// poll loop; tests call it directly.
    pub async fn fire_due_timers(&self, limit: u32) -> Result<usize> {
        self.dispatcher.fire_due_timers(limit).await
    }

    /// The underlying persistence backend.
    pub fn persistence(&self) -> Arc<dyn Persistence> {
        self.dispatcher.persistence().clone()
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine").field("dispatcher", &"...").finish()
    }
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Trigger ingress and resume dispatch.
//!
//! The dispatcher is the only component that moves instances between
//! storage and the scheduler. Every path through it follows the same
//! discipline: acquire the instance's lease, load, mutate, tick, save,
//! release. The lease serializes ticks within this process; the revision
//! check on save catches writers elsewhere, and a conflicted save is
//! retried from a fresh load.
//!
//! Bookmark consumption is at-most-once. A resume first takes the bookmark
//! out of the loaded instance; if it is already gone (duplicate delivery,
//! a cancelled sibling, a cancelled instance) the delivery becomes a
//! logged no-op before any activity code runs.

use crate::activity::ActivityRegistry;
use crate::error::{EngineError, Result};
use crate::instance::{BranchState, InstanceSettings, InstanceStatus, WorkflowInstance};
use crate::persistence::{BookmarkKey, Persistence};
use crate::runtime::Clock;
use crate::scheduler;
use crate::variables::Variables;
use oxbow_dsl::{NodeDef, WorkflowDefinition};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How many times a conflicted save is retried from a fresh load before
/// the conflict is surfaced to the caller.
const MAX_CONFLICT_RETRIES: usize = 5;

/// A definition whose entry node can start a fresh instance when a
/// matching trigger arrives with no bookmark to resume.
#[derive(Debug, Clone)]
struct StartTrigger {
    definition_id: String,
    activity_kind: String,
    correlation: String,
}

/// Shared dispatch state: definitions, activities, storage, and the
/// per-instance lease map enforcing the single-writer invariant.
pub(crate) struct Dispatcher {
    persistence: Arc<dyn Persistence>,
    registry: ActivityRegistry,
    definitions: HashMap<String, Arc<WorkflowDefinition>>,
    start_triggers: Vec<StartTrigger>,
    default_settings: InstanceSettings,
    clock: Arc<dyn Clock>,
    leases: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl Dispatcher {
    pub(crate) fn new(
        persistence: Arc<dyn Persistence>,
        registry: ActivityRegistry,
        definitions: HashMap<String, Arc<WorkflowDefinition>>,
        default_settings: InstanceSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let start_triggers = collect_start_triggers(&registry, &definitions);
        Dispatcher {
            persistence,
            registry,
            definitions,
            start_triggers,
            default_settings,
            clock,
            leases: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn persistence(&self) -> &Arc<dyn Persistence> {
        &self.persistence
    }

    /// Acquire the single-writer lease for an instance. Held for one full
    /// load-tick-save cycle; a second trigger for the same instance queues
    /// behind it rather than interleaving.
    async fn lease(&self, instance_id: Uuid) -> OwnedMutexGuard<()> {
        let lease = {
            let mut leases = self.leases.lock().await;
            leases
                .entry(instance_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lease.lock_owned().await
    }

    fn definition(&self, definition_id: &str) -> Result<Arc<WorkflowDefinition>> {
        self.definitions
            .get(definition_id)
            .cloned()
            .ok_or_else(|| EngineError::DefinitionNotFound {
                definition_id: definition_id.to_string(),
            })
    }

    /// Create an instance of a definition and run its first tick.
    ///
    /// With a payload, the root branch enters the entry node through
    /// `resume`, the way a start trigger delivers its request body. Without
    /// one the entry node is executed from scratch.
    pub(crate) async fn start_instance(
        &self,
        definition_id: &str,
        payload: Option<Value>,
    ) -> Result<Uuid> {
        let definition = self.definition(definition_id)?;
        let now = self.clock.now();
        let mut instance = WorkflowInstance::new(
            definition.id(),
            definition.entry_point(),
            self.default_settings.clone(),
            now,
        );
        if let Some(payload) = payload {
            if let Some(root) = instance.branch_mut(0) {
                root.state = BranchState::Resuming {
                    node_id: definition.entry_point().to_string(),
                    payload,
                };
            }
        }
        let instance_id = instance.id;

        scheduler::run_tick(&mut instance, &definition, &self.registry, now).await;
        self.persistence.save_instance(&instance).await?;

        info!(
            instance = %instance_id,
            definition = %definition_id,
            status = %instance.status,
            "instance started"
        );
        Ok(instance_id)
    }

    /// Deliver an external trigger and return every instance it touched.
    ///
    /// Matching bookmarks are resumed first, then matching start triggers
    /// create fresh instances. Failures on individual matches are logged
    /// and skipped so one broken instance cannot starve the others; an
    /// unregistered activity kind is a malformed request and an error.
    pub(crate) async fn deliver_trigger(
        &self,
        activity_kind: &str,
        correlation: &str,
        payload: Value,
    ) -> Result<Vec<Uuid>> {
        if self.registry.get(activity_kind).is_none() {
            return Err(EngineError::UnknownActivity {
                kind: activity_kind.to_string(),
            });
        }

        let mut touched = Vec::new();

        let matches = self
            .persistence
            .find_bookmarks(activity_kind, correlation)
            .await?;
        for key in matches {
            match self.resume_bookmark(&key, payload.clone()).await {
                Ok(Some(instance_id)) => touched.push(instance_id),
                Ok(None) => {}
                Err(err) => warn!(
                    instance = %key.instance_id,
                    kind = activity_kind,
                    correlation,
                    error = %err,
                    "resume failed; continuing with remaining matches"
                ),
            }
        }

        for trigger in &self.start_triggers {
            if trigger.activity_kind == activity_kind && trigger.correlation == correlation {
                match self
                    .start_instance(&trigger.definition_id, Some(payload.clone()))
                    .await
                {
                    Ok(instance_id) => touched.push(instance_id),
                    Err(err) => warn!(
                        definition = %trigger.definition_id,
                        error = %err,
                        "start trigger failed"
                    ),
                }
            }
        }

        if touched.is_empty() {
            debug!(
                kind = activity_kind,
                correlation, "trigger matched no bookmark and no start trigger"
            );
        }
        Ok(touched)
    }

    /// Resume one bookmark under its instance's lease.
    ///
    /// Returns the instance ID when a tick ran, `None` when the delivery
    /// was a legitimate no-op: the instance is gone, already terminal (but
    /// not faulted), or the bookmark was consumed by an earlier delivery.
    pub(crate) async fn resume_bookmark(
        &self,
        key: &BookmarkKey,
        payload: Value,
    ) -> Result<Option<Uuid>> {
        let _guard = self.lease(key.instance_id).await;

        let mut last_revision = 0;
        for attempt in 0..MAX_CONFLICT_RETRIES {
            let mut instance = match self.persistence.load_instance(key.instance_id).await {
                Ok(instance) => instance,
                Err(EngineError::InstanceNotFound { .. }) => {
                    debug!(instance = %key.instance_id, "resume for deleted instance is a no-op");
                    return Ok(None);
                }
                Err(err) => return Err(err),
            };
            last_revision = instance.revision;

            if instance.status == InstanceStatus::Faulted {
                warn!(
                    instance = %instance.id,
                    "resume rejected: instance is faulted; bookmarks retained for inspection"
                );
                return Err(EngineError::InvalidInstanceState {
                    instance_id: instance.id,
                    expected: InstanceStatus::Suspended.to_string(),
                    actual: instance.status.to_string(),
                });
            }
            if instance.status.is_terminal() {
                debug!(
                    instance = %instance.id,
                    status = %instance.status,
                    "late resume for terminal instance is a no-op"
                );
                return Ok(None);
            }

            let Some(bookmark) = instance.take_bookmark(key.bookmark_id) else {
                debug!(
                    instance = %instance.id,
                    bookmark = %key.bookmark_id,
                    "bookmark already consumed; duplicate delivery is a no-op"
                );
                return Ok(None);
            };

            let definition = self.definition(&instance.definition_id)?;
            if let Some(branch) = instance.branch_mut(bookmark.branch_id) {
                branch.state = BranchState::Resuming {
                    node_id: bookmark.node_id.clone(),
                    payload: payload.clone(),
                };
            }
            instance.status = InstanceStatus::Running;

            scheduler::run_tick(&mut instance, &definition, &self.registry, self.clock.now()).await;

            match self.persistence.save_instance(&instance).await {
                Ok(_) => {
                    debug!(
                        instance = %instance.id,
                        status = %instance.status,
                        "resume tick persisted"
                    );
                    return Ok(Some(instance.id));
                }
                Err(err) if err.is_retryable() => {
                    debug!(
                        instance = %instance.id,
                        attempt,
                        "save conflicted; retrying from a fresh load"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        Err(EngineError::Conflict {
            instance_id: key.instance_id,
            revision: last_revision,
        })
    }

    /// Cancel an instance: delete its bookmarks, tear down its branches,
    /// and mark it Cancelled in a single guarded save.
    pub(crate) async fn cancel_instance(&self, instance_id: Uuid) -> Result<()> {
        let _guard = self.lease(instance_id).await;

        let mut last_revision = 0;
        for attempt in 0..MAX_CONFLICT_RETRIES {
            let mut instance = self.persistence.load_instance(instance_id).await?;
            last_revision = instance.revision;

            if instance.status.is_terminal() {
                return Err(EngineError::InvalidInstanceState {
                    instance_id,
                    expected: "running or suspended".to_string(),
                    actual: instance.status.to_string(),
                });
            }

            instance.bookmarks.clear();
            for branch in &mut instance.branches {
                branch.state = BranchState::Completed;
            }
            instance.status = InstanceStatus::Cancelled;
            instance.touch(self.clock.now());

            match self.persistence.save_instance(&instance).await {
                Ok(_) => {
                    info!(instance = %instance_id, "instance cancelled");
                    return Ok(());
                }
                Err(err) if err.is_retryable() => {
                    debug!(instance = %instance_id, attempt, "cancel save conflicted; retrying");
                }
                Err(err) => return Err(err),
            }
        }

        Err(EngineError::Conflict {
            instance_id,
            revision: last_revision,
        })
    }

    /// Scan for due timer bookmarks and resume each, oldest due first.
    /// Returns how many resumed; individual failures are logged and do
    /// not stop the scan.
    pub(crate) async fn fire_due_timers(&self, limit: u32) -> Result<usize> {
        let now = self.clock.now();
        let due = self.persistence.due_timers(now, limit).await?;
        let mut fired = 0;
        for key in due {
            match self.resume_bookmark(&key, Value::Null).await {
                Ok(Some(_)) => fired += 1,
                Ok(None) => {}
                Err(err) => warn!(
                    instance = %key.instance_id,
                    bookmark = %key.bookmark_id,
                    error = %err,
                    "due timer resume failed"
                ),
            }
        }
        Ok(fired)
    }
}

/// Find definitions whose entry node declares a static trigger
/// correlation. Reference-bound entry config has no variables to resolve
/// against before an instance exists, so such entries are skipped.
fn collect_start_triggers(
    registry: &ActivityRegistry,
    definitions: &HashMap<String, Arc<WorkflowDefinition>>,
) -> Vec<StartTrigger> {
    let no_variables = Variables::new();
    let mut triggers = Vec::new();
    for definition in definitions.values() {
        let Some(NodeDef::Activity(entry)) = definition.node(definition.entry_point()) else {
            continue;
        };
        let Some(activity) = registry.get(&entry.kind) else {
            continue;
        };
        let Ok(config) = no_variables.evaluate_config(&entry.config) else {
            debug!(
                definition = %definition.id(),
                node = %entry.id,
                "entry config is not static; definition will not start from triggers"
            );
            continue;
        };
        if let Some(correlation) = activity.trigger_correlation(&config) {
            debug!(
                definition = %definition.id(),
                kind = %entry.kind,
                correlation = %correlation,
                "registered start trigger"
            );
            triggers.push(StartTrigger {
                definition_id: definition.id().to_string(),
                activity_kind: entry.kind.clone(),
                correlation,
            });
        }
    }
    triggers
}

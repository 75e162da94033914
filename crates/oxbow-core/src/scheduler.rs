// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The run-to-suspension scheduler.
//!
//! A tick takes a loaded instance and executes runnable branches, one node
//! at a time, until nothing can run without external input. Runnable
//! branches are processed in creation order; combined with forks spawning
//! children in declaration order, this makes every tick deterministic,
//! including which branch wins a wait-any join when several could.
//!
//! A tick never touches storage. The engine loads the instance, ticks it,
//! and saves the result under the instance's single-writer lock; faults
//! inside activities become instance state, not errors.
//!
//! Cycles in the graph are legal, so every tick carries a node budget.
//! Exhausting it faults the instance rather than spinning forever.

use crate::activity::{ActivityContext, ActivityError, ActivityExecution, ActivityRegistry};
use crate::forks;
use crate::instance::{Bookmark, BranchState, InstanceStatus, WorkflowInstance};
use chrono::{DateTime, Utc};
use oxbow_dsl::{NodeDef, WorkflowDefinition};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

/// Work a runnable branch is about to do.
enum Work {
    Execute { node_id: String },
    Resume { node_id: String, payload: Value },
}

/// Outcome of one activity call, execute or resume.
enum Completion {
    Outcome(String),
    Suspended(crate::activity::Suspension),
}

/// Run an instance until no branch can proceed without external input.
///
/// On return the instance is `Suspended`, `Finished`, or `Faulted`, with
/// branches and bookmarks updated to match. The caller persists it.
pub(crate) async fn run_tick(
    instance: &mut WorkflowInstance,
    definition: &WorkflowDefinition,
    registry: &ActivityRegistry,
    now: DateTime<Utc>,
) {
    let budget = instance.settings.max_nodes_per_tick;
    let mut steps = 0usize;

    while let Some((branch_id, work)) = next_runnable(instance) {
        if steps >= budget {
            fault(
                instance,
                now,
                format!("tick exceeded the node budget of {} steps", budget),
            );
            return;
        }
        steps += 1;

        step(instance, definition, registry, branch_id, work, now).await;
        if instance.status.is_terminal() {
            return;
        }
    }

    settle_status(instance, now);
}

/// The first branch, in creation order, that can make progress.
fn next_runnable(instance: &WorkflowInstance) -> Option<(u64, Work)> {
    for branch in &instance.branches {
        match &branch.state {
            BranchState::Ready { node_id } => {
                return Some((
                    branch.id,
                    Work::Execute {
                        node_id: node_id.clone(),
                    },
                ));
            }
            BranchState::Resuming { node_id, payload } => {
                return Some((
                    branch.id,
                    Work::Resume {
                        node_id: node_id.clone(),
                        payload: payload.clone(),
                    },
                ));
            }
            _ => {}
        }
    }
    None
}

/// Execute one node on one branch.
async fn step(
    instance: &mut WorkflowInstance,
    definition: &WorkflowDefinition,
    registry: &ActivityRegistry,
    branch_id: u64,
    work: Work,
    now: DateTime<Utc>,
) {
    let node_id = match &work {
        Work::Execute { node_id } | Work::Resume { node_id, .. } => node_id.clone(),
    };

    let Some(node) = definition.node(&node_id) else {
        fault(
            instance,
            now,
            format!("branch {} reached unknown node '{}'", branch_id, node_id),
        );
        return;
    };

    match node {
        NodeDef::Fork(fork) => {
            forks::enter_fork(instance, branch_id, fork);
        }
        NodeDef::Join(join) => {
            forks::arrive_at_join(instance, definition, branch_id, join);
        }
        NodeDef::Activity(activity_def) => {
            let Some(activity) = registry.get(&activity_def.kind) else {
                fault(
                    instance,
                    now,
                    format!(
                        "node '{}' needs activity kind '{}' but none is registered",
                        node_id, activity_def.kind
                    ),
                );
                return;
            };

            let config = match instance.variables.evaluate_config(&activity_def.config) {
                Ok(config) => config,
                Err(err) => {
                    fault(
                        instance,
                        now,
                        format!("config for node '{}' failed to evaluate: {}", node_id, err),
                    );
                    return;
                }
            };

            let completion: Result<Completion, ActivityError> = {
                let mut ctx = ActivityContext {
                    instance_id: instance.id,
                    node_id: &node_id,
                    branch_id,
                    config: &config,
                    variables: &mut instance.variables,
                    output: &mut instance.output,
                    settings: &instance.settings,
                    now,
                };
                match work {
                    Work::Execute { .. } => activity.execute(&mut ctx).await.map(|ex| match ex {
                        ActivityExecution::Completed { outcome } => Completion::Outcome(outcome),
                        ActivityExecution::Suspended(suspension) => {
                            Completion::Suspended(suspension)
                        }
                    }),
                    Work::Resume { payload, .. } => {
                        activity.resume(&mut ctx, payload).await.map(Completion::Outcome)
                    }
                }
            };

            match completion {
                Err(err) => {
                    warn!(
                        instance = %instance.id,
                        node = %node_id,
                        error = %err,
                        "activity faulted"
                    );
                    fault(
                        instance,
                        now,
                        format!("activity at node '{}' faulted: {}", node_id, err),
                    );
                }
                Ok(Completion::Suspended(suspension)) => {
                    let bookmark = Bookmark {
                        id: Uuid::new_v4(),
                        node_id: node_id.clone(),
                        branch_id,
                        activity_kind: activity_def.kind.clone(),
                        correlation: suspension.correlation,
                        due_at: suspension.due_at,
                        created_at: now,
                    };
                    debug!(
                        instance = %instance.id,
                        node = %node_id,
                        kind = %bookmark.activity_kind,
                        correlation = %bookmark.correlation,
                        due_at = ?bookmark.due_at,
                        "branch suspended on bookmark"
                    );
                    let bookmark_id = bookmark.id;
                    instance.bookmarks.push(bookmark);
                    if let Some(branch) = instance.branch_mut(branch_id) {
                        branch.state = BranchState::Waiting { bookmark_id };
                    }
                }
                Ok(Completion::Outcome(outcome)) => {
                    debug!(
                        instance = %instance.id,
                        node = %node_id,
                        outcome = %outcome,
                        "node completed"
                    );
                    follow_edge(instance, definition, branch_id, &node_id, &outcome);
                }
            }
        }
    }
}

/// Move a branch along the edge for `outcome`, or complete it when the
/// outcome has no edge.
fn follow_edge(
    instance: &mut WorkflowInstance,
    definition: &WorkflowDefinition,
    branch_id: u64,
    node_id: &str,
    outcome: &str,
) {
    let next = definition.next_node(node_id, outcome).map(str::to_string);
    if let Some(branch) = instance.branch_mut(branch_id) {
        branch.state = match next {
            Some(node_id) => BranchState::Ready { node_id },
            None => BranchState::Completed,
        };
    }
}

/// Fault the instance. Bookmarks are retained for inspection; the
/// instance stops accepting work.
fn fault(instance: &mut WorkflowInstance, now: DateTime<Utc>, message: String) {
    warn!(instance = %instance.id, fault = %message, "instance faulted");
    instance.status = InstanceStatus::Faulted;
    instance.fault = Some(message);
    instance.touch(now);
}

/// Derive the post-tick status from branch and bookmark state.
fn settle_status(instance: &mut WorkflowInstance, now: DateTime<Utc>) {
    if instance.status.is_terminal() {
        return;
    }

    let root_done = instance.branch(0).is_none_or(|root| !root.is_active());
    if root_done {
        instance.status = InstanceStatus::Finished;
        instance.touch(now);
        debug!(instance = %instance.id, "instance finished");
        return;
    }

    if !instance.bookmarks.is_empty() {
        instance.status = InstanceStatus::Suspended;
        instance.touch(now);
        return;
    }

    // Branches are parked or at joins with nothing left to wake them.
    // A wait-all join starved by a dead-ended sibling lands here.
    fault(
        instance,
        now,
        "execution stalled: branches are waiting but no bookmarks remain".to_string(),
    );
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Fork and join mechanics.
//!
//! A fork parks the executing branch and spawns one child branch per
//! declared target, in declaration order. Children run independently and
//! eventually arrive at a join. A wait-all join releases once every
//! sibling has arrived; a wait-any join releases on the first arrival and
//! cancels the losing siblings, including their bookmarks and any nested
//! subtrees. Releasing completes the children and moves the parked parent
//! to the node behind the join.
//!
//! The scheduler executes runnable branches in creation order, and forks
//! create children in declaration order, so when several branches of a
//! wait-any group become runnable in the same tick, the branch with the
//! lowest declaration index arrives first and wins.

use crate::instance::{BranchState, WorkflowInstance};
use oxbow_dsl::{ForkDef, JoinDef, JoinMode, WorkflowDefinition, OUTCOME_DONE};
use tracing::debug;

/// Park `branch_id` at the fork and spawn its children.
pub(crate) fn enter_fork(instance: &mut WorkflowInstance, branch_id: u64, fork: &ForkDef) {
    for (index, target) in fork.branches.iter().enumerate() {
        let child_id = instance.allocate_branch_id();
        instance.branches.push(crate::instance::Branch {
            id: child_id,
            parent: Some(branch_id),
            fork_id: Some(fork.id.clone()),
            index,
            state: BranchState::Ready {
                node_id: target.clone(),
            },
        });
    }
    if let Some(branch) = instance.branch_mut(branch_id) {
        branch.state = BranchState::Parked {
            fork_id: fork.id.clone(),
        };
    }
    debug!(
        fork = %fork.id,
        branches = fork.branches.len(),
        "forked into child branches"
    );
}

/// Record that `branch_id` reached a join, releasing it if its mode is
/// satisfied.
pub(crate) fn arrive_at_join(
    instance: &mut WorkflowInstance,
    definition: &WorkflowDefinition,
    branch_id: u64,
    join: &JoinDef,
) {
    let Some(branch) = instance.branch(branch_id) else {
        return;
    };

    // A branch that was never forked passes straight through; the join
    // has nothing to merge.
    let (Some(parent_id), Some(fork_id)) = (branch.parent, branch.fork_id.clone()) else {
        advance_past_join(instance, definition, branch_id, join);
        return;
    };

    if let Some(branch) = instance.branch_mut(branch_id) {
        branch.state = BranchState::AtJoin {
            join_id: join.id.clone(),
        };
    }

    let released = match join.mode {
        JoinMode::WaitAny => true,
        JoinMode::WaitAll => siblings(instance, parent_id, &fork_id).iter().all(|&id| {
            matches!(
                instance.branch(id).map(|b| &b.state),
                Some(BranchState::AtJoin { join_id }) if join_id == &join.id
            )
        }),
    };

    if !released {
        return;
    }

    // Complete the arrivals and cancel everything else in the group. For
    // wait-all the cancel set is empty; for wait-any it is every losing
    // sibling's subtree, bookmarks included.
    for sibling_id in siblings(instance, parent_id, &fork_id) {
        let at_this_join = matches!(
            instance.branch(sibling_id).map(|b| &b.state),
            Some(BranchState::AtJoin { join_id }) if join_id == &join.id
        );
        if at_this_join {
            if let Some(sibling) = instance.branch_mut(sibling_id) {
                sibling.state = BranchState::Completed;
            }
        } else {
            cancel_subtree(instance, sibling_id);
        }
    }

    debug!(join = %join.id, mode = %join.mode, winner = branch_id, "join released");
    advance_past_join(instance, definition, parent_id, join);
}

/// Move a branch past a released join, following the join's `Done` edge
/// or completing the branch when none exists.
fn advance_past_join(
    instance: &mut WorkflowInstance,
    definition: &WorkflowDefinition,
    branch_id: u64,
    join: &JoinDef,
) {
    let next = definition
        .next_node(&join.id, OUTCOME_DONE)
        .map(str::to_string);
    if let Some(branch) = instance.branch_mut(branch_id) {
        branch.state = match next {
            Some(node_id) => BranchState::Ready { node_id },
            None => BranchState::Completed,
        };
    }
}

/// Cancel a branch and every active descendant, deleting their bookmarks.
pub(crate) fn cancel_subtree(instance: &mut WorkflowInstance, branch_id: u64) {
    let mut pending = vec![branch_id];
    while let Some(current) = pending.pop() {
        pending.extend(
            instance
                .branches
                .iter()
                .filter(|b| b.parent == Some(current) && b.is_active())
                .map(|b| b.id),
        );
        let removed = instance.remove_bookmarks_for_branch(current);
        if !removed.is_empty() {
            debug!(
                branch = current,
                bookmarks = removed.len(),
                "cancelled sibling bookmarks"
            );
        }
        if let Some(branch) = instance.branch_mut(current) {
            branch.state = BranchState::Completed;
        }
    }
}

/// IDs of every active branch spawned by `fork_id` under `parent_id`, in
/// declaration order. Completed branches from an earlier pass through the
/// same fork are not part of the current group.
fn siblings(instance: &WorkflowInstance, parent_id: u64, fork_id: &str) -> Vec<u64> {
    let mut group: Vec<(usize, u64)> = instance
        .branches
        .iter()
        .filter(|b| {
            b.parent == Some(parent_id) && b.fork_id.as_deref() == Some(fork_id) && b.is_active()
        })
        .map(|b| (b.index, b.id))
        .collect();
    group.sort();
    group.into_iter().map(|(_, id)| id).collect()
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workflow instance state.
//!
//! A [`WorkflowInstance`] is the complete durable state of one execution:
//! status, variables, branches, and bookmarks. It is a plain value that
//! serializes to JSON; the persistence layer stores it as a whole under an
//! optimistic revision counter, and the scheduler mutates a loaded copy in
//! memory during a tick before saving it back.

use crate::variables::Variables;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Node budget applied to a single tick unless configured otherwise.
/// Cycles are legal in workflow graphs, so a tick that never suspends has
/// to be cut off somewhere.
pub const DEFAULT_MAX_NODES_PER_TICK: usize = 10_000;

// ============================================================================
// Instance Status
// ============================================================================

/// Lifecycle status of a workflow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    /// A tick is in progress or scheduled.
    Running,
    /// Waiting on at least one bookmark.
    Suspended,
    /// All branches completed normally.
    Finished,
    /// An activity fault stopped execution. Bookmarks are retained for
    /// inspection but the instance no longer accepts resumes.
    Faulted,
    /// Cancelled by an operator or API call.
    Cancelled,
}

impl InstanceStatus {
    /// Stable lowercase string form, used in storage and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Running => "running",
            InstanceStatus::Suspended => "suspended",
            InstanceStatus::Finished => "finished",
            InstanceStatus::Faulted => "faulted",
            InstanceStatus::Cancelled => "cancelled",
        }
    }

    /// Whether this status is terminal. Terminal instances never tick
    /// again and reject resume attempts.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InstanceStatus::Finished | InstanceStatus::Faulted | InstanceStatus::Cancelled
        )
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InstanceStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "running" => Ok(InstanceStatus::Running),
            "suspended" => Ok(InstanceStatus::Suspended),
            "finished" => Ok(InstanceStatus::Finished),
            "faulted" => Ok(InstanceStatus::Faulted),
            "cancelled" => Ok(InstanceStatus::Cancelled),
            other => Err(format!("unknown instance status '{}'", other)),
        }
    }
}

// ============================================================================
// Bookmarks
// ============================================================================

/// A durable marker for a suspended activity.
///
/// Bookmarks are how signals and timers find their way back into an
/// instance: the resume dispatcher matches on `(activity_kind,
/// correlation)` and the timer scheduler scans `due_at`. Consuming a
/// bookmark removes it from the instance, so each one resumes at most
/// once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    /// Unique bookmark identifier.
    pub id: Uuid,
    /// Node whose activity created this bookmark.
    pub node_id: String,
    /// Branch that is waiting on it.
    pub branch_id: u64,
    /// Kind of the suspended activity, e.g. `"ReceiveSignal"`.
    pub activity_kind: String,
    /// Application-chosen correlation value, e.g. a signal name.
    pub correlation: String,
    /// For timer bookmarks, the absolute time the bookmark becomes due.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,
    /// When the bookmark was created.
    pub created_at: DateTime<Utc>,
}

impl Bookmark {
    /// Whether this bookmark matches a resume key.
    pub fn matches(&self, activity_kind: &str, correlation: &str) -> bool {
        self.activity_kind == activity_kind && self.correlation == correlation
    }

    /// Whether this is a timer bookmark that is due at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_at.is_some_and(|due| due <= now)
    }
}

// ============================================================================
// Branches
// ============================================================================

/// What a branch is currently doing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BranchState {
    /// Positioned at a node and ready to execute it.
    Ready {
        /// The node to execute next.
        node_id: String,
    },
    /// A consumed bookmark's payload is waiting to resume the activity at
    /// this node.
    Resuming {
        /// The node whose activity will be resumed.
        node_id: String,
        /// The payload delivered with the signal or timer.
        payload: Value,
    },
    /// Suspended on a bookmark.
    Waiting {
        /// The bookmark this branch waits on.
        bookmark_id: Uuid,
    },
    /// Parked while child branches spawned by a fork run.
    Parked {
        /// The fork node that spawned the children.
        fork_id: String,
    },
    /// Arrived at a join and waiting for it to release.
    AtJoin {
        /// The join node reached.
        join_id: String,
    },
    /// Finished, cancelled, or merged into a join.
    Completed,
}

/// One concurrent strand of execution within an instance.
///
/// Every instance starts with a single root branch. Forks spawn child
/// branches and park the parent; joins complete the children and release
/// the parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    /// Branch identifier, unique within the instance.
    pub id: u64,
    /// Parent branch, `None` for the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<u64>,
    /// Fork node that spawned this branch, `None` for the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fork_id: Option<String>,
    /// Position in the fork's declaration order. Decides the winner when
    /// a wait-any join sees several arrivals at once.
    pub index: usize,
    /// Current state.
    pub state: BranchState,
}

impl Branch {
    /// Whether the branch still participates in execution.
    pub fn is_active(&self) -> bool {
        !matches!(self.state, BranchState::Completed)
    }
}

// ============================================================================
// Instance Settings
// ============================================================================

/// Configuration snapshot taken when an instance is created.
///
/// Instances never read ambient configuration at run time; whatever they
/// need is copied in here at creation, so a config change cannot alter an
/// execution already in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSettings {
    /// Node budget for a single tick.
    pub max_nodes_per_tick: usize,
    /// Application settings exposed to activities, e.g. a base URL for
    /// links in outgoing mail.
    #[serde(default)]
    pub app: serde_json::Map<String, Value>,
}

impl InstanceSettings {
    /// Look up an application setting by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.app.get(key)
    }

    /// Add an application setting, builder style.
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.app.insert(key.into(), value);
        self
    }
}

impl Default for InstanceSettings {
    fn default() -> Self {
        InstanceSettings {
            max_nodes_per_tick: DEFAULT_MAX_NODES_PER_TICK,
            app: serde_json::Map::new(),
        }
    }
}

// ============================================================================
// Workflow Instance
// ============================================================================

/// Complete durable state of one workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInstance {
    /// Unique instance identifier.
    pub id: Uuid,
    /// The definition this instance executes.
    pub definition_id: String,
    /// Optimistic concurrency revision. Incremented by every successful
    /// save; a save based on a stale revision fails with a conflict.
    pub revision: u64,
    /// Lifecycle status.
    pub status: InstanceStatus,
    /// Instance variables.
    pub variables: Variables,
    /// All branches, active and completed, in creation order.
    pub branches: Vec<Branch>,
    /// Outstanding bookmarks.
    pub bookmarks: Vec<Bookmark>,
    /// Configuration snapshot from creation time.
    pub settings: InstanceSettings,
    /// Output produced at completion, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Fault message when status is `Faulted`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
    /// When the instance was created.
    pub created_at: DateTime<Utc>,
    /// When the instance state last changed.
    pub updated_at: DateTime<Utc>,
    /// Next branch ID to allocate.
    next_branch_id: u64,
}

impl WorkflowInstance {
    /// Create a new instance positioned at a definition's entry point.
    pub fn new(
        definition_id: impl Into<String>,
        entry_point: impl Into<String>,
        settings: InstanceSettings,
        now: DateTime<Utc>,
    ) -> Self {
        let root = Branch {
            id: 0,
            parent: None,
            fork_id: None,
            index: 0,
            state: BranchState::Ready {
                node_id: entry_point.into(),
            },
        };
        WorkflowInstance {
            id: Uuid::new_v4(),
            definition_id: definition_id.into(),
            revision: 0,
            status: InstanceStatus::Running,
            variables: Variables::new(),
            branches: vec![root],
            bookmarks: Vec::new(),
            settings,
            output: None,
            fault: None,
            created_at: now,
            updated_at: now,
            next_branch_id: 1,
        }
    }

    /// Allocate the next branch ID. IDs are never reused within an
    /// instance, so completed branches stay addressable in history.
    pub fn allocate_branch_id(&mut self) -> u64 {
        let id = self.next_branch_id;
        self.next_branch_id += 1;
        id
    }

    /// Look up a branch by ID.
    pub fn branch(&self, branch_id: u64) -> Option<&Branch> {
        self.branches.iter().find(|b| b.id == branch_id)
    }

    /// Look up a branch mutably by ID.
    pub fn branch_mut(&mut self, branch_id: u64) -> Option<&mut Branch> {
        self.branches.iter_mut().find(|b| b.id == branch_id)
    }

    /// Branches that still participate in execution, in creation order.
    pub fn active_branches(&self) -> impl Iterator<Item = &Branch> {
        self.branches.iter().filter(|b| b.is_active())
    }

    /// Look up a bookmark by ID.
    pub fn bookmark(&self, bookmark_id: Uuid) -> Option<&Bookmark> {
        self.bookmarks.iter().find(|b| b.id == bookmark_id)
    }

    /// Bookmarks matching a resume key, in creation order.
    pub fn matching_bookmarks(&self, activity_kind: &str, correlation: &str) -> Vec<&Bookmark> {
        self.bookmarks
            .iter()
            .filter(|b| b.matches(activity_kind, correlation))
            .collect()
    }

    /// Consume a bookmark. Returns `None` if it was already consumed or
    /// deleted, which is how duplicate deliveries become no-ops.
    pub fn take_bookmark(&mut self, bookmark_id: Uuid) -> Option<Bookmark> {
        let position = self.bookmarks.iter().position(|b| b.id == bookmark_id)?;
        Some(self.bookmarks.remove(position))
    }

    /// Delete every bookmark belonging to a branch. Used when a wait-any
    /// join cancels losing siblings.
    pub fn remove_bookmarks_for_branch(&mut self, branch_id: u64) -> Vec<Bookmark> {
        let (removed, kept) = std::mem::take(&mut self.bookmarks)
            .into_iter()
            .partition(|b| b.branch_id == branch_id);
        self.bookmarks = kept;
        removed
    }

    /// Record a state change timestamp.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn instance() -> WorkflowInstance {
        WorkflowInstance::new(
            "approval",
            "receive",
            InstanceSettings::default(),
            Utc::now(),
        )
    }

    fn bookmark(instance: &WorkflowInstance, kind: &str, correlation: &str) -> Bookmark {
        Bookmark {
            id: Uuid::new_v4(),
            node_id: "wait".to_string(),
            branch_id: 0,
            activity_kind: kind.to_string(),
            correlation: correlation.to_string(),
            due_at: None,
            created_at: instance.created_at,
        }
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            InstanceStatus::Running,
            InstanceStatus::Suspended,
            InstanceStatus::Finished,
            InstanceStatus::Faulted,
            InstanceStatus::Cancelled,
        ] {
            let parsed: InstanceStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("bogus".parse::<InstanceStatus>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!InstanceStatus::Running.is_terminal());
        assert!(!InstanceStatus::Suspended.is_terminal());
        assert!(InstanceStatus::Finished.is_terminal());
        assert!(InstanceStatus::Faulted.is_terminal());
        assert!(InstanceStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_new_instance_has_root_branch_at_entry() {
        let instance = instance();
        assert_eq!(instance.revision, 0);
        assert_eq!(instance.status, InstanceStatus::Running);
        assert_eq!(instance.branches.len(), 1);
        let root = &instance.branches[0];
        assert_eq!(root.id, 0);
        assert_eq!(root.parent, None);
        assert!(
            matches!(&root.state, BranchState::Ready { node_id } if node_id == "receive")
        );
    }

    #[test]
    fn test_branch_ids_are_never_reused() {
        let mut instance = instance();
        let first = instance.allocate_branch_id();
        let second = instance.allocate_branch_id();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[test]
    fn test_take_bookmark_consumes_once() {
        let mut instance = instance();
        let mark = bookmark(&instance, "ReceiveSignal", "Approve");
        let id = mark.id;
        instance.bookmarks.push(mark);

        assert!(instance.take_bookmark(id).is_some());
        // The second take is the duplicate-delivery case: a no-op.
        assert!(instance.take_bookmark(id).is_none());
        assert!(instance.bookmarks.is_empty());
    }

    #[test]
    fn test_matching_bookmarks_filters_by_kind_and_correlation() {
        let mut instance = instance();
        instance
            .bookmarks
            .push(bookmark(&instance, "ReceiveSignal", "Approve"));
        instance
            .bookmarks
            .push(bookmark(&instance, "ReceiveSignal", "Reject"));
        instance.bookmarks.push(bookmark(&instance, "Delay", "t-1"));

        let matches = instance.matching_bookmarks("ReceiveSignal", "Approve");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].correlation, "Approve");
        assert!(instance.matching_bookmarks("ReceiveSignal", "Escalate").is_empty());
    }

    #[test]
    fn test_remove_bookmarks_for_branch() {
        let mut instance = instance();
        let mut losing = bookmark(&instance, "ReceiveSignal", "Reject");
        losing.branch_id = 2;
        let keeping = bookmark(&instance, "ReceiveSignal", "Approve");
        let kept_id = keeping.id;
        instance.bookmarks.push(losing);
        instance.bookmarks.push(keeping);

        let removed = instance.remove_bookmarks_for_branch(2);
        assert_eq!(removed.len(), 1);
        assert_eq!(instance.bookmarks.len(), 1);
        assert_eq!(instance.bookmarks[0].id, kept_id);
    }

    #[test]
    fn test_timer_bookmark_due() {
        let now = Utc::now();
        let mut mark = Bookmark {
            id: Uuid::new_v4(),
            node_id: "remind".to_string(),
            branch_id: 0,
            activity_kind: "Delay".to_string(),
            correlation: "t-1".to_string(),
            due_at: Some(now + chrono::Duration::seconds(60)),
            created_at: now,
        };
        assert!(!mark.is_due(now));
        assert!(mark.is_due(now + chrono::Duration::seconds(60)));
        mark.due_at = None;
        // Signal bookmarks are never due.
        assert!(!mark.is_due(now + chrono::Duration::days(1)));
    }

    #[test]
    fn test_instance_serde_round_trip() {
        let mut instance = instance();
        instance.variables.set("Document", json!({ "Id": 3 }));
        instance
            .bookmarks
            .push(bookmark(&instance, "ReceiveSignal", "Approve"));
        let child = instance.allocate_branch_id();
        instance.branches.push(Branch {
            id: child,
            parent: Some(0),
            fork_id: Some("fork".to_string()),
            index: 0,
            state: BranchState::Waiting {
                bookmark_id: instance.bookmarks[0].id,
            },
        });

        let serialized = serde_json::to_string(&instance).unwrap();
        let restored: WorkflowInstance = serde_json::from_str(&serialized).unwrap();
        assert_eq!(restored, instance);
        // Allocation state survives the round trip.
        let mut restored = restored;
        assert_eq!(restored.allocate_branch_id(), child + 1);
    }
}

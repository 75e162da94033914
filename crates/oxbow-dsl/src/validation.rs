// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Build-time workflow validation.
//!
//! This module validates documents before compilation to ensure:
//! - Graph structure is valid (entry point exists, no unreachable nodes)
//! - Name aliases are unique and resolvable
//! - Edges reference existing nodes and producible outcomes
//! - Fork/Join shapes are usable
//!
//! Validation never rejects cycles: loops back to a named node are a
//! supported modeling tool, and runaway loops are bounded at run time.
//! All problems are collected and reported together instead of failing on
//! the first one.

use crate::catalog::ActivityCatalog;
use crate::document::{BindingValue, DocumentEdge, Node, WorkflowDocument, OUTCOME_DONE};
use std::collections::{HashMap, HashSet};

// ============================================================================
// Validation Result Types
// ============================================================================

/// Result of document validation containing errors and warnings.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// Hard errors that prevent compilation.
    pub errors: Vec<ValidationError>,
    /// Soft warnings that don't prevent compilation but indicate potential issues.
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are allowed).
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns true if there are any errors.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns true if there are any warnings.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Merge another validation result into this one.
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

// ============================================================================
// Validation Errors
// ============================================================================

/// Errors that can occur during validation.
#[derive(Debug, Clone)]
#[allow(missing_docs)] // Fields are self-documenting from variant docs
pub enum ValidationError {
    // === Graph Structure Errors ===
    /// Workflow has no nodes defined.
    EmptyWorkflow,
    /// Entry point node does not exist in the workflow.
    EntryPointNotFound {
        entry_point: String,
        available_nodes: Vec<String>,
    },
    /// A name alias is shared by several nodes, or collides with a node ID.
    DuplicateNodeName { name: String, node_ids: Vec<String> },
    /// A node is not reachable from the entry point.
    UnreachableNode { node_id: String },
    /// Two nodes were added under the same ID (builder only; parsed
    /// documents key nodes by ID and cannot express this).
    DuplicateNodeId { node_id: String },

    // === Node Errors ===
    /// Activity node uses a kind absent from the catalog.
    UnknownActivityKind {
        node_id: String,
        kind: String,
        available_kinds: Vec<String>,
    },
    /// Fork node declares no branches.
    ForkWithoutBranches { fork_id: String },
    /// Fork branch entry does not resolve to a node.
    ForkBranchNotFound {
        fork_id: String,
        target: String,
        available_targets: Vec<String>,
    },

    // === Edge Errors ===
    /// Edge starts at a node that does not exist.
    EdgeSourceNotFound {
        from_node: String,
        available_nodes: Vec<String>,
    },
    /// Edge target does not resolve to a node ID or name alias.
    EdgeTargetNotFound {
        from_node: String,
        to_node: String,
        available_targets: Vec<String>,
    },
    /// Edge is labeled with an outcome its source can never produce.
    OutcomeNotProducible {
        node_id: String,
        kind: String,
        outcome: String,
        declared_outcomes: Vec<String>,
    },
    /// Two edges leave the same node under the same outcome.
    DuplicateEdge {
        from_node: String,
        from_outcome: String,
    },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // Graph Structure Errors
            ValidationError::EmptyWorkflow => {
                write!(f, "[E001] Workflow has no nodes defined")
            }
            ValidationError::EntryPointNotFound {
                entry_point,
                available_nodes,
            } => {
                write!(
                    f,
                    "[E002] Entry point '{}' not found in nodes. Available nodes: {}",
                    entry_point,
                    join_or_none(available_nodes)
                )
            }
            ValidationError::DuplicateNodeName { name, node_ids } => {
                write!(
                    f,
                    "[E003] Name '{}' is used by more than one node ({}), so edges cannot target it unambiguously",
                    name,
                    node_ids.join(", ")
                )
            }
            ValidationError::UnreachableNode { node_id } => {
                write!(
                    f,
                    "[E004] Node '{}' is unreachable from the entry point",
                    node_id
                )
            }
            ValidationError::DuplicateNodeId { node_id } => {
                write!(f, "[E005] Node ID '{}' is declared more than once", node_id)
            }

            // Node Errors
            ValidationError::UnknownActivityKind {
                node_id,
                kind,
                available_kinds,
            } => {
                let suggestion = suggest_name(kind, available_kinds)
                    .map(|s| format!(". Did you mean '{}'?", s))
                    .unwrap_or_default();
                write!(
                    f,
                    "[E010] Node '{}' uses unknown activity kind '{}'{}\n       Available kinds: {}",
                    node_id,
                    kind,
                    suggestion,
                    join_or_none(available_kinds)
                )
            }
            ValidationError::ForkWithoutBranches { fork_id } => {
                write!(f, "[E011] Fork '{}' declares no branches", fork_id)
            }
            ValidationError::ForkBranchNotFound {
                fork_id,
                target,
                available_targets,
            } => {
                let suggestion = suggest_name(target, available_targets)
                    .map(|s| format!(". Did you mean '{}'?", s))
                    .unwrap_or_default();
                write!(
                    f,
                    "[E012] Fork '{}' branch entry '{}' does not exist{}",
                    fork_id, target, suggestion
                )
            }

            // Edge Errors
            ValidationError::EdgeSourceNotFound {
                from_node,
                available_nodes,
            } => {
                let suggestion = suggest_name(from_node, available_nodes)
                    .map(|s| format!(". Did you mean '{}'?", s))
                    .unwrap_or_default();
                write!(
                    f,
                    "[E020] Edge starts at unknown node '{}'{}",
                    from_node, suggestion
                )
            }
            ValidationError::EdgeTargetNotFound {
                from_node,
                to_node,
                available_targets,
            } => {
                let suggestion = suggest_name(to_node, available_targets)
                    .map(|s| format!(". Did you mean '{}'?", s))
                    .unwrap_or_default();
                write!(
                    f,
                    "[E021] Edge from '{}' targets '{}' but no node has that ID or name{}",
                    from_node, to_node, suggestion
                )
            }
            ValidationError::OutcomeNotProducible {
                node_id,
                kind,
                outcome,
                declared_outcomes,
            } => {
                let suggestion = suggest_name(outcome, declared_outcomes)
                    .map(|s| format!(". Did you mean '{}'?", s))
                    .unwrap_or_default();
                write!(
                    f,
                    "[E022] Node '{}' ({}) never produces outcome '{}'{}\n       Declared outcomes: {}",
                    node_id,
                    kind,
                    outcome,
                    suggestion,
                    join_or_none(declared_outcomes)
                )
            }
            ValidationError::DuplicateEdge {
                from_node,
                from_outcome,
            } => {
                write!(
                    f,
                    "[E023] Node '{}' has more than one edge for outcome '{}'",
                    from_node, from_outcome
                )
            }
        }
    }
}

impl std::error::Error for ValidationError {}

// ============================================================================
// Validation Warnings
// ============================================================================

/// Warnings that indicate potential issues but don't prevent compilation.
#[derive(Debug, Clone)]
#[allow(missing_docs)] // Fields are self-documenting from variant docs
pub enum ValidationWarning {
    /// Fork with a single branch behaves like a plain edge.
    SingleBranchFork { fork_id: String },
    /// Entry node config reads variables that cannot exist yet.
    EntryReferenceBinding { node_id: String, field: String },
    /// Fork branch has no path to any Join node.
    BranchNeverJoins { fork_id: String, target: String },
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationWarning::SingleBranchFork { fork_id } => {
                write!(
                    f,
                    "[W001] Fork '{}' has a single branch; a plain edge would do the same",
                    fork_id
                )
            }
            ValidationWarning::EntryReferenceBinding { node_id, field } => {
                write!(
                    f,
                    "[W002] Entry node '{}' binds '{}' to a variable reference without a default; variables are empty when an instance starts",
                    node_id, field
                )
            }
            ValidationWarning::BranchNeverJoins { fork_id, target } => {
                write!(
                    f,
                    "[W003] Fork '{}' branch starting at '{}' has no path to any Join; a wait-all join over this fork can never complete",
                    fork_id, target
                )
            }
        }
    }
}

// ============================================================================
// Name Resolution
// ============================================================================

/// Resolves edge targets given as node IDs or name aliases to node IDs.
#[derive(Debug, Default)]
pub(crate) struct TargetIndex {
    by_id: HashSet<String>,
    by_name: HashMap<String, String>,
}

impl TargetIndex {
    /// Resolve a target to a node ID. IDs win over name aliases.
    pub(crate) fn resolve<'a>(&'a self, target: &'a str) -> Option<&'a str> {
        if self.by_id.contains(target) {
            Some(target)
        } else {
            self.by_name.get(target).map(String::as_str)
        }
    }

    /// Every valid target: node IDs plus name aliases.
    pub(crate) fn available(&self) -> Vec<String> {
        let mut targets: Vec<String> = self.by_id.iter().cloned().collect();
        targets.extend(self.by_name.keys().cloned());
        targets.sort();
        targets.dedup();
        targets
    }
}

/// Build the target index, reporting duplicate name aliases.
pub(crate) fn build_target_index(
    doc: &WorkflowDocument,
) -> (TargetIndex, Vec<ValidationError>) {
    let mut index = TargetIndex {
        by_id: doc.nodes.keys().cloned().collect(),
        by_name: HashMap::new(),
    };
    let mut errors = Vec::new();
    let mut claimed: HashMap<String, Vec<String>> = HashMap::new();

    for (node_id, node) in &doc.nodes {
        if let Some(name) = node.name() {
            // A name equal to the node's own ID is redundant but harmless.
            if name == node_id {
                continue;
            }
            claimed
                .entry(name.to_string())
                .or_default()
                .push(node_id.clone());
        }
    }

    for (name, mut owners) in claimed {
        owners.sort();
        if owners.len() > 1 || index.by_id.contains(&name) {
            let mut node_ids = owners;
            if index.by_id.contains(&name) {
                node_ids.push(name.clone());
                node_ids.sort();
                node_ids.dedup();
            }
            errors.push(ValidationError::DuplicateNodeName { name, node_ids });
        } else {
            index.by_name.insert(name, owners.remove(0));
        }
    }

    (index, errors)
}

// ============================================================================
// Main Validation Function
// ============================================================================

/// Validate a workflow document against an activity catalog.
///
/// Returns a `ValidationResult` containing errors and warnings.
/// Compilation should fail if there are any errors.
pub fn validate_document(doc: &WorkflowDocument, catalog: &ActivityCatalog) -> ValidationResult {
    let mut result = ValidationResult::default();

    // Phase 1: Graph structure and name aliases
    let Some(index) = validate_structure(doc, &mut result) else {
        return result;
    };

    // Phase 2: Node-level checks
    validate_nodes(doc, catalog, &index, &mut result);

    // Phase 3: Edge checks
    validate_edges(doc, catalog, &index, &mut result);

    // Phase 4: Reachability
    validate_reachability(doc, &index, &mut result);

    // Phase 5: Binding warnings
    validate_bindings(doc, &mut result);

    result
}

// ============================================================================
// Phase 1: Graph Structure
// ============================================================================

fn validate_structure(
    doc: &WorkflowDocument,
    result: &mut ValidationResult,
) -> Option<TargetIndex> {
    if doc.nodes.is_empty() {
        result.errors.push(ValidationError::EmptyWorkflow);
        return None;
    }

    if !doc.nodes.contains_key(&doc.entry_point) {
        let mut available_nodes: Vec<String> = doc.nodes.keys().cloned().collect();
        available_nodes.sort();
        result.errors.push(ValidationError::EntryPointNotFound {
            entry_point: doc.entry_point.clone(),
            available_nodes,
        });
    }

    let (index, name_errors) = build_target_index(doc);
    result.errors.extend(name_errors);
    Some(index)
}

// ============================================================================
// Phase 2: Node Validation
// ============================================================================

fn validate_nodes(
    doc: &WorkflowDocument,
    catalog: &ActivityCatalog,
    index: &TargetIndex,
    result: &mut ValidationResult,
) {
    for (node_id, node) in &doc.nodes {
        match node {
            Node::Activity(activity) => {
                if !catalog.contains(&activity.kind) {
                    result.errors.push(ValidationError::UnknownActivityKind {
                        node_id: node_id.clone(),
                        kind: activity.kind.clone(),
                        available_kinds: catalog.kind_names(),
                    });
                }
            }
            Node::Fork(fork) => {
                if fork.branches.is_empty() {
                    result.errors.push(ValidationError::ForkWithoutBranches {
                        fork_id: node_id.clone(),
                    });
                } else if fork.branches.len() == 1 {
                    result.warnings.push(ValidationWarning::SingleBranchFork {
                        fork_id: node_id.clone(),
                    });
                }
                for target in &fork.branches {
                    if index.resolve(target).is_none() {
                        result.errors.push(ValidationError::ForkBranchNotFound {
                            fork_id: node_id.clone(),
                            target: target.clone(),
                            available_targets: index.available(),
                        });
                    }
                }
            }
            Node::Join(_) => {}
        }
    }
}

// ============================================================================
// Phase 3: Edge Validation
// ============================================================================

/// Outcomes a node can produce, for edge-label checking.
///
/// Returns `None` when the vocabulary is unknown (unregistered activity
/// kind), in which case the label check is skipped; the kind itself is
/// already reported as an error.
fn declared_outcomes(node: &Node, catalog: &ActivityCatalog) -> Option<Vec<String>> {
    match node {
        Node::Activity(activity) => catalog
            .outcomes(&activity.kind)
            .map(|outcomes| outcomes.to_vec()),
        // A fork transfers control to its branches and never completes a
        // node itself, so no edge may leave it.
        Node::Fork(_) => Some(Vec::new()),
        Node::Join(_) => Some(vec![OUTCOME_DONE.to_string()]),
    }
}

fn validate_edges(
    doc: &WorkflowDocument,
    catalog: &ActivityCatalog,
    index: &TargetIndex,
    result: &mut ValidationResult,
) {
    let mut seen: HashSet<(&str, &str)> = HashSet::new();

    for edge in &doc.edges {
        let DocumentEdge {
            from_node,
            from_outcome,
            to_node,
        } = edge;

        let Some(source) = doc.nodes.get(from_node) else {
            let mut available_nodes: Vec<String> = doc.nodes.keys().cloned().collect();
            available_nodes.sort();
            result.errors.push(ValidationError::EdgeSourceNotFound {
                from_node: from_node.clone(),
                available_nodes,
            });
            continue;
        };

        if index.resolve(to_node).is_none() {
            result.errors.push(ValidationError::EdgeTargetNotFound {
                from_node: from_node.clone(),
                to_node: to_node.clone(),
                available_targets: index.available(),
            });
        }

        if let Some(outcomes) = declared_outcomes(source, catalog)
            && !outcomes.iter().any(|o| o == from_outcome)
        {
            result.errors.push(ValidationError::OutcomeNotProducible {
                node_id: from_node.clone(),
                kind: match source {
                    Node::Activity(a) => a.kind.clone(),
                    other => other.type_name().to_string(),
                },
                outcome: from_outcome.clone(),
                declared_outcomes: outcomes,
            });
        }

        if !seen.insert((from_node.as_str(), from_outcome.as_str())) {
            result.errors.push(ValidationError::DuplicateEdge {
                from_node: from_node.clone(),
                from_outcome: from_outcome.clone(),
            });
        }
    }
}

// ============================================================================
// Phase 4: Reachability
// ============================================================================

fn validate_reachability(
    doc: &WorkflowDocument,
    index: &TargetIndex,
    result: &mut ValidationResult,
) {
    let adjacency = build_adjacency(doc, index);
    let reachable = reachable_from(&doc.entry_point, &adjacency);

    let mut unreachable: Vec<&String> = doc
        .nodes
        .keys()
        .filter(|node_id| !reachable.contains(node_id.as_str()))
        .collect();
    unreachable.sort();

    for node_id in unreachable {
        result.errors.push(ValidationError::UnreachableNode {
            node_id: node_id.clone(),
        });
    }

    // Branches that can never reach a join starve wait-all joins.
    for (node_id, node) in &doc.nodes {
        if let Node::Fork(fork) = node {
            for target in &fork.branches {
                let Some(entry) = index.resolve(target) else {
                    continue;
                };
                let from_branch = reachable_from(entry, &adjacency);
                let joins_reachable = from_branch
                    .iter()
                    .any(|id| matches!(doc.nodes.get(*id), Some(Node::Join(_))));
                if !joins_reachable {
                    result.warnings.push(ValidationWarning::BranchNeverJoins {
                        fork_id: node_id.clone(),
                        target: target.clone(),
                    });
                }
            }
        }
    }
}

/// Adjacency over resolved edges plus fork branch entries.
fn build_adjacency<'a>(
    doc: &'a WorkflowDocument,
    index: &'a TargetIndex,
) -> HashMap<&'a str, Vec<&'a str>> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();

    for edge in &doc.edges {
        if let Some(target) = index.resolve(&edge.to_node)
            && doc.nodes.contains_key(edge.from_node.as_str())
        {
            adjacency
                .entry(edge.from_node.as_str())
                .or_default()
                .push(target);
        }
    }

    for (node_id, node) in &doc.nodes {
        if let Node::Fork(fork) = node {
            for target in &fork.branches {
                if let Some(resolved) = index.resolve(target) {
                    adjacency.entry(node_id.as_str()).or_default().push(resolved);
                }
            }
        }
    }

    adjacency
}

/// Compute the set of nodes reachable from a starting node.
fn reachable_from<'a>(
    start: &'a str,
    adjacency: &HashMap<&'a str, Vec<&'a str>>,
) -> HashSet<&'a str> {
    let mut reachable = HashSet::new();
    let mut queue = vec![start];

    while let Some(node_id) = queue.pop() {
        if !reachable.insert(node_id) {
            continue;
        }
        if let Some(neighbors) = adjacency.get(node_id) {
            for neighbor in neighbors {
                if !reachable.contains(neighbor) {
                    queue.push(neighbor);
                }
            }
        }
    }

    reachable
}

// ============================================================================
// Phase 5: Binding Warnings
// ============================================================================

fn validate_bindings(doc: &WorkflowDocument, result: &mut ValidationResult) {
    let Some(Node::Activity(entry)) = doc.nodes.get(&doc.entry_point) else {
        return;
    };

    let mut fields: Vec<(&String, &BindingValue)> = entry.config.iter().collect();
    fields.sort_by_key(|(field, _)| field.as_str());

    for (field, value) in fields {
        if let BindingValue::Reference(reference) = value
            && reference.default.is_none()
        {
            result.warnings.push(ValidationWarning::EntryReferenceBinding {
                node_id: doc.entry_point.clone(),
                field: field.clone(),
            });
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}

/// Find the most similar candidate name, for "did you mean" hints.
fn suggest_name(target: &str, candidates: &[String]) -> Option<String> {
    let target_lower = target.to_lowercase();

    candidates
        .iter()
        .map(|candidate| {
            (
                candidate,
                edit_distance(&target_lower, &candidate.to_lowercase()),
            )
        })
        .filter(|(_, distance)| *distance <= target.len() / 2 + 2)
        .min_by_key(|(_, distance)| *distance)
        .map(|(candidate, _)| candidate.clone())
}

/// Levenshtein distance over chars, single-row DP.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{ActivityNode, ForkNode, JoinMode, JoinNode};
    use serde_json::json;

    fn activity(id: &str, kind: &str) -> Node {
        Node::Activity(ActivityNode {
            id: id.to_string(),
            name: None,
            kind: kind.to_string(),
            config: HashMap::new(),
        })
    }

    fn named_activity(id: &str, name: &str, kind: &str) -> Node {
        Node::Activity(ActivityNode {
            id: id.to_string(),
            name: Some(name.to_string()),
            kind: kind.to_string(),
            config: HashMap::new(),
        })
    }

    fn fork(id: &str, branches: &[&str]) -> Node {
        Node::Fork(ForkNode {
            id: id.to_string(),
            name: None,
            branches: branches.iter().map(|b| b.to_string()).collect(),
        })
    }

    fn join(id: &str, mode: JoinMode) -> Node {
        Node::Join(JoinNode {
            id: id.to_string(),
            name: None,
            mode,
        })
    }

    fn edge(from: &str, outcome: &str, to: &str) -> DocumentEdge {
        DocumentEdge {
            from_node: from.to_string(),
            from_outcome: outcome.to_string(),
            to_node: to.to_string(),
        }
    }

    fn doc(entry: &str, nodes: Vec<Node>, edges: Vec<DocumentEdge>) -> WorkflowDocument {
        WorkflowDocument {
            id: "test".to_string(),
            name: None,
            description: None,
            nodes: nodes.into_iter().map(|n| (n.id().to_string(), n)).collect(),
            entry_point: entry.to_string(),
            edges,
        }
    }

    fn catalog() -> ActivityCatalog {
        ActivityCatalog::new()
            .with("SetVariable", ["Done"])
            .with("ReceiveSignal", ["Done"])
            .with("Approval", ["Approved", "Rejected"])
    }

    // === Graph Structure Tests ===

    #[test]
    fn test_empty_workflow() {
        let doc = doc("start", vec![], vec![]);
        let result = validate_document(&doc, &catalog());
        assert!(result.has_errors());
        assert!(
            result
                .errors
                .iter()
                .any(|e| matches!(e, ValidationError::EmptyWorkflow))
        );
    }

    #[test]
    fn test_entry_point_not_found() {
        let doc = doc("missing", vec![activity("a", "SetVariable")], vec![]);
        let result = validate_document(&doc, &catalog());
        assert!(result.errors.iter().any(
            |e| matches!(e, ValidationError::EntryPointNotFound { entry_point, .. } if entry_point == "missing")
        ));
    }

    #[test]
    fn test_valid_linear_workflow() {
        let doc = doc(
            "a",
            vec![activity("a", "SetVariable"), activity("b", "SetVariable")],
            vec![edge("a", "Done", "b")],
        );
        let result = validate_document(&doc, &catalog());
        assert!(result.is_ok(), "unexpected errors: {:?}", result.errors);
    }

    #[test]
    fn test_unreachable_node() {
        let doc = doc(
            "a",
            vec![activity("a", "SetVariable"), activity("orphan", "SetVariable")],
            vec![],
        );
        let result = validate_document(&doc, &catalog());
        assert!(result.errors.iter().any(
            |e| matches!(e, ValidationError::UnreachableNode { node_id } if node_id == "orphan")
        ));
    }

    #[test]
    fn test_cycle_is_legal() {
        let doc = doc(
            "a",
            vec![activity("a", "SetVariable"), activity("b", "SetVariable")],
            vec![edge("a", "Done", "b"), edge("b", "Done", "a")],
        );
        let result = validate_document(&doc, &catalog());
        assert!(result.is_ok(), "cycles must pass: {:?}", result.errors);
    }

    // === Name Alias Tests ===

    #[test]
    fn test_duplicate_name_rejected() {
        let doc = doc(
            "a",
            vec![
                named_activity("a", "Reminder", "SetVariable"),
                named_activity("b", "Reminder", "SetVariable"),
            ],
            vec![edge("a", "Done", "b")],
        );
        let result = validate_document(&doc, &catalog());
        assert!(result.errors.iter().any(
            |e| matches!(e, ValidationError::DuplicateNodeName { name, .. } if name == "Reminder")
        ));
    }

    #[test]
    fn test_name_colliding_with_id_rejected() {
        let doc = doc(
            "a",
            vec![
                activity("a", "SetVariable"),
                named_activity("b", "a", "SetVariable"),
            ],
            vec![edge("a", "Done", "b")],
        );
        let result = validate_document(&doc, &catalog());
        assert!(
            result
                .errors
                .iter()
                .any(|e| matches!(e, ValidationError::DuplicateNodeName { name, .. } if name == "a"))
        );
    }

    #[test]
    fn test_edge_targets_name_alias() {
        let doc = doc(
            "a",
            vec![
                activity("a", "SetVariable"),
                named_activity("b", "Reminder", "SetVariable"),
            ],
            vec![edge("a", "Done", "Reminder"), edge("b", "Done", "a")],
        );
        let result = validate_document(&doc, &catalog());
        assert!(result.is_ok(), "unexpected errors: {:?}", result.errors);
    }

    // === Node Tests ===

    #[test]
    fn test_unknown_activity_kind_with_suggestion() {
        let doc = doc("a", vec![activity("a", "SetVariabel")], vec![]);
        let result = validate_document(&doc, &catalog());
        let rendered = result
            .errors
            .iter()
            .find(|e| matches!(e, ValidationError::UnknownActivityKind { .. }))
            .map(|e| e.to_string())
            .expect("expected unknown kind error");
        assert!(rendered.contains("[E010]"));
        assert!(rendered.contains("Did you mean 'SetVariable'?"));
    }

    #[test]
    fn test_fork_without_branches() {
        let doc = doc("f", vec![fork("f", &[])], vec![]);
        let result = validate_document(&doc, &catalog());
        assert!(
            result
                .errors
                .iter()
                .any(|e| matches!(e, ValidationError::ForkWithoutBranches { .. }))
        );
    }

    #[test]
    fn test_single_branch_fork_warns() {
        let doc = doc(
            "f",
            vec![
                fork("f", &["b"]),
                activity("b", "ReceiveSignal"),
                join("j", JoinMode::WaitAny),
            ],
            vec![edge("b", "Done", "j")],
        );
        let result = validate_document(&doc, &catalog());
        assert!(result.is_ok(), "unexpected errors: {:?}", result.errors);
        assert!(
            result
                .warnings
                .iter()
                .any(|w| matches!(w, ValidationWarning::SingleBranchFork { .. }))
        );
    }

    #[test]
    fn test_fork_branch_not_found() {
        let doc = doc("f", vec![fork("f", &["ghost"])], vec![]);
        let result = validate_document(&doc, &catalog());
        assert!(result.errors.iter().any(
            |e| matches!(e, ValidationError::ForkBranchNotFound { target, .. } if target == "ghost")
        ));
    }

    // === Edge Tests ===

    #[test]
    fn test_edge_source_not_found() {
        let doc = doc(
            "a",
            vec![activity("a", "SetVariable")],
            vec![edge("ghost", "Done", "a")],
        );
        let result = validate_document(&doc, &catalog());
        assert!(result.errors.iter().any(
            |e| matches!(e, ValidationError::EdgeSourceNotFound { from_node, .. } if from_node == "ghost")
        ));
    }

    #[test]
    fn test_edge_target_not_found() {
        let doc = doc(
            "a",
            vec![activity("a", "SetVariable")],
            vec![edge("a", "Done", "ghost")],
        );
        let result = validate_document(&doc, &catalog());
        assert!(result.errors.iter().any(
            |e| matches!(e, ValidationError::EdgeTargetNotFound { to_node, .. } if to_node == "ghost")
        ));
    }

    #[test]
    fn test_outcome_not_producible() {
        let doc = doc(
            "a",
            vec![activity("a", "Approval"), activity("b", "SetVariable")],
            vec![edge("a", "Maybe", "b"), edge("a", "Approved", "b")],
        );
        let result = validate_document(&doc, &catalog());
        assert!(result.errors.iter().any(|e| matches!(
            e,
            ValidationError::OutcomeNotProducible { outcome, .. } if outcome == "Maybe"
        )));
        // The second, producible edge must not trip the check.
        assert_eq!(
            result
                .errors
                .iter()
                .filter(|e| matches!(e, ValidationError::OutcomeNotProducible { .. }))
                .count(),
            1
        );
    }

    #[test]
    fn test_edge_from_fork_rejected() {
        let doc = doc(
            "f",
            vec![
                fork("f", &["b"]),
                activity("b", "ReceiveSignal"),
                join("j", JoinMode::WaitAll),
                activity("c", "SetVariable"),
            ],
            vec![
                edge("b", "Done", "j"),
                edge("f", "Done", "c"),
                edge("j", "Done", "c"),
            ],
        );
        let result = validate_document(&doc, &catalog());
        assert!(result.errors.iter().any(|e| matches!(
            e,
            ValidationError::OutcomeNotProducible { node_id, kind, .. }
                if node_id == "f" && kind == "Fork"
        )));
    }

    #[test]
    fn test_join_produces_done() {
        let doc = doc(
            "f",
            vec![
                fork("f", &["b", "c"]),
                activity("b", "ReceiveSignal"),
                activity("c", "ReceiveSignal"),
                join("j", JoinMode::WaitAll),
                activity("after", "SetVariable"),
            ],
            vec![
                edge("b", "Done", "j"),
                edge("c", "Done", "j"),
                edge("j", "Done", "after"),
            ],
        );
        let result = validate_document(&doc, &catalog());
        assert!(result.is_ok(), "unexpected errors: {:?}", result.errors);
    }

    #[test]
    fn test_duplicate_edge() {
        let doc = doc(
            "a",
            vec![
                activity("a", "Approval"),
                activity("b", "SetVariable"),
                activity("c", "SetVariable"),
            ],
            vec![
                edge("a", "Approved", "b"),
                edge("a", "Approved", "c"),
                edge("a", "Rejected", "c"),
            ],
        );
        let result = validate_document(&doc, &catalog());
        assert!(result.errors.iter().any(|e| matches!(
            e,
            ValidationError::DuplicateEdge { from_outcome, .. } if from_outcome == "Approved"
        )));
    }

    // === Warning Tests ===

    #[test]
    fn test_branch_never_joins_warning() {
        let doc = doc(
            "f",
            vec![
                fork("f", &["b", "c"]),
                activity("b", "ReceiveSignal"),
                activity("c", "ReceiveSignal"),
                join("j", JoinMode::WaitAll),
            ],
            vec![edge("b", "Done", "j")],
        );
        let result = validate_document(&doc, &catalog());
        assert!(result.warnings.iter().any(|w| matches!(
            w,
            ValidationWarning::BranchNeverJoins { target, .. } if target == "c"
        )));
    }

    #[test]
    fn test_entry_reference_binding_warning() {
        let mut config = HashMap::new();
        config.insert(
            "To".to_string(),
            BindingValue::reference("Document.Author.Email"),
        );
        config.insert(
            "Subject".to_string(),
            BindingValue::reference_or("Document.Title", json!("untitled")),
        );
        let node = Node::Activity(ActivityNode {
            id: "entry".to_string(),
            name: None,
            kind: "SetVariable".to_string(),
            config,
        });
        let doc = doc("entry", vec![node], vec![]);
        let result = validate_document(&doc, &catalog());
        // Only the default-less reference warns.
        let warnings: Vec<_> = result
            .warnings
            .iter()
            .filter(|w| matches!(w, ValidationWarning::EntryReferenceBinding { .. }))
            .collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].to_string().contains("'To'"));
    }

    // === Helper Function Tests ===

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("fork", "fork"), 0);
        assert_eq!(edit_distance("fork", "form"), 1);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("abc", ""), 3);
        assert_eq!(edit_distance("waitAll", "waitAny"), 2);
    }

    #[test]
    fn test_suggest_name() {
        let candidates = vec![
            "SetVariable".to_string(),
            "ReceiveSignal".to_string(),
            "Delay".to_string(),
        ];
        assert_eq!(
            suggest_name("SetVariabel", &candidates),
            Some("SetVariable".to_string())
        );
        assert_eq!(suggest_name("SomethingElseEntirely", &candidates), None);
    }

    #[test]
    fn test_error_codes_are_stable() {
        let rendered = ValidationError::EmptyWorkflow.to_string();
        assert!(rendered.starts_with("[E001]"));
        let rendered = ValidationError::UnreachableNode {
            node_id: "x".to_string(),
        }
        .to_string();
        assert!(rendered.starts_with("[E004]"));
        let rendered = ValidationWarning::SingleBranchFork {
            fork_id: "f".to_string(),
        }
        .to_string();
        assert!(rendered.starts_with("[W001]"));
    }
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Compiled workflow definitions.
//!
//! A [`WorkflowDefinition`] is the immutable, executable form of a
//! [`WorkflowDocument`]: validated, with every edge target and fork branch
//! resolved to a node ID. Name aliases exist only in documents; after
//! compilation the graph speaks IDs exclusively, so the scheduler never
//! resolves names at run time.

use crate::catalog::ActivityCatalog;
use crate::document::{InputBinding, JoinMode, Node, WorkflowDocument};
use crate::validation::{
    build_target_index, validate_document, ValidationError, ValidationWarning,
};
use std::collections::HashMap;

// ============================================================================
// Build Error
// ============================================================================

/// Compilation failure carrying every validation error found.
#[derive(Debug, Clone)]
pub struct BuildError {
    /// Hard errors that prevented compilation.
    pub errors: Vec<ValidationError>,
    /// Warnings collected alongside the errors.
    pub warnings: Vec<ValidationWarning>,
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "workflow failed validation with {} error(s):",
            self.errors.len()
        )?;
        for error in &self.errors {
            writeln!(f, "  {}", error)?;
        }
        for warning in &self.warnings {
            writeln!(f, "  {}", warning)?;
        }
        Ok(())
    }
}

impl std::error::Error for BuildError {}

// ============================================================================
// Compiled Nodes
// ============================================================================

/// A node in a compiled definition.
#[derive(Debug, Clone)]
pub enum NodeDef {
    /// Executable activity node.
    Activity(ActivityDef),
    /// Parallel split into branches.
    Fork(ForkDef),
    /// Merge point for fork branches.
    Join(JoinDef),
}

impl NodeDef {
    /// Node ID, unique within the definition.
    pub fn id(&self) -> &str {
        match self {
            NodeDef::Activity(a) => &a.id,
            NodeDef::Fork(o) => &o.id,
            NodeDef::Join(j) => &j.id,
        }
    }

    /// Optional display name.
    pub fn name(&self) -> Option<&str> {
        match self {
            NodeDef::Activity(a) => a.name.as_deref(),
            NodeDef::Fork(o) => o.name.as_deref(),
            NodeDef::Join(j) => j.name.as_deref(),
        }
    }
}

/// Compiled activity node.
#[derive(Debug, Clone)]
pub struct ActivityDef {
    /// Node ID.
    pub id: String,
    /// Optional display name.
    pub name: Option<String>,
    /// Registered activity kind, e.g. `"SetVariable"`.
    pub kind: String,
    /// Input bindings evaluated against instance variables at execution time.
    pub config: InputBinding,
}

/// Compiled fork node. Branch entries are resolved node IDs in declaration
/// order; that order decides the winner when a wait-any join sees several
/// branches arrive in the same tick.
#[derive(Debug, Clone)]
pub struct ForkDef {
    /// Node ID.
    pub id: String,
    /// Optional display name.
    pub name: Option<String>,
    /// Branch entry node IDs in declaration order.
    pub branches: Vec<String>,
}

/// Compiled join node.
#[derive(Debug, Clone)]
pub struct JoinDef {
    /// Node ID.
    pub id: String,
    /// Optional display name.
    pub name: Option<String>,
    /// Whether all branches or any single branch releases the join.
    pub mode: JoinMode,
}

// ============================================================================
// Workflow Definition
// ============================================================================

/// Immutable, validated, executable workflow graph.
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    id: String,
    name: Option<String>,
    entry_point: String,
    nodes: HashMap<String, NodeDef>,
    /// node ID -> outcome -> target node ID
    edges: HashMap<String, HashMap<String, String>>,
    warnings: Vec<ValidationWarning>,
}

impl WorkflowDefinition {
    /// Definition ID, used by instances to reference their graph.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Optional display name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// ID of the node where new instances start.
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Look up a node by ID.
    pub fn node(&self, node_id: &str) -> Option<&NodeDef> {
        self.nodes.get(node_id)
    }

    /// The node that follows `node_id` under `outcome`, if an edge exists.
    pub fn next_node(&self, node_id: &str, outcome: &str) -> Option<&str> {
        self.edges
            .get(node_id)
            .and_then(|by_outcome| by_outcome.get(outcome))
            .map(String::as_str)
    }

    /// Iterate over all nodes in no particular order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeDef> {
        self.nodes.values()
    }

    /// Number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Warnings collected during validation.
    pub fn warnings(&self) -> &[ValidationWarning] {
        &self.warnings
    }
}

// ============================================================================
// Compilation
// ============================================================================

/// Compile a document into an executable definition.
///
/// Runs full validation first and fails with every collected error if any
/// is fatal. On success, edge targets and fork branches given as name
/// aliases are resolved to node IDs.
pub fn compile(
    doc: &WorkflowDocument,
    catalog: &ActivityCatalog,
) -> Result<WorkflowDefinition, BuildError> {
    let result = validate_document(doc, catalog);
    if result.has_errors() {
        return Err(BuildError {
            errors: result.errors,
            warnings: result.warnings,
        });
    }

    let (index, _) = build_target_index(doc);

    let mut nodes = HashMap::with_capacity(doc.nodes.len());
    for (node_id, node) in &doc.nodes {
        // The map key is canonical; a stale inline ID cannot survive.
        let compiled = match node {
            Node::Activity(a) => NodeDef::Activity(ActivityDef {
                id: node_id.clone(),
                name: a.name.clone(),
                kind: a.kind.clone(),
                config: a.config.clone(),
            }),
            Node::Fork(o) => NodeDef::Fork(ForkDef {
                id: node_id.clone(),
                name: o.name.clone(),
                branches: o
                    .branches
                    .iter()
                    .map(|target| resolved(&index, target))
                    .collect(),
            }),
            Node::Join(j) => NodeDef::Join(JoinDef {
                id: node_id.clone(),
                name: j.name.clone(),
                mode: j.mode,
            }),
        };
        nodes.insert(node_id.clone(), compiled);
    }

    let mut edges: HashMap<String, HashMap<String, String>> = HashMap::new();
    for edge in &doc.edges {
        edges
            .entry(edge.from_node.clone())
            .or_default()
            .insert(edge.from_outcome.clone(), resolved(&index, &edge.to_node));
    }

    Ok(WorkflowDefinition {
        id: doc.id.clone(),
        name: doc.name.clone(),
        entry_point: doc.entry_point.clone(),
        nodes,
        edges,
        warnings: result.warnings,
    })
}

fn resolved(index: &crate::validation::TargetIndex, target: &str) -> String {
    // Validation guarantees every target resolves by the time we compile.
    index.resolve(target).unwrap_or(target).to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::parse_document;
    use serde_json::json;

    fn catalog() -> ActivityCatalog {
        ActivityCatalog::new()
            .with("HttpEndpoint", ["Done"])
            .with("SetVariable", ["Done"])
            .with("ReceiveSignal", ["Done"])
            .with("Delay", ["Done"])
            .with("HttpResponse", ["Done"])
    }

    fn approval_doc() -> WorkflowDocument {
        parse_document(&json!({
            "id": "document-approval",
            "name": "Document Approval",
            "entryPoint": "receive",
            "nodes": {
                "receive": {
                    "nodeType": "Activity",
                    "id": "receive",
                    "kind": "HttpEndpoint",
                    "config": {
                        "Path": { "valueType": "immediate", "value": "/documents" }
                    }
                },
                "store": {
                    "nodeType": "Activity",
                    "id": "store",
                    "name": "Store Document",
                    "kind": "SetVariable",
                    "config": {
                        "Name": { "valueType": "immediate", "value": "Document" },
                        "Value": { "valueType": "reference", "value": "Input.Body" }
                    }
                },
                "fork": {
                    "nodeType": "Fork",
                    "id": "fork",
                    "branches": ["approve", "reject", "remind"]
                },
                "approve": { "nodeType": "Activity", "id": "approve", "kind": "ReceiveSignal",
                             "config": { "Signal": { "valueType": "immediate", "value": "Approve" } } },
                "reject": { "nodeType": "Activity", "id": "reject", "kind": "ReceiveSignal",
                            "config": { "Signal": { "valueType": "immediate", "value": "Reject" } } },
                "remind": { "nodeType": "Activity", "id": "remind", "name": "Reminder", "kind": "Delay",
                            "config": { "Seconds": { "valueType": "immediate", "value": 60 } } },
                "join": { "nodeType": "Join", "id": "join", "mode": "waitAny" },
                "respond": { "nodeType": "Activity", "id": "respond", "kind": "HttpResponse",
                             "config": { "Body": { "valueType": "immediate", "value": "Thanks for the hard work!" } } }
            },
            "edges": [
                { "fromNode": "receive", "fromOutcome": "Done", "toNode": "store" },
                { "fromNode": "store", "fromOutcome": "Done", "toNode": "fork" },
                { "fromNode": "approve", "fromOutcome": "Done", "toNode": "join" },
                { "fromNode": "reject", "fromOutcome": "Done", "toNode": "join" },
                { "fromNode": "remind", "fromOutcome": "Done", "toNode": "Reminder" },
                { "fromNode": "join", "fromOutcome": "Done", "toNode": "respond" }
            ]
        }))
        .expect("document should parse")
    }

    #[test]
    fn test_compile_approval_workflow() {
        let definition = compile(&approval_doc(), &catalog()).expect("should compile");
        assert_eq!(definition.id(), "document-approval");
        assert_eq!(definition.entry_point(), "receive");
        assert_eq!(definition.node_count(), 8);
        assert_eq!(definition.next_node("receive", "Done"), Some("store"));
        assert_eq!(definition.next_node("join", "Done"), Some("respond"));
        assert_eq!(definition.next_node("respond", "Done"), None);
    }

    #[test]
    fn test_compile_resolves_name_alias_to_id() {
        let definition = compile(&approval_doc(), &catalog()).expect("should compile");
        // The reminder loop edge targets the name "Reminder" in the
        // document; the compiled graph must speak IDs.
        assert_eq!(definition.next_node("remind", "Done"), Some("remind"));
    }

    #[test]
    fn test_compile_preserves_branch_order() {
        let definition = compile(&approval_doc(), &catalog()).expect("should compile");
        let Some(NodeDef::Fork(fork)) = definition.node("fork") else {
            panic!("expected fork node");
        };
        assert_eq!(fork.branches, vec!["approve", "reject", "remind"]);
    }

    #[test]
    fn test_compile_rejects_invalid_document() {
        let doc = parse_document(&json!({
            "id": "broken",
            "entryPoint": "missing",
            "nodes": {
                "a": { "nodeType": "Activity", "id": "a", "kind": "NoSuchKind", "config": {} }
            }
        }))
        .expect("document should parse");

        let err = compile(&doc, &catalog()).expect_err("should fail validation");
        // Bad entry point, unknown kind, and the node left unreachable by
        // the bad entry point are all reported together.
        assert_eq!(err.errors.len(), 3);
        let rendered = err.to_string();
        assert!(rendered.contains("[E002]"));
        assert!(rendered.contains("[E004]"));
        assert!(rendered.contains("[E010]"));
    }

    #[test]
    fn test_compiled_join_mode() {
        let definition = compile(&approval_doc(), &catalog()).expect("should compile");
        let Some(NodeDef::Join(join)) = definition.node("join") else {
            panic!("expected join node");
        };
        assert_eq!(join.mode, JoinMode::WaitAny);
    }
}

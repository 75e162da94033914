// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workflow document types - the declarative source form.
//!
//! A [`WorkflowDocument`] is what a visual designer or a JSON file produces:
//! a map of nodes, an entry point, and labeled edges. Documents are inert
//! data; they become executable only after compilation into a
//! [`WorkflowDefinition`](crate::WorkflowDefinition), which validates the
//! graph against an activity catalog.
//!
//! Example:
//! ```json
//! {
//!   "id": "document-approval",
//!   "entryPoint": "receive",
//!   "nodes": {
//!     "receive": { "nodeType": "Activity", "id": "receive", "kind": "HttpEndpoint",
//!                  "config": { "Path": { "valueType": "immediate", "value": "/v1/documents" } } },
//!     "fan-out": { "nodeType": "Fork", "id": "fan-out", "branches": ["approve", "reject"] }
//!   },
//!   "edges": [
//!     { "fromNode": "receive", "fromOutcome": "Done", "toNode": "fan-out" }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Outcome name every activity can emit on plain success.
///
/// Activities with richer vocabularies (branching, faults resolved into
/// outcomes) declare additional names; `Done` is the conventional default
/// that sequential edges are labeled with.
pub const OUTCOME_DONE: &str = "Done";

// ============================================================================
// Root Types
// ============================================================================

/// Complete workflow document, the unit a definition is compiled from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDocument {
    /// Unique definition identifier, referenced by workflow instances.
    pub id: String,

    /// Human-readable workflow name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Detailed description of what the workflow does.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Map of node IDs to node definitions.
    pub nodes: HashMap<String, Node>,

    /// ID of the node execution starts at.
    pub entry_point: String,

    /// Labeled transitions between nodes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<DocumentEdge>,
}

/// A single transition in the workflow graph.
///
/// The edge fires when `from_node` finishes with the outcome named by
/// `from_outcome`. Targets may name a node by ID or by its unique `name`
/// alias; the compiler resolves aliases to IDs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentEdge {
    /// Source node ID.
    pub from_node: String,

    /// Outcome name that triggers this transition.
    pub from_outcome: String,

    /// Target node ID or name alias.
    pub to_node: String,
}

// ============================================================================
// Node Types
// ============================================================================

/// Union of all node types, discriminated by the nodeType field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "nodeType")]
pub enum Node {
    /// Executes a registered activity.
    Activity(ActivityNode),

    /// Splits execution into parallel branches.
    Fork(ForkNode),

    /// Reunites branches created by a Fork.
    Join(JoinNode),
}

impl Node {
    /// Node ID regardless of variant.
    pub fn id(&self) -> &str {
        match self {
            Node::Activity(n) => &n.id,
            Node::Fork(n) => &n.id,
            Node::Join(n) => &n.id,
        }
    }

    /// Optional name alias regardless of variant.
    pub fn name(&self) -> Option<&str> {
        match self {
            Node::Activity(n) => n.name.as_deref(),
            Node::Fork(n) => n.name.as_deref(),
            Node::Join(n) => n.name.as_deref(),
        }
    }

    /// Node type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Node::Activity(_) => "Activity",
            Node::Fork(_) => "Fork",
            Node::Join(_) => "Join",
        }
    }
}

/// Executes a registered activity kind with a configured input binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityNode {
    /// Unique node identifier.
    pub id: String,

    /// Optional name alias, usable as an edge target (loops jump here).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Activity kind to execute (e.g. "SetVariable", "ReceiveSignal").
    pub kind: String,

    /// Configuration bindings evaluated against instance state at run time.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub config: InputBinding,
}

/// Splits execution into one parallel branch per listed target.
///
/// Branch order is declaration order; it decides the deterministic winner
/// when a wait-any join sees several branches arrive in the same tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkNode {
    /// Unique node identifier.
    pub id: String,

    /// Optional name alias.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Entry node of each branch, in declaration order.
    pub branches: Vec<String>,
}

/// Reunites branches created by a Fork, according to its mode.
///
/// A completed Join emits the `Done` outcome on the surviving flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinNode {
    /// Unique node identifier.
    pub id: String,

    /// Optional name alias.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Completion mode.
    pub mode: JoinMode,
}

/// Completion policy for a Join node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JoinMode {
    /// Completes once every sibling branch has arrived.
    WaitAll,
    /// Completes on the first arrival and cancels the remaining siblings.
    WaitAny,
}

impl JoinMode {
    /// Get as string.
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinMode::WaitAll => "waitAll",
            JoinMode::WaitAny => "waitAny",
        }
    }
}

impl std::fmt::Display for JoinMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Input Bindings
// ============================================================================

/// Maps configuration field names to binding values.
///
/// Example:
/// ```json
/// {
///   "VariableName": { "valueType": "immediate", "value": "Document" },
///   "To": { "valueType": "reference", "value": "Document.Author.Email" }
/// }
/// ```
pub type InputBinding = HashMap<String, BindingValue>;

/// How a configuration field obtains its value.
///
/// Uses an explicit `valueType` discriminator:
/// - `immediate`: the value is a literal (string, number, boolean, object, array)
/// - `reference`: the value is a dot path into instance variables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "valueType", rename_all = "lowercase")]
pub enum BindingValue {
    /// Immediate/literal value.
    Immediate(ImmediateBinding),

    /// Reference to instance variables at a dot path.
    Reference(ReferenceBinding),
}

/// An immediate (literal) value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImmediateBinding {
    /// The literal value.
    pub value: serde_json::Value,
}

/// A reference into instance variables.
///
/// Paths use dot notation rooted at the variable map, e.g.
/// `"Document.Author.Name"` reads field `Name` inside field `Author` of
/// variable `Document`. Resolution of a missing path is an error unless a
/// default is declared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceBinding {
    /// Dot path into instance variables.
    pub value: String,

    /// Fallback used when the path does not resolve.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl BindingValue {
    /// Build an immediate binding from a literal value.
    pub fn immediate(value: impl Into<serde_json::Value>) -> Self {
        BindingValue::Immediate(ImmediateBinding {
            value: value.into(),
        })
    }

    /// Build a reference binding for a dot path.
    pub fn reference(path: impl Into<String>) -> Self {
        BindingValue::Reference(ReferenceBinding {
            value: path.into(),
            default: None,
        })
    }

    /// Build a reference binding with a fallback value.
    pub fn reference_or(path: impl Into<String>, default: impl Into<serde_json::Value>) -> Self {
        BindingValue::Reference(ReferenceBinding {
            value: path.into(),
            default: Some(default.into()),
        })
    }

    /// Check if this is a reference (dynamic data lookup).
    pub fn is_reference(&self) -> bool {
        matches!(self, BindingValue::Reference(_))
    }

    /// Check if this is an immediate (static/literal) value.
    pub fn is_immediate(&self) -> bool {
        matches!(self, BindingValue::Immediate(_))
    }

    /// Get the path if this is a reference.
    pub fn as_reference_path(&self) -> Option<&str> {
        match self {
            BindingValue::Reference(r) => Some(&r.value),
            _ => None,
        }
    }

    /// Get the value if this is an immediate.
    pub fn as_immediate_value(&self) -> Option<&serde_json::Value> {
        match self {
            BindingValue::Immediate(i) => Some(&i.value),
            _ => None,
        }
    }
}

// ============================================================================
// Parsing Functions
// ============================================================================

/// Parse a workflow document from a JSON value.
pub fn parse_document(json: &serde_json::Value) -> Result<WorkflowDocument, String> {
    serde_json::from_value(json.clone())
        .map_err(|e| format!("Failed to parse workflow document: {}", e))
}

// ============================================================================
// Tests
// ============================================================================

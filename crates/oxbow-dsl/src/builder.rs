// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Fluent workflow construction.
//!
//! [`WorkflowBuilder`] assembles a [`WorkflowDocument`] in code and compiles
//! it through the same validation pipeline as parsed documents. The two
//! paths produce identical definitions; the builder is just nicer to write
//! in Rust:
//!
//! ```
//! use oxbow_dsl::{ActivityCatalog, BindingValue, JoinMode, WorkflowBuilder};
//!
//! let catalog = ActivityCatalog::new()
//!     .with("ReceiveSignal", ["Done"])
//!     .with("SetVariable", ["Done"]);
//!
//! let definition = WorkflowBuilder::new("greeting")
//!     .activity("wait", "ReceiveSignal", [("Signal", BindingValue::immediate("Go"))])
//!     .activity("greet", "SetVariable", [
//!         ("Name", BindingValue::immediate("Greeting")),
//!         ("Value", BindingValue::immediate("hello")),
//!     ])
//!     .then("wait", "greet")
//!     .build(&catalog)
//!     .expect("workflow should validate");
//!
//! assert_eq!(definition.entry_point(), "wait");
//! # let _ = JoinMode::WaitAll;
//! ```

use crate::catalog::ActivityCatalog;
use crate::definition::{compile, BuildError, WorkflowDefinition};
use crate::document::{
    ActivityNode, BindingValue, DocumentEdge, ForkNode, InputBinding, JoinMode, JoinNode, Node,
    WorkflowDocument, OUTCOME_DONE,
};
use crate::validation::ValidationError;
use std::collections::HashMap;

/// Fluent builder for workflow definitions.
#[derive(Debug, Default)]
pub struct WorkflowBuilder {
    id: String,
    name: Option<String>,
    description: Option<String>,
    entry_point: Option<String>,
    nodes: Vec<Node>,
    edges: Vec<DocumentEdge>,
}

impl WorkflowBuilder {
    /// Start a builder for a workflow with the given ID.
    pub fn new(id: impl Into<String>) -> Self {
        WorkflowBuilder {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Set the display name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the entry point explicitly. Defaults to the first node added.
    pub fn entry_point(mut self, node_id: impl Into<String>) -> Self {
        self.entry_point = Some(node_id.into());
        self
    }

    /// Add an activity node.
    pub fn activity<F, V>(
        self,
        id: impl Into<String>,
        kind: impl Into<String>,
        config: impl IntoIterator<Item = (F, V)>,
    ) -> Self
    where
        F: Into<String>,
        V: Into<BindingValue>,
    {
        self.activity_node(id, None, kind, config)
    }

    /// Add an activity node with a name alias, so edges can target it by
    /// name (loops back to a reminder read better than loops to `"n7"`).
    pub fn activity_named<F, V>(
        self,
        id: impl Into<String>,
        name: impl Into<String>,
        kind: impl Into<String>,
        config: impl IntoIterator<Item = (F, V)>,
    ) -> Self
    where
        F: Into<String>,
        V: Into<BindingValue>,
    {
        self.activity_node(id, Some(name.into()), kind, config)
    }

    fn activity_node<F, V>(
        mut self,
        id: impl Into<String>,
        name: Option<String>,
        kind: impl Into<String>,
        config: impl IntoIterator<Item = (F, V)>,
    ) -> Self
    where
        F: Into<String>,
        V: Into<BindingValue>,
    {
        let config: InputBinding = config
            .into_iter()
            .map(|(field, value)| (field.into(), value.into()))
            .collect();
        self.nodes.push(Node::Activity(ActivityNode {
            id: id.into(),
            name,
            kind: kind.into(),
            config,
        }));
        self
    }

    /// Add a fork node. Branch order is declaration order and decides the
    /// winner when a wait-any join sees several arrivals in one tick.
    pub fn fork<B>(mut self, id: impl Into<String>, branches: impl IntoIterator<Item = B>) -> Self
    where
        B: Into<String>,
    {
        self.nodes.push(Node::Fork(ForkNode {
            id: id.into(),
            name: None,
            branches: branches.into_iter().map(Into::into).collect(),
        }));
        self
    }

    /// Add a join node.
    pub fn join(mut self, id: impl Into<String>, mode: JoinMode) -> Self {
        self.nodes.push(Node::Join(JoinNode {
            id: id.into(),
            name: None,
            mode,
        }));
        self
    }

    /// Connect two nodes under an outcome label. The target may be a node
    /// ID or a name alias.
    pub fn edge(
        mut self,
        from: impl Into<String>,
        outcome: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        self.edges.push(DocumentEdge {
            from_node: from.into(),
            from_outcome: outcome.into(),
            to_node: to.into(),
        });
        self
    }

    /// Connect two nodes under the default `"Done"` outcome.
    pub fn then(self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edge(from, OUTCOME_DONE, to)
    }

    /// Produce the document form without compiling it.
    pub fn into_document(self) -> Result<WorkflowDocument, BuildError> {
        let entry_point = self
            .entry_point
            .or_else(|| self.nodes.first().map(|n| n.id().to_string()))
            .unwrap_or_default();

        let mut nodes: HashMap<String, Node> = HashMap::with_capacity(self.nodes.len());
        let mut duplicates = Vec::new();
        for node in self.nodes {
            let node_id = node.id().to_string();
            if nodes.contains_key(&node_id) {
                duplicates.push(ValidationError::DuplicateNodeId { node_id });
            } else {
                nodes.insert(node_id, node);
            }
        }
        if !duplicates.is_empty() {
            return Err(BuildError {
                errors: duplicates,
                warnings: Vec::new(),
            });
        }

        Ok(WorkflowDocument {
            id: self.id,
            name: self.name,
            description: self.description,
            nodes,
            entry_point,
            edges: self.edges,
        })
    }

    /// Validate and compile into an executable definition.
    pub fn build(self, catalog: &ActivityCatalog) -> Result<WorkflowDefinition, BuildError> {
        let document = self.into_document()?;
        compile(&document, catalog)
    }
}

// ============================================================================
// Tests
// ============================================================================

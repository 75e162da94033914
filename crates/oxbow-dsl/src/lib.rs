// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workflow Definition Model - Single Source of Truth
//!
//! This crate defines the workflow graph types used throughout the codebase:
//! - Runtime deserialization of workflow documents (JSON)
//! - Fluent builder for constructing workflows in Rust
//! - Build-time validation with coded errors and warnings
//! - Compiled, immutable definitions the engine executes
//!
//! Documents and definitions are deliberately separate: a document carries
//! name aliases and may be structurally wrong, while a
//! [`WorkflowDefinition`] only exists after validation and speaks node IDs
//! exclusively. Input bindings are declarative values resolved against
//! instance variables at execution time, never at build time.

#![deny(missing_docs)]

// Document model (JSON-facing workflow graphs)
pub mod document;

// Activity kind catalog (outcome vocabularies for validation)
pub mod catalog;

// Build-time validation
pub mod validation;

// Compiled definitions
pub mod definition;

// Fluent construction
pub mod builder;

pub use builder::WorkflowBuilder;
pub use catalog::{ActivityCatalog, ActivityDescriptor};
pub use definition::{
    compile, ActivityDef, BuildError, ForkDef, JoinDef, NodeDef, WorkflowDefinition,
};
pub use document::{
    parse_document, ActivityNode, BindingValue, DocumentEdge, ForkNode, ImmediateBinding,
    InputBinding, JoinMode, JoinNode, Node, ReferenceBinding, WorkflowDocument, OUTCOME_DONE,
};
pub use validation::{
    validate_document, ValidationError, ValidationResult, ValidationWarning,
};

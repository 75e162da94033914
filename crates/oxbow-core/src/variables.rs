// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Instance variables and input binding evaluation.
//!
//! Variables are a flat map of named JSON values scoped to one workflow
//! instance. Reads use dotted paths: the first segment names a variable,
//! the rest walk object fields (or array indices). Lookups are strict; a
//! missing variable or field is [`EngineError::FieldNotFound`], never a
//! silent null. A reference binding with a declared default is the one way
//! to opt out of that strictness.
//!
//! Binding evaluation happens when the scheduler is about to execute a
//! node, against the variables as they are at that moment. Definitions
//! stay pure data; nothing is resolved at build time.

use crate::error::{EngineError, Result};
use oxbow_dsl::{BindingValue, InputBinding};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Named JSON values scoped to a workflow instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Variables {
    values: serde_json::Map<String, Value>,
}

impl Variables {
    /// Create an empty variable map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable, replacing any previous value under the same name.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Remove a variable, returning its previous value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    /// Get a variable by exact name (no path traversal).
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Whether a variable with this exact name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Resolve a dotted path like `Document.Author.Name`.
    ///
    /// The first segment is a variable name; remaining segments index into
    /// objects by field or arrays by position. Any miss along the way
    /// fails with the full path, so error messages point at what the
    /// workflow author wrote rather than at an intermediate step.
    pub fn lookup(&self, path: &str) -> Result<&Value> {
        let not_found = || EngineError::FieldNotFound {
            path: path.to_string(),
        };

        let mut segments = path.split('.');
        let root = segments.next().filter(|s| !s.is_empty()).ok_or_else(not_found)?;
        let mut current = self.values.get(root).ok_or_else(not_found)?;

        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment).ok_or_else(not_found)?,
                Value::Array(items) => {
                    let index: usize = segment.parse().map_err(|_| not_found())?;
                    items.get(index).ok_or_else(not_found)?
                }
                _ => return Err(not_found()),
            };
        }

        Ok(current)
    }

    /// Evaluate one binding against the current variables.
    ///
    /// Immediate bindings pass their value through. Reference bindings
    /// resolve their path, falling back to the declared default when the
    /// path is missing and a default exists.
    pub fn evaluate(&self, binding: &BindingValue) -> Result<Value> {
        match binding {
            BindingValue::Immediate(immediate) => Ok(immediate.value.clone()),
            BindingValue::Reference(reference) => match self.lookup(&reference.value) {
                Ok(value) => Ok(value.clone()),
                Err(EngineError::FieldNotFound { .. }) if reference.default.is_some() => {
                    Ok(reference.default.clone().unwrap_or(Value::Null))
                }
                Err(err) => Err(err),
            },
        }
    }

    /// Evaluate a node's whole config into concrete values.
    pub fn evaluate_config(&self, config: &InputBinding) -> Result<HashMap<String, Value>> {
        let mut evaluated = HashMap::with_capacity(config.len());
        for (field, binding) in config {
            evaluated.insert(field.clone(), self.evaluate(binding)?);
        }
        Ok(evaluated)
    }

    /// The variables as one JSON object, for storage.
    pub fn as_json(&self) -> Value {
        Value::Object(self.values.clone())
    }

    /// Iterate over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

impl From<serde_json::Map<String, Value>> for Variables {
    fn from(values: serde_json::Map<String, Value>) -> Self {
        Variables { values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document_variables() -> Variables {
        let mut variables = Variables::new();
        variables.set(
            "Document",
            json!({
                "Id": 3,
                "Author": { "Name": "John" },
                "Tags": ["draft", "internal"]
            }),
        );
        variables.set("Count", json!(2));
        variables
    }

    #[test]
    fn test_lookup_root_variable() {
        let variables = document_variables();
        assert_eq!(variables.lookup("Count").unwrap(), &json!(2));
    }

    #[test]
    fn test_lookup_nested_field() {
        let variables = document_variables();
        assert_eq!(
            variables.lookup("Document.Author.Name").unwrap(),
            &json!("John")
        );
    }

    #[test]
    fn test_lookup_array_index() {
        let variables = document_variables();
        assert_eq!(variables.lookup("Document.Tags.1").unwrap(), &json!("internal"));
    }

    #[test]
    fn test_lookup_missing_variable_fails_with_full_path() {
        let variables = document_variables();
        let err = variables.lookup("Missing.Field").unwrap_err();
        assert!(
            matches!(err, EngineError::FieldNotFound { ref path } if path == "Missing.Field")
        );
    }

    #[test]
    fn test_lookup_missing_field_fails() {
        let variables = document_variables();
        let err = variables.lookup("Document.Author.Email").unwrap_err();
        assert_eq!(err.error_code(), "FIELD_NOT_FOUND");
    }

    #[test]
    fn test_lookup_through_scalar_fails() {
        let variables = document_variables();
        assert!(variables.lookup("Count.Anything").is_err());
    }

    #[test]
    fn test_lookup_array_out_of_bounds_fails() {
        let variables = document_variables();
        assert!(variables.lookup("Document.Tags.9").is_err());
    }

    #[test]
    fn test_null_field_is_found() {
        let mut variables = Variables::new();
        variables.set("Maybe", json!({ "Value": null }));
        // Present-but-null is a successful lookup, not a miss.
        assert_eq!(variables.lookup("Maybe.Value").unwrap(), &Value::Null);
    }

    #[test]
    fn test_evaluate_immediate() {
        let variables = Variables::new();
        let value = variables
            .evaluate(&BindingValue::immediate("hello"))
            .unwrap();
        assert_eq!(value, json!("hello"));
    }

    #[test]
    fn test_evaluate_reference() {
        let variables = document_variables();
        let value = variables
            .evaluate(&BindingValue::reference("Document.Id"))
            .unwrap();
        assert_eq!(value, json!(3));
    }

    #[test]
    fn test_evaluate_reference_default_on_miss() {
        let variables = document_variables();
        let value = variables
            .evaluate(&BindingValue::reference_or("Document.Title", "untitled"))
            .unwrap();
        assert_eq!(value, json!("untitled"));
    }

    #[test]
    fn test_evaluate_reference_without_default_propagates() {
        let variables = document_variables();
        let err = variables
            .evaluate(&BindingValue::reference("Document.Title"))
            .unwrap_err();
        assert_eq!(err.error_code(), "FIELD_NOT_FOUND");
    }

    #[test]
    fn test_evaluate_config() {
        let variables = document_variables();
        let mut config = InputBinding::new();
        config.insert("Name".to_string(), BindingValue::immediate("AuthorName"));
        config.insert(
            "Value".to_string(),
            BindingValue::reference("Document.Author.Name"),
        );

        let evaluated = variables.evaluate_config(&config).unwrap();
        assert_eq!(evaluated["Name"], json!("AuthorName"));
        assert_eq!(evaluated["Value"], json!("John"));
    }

    #[test]
    fn test_round_trips_through_json() {
        let variables = document_variables();
        let serialized = serde_json::to_value(&variables).unwrap();
        let restored: Variables = serde_json::from_value(serialized).unwrap();
        assert_eq!(restored, variables);
    }
}

//! Failure representation shared by every generation rule.
//!
//! A `Failure` is born at the failing site with an empty path; enclosing
//! checks push their accessor while the failure unwinds, so the path reads
//! leaf-to-root until the orchestrator reverses it once during wrapping.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::value::{Value, json_quote};

#[derive(Debug, Clone, PartialEq)]
pub enum PathPart {
    Index(usize),
    Field(String),
}

/// Raw validation mismatch, as produced inside compiled checks.
#[derive(Debug, Clone)]
pub struct Failure {
    pub bad_value: Value,
    /// Leaf-to-root while unwinding; reversed once at the wrapping boundary.
    pub path: Vec<PathPart>,
    pub expression: String,
}

impl Failure {
    pub fn new(bad_value: &Value, expression: impl Into<String>) -> Self {
        Failure {
            bad_value: bad_value.clone(),
            path: Vec::new(),
            expression: expression.into(),
        }
    }

    pub fn push_index(mut self, index: usize) -> Self {
        self.path.push(PathPart::Index(index));
        self
    }

    pub fn push_field(mut self, field: impl Into<String>) -> Self {
        self.path.push(PathPart::Field(field.into()));
        self
    }
}

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("identifier regex"));

pub(crate) fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

pub(crate) fn render_path(root: &str, path: &[PathPart]) -> String {
    let mut out = String::from(root);
    for part in path {
        match part {
            PathPart::Index(i) => out.push_str(&format!("[{i}]")),
            PathPart::Field(name) => {
                if is_valid_identifier(name) {
                    out.push('.');
                    out.push_str(name);
                } else {
                    out.push_str(&format!("[{}]", json_quote(name)));
                }
            }
        }
    }
    out
}

/// A single first-encountered mismatch with its full root-to-leaf access path.
#[derive(Debug, Clone, Error)]
#[error(
    "validation failed: bad value at path {} (of kind {}): failed at expression {expression}",
    render_path(.root_name, .path),
    .bad_value.kind_name()
)]
pub struct ValidationError {
    pub bad_value: Value,
    /// Root-to-leaf.
    pub path: Vec<PathPart>,
    pub expression: String,
    /// The value the whole check started from.
    pub source_value: Value,
    /// Name the path is rendered under; "value" unless re-rooted.
    pub root_name: String,
}

impl ValidationError {
    pub(crate) fn from_failure(mut failure: Failure, source: &Value) -> Self {
        failure.path.reverse();
        ValidationError {
            bad_value: failure.bad_value,
            path: failure.path,
            expression: failure.expression,
            source_value: source.clone(),
            root_name: "value".into(),
        }
    }

    pub fn path_string(&self) -> String {
        render_path(&self.root_name, &self.path)
    }

    pub fn with_root_name(mut self, name: impl Into<String>) -> Self {
        self.root_name = name.into();
        self
    }
}

/// Generation could not produce valid checking logic. Fatal for the build;
/// never conflated with a validation failure.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to build validator: checking of class instances is disabled; class is {class}")]
    ClassInstancesDisabled { class: String },

    #[error("failed to assemble validator: {reason}; fragments are:\n{listing}")]
    Assemble { reason: String, listing: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_render_with_dot_or_bracket_access() {
        let path = vec![
            PathPart::Field("a".into()),
            PathPart::Index(3),
            PathPart::Field("b c".into()),
        ];
        assert_eq!(render_path("value", &path), r#"value.a[3]["b c"]"#);
    }

    #[test]
    fn failure_unwinds_leaf_to_root_and_wrapping_reverses() {
        let failure = Failure::new(&Value::Null, "!is_number(value)")
            .push_field("x")
            .push_index(2);
        let err = ValidationError::from_failure(failure, &Value::Null);
        assert_eq!(err.path_string(), "value[2].x");
        let msg = err.to_string();
        assert!(msg.contains("value[2].x"), "{msg}");
        assert!(msg.contains("!is_number(value)"), "{msg}");
    }

    #[test]
    fn rerooting_changes_only_the_rendered_root() {
        let failure = Failure::new(&Value::Undefined, "expr").push_field("x");
        let err = ValidationError::from_failure(failure, &Value::Undefined)
            .with_root_name("arguments");
        assert_eq!(err.path_string(), "arguments.x");
    }
}

//! Declarative value shapes.
//!
//! A schema checks a raw `serde_json::Value` and either accepts it or reports
//! every offending field, so a single bad payload produces one error listing
//! all of its problems rather than the first one serde trips over.

use std::fmt;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Primitive kind a field must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Number,
    String,
    Bool,
}

impl FieldKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Number => value.is_number(),
            FieldKind::String => value.is_string(),
            FieldKind::Bool => value.is_boolean(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FieldKind::Integer => "integer",
            FieldKind::Number => "number",
            FieldKind::String => "string",
            FieldKind::Bool => "boolean",
        }
    }
}

/// Name of the JSON kind actually present, for error messages.
fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSchema {
    pub name: &'static str,
    pub kind: FieldKind,
}

/// An object whose declared fields are all required. Undeclared fields are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectSchema {
    pub name: &'static str,
    pub fields: &'static [FieldSchema],
}

impl ObjectSchema {
    fn collect_issues(&self, value: &Value, path: &str, issues: &mut Vec<FieldIssue>) {
        let Some(object) = value.as_object() else {
            issues.push(FieldIssue::new(path_or_root(path), "object", value));
            return;
        };

        for field in self.fields {
            let field_path = format!("{}/{}", path, field.name);
            match object.get(field.name) {
                None => issues.push(FieldIssue {
                    path: field_path,
                    expected: field.kind.name(),
                    found: "missing",
                }),
                Some(v) if !field.kind.matches(v) => {
                    issues.push(FieldIssue::new(field_path, field.kind.name(), v));
                }
                Some(_) => {}
            }
        }
    }

    pub fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        let mut issues = Vec::new();
        self.collect_issues(value, "", &mut issues);
        ValidationError::check(self.name.to_string(), issues)
    }
}

/// Top-level shape of a request body or response payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    Object(ObjectSchema),
    ArrayOf(ObjectSchema),
}

impl Schema {
    pub fn name(&self) -> String {
        match self {
            Schema::Object(o) => o.name.to_string(),
            Schema::ArrayOf(o) => format!("{}[]", o.name),
        }
    }

    pub fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        match self {
            Schema::Object(object) => object.validate(value),
            Schema::ArrayOf(object) => {
                let mut issues = Vec::new();
                match value.as_array() {
                    Some(items) => {
                        for (i, item) in items.iter().enumerate() {
                            object.collect_issues(item, &format!("/{}", i), &mut issues);
                        }
                    }
                    None => issues.push(FieldIssue::new("/".to_string(), "array", value)),
                }
                ValidationError::check(self.name(), issues)
            }
        }
    }
}

fn path_or_root(path: &str) -> String {
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

/// One offending field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    /// JSON-pointer style location, e.g. `/0/name`.
    pub path: String,
    pub expected: &'static str,
    pub found: &'static str,
}

impl FieldIssue {
    fn new(path: String, expected: &'static str, value: &Value) -> Self {
        Self {
            path,
            expected,
            found: kind_of(value),
        }
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: expected {}, found {}", self.path, self.expected, self.found)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{target} failed validation: {}", join_issues(.issues))]
pub struct ValidationError {
    pub target: String,
    pub issues: Vec<FieldIssue>,
}

fn join_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    fn check(target: String, issues: Vec<FieldIssue>) -> Result<(), Self> {
        if issues.is_empty() {
            Ok(())
        } else {
            Err(Self { target, issues })
        }
    }

    /// Wrap a serde failure on a value that already passed its schema.
    pub(crate) fn decode(target: &str, error: serde_json::Error) -> Self {
        Self {
            target: target.to_string(),
            issues: vec![FieldIssue {
                path: format!("/ (line {}, column {})", error.line(), error.column()),
                expected: "decodable value",
                found: "undecodable value",
            }],
        }
    }

    /// Paths of all offending fields.
    pub fn paths(&self) -> Vec<&str> {
        self.issues.iter().map(|i| i.path.as_str()).collect()
    }
}

/// A type with a declared schema. Parsing validates before deserializing.
pub trait Validated: Serialize + DeserializeOwned {
    const SCHEMA: ObjectSchema;

    fn parse(value: Value) -> Result<Self, ValidationError> {
        Self::SCHEMA.validate(&value)?;
        serde_json::from_value(value).map_err(|e| ValidationError::decode(Self::SCHEMA.name, e))
    }

    fn parse_list(value: Value) -> Result<Vec<Self>, ValidationError> {
        Schema::ArrayOf(Self::SCHEMA).validate(&value)?;
        serde_json::from_value(value).map_err(|e| ValidationError::decode(Self::SCHEMA.name, e))
    }

    /// Serialize and check the result against the schema.
    fn to_validated_value(&self) -> Result<Value, ValidationError> {
        let value = serde_json::to_value(self)
            .map_err(|e| ValidationError::decode(Self::SCHEMA.name, e))?;
        Self::SCHEMA.validate(&value)?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PET: ObjectSchema = ObjectSchema {
        name: "Pet",
        fields: &[
            FieldSchema { name: "age", kind: FieldKind::Integer },
            FieldSchema { name: "weight", kind: FieldKind::Number },
            FieldSchema { name: "name", kind: FieldKind::String },
            FieldSchema { name: "vaccinated", kind: FieldKind::Bool },
        ],
    };

    #[test]
    fn test_object_accepts_conforming_value() {
        let value = json!({"age": 3, "weight": 4.5, "name": "Rex", "vaccinated": true});
        assert!(PET.validate(&value).is_ok());
    }

    #[test]
    fn test_object_ignores_extra_fields() {
        let value = json!({"age": 3, "weight": 4, "name": "Rex", "vaccinated": false, "tag": "x"});
        assert!(PET.validate(&value).is_ok());
    }

    #[test]
    fn test_object_reports_every_issue() {
        let value = json!({"age": 3.5, "name": null, "vaccinated": "yes"});
        let err = PET.validate(&value).unwrap_err();
        assert_eq!(err.target, "Pet");
        assert_eq!(err.paths(), vec!["/age", "/weight", "/name", "/vaccinated"]);
        assert_eq!(err.issues[0].found, "number");
        assert_eq!(err.issues[1].found, "missing");
        assert_eq!(err.issues[2].found, "null");
        assert_eq!(err.issues[3].found, "string");
    }

    #[test]
    fn test_object_rejects_non_object() {
        let err = PET.validate(&json!([1, 2])).unwrap_err();
        assert_eq!(err.paths(), vec!["/"]);
        assert_eq!(err.issues[0].expected, "object");
        assert_eq!(err.issues[0].found, "array");
    }

    #[test]
    fn test_array_paths_include_index() {
        let schema = Schema::ArrayOf(PET);
        let value = json!([
            {"age": 1, "weight": 1, "name": "a", "vaccinated": true},
            {"age": 1, "weight": 1, "vaccinated": true},
        ]);
        let err = schema.validate(&value).unwrap_err();
        assert_eq!(err.target, "Pet[]");
        assert_eq!(err.paths(), vec!["/1/name"]);
    }

    #[test]
    fn test_array_rejects_object() {
        let err = Schema::ArrayOf(PET).validate(&json!({})).unwrap_err();
        assert_eq!(err.issues[0].expected, "array");
    }

    #[test]
    fn test_error_display_lists_issues() {
        let err = PET.validate(&json!({"age": 1, "weight": 1, "vaccinated": true})).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Pet failed validation: /name: expected string, found missing"
        );
    }
}

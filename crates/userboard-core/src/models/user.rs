use serde::{Deserialize, Serialize};

use crate::schema::{FieldKind, FieldSchema, ObjectSchema, Schema, Validated};

/// A user as served by the remote API. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct User {
    pub id: i64,
    pub name: String,
}

impl Validated for User {
    const SCHEMA: ObjectSchema = ObjectSchema {
        name: "User",
        fields: &[
            FieldSchema { name: "id", kind: FieldKind::Integer },
            FieldSchema { name: "name", kind: FieldKind::String },
        ],
    };
}

/// Shape of a `GET /users` response.
pub const USERS_SCHEMA: Schema = Schema::ArrayOf(User::SCHEMA);

/// Payload for `POST /users`. Never stored client-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct CreateUserInput {
    pub name: String,
}

impl CreateUserInput {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Validated for CreateUserInput {
    const SCHEMA: ObjectSchema = ObjectSchema {
        name: "CreateUserInput",
        fields: &[FieldSchema { name: "name", kind: FieldKind::String }],
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_parse_valid() {
        let user = User::parse(json!({"id": 1, "name": "Alice"})).unwrap();
        assert_eq!(user, User { id: 1, name: "Alice".to_string() });
    }

    #[test]
    fn test_user_parse_ignores_extra_fields() {
        // The public API returns username, email, address, ...
        let user = User::parse(json!({
            "id": 1,
            "name": "Leanne Graham",
            "username": "Bret",
            "address": {"city": "Gwenborough"}
        }))
        .unwrap();
        assert_eq!(user.name, "Leanne Graham");
    }

    #[test]
    fn test_user_parse_missing_fields() {
        let err = User::parse(json!({"id": 1})).unwrap_err();
        assert_eq!(err.paths(), vec!["/name"]);

        let err = User::parse(json!({"name": "Alice"})).unwrap_err();
        assert_eq!(err.paths(), vec!["/id"]);

        let err = User::parse(json!({})).unwrap_err();
        assert_eq!(err.paths(), vec!["/id", "/name"]);
    }

    #[test]
    fn test_user_parse_wrong_types() {
        let err = User::parse(json!({"id": "1", "name": 7})).unwrap_err();
        assert_eq!(err.paths(), vec!["/id", "/name"]);
        assert_eq!(err.issues[0].found, "string");
        assert_eq!(err.issues[1].found, "integer");

        assert!(User::parse(json!({"id": 1.5, "name": "x"})).is_err());
        assert!(User::parse(json!("Alice")).is_err());
    }

    #[test]
    fn test_user_parse_list() {
        let users = User::parse_list(json!([
            {"id": 1, "name": "Alice"},
            {"id": 2, "name": "Bob"}
        ]))
        .unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[1].name, "Bob");

        let err = User::parse_list(json!([{"id": 1, "name": "Alice"}, {"id": 2}])).unwrap_err();
        assert_eq!(err.target, "User[]");
        assert_eq!(err.paths(), vec!["/1/name"]);
    }

    #[test]
    fn test_users_schema_accepts_empty_list() {
        assert!(USERS_SCHEMA.validate(&json!([])).is_ok());
    }

    #[test]
    fn test_create_user_input_validated_value() {
        let value = CreateUserInput::new("john doe").to_validated_value().unwrap();
        assert_eq!(value, json!({"name": "john doe"}));
    }

    #[test]
    fn test_create_user_input_schema_rejects_bad_body() {
        let err = CreateUserInput::SCHEMA.validate(&json!({"name": 5})).unwrap_err();
        assert_eq!(err.target, "CreateUserInput");
        assert_eq!(err.paths(), vec!["/name"]);
    }
}

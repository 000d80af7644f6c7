//! The remote operations this application may invoke.
//!
//! Each `Endpoint` maps to a static `EndpointDescriptor` holding the method,
//! path template, alias and schemas. Aliases are unique and double as the
//! seeds of query cache keys.

use std::fmt;

use crate::models::user::USERS_SCHEMA;
use crate::models::{CreateUserInput, User};
use crate::schema::{ObjectSchema, Schema, Validated};

use super::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_reqwest(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub method: HttpMethod,
    /// Path template; `:name` segments are substituted at call time.
    pub path: &'static str,
    pub alias: &'static str,
    pub description: &'static str,
    pub body: Option<ObjectSchema>,
    pub response: Schema,
}

impl EndpointDescriptor {
    /// Names of the `:param` placeholders in `path`, in order.
    pub fn path_params(&self) -> Vec<&'static str> {
        self.path
            .split('/')
            .filter_map(|segment| segment.strip_prefix(':'))
            .collect()
    }

    /// Substitute `:param` placeholders with the given values.
    pub fn render_path(&self, params: &[(&str, String)]) -> Result<String, ApiError> {
        self.path
            .split('/')
            .map(|segment| match segment.strip_prefix(':') {
                Some(name) => params
                    .iter()
                    .find(|(key, _)| *key == name)
                    .map(|(_, value)| value.clone())
                    .ok_or_else(|| ApiError::MissingPathParam(name.to_string())),
                None => Ok(segment.to_string()),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(|segments| segments.join("/"))
    }
}

/// Every operation in the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    GetUsers,
    GetUserById,
    CreateUser,
}

impl Endpoint {
    /// All endpoints in contract order.
    pub const ALL: [Endpoint; 3] = [Endpoint::GetUsers, Endpoint::GetUserById, Endpoint::CreateUser];

    pub fn descriptor(self) -> EndpointDescriptor {
        match self {
            Endpoint::GetUsers => EndpointDescriptor {
                method: HttpMethod::Get,
                path: "/users",
                alias: "getUsers",
                description: "Get all users",
                body: None,
                response: USERS_SCHEMA,
            },
            Endpoint::GetUserById => EndpointDescriptor {
                method: HttpMethod::Get,
                path: "/users/:id",
                alias: "getUserById",
                description: "Get a user",
                body: None,
                response: Schema::Object(User::SCHEMA),
            },
            Endpoint::CreateUser => EndpointDescriptor {
                method: HttpMethod::Post,
                path: "/users",
                alias: "createUser",
                description: "Create a user",
                body: Some(CreateUserInput::SCHEMA),
                response: Schema::Object(User::SCHEMA),
            },
        }
    }

    pub fn alias(self) -> &'static str {
        self.descriptor().alias
    }

    pub fn from_alias(alias: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.alias() == alias)
    }
}

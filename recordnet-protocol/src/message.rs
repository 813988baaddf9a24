//! JSON payload schema for requests and responses.
//!
//! The framing layer treats payloads as opaque bytes; these types are the
//! schema recordnet peers agree on inside a frame.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Username/password pair attached to a request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Request message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation id, echoed back in the response. Peers that do not
    /// correlate leave it at zero.
    #[serde(default)]
    pub id: u64,

    /// Command name followed by positional arguments.
    pub body: Vec<String>,

    /// Optional structured argument (a domain object).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<Credentials>,
}

impl Request {
    pub fn new<I, S>(body: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: 0,
            body: body.into_iter().map(Into::into).collect(),
            payload: None,
            auth: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_auth(mut self, auth: Credentials) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Returns the command name (`body[0]`).
    pub fn command(&self) -> Option<&str> {
        self.body.first().map(String::as_str)
    }

    /// Returns the positional arguments after the command name.
    pub fn args(&self) -> &[String] {
        self.body.get(1..).unwrap_or(&[])
    }
}

/// Kind of a command argument, as advertised in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentKind {
    /// Free-form word.
    Text,
    /// Signed integer.
    Integer,
    /// Structured record, sent as the request payload.
    Record,
}

/// One argument of a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentSpec {
    pub name: String,
    pub kind: ArgumentKind,
    #[serde(default)]
    pub optional: bool,
}

impl ArgumentSpec {
    pub fn new(name: impl Into<String>, kind: ArgumentKind) -> Self {
        Self {
            name: name.into(),
            kind,
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Describes a command the server accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDescriptor {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub arguments: Vec<ArgumentSpec>,
}

impl CommandDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            arguments: Vec::new(),
        }
    }

    pub fn with_argument(mut self, argument: ArgumentSpec) -> Self {
        self.arguments.push(argument);
        self
    }

    /// Returns whether the command carries a structured record.
    pub fn takes_record(&self) -> bool {
        self.arguments.iter().any(|a| a.kind == ArgumentKind::Record)
    }
}

/// Response message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Id of the request this answers.
    #[serde(default)]
    pub id: u64,

    /// Human-readable result.
    pub text: String,

    /// Current command catalog.
    #[serde(default)]
    pub catalog: Vec<CommandDescriptor>,

    /// Optional structured result (domain objects).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Vec<Value>>,
}

impl Response {
    /// Creates a text-only response.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            id: 0,
            text: text.into(),
            catalog: Vec::new(),
            payload: None,
        }
    }

    pub fn with_catalog(mut self, catalog: Vec<CommandDescriptor>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_payload(mut self, payload: Vec<Value>) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }
}

//! Uniform result envelope for remote exchanges
//!
//! Every call against the server — success, HTTP-level failure, or a
//! request that never left the machine — comes back as one [`RestResult`].
//! Callers branch on [`RestResult::success`] and log the envelope whole; the
//! `Display` implementation renders the full diagnostic block including the
//! echoed request.
//!
//! A protocol failure (4xx/5xx) is an expected outcome, not an error: the
//! envelope carries the real status code and whatever body the server sent.
//! A transport failure (DNS, refused connection, timeout, bad URL) uses the
//! status sentinel `0` with a descriptive error text and no body.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use tracing::warn;

use crate::xml::{self, XmlNode};

/// Parsed representation of a response body
#[derive(Debug, Clone, Default)]
pub enum ParsedBody {
    /// No body, or a body that could not be parsed at all
    #[default]
    Empty,
    /// JSON object body as a string-keyed map
    Json(BTreeMap<String, Value>),
    /// XML body as its root element
    Xml(XmlNode),
}

impl ParsedBody {
    /// Sniff and parse a raw body. Malformed content degrades to
    /// [`ParsedBody::Empty`] with a diagnostic, never an error.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim_start();
        if trimmed.is_empty() {
            return Self::Empty;
        }
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            match serde_json::from_str::<Value>(trimmed) {
                Ok(Value::Object(map)) => {
                    return Self::Json(map.into_iter().collect());
                }
                Ok(other) => {
                    // Bare arrays get a synthetic wrapper key so lookups stay uniform.
                    let mut map = BTreeMap::new();
                    map.insert(String::new(), other);
                    return Self::Json(map);
                }
                Err(err) => {
                    warn!("JSON body did not parse: {}", err);
                    return Self::Empty;
                }
            }
        }
        if trimmed.starts_with('<') {
            if let Some(root) = xml::parse_document(trimmed) {
                return Self::Xml(root);
            }
            warn!("XML body did not parse");
            return Self::Empty;
        }
        Self::Empty
    }

    /// True when nothing was parsed
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Scalar field lookup by name, searching the top level and then one
    /// wrapper level down. JSON numbers and booleans stringify.
    pub fn field(&self, name: &str) -> Option<String> {
        match self {
            Self::Empty => None,
            Self::Json(map) => {
                if let Some(v) = map.get(name).and_then(json_scalar) {
                    return Some(v);
                }
                // Single-object wrapper, e.g. {"Call": {...}}.
                for value in map.values() {
                    if let Value::Object(inner) = value {
                        if let Some(v) = inner.get(name).and_then(json_scalar) {
                            return Some(v);
                        }
                    }
                }
                None
            }
            Self::Xml(root) => {
                if root.name == name && root.is_leaf() {
                    return Some(root.text.clone());
                }
                if let Some(text) = root.child_text(name) {
                    return Some(text.to_string());
                }
                for child in &root.children {
                    if let Some(text) = child.child_text(name) {
                        return Some(text.to_string());
                    }
                }
                None
            }
        }
    }
}

fn json_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Outcome of exactly one remote exchange
#[derive(Debug, Clone, Default)]
pub struct RestResult {
    /// True only for an accepted (2xx/3xx) exchange that was actually sent
    pub success: bool,
    /// HTTP status code; `0` when the request could not be sent at all
    pub status: u16,
    /// HTTP status description, empty for transport failures
    pub status_description: String,
    /// Raw response body text
    pub raw: String,
    /// Parsed response body
    pub body: ParsedBody,
    /// Total matching records reported by list endpoints, 0 when absent
    pub total_count: u64,
    /// Object id of a newly created resource, when the server reported one
    pub returned_object_id: Option<String>,
    /// Human-readable error text; non-empty whenever `success` is false
    pub error_text: String,
    /// Echo of the request method, for diagnostics
    pub method: String,
    /// Echo of the request URL
    pub url: String,
    /// Echo of the request body
    pub request_body: String,
}

impl RestResult {
    /// Envelope for a request that never reached the server.
    ///
    /// Status carries the `0` sentinel and no body is present.
    pub fn transport_failure(
        method: impl Into<String>,
        url: impl Into<String>,
        request_body: impl Into<String>,
        error_text: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            status: 0,
            error_text: error_text.into(),
            method: method.into(),
            url: url.into(),
            request_body: request_body.into(),
            ..Default::default()
        }
    }

    /// True when the status code counts as an accepted exchange
    pub fn status_accepted(status: u16) -> bool {
        (200..400).contains(&status)
    }
}

impl fmt::Display for RestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "    success: {}", self.success)?;
        writeln!(f, "    status: {} {}", self.status, self.status_description)?;
        if !self.error_text.is_empty() {
            writeln!(f, "    error: {}", self.error_text)?;
        }
        if self.total_count > 0 {
            writeln!(f, "    total count: {}", self.total_count)?;
        }
        if let Some(id) = &self.returned_object_id {
            writeln!(f, "    returned object id: {}", id)?;
        }
        writeln!(f, "    request: {} {}", self.method, self.url)?;
        if !self.request_body.is_empty() {
            writeln!(f, "    request body: {}", self.request_body)?;
        }
        if !self.raw.is_empty() {
            writeln!(f, "    response body: {}", self.raw)?;
        }
        Ok(())
    }
}

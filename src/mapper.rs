//! Generic wire-to-object population
//!
//! The server speaks the same schema in two dialects (JSON and XML); this
//! module walks either one and applies fields onto typed Rust objects. There
//! is no runtime reflection: each mappable type implements [`WireRecord`],
//! an explicit field table routing wire names to setters, with helper
//! coercions on [`FieldValue`] for every scalar kind the wire carries.
//!
//! Population is deliberately forgiving. Wire fields with no matching
//! property are dropped silently when their name contains `URI` (those are
//! always derivable) and logged at debug level otherwise — never fatal. A
//! malformed payload degrades to a partially-populated object plus
//! diagnostics. Structured wire nodes recurse into the already-existing
//! sub-object on the target (populate-in-place, not construction).
//!
//! Identity is immutable: a field named case-sensitively `ObjectId` is never
//! routed through [`WireRecord::apply_field`]. Freshly built instances
//! (list entries, first fetches) receive their id exactly once through
//! [`WireRecord::apply_identity`]; a refresh of an existing object can never
//! change it.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::result::ParsedBody;
use crate::xml::XmlNode;

/// One wire field value, in either dialect
#[derive(Debug, Clone, Copy)]
pub enum FieldValue<'a> {
    /// JSON value (scalar, object, or array)
    Json(&'a Value),
    /// XML element (leaf or structured)
    Xml(&'a XmlNode),
}

impl<'a> FieldValue<'a> {
    /// Scalar text of this value, if it is a scalar
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Json(Value::String(s)) => Some(s.clone()),
            Self::Json(Value::Number(n)) => Some(n.to_string()),
            Self::Json(Value::Bool(b)) => Some(b.to_string()),
            Self::Json(_) => None,
            Self::Xml(node) if node.is_leaf() => Some(node.text.clone()),
            Self::Xml(_) => None,
        }
    }

    /// True when this value carries structure rather than a scalar
    pub fn is_structured(&self) -> bool {
        match self {
            Self::Json(v) => v.is_object() || v.is_array(),
            Self::Xml(node) => !node.is_leaf(),
        }
    }

    /// Verbatim string coercion
    pub fn to_string_value(&self) -> String {
        self.as_text().unwrap_or_default()
    }

    /// 32-bit integer coercion; unparsable input keeps the default
    pub fn to_i32(&self) -> i32 {
        self.as_text().and_then(|t| t.trim().parse().ok()).unwrap_or(0)
    }

    /// 64-bit integer coercion
    pub fn to_i64(&self) -> i64 {
        self.as_text().and_then(|t| t.trim().parse().ok()).unwrap_or(0)
    }

    /// Boolean coercion: `true`/`false` case-insensitively, plus the
    /// numeric `1`/`0` the wire sometimes sends
    pub fn to_bool(&self) -> bool {
        match self.as_text() {
            Some(t) => {
                let t = t.trim();
                t.eq_ignore_ascii_case("true") || t == "1"
            }
            None => false,
        }
    }

    /// Timestamp coercion: RFC 3339 first, then the server's
    /// `YYYY-MM-DD HH:MM:SS[.fff]` calendar form
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        let text = self.as_text()?;
        let text = text.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }

    /// Closed-enumeration coercion: case-insensitive symbol lookup,
    /// falling back to the enum's default (zero) value on no match
    pub fn to_enum<E: WireEnum>(&self) -> E {
        match self.as_text() {
            Some(t) => E::from_symbol(t.trim()).unwrap_or_default(),
            None => E::default(),
        }
    }
}

/// A closed enumeration that appears on the wire as a symbol
pub trait WireEnum: Default {
    /// Case-insensitive lookup; `None` falls back to the default value
    fn from_symbol(symbol: &str) -> Option<Self>
    where
        Self: Sized;
}

/// Outcome of routing one wire field through a type's field table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOutcome {
    /// The field matched a property and was applied
    Applied,
    /// No property with that name exists on the target
    Unknown,
}

/// A type that can be populated from wire payloads
pub trait WireRecord: Default {
    /// Element/key name this type uses on the wire. Defaults used by the
    /// wrapper-stripping logic; types whose wire name differs from their
    /// Rust name override it here.
    const WIRE_NAME: &'static str;

    /// Apply one named wire field. Implementations route scalars through
    /// the [`FieldValue`] coercions and recurse into sub-objects with
    /// [`populate_nested`].
    fn apply_field(&mut self, name: &str, value: &FieldValue<'_>) -> FieldOutcome;

    /// Receive the immutable object identity. Called at most once, on
    /// freshly constructed instances only; the populate sweep never routes
    /// `ObjectId` through [`WireRecord::apply_field`].
    fn apply_identity(&mut self, _object_id: &str) {}
}

/// Populate an existing object from raw wire text (refresh semantics:
/// identity is left untouched even if present in the payload).
pub fn populate_object<T: WireRecord>(text: &str, target: &mut T) {
    populate_object_from_body(&ParsedBody::parse(text), target);
}

/// Populate an existing object from an already-parsed body
pub fn populate_object_from_body<T: WireRecord>(body: &ParsedBody, target: &mut T) {
    match body {
        ParsedBody::Empty => {}
        ParsedBody::Json(map) => {
            // Strip a {"TypeName": {...}} wrapper when present.
            if let Some(Value::Object(inner)) = map.get(T::WIRE_NAME) {
                apply_json_fields(target, inner, false);
            } else {
                for (name, value) in map.iter() {
                    route_field(target, name, &FieldValue::Json(value), false);
                }
            }
        }
        ParsedBody::Xml(root) => {
            let node = if root.name == T::WIRE_NAME {
                root
            } else {
                root.child(T::WIRE_NAME).unwrap_or(root)
            };
            apply_xml_fields(target, node, false);
        }
    }
}

/// Parse a list payload into typed records.
///
/// `name_override` substitutes for [`WireRecord::WIRE_NAME`] when the
/// endpoint wraps entries in a different element name. The returned length
/// always equals the number of sibling entries in the payload, whether or
/// not a total indicator was present. A single unwrapped object is promoted
/// to a one-element list.
pub fn populate_list<T: WireRecord>(text: &str, name_override: Option<&str>) -> Vec<T> {
    populate_list_from_body(&ParsedBody::parse(text), name_override)
}

/// List population over an already-parsed body
pub fn populate_list_from_body<T: WireRecord>(
    body: &ParsedBody,
    name_override: Option<&str>,
) -> Vec<T> {
    let wire_name = name_override.unwrap_or(T::WIRE_NAME);
    let mut out = Vec::new();

    match body {
        ParsedBody::Empty => {}
        ParsedBody::Json(map) => {
            // Entries sit under the type-name key; a bare top-level array
            // lands under the synthetic empty key.
            let entries = map.get(wire_name).or_else(|| map.get(""));
            match entries {
                Some(Value::Array(items)) => {
                    for item in items {
                        if let Value::Object(fields) = item {
                            let mut record = T::default();
                            apply_json_fields(&mut record, fields, true);
                            out.push(record);
                        }
                    }
                }
                Some(Value::Object(fields)) => {
                    let mut record = T::default();
                    apply_json_fields(&mut record, fields, true);
                    out.push(record);
                }
                _ => {}
            }
        }
        ParsedBody::Xml(root) => {
            if root.name == wire_name {
                // Response was a single bare object.
                let mut record = T::default();
                apply_xml_fields(&mut record, root, true);
                out.push(record);
            } else {
                for node in root.children_named(wire_name) {
                    let mut record = T::default();
                    apply_xml_fields(&mut record, node, true);
                    out.push(record);
                }
            }
        }
    }

    out
}

/// Recurse a structured wire value onto an existing sub-object. This is the
/// hook [`WireRecord::apply_field`] implementations use for nested nodes;
/// sub-population uses refresh semantics (no identity assignment).
pub fn populate_nested<T: WireRecord>(value: &FieldValue<'_>, target: &mut T) {
    match value {
        FieldValue::Json(Value::Object(fields)) => apply_json_fields(target, fields, false),
        FieldValue::Xml(node) if !node.is_leaf() => apply_xml_fields(target, node, false),
        _ => {}
    }
}

fn apply_json_fields<T: WireRecord>(
    target: &mut T,
    fields: &serde_json::Map<String, Value>,
    fresh: bool,
) {
    for (name, value) in fields {
        route_field(target, name, &FieldValue::Json(value), fresh);
    }
}

fn apply_xml_fields<T: WireRecord>(target: &mut T, node: &XmlNode, fresh: bool) {
    for child in &node.children {
        route_field(target, &child.name, &FieldValue::Xml(child), fresh);
    }
}

fn route_field<T: WireRecord>(target: &mut T, name: &str, value: &FieldValue<'_>, fresh: bool) {
    // Identity is assigned once on fresh instances and otherwise immutable.
    if name == "ObjectId" {
        if fresh {
            if let Some(id) = value.as_text() {
                target.apply_identity(&id);
            }
        }
        return;
    }

    match target.apply_field(name, value) {
        FieldOutcome::Applied => {}
        FieldOutcome::Unknown => {
            // URI fields are always redundant; anything else is worth a note.
            if !name.contains("URI") {
                debug!(field = name, type_name = T::WIRE_NAME, "unknown wire field ignored");
            }
        }
    }
}

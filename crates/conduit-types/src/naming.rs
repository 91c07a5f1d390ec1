use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier used when none can be extracted from a payload.
pub const FALLBACK_IDENTIFIER: &str = "UnknownId";

/// `chrono` format of the timestamp prefix: `yyyy-MM-dd-HH-mm-ss-fff`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S-%3f";

/// Extension appended to every generated object name.
pub const OBJECT_EXTENSION: &str = ".json";

/// Longest identifier kept in an object name, in characters.
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Why an identifier could not be read from a payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("payload is JSON but not an object")]
    NotAnObject,

    #[error("payload has no 'id' field")]
    Missing,

    #[error("'id' field is not a string (found {0})")]
    NotAString(&'static str),

    #[error("'id' field is blank")]
    Blank,
}

impl IdentifierError {
    /// `true` for failures caused by a malformed payload, as opposed to a
    /// well-formed payload that simply carries no usable identifier.
    pub fn is_parse_failure(&self) -> bool {
        matches!(
            self,
            Self::InvalidJson(_) | Self::NotAnObject | Self::NotAString(_)
        )
    }
}

/// Best-effort extraction of the top-level string `id` field of a JSON body.
pub fn extract_identifier(body: &str) -> Result<String, IdentifierError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| IdentifierError::InvalidJson(e.to_string()))?;
    let object = value.as_object().ok_or(IdentifierError::NotAnObject)?;
    match object.get("id") {
        None | Some(Value::Null) => Err(IdentifierError::Missing),
        Some(Value::String(id)) if id.trim().is_empty() => Err(IdentifierError::Blank),
        Some(Value::String(id)) => Ok(id.clone()),
        Some(other) => Err(IdentifierError::NotAString(json_type_name(other))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Name of a stored object: `{timestamp}-{identifier}.json`.
///
/// Uniqueness rests on the millisecond timestamp prefix. Two submissions in
/// the same millisecond carrying the same identifier produce the same name.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectName(String);

impl ObjectName {
    /// Build the name for a submission received at `at`.
    ///
    /// The identifier is reduced to a single safe path segment: characters
    /// outside `[A-Za-z0-9._~-]` become `_` and the result is capped at
    /// [`MAX_IDENTIFIER_LEN`] characters. A blank identifier falls back to
    /// [`FALLBACK_IDENTIFIER`].
    pub fn generate(at: DateTime<Utc>, identifier: &str) -> Self {
        let sanitized: String = identifier
            .trim()
            .chars()
            .take(MAX_IDENTIFIER_LEN)
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '~' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let identifier = if sanitized.is_empty() {
            FALLBACK_IDENTIFIER
        } else {
            &sanitized
        };
        Self(format!(
            "{}-{}{}",
            at.format(TIMESTAMP_FORMAT),
            identifier,
            OBJECT_EXTENSION
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectName({})", self.0)
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

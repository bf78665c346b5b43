//! Pub/sub notification payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload of a `preview` notification: `{ "src": "<relative path>" }`.
///
/// The payload is not validated. `src` is turned into text the way string
/// concatenation would: a missing key reads `undefined`, `null` reads
/// `null`, and objects read `[object Object]`. A malformed notification
/// degrades the stored URL instead of being rejected.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewEvent {
    /// Frame path relative to the origin.
    #[serde(default)]
    pub src: Option<String>,
}

/// Text used for a `src` that is absent from the payload.
const UNDEFINED: &str = "undefined";

impl PreviewEvent {
    /// Create an event for a relative frame path.
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: Some(src.into()),
        }
    }

    /// Build an event from an arbitrary JSON payload.
    ///
    /// A payload that is not an object has no `src`.
    pub fn from_payload(payload: &Value) -> Self {
        Self {
            src: payload.get("src").map(concat_text),
        }
    }

    /// The relative path to resolve against the origin.
    pub fn path(&self) -> &str {
        self.src.as_deref().unwrap_or(UNDEFINED)
    }
}

/// Text a JSON value contributes when appended to a string.
fn concat_text(value: &Value) -> String {
    match value {
        Value::Null => "null".to_owned(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => format!("{f}"),
            _ => n.to_string(),
        },
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => concat_text(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_owned(),
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A type which represents a `payload` in the test-client context.
/// A payload either holds structured data as a [`Value`] or an opaque piece
/// of text that did not parse as JSON. The enum is used for both data that's
/// sent and data that's received.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Structured(Value),
    Text(String),
}

impl Payload {
    /// Best-effort constructor for operator input: tries to parse the raw
    /// text as JSON and falls back to treating it as an opaque string. The
    /// fallback is never an error.
    pub fn parse<T: AsRef<str>>(raw: T) -> Self {
        let raw = raw.as_ref();
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Payload::Structured(value),
            Err(_) => Payload::Text(raw.to_owned()),
        }
    }

    /// The JSON value that crosses the transport boundary.
    pub fn to_value(&self) -> Value {
        match self {
            Payload::Structured(value) => value.clone(),
            Payload::Text(text) => Value::String(text.clone()),
        }
    }
}

impl From<&str> for Payload {
    fn from(string: &str) -> Self {
        Self::Text(string.to_owned())
    }
}

impl From<String> for Payload {
    fn from(string: String) -> Self {
        Self::Text(string)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        // Inbound JSON strings collapse to text so the log shows them the
        // way the server sent them, without an extra layer of quotes.
        match value {
            Value::String(text) => Self::Text(text),
            other => Self::Structured(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_json() {
        let sut = Payload::parse(r#"{"a":1}"#);
        assert_eq!(Payload::Structured(json!({"a": 1})), sut);

        let sut = Payload::parse("[1, 2, 3]");
        assert_eq!(Payload::Structured(json!([1, 2, 3])), sut);

        let sut = Payload::parse("42");
        assert_eq!(Payload::Structured(json!(42)), sut);
    }

    #[test]
    fn test_parse_falls_back_to_text() {
        let sut = Payload::parse("hello");
        assert_eq!(Payload::Text(String::from("hello")), sut);

        // trailing garbage is not valid JSON either
        let sut = Payload::parse("{\"a\":1} and then some");
        assert_eq!(Payload::Text(String::from("{\"a\":1} and then some")), sut);
    }

    #[test]
    fn test_from() {
        let sut = Payload::from("foo ™");
        assert_eq!(Payload::Text(String::from("foo ™")), sut);

        let sut = Payload::from(String::from("foo ™"));
        assert_eq!(Payload::Text(String::from("foo ™")), sut);

        let sut = Payload::from(json!({"token": 123}));
        assert_eq!(Payload::Structured(json!({"token": 123})), sut);

        let sut = Payload::from(json!("plain"));
        assert_eq!(Payload::Text(String::from("plain")), sut);
    }

    #[test]
    fn test_to_value() {
        assert_eq!(Payload::parse("{\"a\":1}").to_value(), json!({"a": 1}));
        assert_eq!(Payload::parse("hi").to_value(), json!("hi"));
    }

    #[test]
    fn test_deep_value_equality() {
        // Structured payloads compare by value, not identity.
        let left = Payload::parse(r#"{"a": [1, {"b": 2}]}"#);
        let right = Payload::Structured(json!({"a": [1, {"b": 2}]}));
        assert_eq!(left, right);
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

/// An `Event` in the test client is either one of the well-known wire
/// events, the internal `system` tag used to narrate lifecycle and registry
/// actions in the log, or custom.
///
/// Wire names are matched exactly: `Chat` and `chat` are distinct events.
#[derive(Debug, PartialEq, PartialOrd, Clone, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Event {
    Connect,
    Disconnect,
    Error,
    Message,
    Notification,
    System,
    Custom(String),
}

impl Event {
    pub fn as_str(&self) -> &str {
        match self {
            Event::Connect => "connect",
            Event::Disconnect => "disconnect",
            Event::Error => "error",
            Event::Message => "message",
            Event::Notification => "notification",
            Event::System => "system",
            Event::Custom(string) => string,
        }
    }
}

impl From<String> for Event {
    fn from(string: String) -> Self {
        match &string[..] {
            "connect" => Event::Connect,
            "disconnect" => Event::Disconnect,
            "error" => Event::Error,
            "message" => Event::Message,
            "notification" => Event::Notification,
            "system" => Event::System,
            _ => Event::Custom(string),
        }
    }
}

impl From<&str> for Event {
    fn from(string: &str) -> Self {
        Event::from(String::from(string))
    }
}

impl From<Event> for String {
    fn from(event: Event) -> Self {
        match event {
            Event::Custom(string) => string,
            other => other.as_str().to_owned(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

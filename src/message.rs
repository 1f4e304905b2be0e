use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::Event;
use crate::payload::Payload;

/// One log entry. Messages are immutable once created; the log appends them
/// in timestamp order and never reorders or rewrites existing entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub event: Event,
    pub data: Payload,
    pub timestamp: DateTime<Utc>,
    pub is_outgoing: bool,
    pub error: Option<String>,
}

impl Message {
    fn new(event: Event, data: Payload, is_outgoing: bool) -> Self {
        Message {
            id: Uuid::new_v4(),
            event,
            data,
            timestamp: Utc::now(),
            is_outgoing,
            error: None,
        }
    }

    /// An entry for a frame received from the server.
    pub fn incoming(event: Event, data: Payload) -> Self {
        Self::new(event, data, false)
    }

    /// An entry for a frame emitted to the server.
    pub fn outgoing(event: Event, data: Payload) -> Self {
        Self::new(event, data, true)
    }

    /// A `system` entry narrating a lifecycle or registry action.
    pub fn system<T: Into<String>>(text: T) -> Self {
        Self::new(Event::System, Payload::Text(text.into()), false)
    }

    pub(crate) fn with_error<T: Into<String>>(mut self, error: T) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Append-only, time-ordered message sequence. The log owns the sequence
/// exclusively; everything else appends through the client's single access
/// point and only ever reads.
#[derive(Debug, Default)]
pub(crate) struct MessageLog {
    entries: Vec<Message>,
}

impl MessageLog {
    pub(crate) fn append(&mut self, message: Message) {
        self.entries.push(message);
    }

    /// Empties the sequence and appends one system entry recording the
    /// clear, so a manually cleared log is never observably empty with no
    /// explanation.
    pub(crate) fn clear(&mut self) -> Message {
        self.entries.clear();
        let marker = Message::system("log cleared");
        self.entries.push(marker.clone());
        marker
    }

    pub(crate) fn entries(&self) -> &[Message] {
        &self.entries
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_append_preserves_order() {
        let mut log = MessageLog::default();
        log.append(Message::outgoing(Event::from("a"), Payload::parse("1")));
        log.append(Message::incoming(Event::from("b"), Payload::parse("2")));
        log.append(Message::system("c"));

        let events: Vec<String> = log
            .entries()
            .iter()
            .map(|message| message.event.to_string())
            .collect();
        assert_eq!(events, vec!["a", "b", "system"]);
    }

    #[test]
    fn test_clear_leaves_single_system_entry() {
        let mut log = MessageLog::default();
        log.append(Message::system("one"));
        log.append(Message::system("two"));

        log.clear();

        assert_eq!(log.len(), 1);
        let marker = &log.entries()[0];
        assert_eq!(marker.event, Event::System);
        assert_eq!(marker.data, Payload::Text(String::from("log cleared")));
    }

    #[test]
    fn test_system_entry_shape() {
        let message = Message::system("connected");
        assert_eq!(message.event, Event::System);
        assert!(!message.is_outgoing);
        assert_eq!(message.error, None);

        let failed = Message::system("emit failed").with_error("boom");
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_serializes_with_wire_names() {
        let message = Message::outgoing(Event::from("chat"), Payload::Structured(json!({"a": 1})));
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["event"], json!("chat"));
        assert_eq!(value["data"], json!({"a": 1}));
        assert_eq!(value["is_outgoing"], json!(true));
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// The wire events every freshly built registry starts out with.
pub const DEFAULT_LISTENER_EVENTS: [&str; 5] =
    ["connect", "disconnect", "error", "message", "notification"];

/// A named subscription: the stored intent to log inbound frames for one
/// wire event. `is_active` is declared intent only; the live transport
/// binding is reconciled against it whenever a connection is established.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventListener {
    pub id: Uuid,
    pub event_name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub description: Option<String>,
}

impl EventListener {
    fn new(event_name: String, description: Option<String>) -> Self {
        EventListener {
            id: Uuid::new_v4(),
            event_name,
            is_active: true,
            created_at: Utc::now(),
            description,
        }
    }
}

/// The set of listener definitions, keyed by exact event name. Definitions
/// persist across disconnects; only their live bindings come and go.
#[derive(Debug, Default)]
pub(crate) struct ListenerRegistry {
    listeners: Vec<EventListener>,
}

impl ListenerRegistry {
    pub(crate) fn with_defaults() -> Self {
        let mut registry = Self::default();
        for event in DEFAULT_LISTENER_EVENTS {
            // infallible, the bootstrap set contains no duplicates
            let _ = registry.add(event, None);
        }
        registry
    }

    /// Adds a definition for `event_name`. Names are matched exactly and at
    /// most one listener per name may exist.
    pub(crate) fn add<T: Into<String>>(
        &mut self,
        event_name: T,
        description: Option<String>,
    ) -> Result<EventListener> {
        let event_name = event_name.into();
        if event_name.trim().is_empty() {
            return Err(Error::InvalidEventName());
        }
        if self.contains(&event_name) {
            return Err(Error::DuplicatedListener(event_name));
        }
        let listener = EventListener::new(event_name, description);
        self.listeners.push(listener.clone());
        Ok(listener)
    }

    /// Removes the definition with the given id. Unknown ids are a no-op,
    /// the caller may race a concurrent removal.
    pub(crate) fn remove(&mut self, id: Uuid) -> Option<EventListener> {
        let index = self.listeners.iter().position(|l| l.id == id)?;
        Some(self.listeners.remove(index))
    }

    /// Flips `is_active` and returns the updated definition.
    pub(crate) fn toggle(&mut self, id: Uuid) -> Option<EventListener> {
        let listener = self.listeners.iter_mut().find(|l| l.id == id)?;
        listener.is_active = !listener.is_active;
        Some(listener.clone())
    }

    pub(crate) fn contains(&self, event_name: &str) -> bool {
        self.listeners.iter().any(|l| l.event_name == event_name)
    }

    /// Whether an active definition exists for `event_name`.
    pub(crate) fn is_active(&self, event_name: &str) -> bool {
        self.listeners
            .iter()
            .any(|l| l.event_name == event_name && l.is_active)
    }

    pub(crate) fn active(&self) -> impl Iterator<Item = &EventListener> {
        self.listeners.iter().filter(|l| l.is_active)
    }

    pub(crate) fn all(&self) -> &[EventListener] {
        &self.listeners
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let registry = ListenerRegistry::with_defaults();
        assert_eq!(registry.len(), DEFAULT_LISTENER_EVENTS.len());
        for event in DEFAULT_LISTENER_EVENTS {
            assert!(registry.is_active(event));
        }
    }

    #[test]
    fn test_add_rejects_blank_names() {
        let mut registry = ListenerRegistry::default();
        assert!(matches!(registry.add("", None), Err(Error::InvalidEventName())));
        assert!(matches!(registry.add("   ", None), Err(Error::InvalidEventName())));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_add_rejects_duplicates() {
        let mut registry = ListenerRegistry::default();
        registry.add("chat", None).unwrap();

        let result = registry.add("chat", Some(String::from("again")));
        assert!(matches!(result, Err(Error::DuplicatedListener(name)) if name == "chat"));
        assert_eq!(registry.len(), 1);

        // exact matching, so a different casing is a different listener
        assert!(registry.add("Chat", None).is_ok());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_toggle_is_its_own_inverse() {
        let mut registry = ListenerRegistry::default();
        let original = registry.add("chat", Some(String::from("room traffic"))).unwrap();

        let toggled = registry.toggle(original.id).unwrap();
        assert!(!toggled.is_active);
        assert!(!registry.is_active("chat"));

        let restored = registry.toggle(original.id).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_remove_unknown_id_is_noop() {
        let mut registry = ListenerRegistry::with_defaults();
        assert!(registry.remove(Uuid::new_v4()).is_none());
        assert_eq!(registry.len(), DEFAULT_LISTENER_EVENTS.len());
    }

    #[test]
    fn test_remove_deletes_definition() {
        let mut registry = ListenerRegistry::default();
        let listener = registry.add("chat", None).unwrap();

        let removed = registry.remove(listener.id).unwrap();
        assert_eq!(removed.event_name, "chat");
        assert!(!registry.contains("chat"));
    }
}

//! Deterministic in-process transport. The sim stands in for a real server:
//! tests and presentation-layer harnesses drive it through a [`SimHandle`]
//! to script lifecycle signals and inbound frames, and inspect what the
//! client emitted and bound. No network, no timing assumptions.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use url::Url;

use super::{Transport, TransportEvent, TransportSink};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct SimState {
    sink: Option<TransportSink>,
    open_url: Option<Url>,
    // current handler table, insertion ordered
    bound: Vec<String>,
    // full call histories, for asserting how often the client (re)bound
    bind_log: Vec<String>,
    unbind_log: Vec<String>,
    emitted: Vec<(String, Value)>,
    open_calls: usize,
    close_calls: usize,
    fail_next_open: Option<String>,
    fail_emit: bool,
}

/// Scripting and inspection handle shared between the sim transport and the
/// test driving it.
#[derive(Debug, Clone)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimHandle {
    /// Injects a raw lifecycle signal, as if the underlying library had
    /// reported it. No-op while the transport is not open.
    pub fn signal(&self, event: TransportEvent) {
        let sink = match self.state.lock() {
            Ok(state) => state.sink.clone(),
            Err(_) => None,
        };
        if let Some(sink) = sink {
            sink.emit(event);
        }
    }

    /// Delivers an inbound frame for `event`, but only if the client bound
    /// a live handler for it, exactly like a real handler table.
    pub fn server_emit(&self, event: &str, data: Value) {
        let sink = match self.state.lock() {
            Ok(state) if state.bound.iter().any(|e| e == event) => state.sink.clone(),
            _ => None,
        };
        if let Some(sink) = sink {
            sink.emit(TransportEvent::Packet {
                event: event.to_owned(),
                data,
            });
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().map(|s| s.open_url.is_some()).unwrap_or(false)
    }

    pub fn open_url(&self) -> Option<Url> {
        self.state.lock().ok().and_then(|s| s.open_url.clone())
    }

    /// The current handler table, in bind order.
    pub fn bound(&self) -> Vec<String> {
        self.state.lock().map(|s| s.bound.clone()).unwrap_or_default()
    }

    /// Every `bind` call made so far, including replacements.
    pub fn bind_log(&self) -> Vec<String> {
        self.state.lock().map(|s| s.bind_log.clone()).unwrap_or_default()
    }

    pub fn unbind_log(&self) -> Vec<String> {
        self.state.lock().map(|s| s.unbind_log.clone()).unwrap_or_default()
    }

    /// Every frame the client emitted, in order.
    pub fn emitted(&self) -> Vec<(String, Value)> {
        self.state.lock().map(|s| s.emitted.clone()).unwrap_or_default()
    }

    pub fn open_calls(&self) -> usize {
        self.state.lock().map(|s| s.open_calls).unwrap_or(0)
    }

    pub fn close_calls(&self) -> usize {
        self.state.lock().map(|s| s.close_calls).unwrap_or(0)
    }

    /// Scripts the next `open` to fail with the given reason.
    pub fn fail_next_open<T: Into<String>>(&self, reason: T) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_next_open = Some(reason.into());
        }
    }

    /// Scripts every subsequent emit to fail.
    pub fn fail_emits(&self, fail: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_emit = fail;
        }
    }
}

/// The transport half of the sim. `open` acknowledges asynchronously with
/// [`TransportEvent::Open`] unless scripted to fail.
#[derive(Debug)]
pub struct SimTransport {
    state: Arc<Mutex<SimState>>,
}

impl SimTransport {
    pub fn new() -> (Self, SimHandle) {
        let state = Arc::new(Mutex::new(SimState::default()));
        let handle = SimHandle {
            state: Arc::clone(&state),
        };
        (SimTransport { state }, handle)
    }
}

impl Transport for SimTransport {
    fn open(&mut self, url: &Url, sink: TransportSink) -> Result<()> {
        let mut state = self.state.lock()?;
        state.open_calls += 1;
        if let Some(reason) = state.fail_next_open.take() {
            return Err(Error::IncompleteTransport(reason));
        }
        state.open_url = Some(url.clone());
        state.bound.clear();
        state.sink = Some(sink.clone());
        drop(state);

        sink.emit(TransportEvent::Open);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut state = self.state.lock()?;
        state.close_calls += 1;
        state.open_url = None;
        state.sink = None;
        state.bound.clear();
        Ok(())
    }

    fn emit(&mut self, event: &str, data: Value) -> Result<()> {
        let mut state = self.state.lock()?;
        if state.fail_emit {
            return Err(Error::FailedToEmit(String::from("scripted emit failure")));
        }
        if state.open_url.is_none() {
            return Err(Error::FailedToEmit(String::from("transport is not open")));
        }
        state.emitted.push((event.to_owned(), data));
        Ok(())
    }

    fn bind(&mut self, event: &str) -> Result<()> {
        let mut state = self.state.lock()?;
        state.bind_log.push(event.to_owned());
        if !state.bound.iter().any(|e| e == event) {
            state.bound.push(event.to_owned());
        }
        Ok(())
    }

    fn unbind(&mut self, event: &str) -> Result<()> {
        let mut state = self.state.lock()?;
        state.unbind_log.push(event.to_owned());
        state.bound.retain(|e| e != event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use serde_json::json;

    use super::*;

    fn sink_pair() -> (TransportSink, mpsc::Receiver<(u64, TransportEvent)>) {
        let (tx, rx) = mpsc::channel();
        (TransportSink::new(7, Arc::new(Mutex::new(tx))), rx)
    }

    #[test]
    fn test_open_acknowledges_through_sink() {
        let (mut transport, handle) = SimTransport::new();
        let (sink, rx) = sink_pair();
        let url = Url::parse("http://localhost:4200/").unwrap();

        transport.open(&url, sink).unwrap();

        assert_eq!(rx.try_recv().unwrap(), (7, TransportEvent::Open));
        assert!(handle.is_open());
        assert_eq!(handle.open_calls(), 1);
    }

    #[test]
    fn test_scripted_open_failure() {
        let (mut transport, handle) = SimTransport::new();
        let (sink, rx) = sink_pair();
        handle.fail_next_open("connection refused");

        let url = Url::parse("http://localhost:4200/").unwrap();
        let result = transport.open(&url, sink);

        assert!(matches!(result, Err(Error::IncompleteTransport(_))));
        assert!(rx.try_recv().is_err());
        assert!(!handle.is_open());
    }

    #[test]
    fn test_bind_replaces_instead_of_duplicating() {
        let (mut transport, handle) = SimTransport::new();
        let (sink, _rx) = sink_pair();
        let url = Url::parse("http://localhost:4200/").unwrap();
        transport.open(&url, sink).unwrap();

        transport.bind("chat").unwrap();
        transport.bind("chat").unwrap();

        assert_eq!(handle.bound(), vec!["chat"]);
        assert_eq!(handle.bind_log(), vec!["chat", "chat"]);

        transport.unbind("chat").unwrap();
        assert!(handle.bound().is_empty());
    }

    #[test]
    fn test_server_emit_respects_handler_table() {
        let (mut transport, handle) = SimTransport::new();
        let (sink, rx) = sink_pair();
        let url = Url::parse("http://localhost:4200/").unwrap();
        transport.open(&url, sink).unwrap();
        let _ = rx.try_recv(); // drop the open ack

        handle.server_emit("chat", json!({"a": 1}));
        assert!(rx.try_recv().is_err(), "unbound events must not be delivered");

        transport.bind("chat").unwrap();
        handle.server_emit("chat", json!({"a": 1}));
        assert_eq!(
            rx.try_recv().unwrap().1,
            TransportEvent::Packet {
                event: String::from("chat"),
                data: json!({"a": 1})
            }
        );
    }

    #[test]
    fn test_emit_requires_open() {
        let (mut transport, _handle) = SimTransport::new();
        let result = transport.emit("chat", json!("hi"));
        assert!(matches!(result, Err(Error::FailedToEmit(_))));
    }
}

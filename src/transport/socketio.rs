//! Bundled production transport on top of the `rust_socketio` client, which
//! handles framing, heartbeats and automatic reconnection.
//!
//! Two impedance mismatches are bridged here. The library only accepts
//! callbacks before `connect`, so dynamic `bind`/`unbind` is implemented on
//! top of its catch-all callback: the adapter keeps its own handler table
//! and forwards only frames whose event is currently bound. And the
//! library's retry loop is opaque, so a dropped connection surfaces as
//! [`TransportEvent::Closed`] (or an error) followed by a fresh
//! [`TransportEvent::Open`] rather than the finer-grained reconnect signals.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use rust_socketio::client::Client;
use rust_socketio::{ClientBuilder, Event as WireEvent, Payload as WirePayload};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{Transport, TransportEvent, TransportSink};
use crate::error::{Error, Result};

/// Socket.io transport. One instance serves any number of consecutive
/// connections; `open` tears down the previous session first.
pub struct SocketIoTransport {
    client: Option<Client>,
    bound: Arc<Mutex<HashSet<String>>>,
}

impl SocketIoTransport {
    pub fn new() -> Self {
        SocketIoTransport {
            client: None,
            bound: Arc::new(Mutex::new(HashSet::new())),
        }
    }
}

impl Default for SocketIoTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SocketIoTransport {
    fn open(&mut self, url: &Url, sink: TransportSink) -> Result<()> {
        self.close()?;
        // fresh session, fresh handler table; the client rebinds its active
        // listeners once the open is acknowledged
        self.bound.lock()?.clear();

        let bound = Arc::clone(&self.bound);
        let open_sink = sink.clone();
        let close_sink = sink.clone();
        let error_sink = sink.clone();

        let client = ClientBuilder::new(url.as_str())
            .reconnect(true)
            .reconnect_on_disconnect(false)
            .on(WireEvent::Connect, move |_, _| {
                open_sink.emit(TransportEvent::Open);
            })
            .on(WireEvent::Close, move |_, _| {
                close_sink.emit(TransportEvent::Closed);
            })
            .on(WireEvent::Error, move |payload, _| {
                error_sink.emit(TransportEvent::Error(payload_text(payload)));
            })
            .on_any(move |event, payload, _| {
                let name = String::from(event);
                let forward = bound.lock().map(|table| table.contains(&name)).unwrap_or(false);
                if forward {
                    sink.emit(TransportEvent::Packet {
                        event: name,
                        data: payload_value(payload),
                    });
                }
            })
            .connect()
            .map_err(|err| Error::IncompleteTransport(err.to_string()))?;

        self.client = Some(client);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            if let Err(err) = client.disconnect() {
                debug!(error = %err, "socket.io teardown reported an error");
            }
        }
        Ok(())
    }

    fn emit(&mut self, event: &str, data: Value) -> Result<()> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| Error::FailedToEmit(String::from("transport is not open")))?;
        client
            .emit(event, WirePayload::Text(vec![data]))
            .map_err(|err| Error::FailedToEmit(err.to_string()))
    }

    fn bind(&mut self, event: &str) -> Result<()> {
        self.bound.lock()?.insert(event.to_owned());
        Ok(())
    }

    fn unbind(&mut self, event: &str) -> Result<()> {
        self.bound.lock()?.remove(event);
        Ok(())
    }
}

impl Drop for SocketIoTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Collapses the library's payload shape into one JSON value. Multi-value
/// frames stay arrays; single values are unwrapped.
#[allow(deprecated)]
fn payload_value(payload: WirePayload) -> Value {
    match payload {
        WirePayload::Text(mut values) => {
            if values.len() == 1 {
                values.remove(0)
            } else if values.is_empty() {
                Value::Null
            } else {
                Value::Array(values)
            }
        }
        WirePayload::Binary(bytes) => Value::String(format!("<{} bytes of binary data>", bytes.len())),
        WirePayload::String(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
    }
}

fn payload_text(payload: WirePayload) -> String {
    match payload_value(payload) {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

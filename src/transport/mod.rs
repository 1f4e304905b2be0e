//! The transport boundary consumed by the lifecycle manager. Any
//! socket.io-compatible client can stand behind the [`Transport`] trait; the
//! core depends on nothing beyond this contract.

use std::fmt::Debug;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use url::Url;

use crate::error::Result;

pub mod sim;
#[cfg(feature = "transport")]
pub mod socketio;

#[cfg(feature = "transport")]
pub use socketio::SocketIoTransport;

/// A lifecycle signal or inbound frame reported by a transport. Events are
/// delivered through the [`TransportSink`] handed to [`Transport::open`] and
/// applied by the client's dispatcher in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The transport acknowledged the open.
    Open,
    /// The transport reported an error. Fatal while a connect attempt is in
    /// flight; once connected it no longer changes the connection status.
    Error(String),
    /// The transport closed.
    Closed,
    /// The transport started an automatic retry.
    ReconnectAttempt,
    /// An automatic retry failed; the transport keeps retrying.
    ReconnectError(String),
    /// An automatic retry succeeded.
    ReconnectSuccess,
    /// An inbound event frame.
    Packet { event: String, data: Value },
}

/// Sender half handed to the transport at open time. Every sink belongs to
/// one connect attempt; events from a torn-down attempt carry a stale epoch
/// and are dropped by the dispatcher.
#[derive(Clone)]
pub struct TransportSink {
    epoch: u64,
    tx: Arc<Mutex<Sender<(u64, TransportEvent)>>>,
}

impl TransportSink {
    pub(crate) fn new(epoch: u64, tx: Arc<Mutex<Sender<(u64, TransportEvent)>>>) -> Self {
        TransportSink { epoch, tx }
    }

    /// Delivers one event to the client. A failed delivery means the client
    /// is gone and the event is dropped.
    pub fn emit(&self, event: TransportEvent) {
        if let Ok(tx) = self.tx.lock() {
            let _ = tx.send((self.epoch, event));
        }
    }
}

impl Debug for TransportSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSink").field("epoch", &self.epoch).finish()
    }
}

/// The underlying socket.io-protocol-compatible client. Implementations
/// deliver their lifecycle signals and inbound frames through the sink
/// passed to `open` and must tolerate `close` at any point, including before
/// `open` was ever acknowledged.
pub trait Transport: Send {
    /// Establishes a connection and wires signals into `sink`. May block
    /// until the handshake resolves; the client always calls this off the
    /// caller thread.
    fn open(&mut self, url: &Url, sink: TransportSink) -> Result<()>;

    /// Tears the connection down. Idempotent.
    fn close(&mut self) -> Result<()>;

    /// Emits one event frame to the server.
    fn emit(&mut self, event: &str, data: Value) -> Result<()>;

    /// Registers the live handler for a wire event. Binding an event that
    /// is already bound replaces the existing handler.
    fn bind(&mut self, event: &str) -> Result<()>;

    /// Removes the live handler for a wire event.
    fn unbind(&mut self, event: &str) -> Result<()>;
}

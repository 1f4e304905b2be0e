//! socketio_probe is the core of a manual test client for socket.io-style
//! websocket servers, written in the Rust Programming Language. It owns the
//! connection lifecycle, a registry of named event listeners and a
//! timestamped message log; rendering those and collecting operator input is
//! left to whatever presentation layer sits on top.
//!
//! ## Example usage
//!
//! ``` no_run
//! use socketio_probe::{ClientBuilder, DomainEvent};
//! use socketio_probe::transport::sim::SimTransport;
//!
//! // any socket.io-compatible transport works; the sim needs no server.
//! // with the `transport` feature the bundled rust_socketio transport is
//! // picked automatically when none is configured.
//! let (transport, _server) = SimTransport::new();
//!
//! let client = ClientBuilder::new()
//!     .transport(Box::new(transport))
//!     .subscribe(|event| {
//!         if let DomainEvent::MessageAppended(message) = event {
//!             println!("{} {:?}", message.event, message.data);
//!         }
//!     })
//!     .build()
//!     .expect("client setup failed");
//!
//! client.connect("http://localhost:4200/").expect("connect failed");
//!
//! // listener definitions survive reconnects; only their live bindings
//! // are torn down and rebound.
//! client.add_listener("chat", Some("room traffic".to_owned())).expect("listener rejected");
//!
//! // raw operator input is parsed as JSON where possible and sent as an
//! // opaque string otherwise.
//! client.send("chat", r#"{"text": "hi"}"#).expect("send failed");
//! client.send("chat", "plain text works too").expect("send failed");
//!
//! client.disconnect().expect("disconnect failed");
//! ```
//!
//! The main entry point for using this crate is the [`ClientBuilder`] which
//! provides a way to configure the client in the needed way. When the
//! `build` method is called on the builder, it returns a [`TestClient`]
//! which then could be used to connect, manage listeners and emit messages.
//! One client owns exactly one logical connection; connecting again tears
//! the previous connection down first.
//!
//! ## Current features
//!
//! - connecting to a server, with the full connection status state machine
//!   (`disconnected`, `connecting`, `connected`, `error`, `reconnecting`)
//!   observable at any time.
//! - registering named event listeners before or during a connection;
//!   definitions persist across reconnects and are rebound automatically.
//! - sending JSON or plain-text data to the server (via `serde_json` which
//!   provides safe handling).
//! - a timestamped, append-only log of inbound, outbound and system
//!   messages.
//! - push notifications for every state change through [`DomainEvent`]
//!   subscriptions.
//!
//! Connection errors after the session is established deliberately do not
//! change the connection status: a test tool must let the operator watch a
//! server misbehave without yanking the connection away.

#![warn(clippy::complexity)]
#![warn(clippy::style)]
#![warn(clippy::perf)]
#![warn(clippy::correctness)]

/// Defines client only structs
pub mod client;
/// Contains the error type which will be returned with every result in this
/// crate.
pub mod error;
/// Defines the events that could be sent or received.
pub mod event;
/// Defines the listener registry and its records.
pub mod listener;
/// Defines the message log and its records.
pub mod message;
/// Defines the types of payload (structured or text), that could be sent or
/// received.
pub mod payload;
/// Defines the connection status state machine.
pub mod status;
/// Defines the transport boundary and the bundled transports.
pub mod transport;

pub use error::Error;

pub use {event::Event, payload::Payload};

pub use {listener::EventListener, message::Message, status::ConnectionStatus};

pub use client::{ClientBuilder, DomainEvent, Subscription, TestClient};

#[cfg(test)]
pub(crate) mod test {
    use std::time::{Duration, Instant};

    /// The URL tests connect the sim transport to.
    pub(crate) const TEST_URL: &str = "http://localhost:4200/";

    /// Polls `condition` until it holds or a deadline passes. Transport
    /// events are applied by the dispatcher thread, so tests wait for the
    /// queue to drain instead of assuming synchronous delivery.
    pub(crate) fn wait_for<F: FnMut() -> bool>(mut condition: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }
}

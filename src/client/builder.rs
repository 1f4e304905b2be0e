use crate::client::callback::Callback;
use crate::client::{DomainEvent, TestClient};
#[cfg(not(feature = "transport"))]
use crate::error::Error;
use crate::error::Result;
use crate::listener::ListenerRegistry;
use crate::transport::Transport;
#[cfg(feature = "transport")]
use crate::transport::SocketIoTransport;

/// A builder for the test client. This handles picking the transport,
/// bootstrapping the default listener set and registering subscribers that
/// want to observe every mutation from the start. `build` returns an
/// explicitly owned, not yet connected [`TestClient`].
///
/// # Example
/// ```no_run
/// use socketio_probe::ClientBuilder;
/// use socketio_probe::transport::sim::SimTransport;
///
/// let (transport, _server) = SimTransport::new();
///
/// let client = ClientBuilder::new()
///     .transport(Box::new(transport))
///     .subscribe(|event| println!("{:?}", event))
///     .build()
///     .expect("client setup failed");
///
/// client.connect("http://localhost:4200/").expect("connect failed");
/// ```
pub struct ClientBuilder {
    transport: Option<Box<dyn Transport>>,
    bootstrap_listeners: bool,
    subscribers: Vec<Callback>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        ClientBuilder {
            transport: None,
            bootstrap_listeners: true,
            subscribers: Vec::new(),
        }
    }

    /// Replaces the transport the client will drive. Without this call the
    /// builder falls back to the bundled socket.io transport, which requires
    /// the `transport` feature.
    pub fn transport(mut self, transport: Box<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Skips the default listener bootstrap (`connect`, `disconnect`,
    /// `error`, `message`, `notification`), starting with an empty registry.
    pub fn without_default_listeners(mut self) -> Self {
        self.bootstrap_listeners = false;
        self
    }

    /// Registers a subscriber for the client's domain events before the
    /// client exists, so the very first mutation is already observed.
    pub fn subscribe<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&DomainEvent) + 'static + Send,
    {
        self.subscribers.push(Callback::new(callback));
        self
    }

    pub fn build(self) -> Result<TestClient> {
        let transport = match self.transport {
            Some(transport) => transport,
            #[cfg(feature = "transport")]
            None => Box::new(SocketIoTransport::new()) as Box<dyn Transport>,
            #[cfg(not(feature = "transport"))]
            None => return Err(Error::MissingTransport()),
        };
        let registry = if self.bootstrap_listeners {
            ListenerRegistry::with_defaults()
        } else {
            ListenerRegistry::default()
        };
        Ok(TestClient::new(transport, registry, self.subscribers))
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

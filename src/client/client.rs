use std::ops::DerefMut;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, Weak};
use std::thread;

use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::client::callback::Callback;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::listener::{EventListener, ListenerRegistry};
use crate::message::{Message, MessageLog};
use crate::payload::Payload;
use crate::status::ConnectionStatus;
use crate::transport::{Transport, TransportEvent, TransportSink};

/// A change notification pushed to subscribers synchronously after the
/// mutation that caused it completed.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    StatusChanged(ConnectionStatus),
    MessageAppended(Message),
    LogCleared,
    ListenerAdded(EventListener),
    ListenerRemoved(EventListener),
    ListenerToggled(EventListener),
    ErrorRaised(String),
}

/// Handle returned by [`TestClient::subscribe`]. Consuming it detaches the
/// subscriber; merely dropping it keeps the subscription alive for the
/// lifetime of the client.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    subscribers: Weak<Mutex<Subscribers>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            if let Ok(mut subscribers) = subscribers.lock() {
                subscribers.entries.retain(|(id, _)| *id != self.id);
            }
        }
    }
}

#[derive(Debug, Default)]
struct Subscribers {
    next_id: u64,
    entries: Vec<(u64, Callback)>,
}

/// Everything behind the single serialized access point: status, target
/// URL, listener registry, message log and the pending error. The epoch
/// counts connect/disconnect generations; transport events stamped with an
/// older epoch belong to a torn-down attempt and are dropped.
struct Inner {
    status: ConnectionStatus,
    url: Option<Url>,
    epoch: u64,
    registry: ListenerRegistry,
    log: MessageLog,
    last_error: Option<String>,
}

impl Inner {
    fn set_status(&mut self, status: ConnectionStatus, notifications: &mut Vec<DomainEvent>) {
        if self.status != status {
            info!(from = %self.status, to = %status, "status changed");
            self.status = status;
            notifications.push(DomainEvent::StatusChanged(status));
        }
    }

    fn push_message(&mut self, message: Message, notifications: &mut Vec<DomainEvent>) {
        notifications.push(DomainEvent::MessageAppended(message.clone()));
        self.log.append(message);
    }

    fn push_system<T: Into<String>>(&mut self, text: T, notifications: &mut Vec<DomainEvent>) {
        self.push_message(Message::system(text), notifications);
    }

    fn raise_error(&mut self, error: String, notifications: &mut Vec<DomainEvent>) {
        self.last_error = Some(error.clone());
        notifications.push(DomainEvent::ErrorRaised(error));
    }
}

/// The connection lifecycle manager. Owns one logical connection to a
/// remote endpoint plus the listener registry and the message log, and is
/// the only mutation surface a presentation layer gets.
///
/// All handles returned by `clone` drive the same connection.
#[derive(Clone)]
pub struct TestClient {
    inner: Arc<Mutex<Inner>>,
    transport: Arc<Mutex<Box<dyn Transport>>>,
    subscribers: Arc<Mutex<Subscribers>>,
    events_tx: Arc<Mutex<Sender<(u64, TransportEvent)>>>,
}

impl TestClient {
    pub(crate) fn new(
        transport: Box<dyn Transport>,
        registry: ListenerRegistry,
        callbacks: Vec<Callback>,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        let mut subscribers = Subscribers::default();
        for callback in callbacks {
            let id = subscribers.next_id;
            subscribers.next_id += 1;
            subscribers.entries.push((id, callback));
        }

        let client = TestClient {
            inner: Arc::new(Mutex::new(Inner {
                status: ConnectionStatus::Disconnected,
                url: None,
                epoch: 0,
                registry,
                log: MessageLog::default(),
                last_error: None,
            })),
            transport: Arc::new(Mutex::new(transport)),
            subscribers: Arc::new(Mutex::new(subscribers)),
            events_tx: Arc::new(Mutex::new(tx)),
        };

        let context = DispatchContext {
            inner: Arc::downgrade(&client.inner),
            transport: Arc::downgrade(&client.transport),
            subscribers: Arc::downgrade(&client.subscribers),
        };
        // Applies transport events in arrival order. The loop ends once the
        // client and every outstanding sink are gone.
        thread::spawn(move || {
            while let Ok((epoch, event)) = rx.recv() {
                if !context.apply(epoch, event) {
                    break;
                }
            }
        });

        client
    }

    /// Connects to `url`, tearing down any previous connection first. The
    /// call returns once the attempt has been issued; completion arrives
    /// asynchronously through the status value and the log.
    ///
    /// The URL must be absolute, with a scheme and a host component.
    pub fn connect<T: AsRef<str>>(&self, url: T) -> Result<()> {
        let url = match parse_url(url.as_ref()) {
            Ok(url) => url,
            Err(err) => return Err(self.fail("connect rejected", err)),
        };

        let epoch = {
            let mut inner = self.inner.lock()?;
            let mut notifications = Vec::new();
            inner.epoch += 1;
            inner.last_error = None;
            inner.set_status(ConnectionStatus::Connecting, &mut notifications);
            inner.url = Some(url.clone());
            inner.push_system(format!("connecting to {url}"), &mut notifications);
            let epoch = inner.epoch;
            drop(inner);
            self.notify(&notifications);
            epoch
        };

        info!(url = %url, "issuing connect attempt");
        let sink = TransportSink::new(epoch, Arc::clone(&self.events_tx));
        let inner = Arc::clone(&self.inner);
        let transport = Arc::clone(&self.transport);
        // Teardown of the previous handle and the potentially blocking open
        // both happen off the caller thread; the outcome comes back through
        // the sink. The epoch re-check under the transport lock keeps an
        // attempt that was cancelled before it started from ever opening.
        thread::spawn(move || {
            let mut guard = match transport.lock() {
                Ok(guard) => guard,
                Err(_) => return,
            };
            let current = match inner.lock() {
                Ok(inner) => inner.epoch,
                Err(_) => return,
            };
            if current != epoch {
                debug!("connect attempt superseded before open");
                return;
            }
            if let Err(err) = guard.close() {
                warn!(error = %err, "teardown before connect failed");
            }
            match guard.open(&url, sink.clone()) {
                Ok(()) => debug!(url = %url, "connect attempt issued"),
                Err(err) => sink.emit(TransportEvent::Error(err.to_string())),
            }
        });

        Ok(())
    }

    /// Disconnects. Without a live transport this is a no-op that still
    /// forces the status to `disconnected` and logs a system message.
    /// Teardown failures are reported in the log, never propagated. Calling
    /// this while a `connect` is still pending cancels the attempt.
    pub fn disconnect(&self) -> Result<()> {
        let previous = {
            let mut inner = self.inner.lock()?;
            let mut notifications = Vec::new();
            inner.epoch += 1;
            let previous = inner.status;
            inner.set_status(ConnectionStatus::Disconnected, &mut notifications);
            drop(inner);
            self.notify(&notifications);
            previous
        };

        info!("disconnect requested");
        let teardown = {
            let mut transport = self.transport.lock()?;
            transport.close()
        };

        let mut notifications = Vec::new();
        {
            let mut inner = self.inner.lock()?;
            match teardown {
                Ok(()) => {
                    if previous == ConnectionStatus::Disconnected {
                        inner.push_system(
                            "disconnect requested with no active connection",
                            &mut notifications,
                        );
                    } else {
                        inner.push_system("disconnected", &mut notifications);
                    }
                }
                Err(err) => {
                    warn!(error = %err, "teardown failed");
                    let message = Message::system("disconnected, teardown reported an error")
                        .with_error(err.to_string());
                    inner.push_message(message, &mut notifications);
                }
            }
        }
        self.notify(&notifications);
        Ok(())
    }

    /// Emits `event_name` with the given raw payload text. The text is
    /// parsed as JSON where possible and sent as an opaque string otherwise;
    /// the fallback is never an error. Requires a connected transport. On
    /// success the outbound message is appended to the log; a rejected or
    /// failed send appends nothing.
    pub fn send<E: AsRef<str>, D: AsRef<str>>(&self, event: E, raw_text: D) -> Result<()> {
        let event = event.as_ref();
        let raw_text = raw_text.as_ref();
        if event.trim().is_empty() {
            return Err(self.record(Error::InvalidEventName()));
        }
        if raw_text.is_empty() {
            return Err(self.record(Error::InvalidPayloadText()));
        }
        {
            let inner = self.inner.lock()?;
            if !inner.status.is_connected() {
                drop(inner);
                return Err(self.record(Error::IllegalActionBeforeOpen()));
            }
        }

        let payload = Payload::parse(raw_text);
        let emitted = {
            let mut transport = self.transport.lock()?;
            transport.emit(event, payload.to_value())
        };
        if let Err(err) = emitted {
            let err = match err {
                err @ Error::FailedToEmit(_) => err,
                other => Error::FailedToEmit(other.to_string()),
            };
            return Err(self.record(err));
        }

        debug!(event = %event, "event emitted");
        let mut notifications = Vec::new();
        {
            let mut inner = self.inner.lock()?;
            inner.push_message(Message::outgoing(Event::from(event), payload), &mut notifications);
        }
        self.notify(&notifications);
        Ok(())
    }

    /// Registers a listener for `event_name`. Rejects blank names and
    /// duplicates (names are matched exactly). When the client is connected
    /// the live handler is bound immediately; otherwise binding waits for
    /// the next connect.
    pub fn add_listener<T: AsRef<str>>(
        &self,
        event_name: T,
        description: Option<String>,
    ) -> Result<EventListener> {
        let (listener, live) = {
            let mut inner = self.inner.lock()?;
            let mut notifications = Vec::new();
            let listener = match inner.registry.add(event_name.as_ref(), description) {
                Ok(listener) => listener,
                Err(err) => {
                    drop(inner);
                    return Err(self.fail("listener rejected", err));
                }
            };
            notifications.push(DomainEvent::ListenerAdded(listener.clone()));
            inner.push_system(
                format!("listener added for '{}'", listener.event_name),
                &mut notifications,
            );
            let live = inner.status.is_connected();
            drop(inner);
            self.notify(&notifications);
            (listener, live)
        };

        if live {
            apply_bindings(
                &self.inner,
                &self.subscribers,
                &self.transport,
                vec![listener.event_name.clone()],
                Vec::new(),
            );
        }
        debug!(event = %listener.event_name, "listener added");
        Ok(listener)
    }

    /// Removes the listener with the given id, unbinding its live handler
    /// first when one exists. Unknown ids are a silent no-op; the caller
    /// may race a concurrent removal.
    pub fn remove_listener(&self, id: Uuid) -> Result<()> {
        let (removed, live) = {
            let mut inner = self.inner.lock()?;
            let removed = match inner.registry.remove(id) {
                Some(removed) => removed,
                None => return Ok(()),
            };
            let mut notifications = vec![DomainEvent::ListenerRemoved(removed.clone())];
            inner.push_system(
                format!("listener removed for '{}'", removed.event_name),
                &mut notifications,
            );
            let live = inner.status.is_connected() && removed.is_active;
            drop(inner);
            self.notify(&notifications);
            (removed, live)
        };

        if live {
            apply_bindings(
                &self.inner,
                &self.subscribers,
                &self.transport,
                Vec::new(),
                vec![removed.event_name],
            );
        }
        Ok(())
    }

    /// Flips a listener's `is_active` flag, binding or unbinding the live
    /// handler when connected. The definition itself is retained either
    /// way. Unknown ids are a silent no-op.
    pub fn toggle_listener(&self, id: Uuid) -> Result<()> {
        let (listener, live) = {
            let mut inner = self.inner.lock()?;
            let listener = match inner.registry.toggle(id) {
                Some(listener) => listener,
                None => return Ok(()),
            };
            let notifications = vec![DomainEvent::ListenerToggled(listener.clone())];
            let live = inner.status.is_connected();
            drop(inner);
            self.notify(&notifications);
            (listener, live)
        };

        if live {
            let (bind, unbind) = if listener.is_active {
                (vec![listener.event_name], Vec::new())
            } else {
                (Vec::new(), vec![listener.event_name])
            };
            apply_bindings(&self.inner, &self.subscribers, &self.transport, bind, unbind);
        }
        Ok(())
    }

    /// Empties the log, leaving exactly one system entry that records the
    /// clear.
    pub fn clear_log(&self) -> Result<()> {
        let notifications = {
            let mut inner = self.inner.lock()?;
            let marker = inner.log.clear();
            vec![DomainEvent::LogCleared, DomainEvent::MessageAppended(marker)]
        };
        self.notify(&notifications);
        debug!("message log cleared");
        Ok(())
    }

    /// Registers a subscriber for the client's domain events. Subscribers
    /// are invoked synchronously after each mutation completes and may
    /// invoke client operations, but must not subscribe or unsubscribe from
    /// inside the callback.
    pub fn subscribe<F>(&self, callback: F) -> Result<Subscription>
    where
        F: FnMut(&DomainEvent) + 'static + Send,
    {
        let mut subscribers = self.subscribers.lock()?;
        let id = subscribers.next_id;
        subscribers.next_id += 1;
        subscribers.entries.push((id, Callback::new(callback)));
        Ok(Subscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        })
    }

    pub fn status(&self) -> Result<ConnectionStatus> {
        Ok(self.inner.lock()?.status)
    }

    /// The current target URL. Preserved across failed attempts so a retry
    /// can reuse it.
    pub fn url(&self) -> Result<Option<Url>> {
        Ok(self.inner.lock()?.url.clone())
    }

    pub fn listeners(&self) -> Result<Vec<EventListener>> {
        Ok(self.inner.lock()?.registry.all().to_vec())
    }

    pub fn messages(&self) -> Result<Vec<Message>> {
        Ok(self.inner.lock()?.log.entries().to_vec())
    }

    /// The pending error value: the most recent operation or transport
    /// failure, until dismissed or a new connect attempt starts.
    pub fn last_error(&self) -> Result<Option<String>> {
        Ok(self.inner.lock()?.last_error.clone())
    }

    /// Dismisses the pending error without touching the log.
    pub fn clear_error(&self) -> Result<()> {
        self.inner.lock()?.last_error = None;
        Ok(())
    }

    fn notify(&self, notifications: &[DomainEvent]) {
        notify_subscribers(&self.subscribers, notifications);
    }

    /// Records a failed operation: pending error plus a system entry.
    fn fail(&self, context: &str, error: Error) -> Error {
        warn!(error = %error, "{}", context);
        if let Ok(mut inner) = self.inner.lock() {
            let mut notifications = Vec::new();
            inner.raise_error(error.to_string(), &mut notifications);
            let message = Message::system(context).with_error(error.to_string());
            inner.push_message(message, &mut notifications);
            drop(inner);
            self.notify(&notifications);
        }
        error
    }

    /// Records a rejected send: pending error only, the log stays untouched.
    fn record(&self, error: Error) -> Error {
        warn!(error = %error, "send rejected");
        if let Ok(mut inner) = self.inner.lock() {
            let mut notifications = Vec::new();
            inner.raise_error(error.to_string(), &mut notifications);
            drop(inner);
            self.notify(&notifications);
        }
        error
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)?;
    if !url.has_host() {
        return Err(Error::InvalidUrlHost(raw.to_owned()));
    }
    Ok(url)
}

fn notify_subscribers(subscribers: &Mutex<Subscribers>, notifications: &[DomainEvent]) {
    if notifications.is_empty() {
        return;
    }
    if let Ok(mut subscribers) = subscribers.lock() {
        for event in notifications {
            for (_, callback) in subscribers.entries.iter_mut() {
                callback.deref_mut()(event);
            }
        }
    }
}

/// Applies live handler changes to the transport and reports failures into
/// the log. Called with neither lock held; binding failures must not poison
/// the state that triggered them.
fn apply_bindings(
    inner: &Mutex<Inner>,
    subscribers: &Mutex<Subscribers>,
    transport: &Mutex<Box<dyn Transport>>,
    bind: Vec<String>,
    unbind: Vec<String>,
) {
    let mut failures = Vec::new();
    if let Ok(mut transport) = transport.lock() {
        for event in &bind {
            if let Err(err) = transport.bind(event) {
                failures.push((event.clone(), err));
            }
        }
        for event in &unbind {
            if let Err(err) = transport.unbind(event) {
                failures.push((event.clone(), err));
            }
        }
    }
    if failures.is_empty() {
        return;
    }

    let mut notifications = Vec::new();
    if let Ok(mut inner) = inner.lock() {
        for (event, err) in failures {
            warn!(event = %event, error = %err, "live binding change failed");
            inner.raise_error(err.to_string(), &mut notifications);
            let message = Message::system(format!("failed to rewire listener for '{event}'"))
                .with_error(err.to_string());
            inner.push_message(message, &mut notifications);
        }
    }
    notify_subscribers(subscribers, &notifications);
}

/// Weak handles for the dispatcher thread, so a forgotten client does not
/// keep its own event loop alive.
struct DispatchContext {
    inner: Weak<Mutex<Inner>>,
    transport: Weak<Mutex<Box<dyn Transport>>>,
    subscribers: Weak<Mutex<Subscribers>>,
}

impl DispatchContext {
    /// Applies one transport event. Returns `false` once the client is gone
    /// and the dispatcher should exit.
    fn apply(&self, epoch: u64, event: TransportEvent) -> bool {
        let (inner, subscribers) = match (self.inner.upgrade(), self.subscribers.upgrade()) {
            (Some(inner), Some(subscribers)) => (inner, subscribers),
            _ => return false,
        };

        let mut notifications = Vec::new();
        let mut rebind = Vec::new();
        {
            let mut inner = match inner.lock() {
                Ok(guard) => guard,
                Err(_) => return false,
            };
            if epoch != inner.epoch {
                debug!(epoch, current = inner.epoch, "dropping stale transport event");
                return true;
            }

            match event {
                TransportEvent::Open | TransportEvent::ReconnectSuccess => {
                    if !inner.status.is_connected() {
                        let reconnected = inner.status == ConnectionStatus::Reconnecting;
                        inner.set_status(ConnectionStatus::Connected, &mut notifications);
                        rebind = inner
                            .registry
                            .active()
                            .map(|listener| listener.event_name.clone())
                            .collect();
                        let text = match (&inner.url, reconnected) {
                            (Some(url), false) => format!("connected to {url}"),
                            (Some(url), true) => format!("reconnected to {url}"),
                            (None, _) => String::from("connected"),
                        };
                        inner.push_system(text, &mut notifications);
                    }
                }
                TransportEvent::Error(reason) => {
                    if inner.status == ConnectionStatus::Connecting {
                        // A connect-time error is fatal for the attempt but
                        // the attempt is not abandoned: the URL stays put
                        // and the transport may still come up later.
                        inner.set_status(ConnectionStatus::Error, &mut notifications);
                    }
                    inner.raise_error(reason.clone(), &mut notifications);
                    let message = Message::system("transport error").with_error(reason);
                    inner.push_message(message, &mut notifications);
                }
                TransportEvent::Closed => {
                    if inner.status != ConnectionStatus::Disconnected {
                        inner.set_status(ConnectionStatus::Disconnected, &mut notifications);
                        inner.push_system("connection closed by transport", &mut notifications);
                    }
                }
                TransportEvent::ReconnectAttempt => {
                    if inner.status != ConnectionStatus::Reconnecting {
                        inner.set_status(ConnectionStatus::Reconnecting, &mut notifications);
                        inner.push_system("connection lost, reconnecting", &mut notifications);
                    }
                }
                TransportEvent::ReconnectError(reason) => {
                    // Stays `reconnecting`, the transport keeps retrying.
                    inner.raise_error(reason.clone(), &mut notifications);
                    let message = Message::system("reconnect attempt failed").with_error(reason);
                    inner.push_message(message, &mut notifications);
                }
                TransportEvent::Packet { event, data } => {
                    if inner.registry.is_active(&event) {
                        let message = Message::incoming(Event::from(event), Payload::from(data));
                        inner.push_message(message, &mut notifications);
                    } else {
                        debug!(event = %event, "dropping frame without an active listener");
                    }
                }
            }
        }
        notify_subscribers(&subscribers, &notifications);

        if !rebind.is_empty() {
            if let Some(transport) = self.transport.upgrade() {
                apply_bindings(&inner, &subscribers, &transport, rebind, Vec::new());
            }
        }
        true
    }
}

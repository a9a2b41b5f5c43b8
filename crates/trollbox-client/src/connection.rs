//! Realtime channel lifecycle.
//!
//! One driver task per open channel walks the state machine
//! `Connecting -> Open -> PendingRetry -> Connecting ...` until `close()`.
//! Connect failures and lost channels are logged and retried with capped
//! exponential backoff; they are never surfaced as errors to the caller.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use trollbox_types::{ChatAction, Message, ServerFrame};

use crate::backoff::Backoff;
use crate::error::ConnectionError;
use crate::transport::{Connector, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Channel established; the token was accepted at upgrade.
    Open,
    /// Channel lost, waiting for the backoff timer.
    PendingRetry,
}

/// What the driver reports upward, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Connected,
    /// History sent by the gateway right after (re)connecting.
    Batch(Vec<Message>),
    Action(ChatAction),
    Disconnected,
    /// A connect attempt failed; another follows after the backoff delay.
    ConnectFailed(ConnectionError),
}

struct Shared {
    state: watch::Sender<ConnectionState>,
    token: RwLock<String>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }
}

/// Cheap clonable access to a running channel: send, observe, refresh token.
#[derive(Clone)]
pub struct ConnectionHandle {
    shared: Arc<Shared>,
}

impl ConnectionHandle {
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Queue an action for the gateway. Returns `false` without error when
    /// the channel is not open; delivery is never guaranteed.
    pub fn send(&self, action: &ChatAction) -> bool {
        if self.shared.state() != ConnectionState::Open {
            debug!("Dropping {} while channel is not open", action.name());
            return false;
        }
        let text = match serde_json::to_string(action) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode {}: {}", action.name(), e);
                return false;
            }
        };
        let outbound = self.shared.outbound.lock().expect("outbound lock poisoned");
        match outbound.as_ref() {
            Some(tx) => tx.send(text).is_ok(),
            None => false,
        }
    }

    /// Token to present on the next connect attempt.
    pub fn refresh_token(&self, token: impl Into<String>) {
        *self.shared.token.write().expect("token lock poisoned") = token.into();
    }
}

/// Owns the realtime channel of one widget instance.
pub struct ConnectionManager<C> {
    connector: Arc<C>,
    shared: Arc<Shared>,
    backoff_floor: Duration,
    backoff_max: Duration,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, backoff_floor: Duration, backoff_max: Duration) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector: Arc::new(connector),
            shared: Arc::new(Shared {
                state,
                token: RwLock::new(String::new()),
                outbound: Mutex::new(None),
            }),
            backoff_floor,
            backoff_max,
            cancel: None,
            task: None,
        }
    }

    /// Start connecting to `endpoint`, presenting `token` as `?auth=`.
    ///
    /// Any previous channel is closed first. Fails without retrying when the
    /// token is empty or the endpoint is not a URL. Events for this channel
    /// arrive on the returned receiver until `close()`.
    pub fn open(
        &mut self,
        endpoint: &str,
        token: &str,
    ) -> Result<mpsc::UnboundedReceiver<ChannelEvent>, ConnectionError> {
        if token.trim().is_empty() {
            return Err(ConnectionError::MissingToken);
        }
        let endpoint = Url::parse(endpoint)
            .map_err(|e| ConnectionError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;

        self.close();

        *self.shared.token.write().expect("token lock poisoned") = token.to_string();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        *self.shared.outbound.lock().expect("outbound lock poisoned") = Some(command_tx);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let cancel = CancellationToken::new();
        self.shared.state.send_replace(ConnectionState::Connecting);

        let driver = Driver {
            connector: self.connector.clone(),
            shared: self.shared.clone(),
            endpoint,
            backoff: Backoff::new(self.backoff_floor, self.backoff_max),
            commands: command_rx,
            events: event_tx,
            cancel: cancel.clone(),
        };
        self.task = Some(tokio::spawn(driver.run()));
        self.cancel = Some(cancel);

        Ok(event_rx)
    }

    /// Tear down from any state: cancels a pending reconnect, drops the
    /// channel, and stops all further events.
    pub fn close(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.shared.outbound.lock().expect("outbound lock poisoned").take();
        if self.shared.state.send_replace(ConnectionState::Disconnected) != ConnectionState::Disconnected {
            info!("Realtime channel closed");
        }
    }

    pub fn handle(&self) -> ConnectionHandle {
        ConnectionHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn send(&self, action: &ChatAction) -> bool {
        self.handle().send(action)
    }

    pub fn refresh_token(&self, token: impl Into<String>) {
        self.handle().refresh_token(token)
    }
}

impl<C> Drop for ConnectionManager<C> {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct Driver<C> {
    connector: Arc<C>,
    shared: Arc<Shared>,
    endpoint: Url,
    backoff: Backoff,
    commands: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    cancel: CancellationToken,
}

impl<C: Connector> Driver<C> {
    async fn run(mut self) {
        loop {
            let url = self.url_with_token();
            self.transition(ConnectionState::Connecting);

            let attempt = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                result = self.connector.connect(&url) => result,
            };

            match attempt {
                Ok(transport) => {
                    self.backoff.reset();
                    self.discard_stale_commands();
                    self.transition(ConnectionState::Open);
                    info!("Connected to {}", self.endpoint);
                    self.emit(ChannelEvent::Connected);

                    match self.pump(transport).await {
                        Ok(()) => return,
                        Err(e) => {
                            warn!("Realtime channel lost: {}", e);
                            self.emit(ChannelEvent::Disconnected);
                        }
                    }
                }
                Err(e) => {
                    warn!("Connecting to {} failed: {}", self.endpoint, e);
                    self.emit(ChannelEvent::ConnectFailed(e));
                }
            }

            self.transition(ConnectionState::PendingRetry);
            let delay = self.backoff.next_delay();
            info!(
                "Reconnecting in {:?} (consecutive failures: {})",
                delay,
                self.backoff.failures()
            );

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Relay frames both ways until the channel is lost (`Err`) or the
    /// manager goes away (`Ok`). Dropping `transport` on return closes it.
    async fn pump(&mut self, mut transport: Transport) -> Result<(), ConnectionError> {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(()),
                frame = transport.incoming.recv() => match frame {
                    Some(Ok(text)) => self.handle_frame(&text),
                    Some(Err(e)) => return Err(e),
                    None => return Err(ConnectionError::PeerClosed),
                },
                command = self.commands.recv() => match command {
                    Some(text) => {
                        if transport.outgoing.send(text).await.is_err() {
                            return Err(ConnectionError::PeerClosed);
                        }
                    }
                    None => return Ok(()),
                },
            }
        }
    }

    fn handle_frame(&self, text: &str) {
        match ServerFrame::decode(text) {
            Ok(ServerFrame::History(messages)) => {
                debug!("Received history of {} messages", messages.len());
                self.emit(ChannelEvent::Batch(messages));
            }
            Ok(ServerFrame::Action(action)) => {
                trace!("Received {}", action.name());
                self.emit(ChannelEvent::Action(action));
            }
            Ok(ServerFrame::Error(error)) => warn!("Gateway reported an error: {}", error),
            Err(e) => warn!("Dropping frame from gateway: {}", e),
        }
    }

    fn emit(&self, event: ChannelEvent) {
        if self.cancel.is_cancelled() {
            return;
        }
        let _ = self.events.send(event);
    }

    /// State changes after cancellation are ignored so a late driver step
    /// cannot overwrite the `Disconnected` set by `close()`.
    fn transition(&self, next: ConnectionState) {
        let cancel = &self.cancel;
        self.shared.state.send_if_modified(|state| {
            if cancel.is_cancelled() || *state == next {
                return false;
            }
            *state = next;
            true
        });
    }

    /// Sends queued against a channel that has since died are not replayed.
    fn discard_stale_commands(&mut self) {
        let mut dropped = 0;
        while self.commands.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!("Discarded {} actions queued before reconnect", dropped);
        }
    }

    fn url_with_token(&self) -> Url {
        let token = self.shared.token.read().expect("token lock poisoned").clone();
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("auth", &token);
        url
    }
}

//! A running widget: authenticated identity, realtime channel, message log.

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use trollbox_types::Credentials;

use crate::config::ClientConfig;
use crate::connection::{ChannelEvent, ConnectionHandle, ConnectionManager, ConnectionState};
use crate::credentials::{CredentialStore, HttpTokenSource, TokenSource};
use crate::encoder::{encode_delete, encode_post};
use crate::error::ClientError;
use crate::sync::{LogEvent, Synchronizer};
use crate::transport::{Connector, WsConnector};

/// What the user asked the widget to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Submit(String),
    Delete(String),
}

pub struct Trollbox<C> {
    /// Follows token refreshes, so a role change on the forum applies here.
    credentials: watch::Receiver<Credentials>,
    connection: ConnectionManager<C>,
    handle: ConnectionHandle,
    pump: JoinHandle<()>,
}

impl Trollbox<WsConnector> {
    /// Fetch a token from `config.auth_endpoint` and connect over WebSocket.
    pub async fn start(config: ClientConfig) -> Result<(Self, mpsc::UnboundedReceiver<LogEvent>), ClientError> {
        let source = HttpTokenSource::from_config(&config);
        Self::start_with(config, source, WsConnector).await
    }
}

impl<C: Connector> Trollbox<C> {
    /// Authenticate through `source`, open the channel through `connector`,
    /// and start reconciling. Log changes arrive on the returned receiver.
    ///
    /// Authentication failures are returned here and nothing is connected.
    pub async fn start_with<T: TokenSource>(
        config: ClientConfig,
        source: T,
        connector: C,
    ) -> Result<(Self, mpsc::UnboundedReceiver<LogEvent>), ClientError> {
        let mut store = CredentialStore::new();
        let credentials = store.authenticate(&source).await?.clone();
        let token = store.token().unwrap_or_default().to_string();

        let mut connection = ConnectionManager::new(connector, config.backoff_floor, config.backoff_max);
        let events = connection.open(&config.socket_endpoint, &token)?;
        let handle = connection.handle();

        let (credentials_tx, credentials) = watch::channel(credentials);
        let (log_tx, log_rx) = mpsc::unbounded_channel();
        let pump = Pump {
            sync: Synchronizer::new(),
            store,
            credentials: credentials_tx,
            source: config.refetch_token.then_some(source),
            handle: handle.clone(),
            log: log_tx,
        };
        let pump = tokio::spawn(pump.run(events));

        Ok((
            Self {
                credentials,
                connection,
                handle,
                pump,
            },
            log_rx,
        ))
    }

    /// Submit a chat line. Blank text is ignored. Returns whether the post
    /// was handed to an open channel.
    pub fn post(&self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        let draft = encode_post(text, &self.credentials.borrow());
        self.handle.send(&draft)
    }

    /// Ask the gateway to delete a message. Only moderators and admins may;
    /// for anyone else this does nothing.
    pub fn delete(&self, message_id: &str) -> bool {
        let role = self.credentials.borrow().role;
        if !role.can_moderate() {
            debug!("{} may not delete messages", role);
            return false;
        }
        self.handle.send(&encode_delete(message_id))
    }

    pub fn dispatch(&self, intent: Intent) -> bool {
        match intent {
            Intent::Submit(text) => self.post(&text),
            Intent::Delete(id) => self.delete(&id),
        }
    }

    pub fn credentials(&self) -> Credentials {
        self.credentials.borrow().clone()
    }

    pub fn watch_credentials(&self) -> watch::Receiver<Credentials> {
        self.credentials.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.watch_state()
    }

    /// Stop the channel and the reconciler. The log receiver ends and no
    /// further events are delivered.
    pub fn close(&mut self) {
        self.connection.close();
        self.pump.abort();
    }
}

impl<C> Drop for Trollbox<C> {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Owns the message log; feeds channel events through the synchronizer.
struct Pump<T> {
    sync: Synchronizer,
    store: CredentialStore,
    credentials: watch::Sender<Credentials>,
    /// Present when a fresh token should be fetched before each reconnect.
    source: Option<T>,
    handle: ConnectionHandle,
    log: mpsc::UnboundedSender<LogEvent>,
}

impl<T: TokenSource> Pump<T> {
    async fn run(mut self, mut events: mpsc::UnboundedReceiver<ChannelEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                ChannelEvent::Connected => debug!("Channel open, waiting for history"),
                ChannelEvent::Batch(batch) => {
                    let changes = self.sync.apply_batch(batch);
                    debug!("History reconciled: {} new, {} held", changes.len(), self.sync.len());
                    for change in changes {
                        self.publish(change);
                    }
                }
                ChannelEvent::Action(action) => {
                    if let Some(change) = self.sync.apply_action(action) {
                        self.publish(change);
                    }
                }
                ChannelEvent::Disconnected | ChannelEvent::ConnectFailed(_) => self.refresh_token().await,
            }
        }
        debug!("Channel events ended");
    }

    fn publish(&self, event: LogEvent) {
        let _ = self.log.send(event);
    }

    /// Runs before every reconnect attempt. A failed refresh keeps the
    /// previous token for the next attempt, and if that one is refused the
    /// refresh is simply tried again.
    async fn refresh_token(&mut self) {
        let Some(source) = &self.source else {
            return;
        };
        match self.store.refresh(source).await {
            Ok(session) => {
                info!("Auth token refreshed");
                self.handle.refresh_token(session.token.as_str());
                self.credentials.send_replace(session.credentials.clone());
            }
            Err(e) => warn!("Keeping previous auth token: {}", e),
        }
    }
}

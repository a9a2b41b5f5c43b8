//! Realtime sync core of the Trollbox chat widget.
//!
//! [`Trollbox`] authenticates against the forum, keeps a WebSocket channel
//! to the gateway alive with capped exponential backoff, and reconciles the
//! history batch sent on every (re)connect with the messages already shown.
//! Rendering is left to the caller, which mirrors the log from the stream of
//! [`LogEvent`]s.

pub mod backoff;
pub mod config;
pub mod connection;
pub mod credentials;
pub mod encoder;
pub mod error;
pub mod session;
pub mod sync;
pub mod transport;

pub use backoff::Backoff;
pub use config::ClientConfig;
pub use connection::{ChannelEvent, ConnectionHandle, ConnectionManager, ConnectionState};
pub use credentials::{AuthSession, CredentialStore, HttpTokenSource, StaticToken, TokenSource, authenticate};
pub use encoder::{encode_delete, encode_post};
pub use error::{AuthError, ClientError, ConfigError, ConnectionError};
pub use session::{Intent, Trollbox};
pub use sync::{LogEvent, Synchronizer};
pub use transport::{Connector, Transport, WsConnector};

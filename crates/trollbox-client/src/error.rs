use trollbox_auth::TokenError;

/// Failure to obtain usable credentials. Fatal to the connection attempt and
/// never retried automatically.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("auth endpoint returned an empty token")]
    Empty,
    #[error("auth token is malformed: {0}")]
    Malformed(#[from] TokenError),
    #[error("failed to fetch auth token: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("refreshed token belongs to {got}, session is {expected}")]
    IdentityChanged { expected: String, got: String },
}

/// Realtime channel failures. `NetworkFailure` and `PeerClosed` are handled
/// by the reconnect loop and only logged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("network failure: {0}")]
    NetworkFailure(String),
    #[error("connection closed by peer")]
    PeerClosed,
    #[error("cannot open a channel without an auth token")]
    MissingToken,
    #[error("invalid socket endpoint: {0}")]
    InvalidEndpoint(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Anything that can stop a widget session from starting.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

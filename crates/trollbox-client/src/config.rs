use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_BACKOFF_FLOOR: Duration = Duration::from_secs(1);
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(60);

/// Widget session settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Forum URL that mints a token for the logged-in user.
    pub auth_endpoint: String,
    /// Gateway WebSocket URL, e.g. `wss://forum.example/ws`.
    pub socket_endpoint: String,
    /// Sent as the `Cookie` header when fetching the token, so the forum
    /// recognises the session.
    pub auth_cookie: Option<String>,
    pub backoff_floor: Duration,
    pub backoff_max: Duration,
    /// Fetch a fresh token after every disconnect.
    pub refetch_token: bool,
}

impl ClientConfig {
    pub fn new(auth_endpoint: impl Into<String>, socket_endpoint: impl Into<String>) -> Self {
        Self {
            auth_endpoint: auth_endpoint.into(),
            socket_endpoint: socket_endpoint.into(),
            auth_cookie: None,
            backoff_floor: DEFAULT_BACKOFF_FLOOR,
            backoff_max: DEFAULT_BACKOFF_MAX,
            refetch_token: true,
        }
    }

    pub fn with_auth_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.auth_cookie = Some(cookie.into());
        self
    }

    pub fn with_backoff(mut self, floor: Duration, max: Duration) -> Self {
        self.backoff_floor = floor;
        self.backoff_max = max.max(floor);
        self
    }

    pub fn with_refetch_token(mut self, refetch: bool) -> Self {
        self.refetch_token = refetch;
        self
    }

    /// Read `TROLLBOX_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let auth_endpoint =
            lookup("TROLLBOX_AUTH_ENDPOINT").ok_or(ConfigError::Missing("TROLLBOX_AUTH_ENDPOINT"))?;
        let socket_endpoint =
            lookup("TROLLBOX_SOCKET_URL").ok_or(ConfigError::Missing("TROLLBOX_SOCKET_URL"))?;

        let floor = parse_millis(&lookup, "TROLLBOX_BACKOFF_FLOOR_MS")?.unwrap_or(DEFAULT_BACKOFF_FLOOR);
        let max = parse_millis(&lookup, "TROLLBOX_BACKOFF_MAX_MS")?.unwrap_or(DEFAULT_BACKOFF_MAX);

        let refetch_token = match lookup("TROLLBOX_REFETCH_TOKEN") {
            None => true,
            Some(v) => parse_bool(&v).ok_or(ConfigError::Invalid {
                name: "TROLLBOX_REFETCH_TOKEN",
                value: v,
            })?,
        };

        let mut config = Self::new(auth_endpoint, socket_endpoint)
            .with_backoff(floor, max)
            .with_refetch_token(refetch_token);
        config.auth_cookie = lookup("TROLLBOX_AUTH_COOKIE").filter(|c| !c.is_empty());
        Ok(config)
    }
}

fn parse_millis<F>(lookup: &F, name: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(v) => match v.parse::<u64>() {
            Ok(ms) if ms > 0 => Ok(Some(Duration::from_millis(ms))),
            _ => Err(ConfigError::Invalid { name, value: v }),
        },
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

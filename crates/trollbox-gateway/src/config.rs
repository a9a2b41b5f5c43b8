use std::net::SocketAddr;

use trollbox_auth::DEFAULT_EXPIRY_SECS;

/// Secrets that ship in sample `.env` files and must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me", "secret"];

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 50888;
pub const DEFAULT_PAST_MESSAGES_MAX_SIZE: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("TROLLBOX_SECRET is unset or still a placeholder")]
    InsecureSecret,
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Shared with the forum that mints tokens.
    pub secret: String,
    pub host: String,
    pub port: u16,
    /// How many recent messages a newly connected widget receives.
    pub past_messages_max_size: usize,
    pub token_expiry_secs: u64,
    /// Serve `GET /test-make-auth-token`. Never enable in production.
    pub dev_tokens: bool,
}

impl GatewayConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            past_messages_max_size: DEFAULT_PAST_MESSAGES_MAX_SIZE,
            token_expiry_secs: DEFAULT_EXPIRY_SECS,
            dev_tokens: false,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = lookup("TROLLBOX_SECRET").unwrap_or_default();
        if secret.is_empty() || PLACEHOLDER_SECRETS.contains(&secret.as_str()) {
            return Err(ConfigError::InsecureSecret);
        }

        let mut config = Self::new(secret);
        if let Some(host) = lookup("TROLLBOX_HOST") {
            config.host = host;
        }
        if let Some(port) = parse(&lookup, "TROLLBOX_PORT")? {
            config.port = port;
        }
        if let Some(size) = parse(&lookup, "TROLLBOX_PAST_MESSAGES_MAX_SIZE")? {
            config.past_messages_max_size = size;
        }
        if let Some(expiry) = parse(&lookup, "TROLLBOX_TOKEN_EXPIRY_SECS")? {
            config.token_expiry_secs = expiry;
        }
        if let Some(dev) = lookup("TROLLBOX_DEV_TOKENS") {
            config.dev_tokens = match dev.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "TROLLBOX_DEV_TOKENS",
                        value: dev,
                    });
                }
            };
        }
        Ok(config)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse().map_err(|_| ConfigError::Invalid {
            name: "TROLLBOX_HOST",
            value: addr,
        })
    }
}

fn parse<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

use std::future::Future;

use tracing::{info, warn};

use trollbox_auth::AuthToken;
use trollbox_types::Credentials;

use crate::config::ClientConfig;
use crate::error::AuthError;

/// Where the widget gets its opaque auth token from.
pub trait TokenSource: Send + Sync + 'static {
    fn fetch_token(&self) -> impl Future<Output = Result<String, AuthError>> + Send;
}

/// Fetches the token with a GET to the forum's minting endpoint.
#[derive(Debug, Clone)]
pub struct HttpTokenSource {
    client: reqwest::Client,
    endpoint: String,
    cookie: Option<String>,
}

impl HttpTokenSource {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            cookie: None,
        }
    }

    /// Forward the forum session cookie so the endpoint knows who is asking.
    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        let source = Self::new(config.auth_endpoint.clone());
        match &config.auth_cookie {
            Some(cookie) => source.with_cookie(cookie.clone()),
            None => source,
        }
    }
}

impl TokenSource for HttpTokenSource {
    async fn fetch_token(&self) -> Result<String, AuthError> {
        let mut request = self.client.get(&self.endpoint);
        if let Some(cookie) = &self.cookie {
            request = request.header(reqwest::header::COOKIE, cookie);
        }
        let body = request.send().await?.error_for_status()?.text().await?;
        Ok(body)
    }
}

/// A token known up front, e.g. rendered into the page by the forum.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl TokenSource for StaticToken {
    async fn fetch_token(&self) -> Result<String, AuthError> {
        Ok(self.0.clone())
    }
}

/// Decoded identity plus the raw token presented to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub credentials: Credentials,
    pub token: String,
}

/// Fetch and decode a token. The signature is not checked here; the gateway
/// does that.
pub async fn authenticate<T: TokenSource>(source: &T) -> Result<AuthSession, AuthError> {
    let raw = source.fetch_token().await?;
    let token = raw.trim();
    if token.is_empty() {
        return Err(AuthError::Empty);
    }
    let credentials = AuthToken::decode(token)?.credentials();
    Ok(AuthSession {
        credentials,
        token: token.to_string(),
    })
}

/// Holds the session identity once authentication succeeds.
#[derive(Debug, Default)]
pub struct CredentialStore {
    session: Option<AuthSession>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn authenticate<T: TokenSource>(&mut self, source: &T) -> Result<&Credentials, AuthError> {
        let session = authenticate(source).await?;
        info!(
            "Authenticated as {} (uid {}, {})",
            session.credentials.username, session.credentials.uid, session.credentials.role
        );
        Ok(&self.session.insert(session).credentials)
    }

    /// Fetch a fresh token for the same user. A changed role (promotion or
    /// demotion on the forum) is taken over; a different username or uid is
    /// refused and the previous session stays.
    pub async fn refresh<T: TokenSource>(&mut self, source: &T) -> Result<&AuthSession, AuthError> {
        let fresh = authenticate(source).await?;
        let session = self.session.get_or_insert_with(|| fresh.clone());

        if session.credentials.username != fresh.credentials.username
            || session.credentials.uid != fresh.credentials.uid
        {
            warn!(
                "Refreshed token is for {} but session belongs to {}",
                fresh.credentials.username, session.credentials.username
            );
            return Err(AuthError::IdentityChanged {
                expected: session.credentials.username.clone(),
                got: fresh.credentials.username,
            });
        }

        if session.credentials.role != fresh.credentials.role {
            info!(
                "{} is now {} (was {})",
                fresh.credentials.username, fresh.credentials.role, session.credentials.role
            );
        }
        *session = fresh;
        Ok(session)
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.session.as_ref().map(|s| &s.credentials)
    }

    pub fn token(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.token.as_str())
    }

    pub fn clear(&mut self) {
        self.session = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trollbox_auth::{CompactToken, mint_token, unix_now};
    use trollbox_types::Role;

    fn token_for(username: &str, uid: u32, role: Role) -> String {
        mint_token(
            Credentials {
                timestamp: unix_now(),
                username: username.into(),
                uid,
                role,
            },
            "secret",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn authenticate_decodes_structured_token() {
        let source = StaticToken(format!("{}\n", token_for("alice", 7, Role::Mod)));
        let session = authenticate(&source).await.unwrap();
        assert_eq!(session.credentials.username, "alice");
        assert_eq!(session.credentials.uid, 7);
        assert_eq!(session.credentials.role, Role::Mod);
        assert!(!session.token.ends_with('\n'));
    }

    #[tokio::test]
    async fn authenticate_accepts_compact_token() {
        let source = StaticToken(CompactToken::sign(unix_now(), "bob", "secret").encode());
        let session = authenticate(&source).await.unwrap();
        assert_eq!(session.credentials.username, "bob");
        assert_eq!(session.credentials.role, Role::User);
    }

    #[tokio::test]
    async fn empty_payload_is_rejected() {
        let err = authenticate(&StaticToken("  \n".into())).await.unwrap_err();
        assert!(matches!(err, AuthError::Empty));
    }

    #[tokio::test]
    async fn garbage_payload_is_malformed() {
        let err = authenticate(&StaticToken("<html>login</html>".into())).await.unwrap_err();
        assert!(matches!(err, AuthError::Malformed(_)));
    }

    #[tokio::test]
    async fn store_keeps_credentials() {
        let mut store = CredentialStore::new();
        assert!(store.credentials().is_none());

        let creds = store
            .authenticate(&StaticToken(token_for("alice", 7, Role::User)))
            .await
            .unwrap()
            .clone();
        assert_eq!(creds.username, "alice");
        assert_eq!(store.credentials(), Some(&creds));
        assert!(store.token().is_some());

        store.clear();
        assert!(store.credentials().is_none());
    }

    #[tokio::test]
    async fn refresh_rejects_a_different_user() {
        let mut store = CredentialStore::new();
        let original = token_for("alice", 7, Role::User);
        store.authenticate(&StaticToken(original.clone())).await.unwrap();

        let err = store
            .refresh(&StaticToken(token_for("mallory", 9, Role::Admin)))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::IdentityChanged { .. }));
        assert_eq!(store.token(), Some(original.as_str()));
    }

    #[tokio::test]
    async fn refresh_replaces_token_for_same_user() {
        let mut store = CredentialStore::new();
        store
            .authenticate(&StaticToken(token_for("alice", 7, Role::User)))
            .await
            .unwrap();

        let fresh = CompactToken::sign(unix_now(), "alice", "secret").encode();
        // compact tokens carry uid 0, so they do not match alice/7
        assert!(store.refresh(&StaticToken(fresh)).await.is_err());

        let fresh = token_for("alice", 7, Role::User) + "=";
        let token = store.refresh(&StaticToken(fresh.clone())).await.unwrap().token.clone();
        assert_eq!(token, fresh);
        assert_eq!(store.credentials().unwrap().username, "alice");
    }

    #[tokio::test]
    async fn refresh_takes_over_a_new_role() {
        let mut store = CredentialStore::new();
        store
            .authenticate(&StaticToken(token_for("alice", 7, Role::User)))
            .await
            .unwrap();

        let promoted = token_for("alice", 7, Role::Mod);
        let session = store.refresh(&StaticToken(promoted.clone())).await.unwrap();
        assert_eq!(session.credentials.role, Role::Mod);
        assert_eq!(session.token, promoted);
        assert_eq!(store.credentials().unwrap().role, Role::Mod);

        store
            .refresh(&StaticToken(token_for("alice", 7, Role::User)))
            .await
            .unwrap();
        assert_eq!(store.credentials().unwrap().role, Role::User);
    }
}

use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade, ws::rejection::WebSocketUpgradeRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use trollbox_auth::{AuthToken, TokenError, mint_token, unix_now};
use trollbox_types::{Credentials, Role};

use crate::config::GatewayConfig;
use crate::connection;
use crate::dispatcher::Dispatcher;

#[derive(Clone)]
pub struct GatewayState {
    pub dispatcher: Dispatcher,
    pub config: Arc<GatewayConfig>,
}

impl GatewayState {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            dispatcher: Dispatcher::new(config.past_messages_max_size),
            config: Arc::new(config),
        }
    }
}

pub fn router(state: GatewayState) -> Router {
    let mut app = Router::new().route("/ws", get(ws_upgrade));
    if state.config.dev_tokens {
        warn!("TROLLBOX_DEV_TOKENS is on: anyone can mint an admin token at /test-make-auth-token");
        app = app.route("/test-make-auth-token", get(make_auth_token));
    }

    app.with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Deserialize)]
struct WsParams {
    auth: Option<String>,
}

/// Check a presented token against the shared secret and its age.
pub fn verify_token(config: &GatewayConfig, token: &str) -> Result<Credentials, TokenError> {
    let token = AuthToken::decode(token)?;
    token.verify(&config.secret, unix_now(), config.token_expiry_secs)?;
    Ok(token.credentials())
}

/// The token is checked before the upgrade so a bad one never gets a socket.
async fn ws_upgrade(
    State(state): State<GatewayState>,
    Query(params): Query<WsParams>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let credentials = match verify_token(&state.config, params.auth.as_deref().unwrap_or_default()) {
        Ok(credentials) => credentials,
        Err(e) => {
            debug!("Refusing WebSocket upgrade: {}", e);
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    match ws {
        Ok(ws) => ws
            .on_upgrade(move |socket| connection::handle_connection(socket, state.dispatcher, credentials))
            .into_response(),
        Err(rejection) => rejection.into_response(),
    }
}

/// Development helper: a token for an anonymous admin.
async fn make_auth_token(State(state): State<GatewayState>) -> Result<String, StatusCode> {
    let credentials = Credentials {
        timestamp: unix_now(),
        username: "Anonymous".into(),
        uid: 0,
        role: Role::Admin,
    };
    mint_token(credentials, &state.config.secret).map_err(|e| {
        warn!("Failed to mint dev token: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

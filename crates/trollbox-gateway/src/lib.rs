//! Trollbox gateway: verifies widget tokens at the WebSocket upgrade, sends
//! each widget the recent history, and fans posts and deletes out to every
//! connected widget.

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod routes;

pub use config::{ConfigError, GatewayConfig};
pub use dispatcher::Dispatcher;
pub use routes::{GatewayState, router};

use tokio::net::TcpListener;
use tracing::info;

/// Serve the gateway on an already bound listener until the process stops.
pub async fn serve(listener: TcpListener, config: GatewayConfig) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    let app = router(GatewayState::new(config));

    info!("Trollbox gateway listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

use anyhow::Context;
use tracing::info;

use trollbox_gateway::GatewayConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trollbox=debug,trollbox_gateway=debug,tower_http=debug".into()),
        )
        .init();

    let config = GatewayConfig::from_env().context("set TROLLBOX_SECRET to the secret shared with the forum")?;
    info!(
        "Keeping {} past messages, tokens valid for {}s",
        config.past_messages_max_size, config.token_expiry_secs
    );

    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    trollbox_gateway::serve(listener, config).await
}

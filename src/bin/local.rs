use anyhow::Result;
use image_inquiry::{config::log_level_from_env, create_state, init_tracing, router, Config};
use std::env;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(&log_level_from_env());
    let mut config = Config::from_env();
    config.trust_identity_header = true;

    let addr = env::var("LOCAL_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());
    let state = create_state(config).await?;

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("listening on {addr}");
    axum::serve(listener, router(state)).await?;

    Ok(())
}

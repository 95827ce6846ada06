//! Run a tiny Axum server that accepts inbound messages and delivery receipts
//! on `POST /sms/inbound`. Configure with `config/*.toml` or `SMSGATE__*`
//! environment variables, e.g. `SMSGATE__GATEWAY__ADAPTER=sms_global`.

use smsgate::prelude::*;
use smsgate::telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    init_tracing(&config.logging)?;

    let gateway = connect(&config)?;
    let state = AppState {
        processor: webhook_processor(gateway, &config.webhook),
    };

    let address = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(%address, "listening for inbound SMS");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

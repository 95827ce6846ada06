//! Send an SMS through the configured gateway (SMSGlobal by default).
use smsgate::prelude::*;

use std::env;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let adapter = env::var("SMS_ADAPTER").unwrap_or_else(|_| "sms_global".to_string());
    let to = arg_or_env("--to", "SMS_TO");
    let text = arg_or_env("--text", "SMS_TEXT");

    let config = match adapter.as_str() {
        "tropo" => GatewayConfig::new("tropo")
            .with("outgoing_token", arg_or_env("--token", "TROPO_OUTGOING_TOKEN")),
        other => GatewayConfig::new(other)
            .with("user", arg_or_env("--user", "SMSGLOBAL_USER"))
            .with("password", arg_or_env("--password", "SMSGLOBAL_PASSWORD")),
    };

    let gateway = Gateway::new(default_registry());
    gateway.establish_connection(&config)?;

    let response = gateway
        .deliver(
            &OutboundSms::new(to, text),
            &DeliverOptions {
                filter_response: true,
            },
        )
        .await?;
    println!(
        "Sent via {}: success={} id={:?}\nRaw: {}",
        gateway.connection()?.name(),
        gateway.delivery_request_successful(&response)?,
        gateway.message_id(&response)?,
        response
    );
    Ok(())
}

fn arg_or_env(flag: &str, env_key: &str) -> String {
    let args: Vec<String> = std::env::args().collect();
    if let Some(idx) = args.iter().position(|a| a == flag) {
        if idx + 1 < args.len() {
            return args[idx + 1].clone();
        }
    }
    env::var(env_key)
        .unwrap_or_else(|_| panic!("missing {} (arg {} or env {})", flag, flag, env_key))
}

//! # smsgate
//!
//! Send and receive SMS through interchangeable third-party gateways behind a
//! single connection facade.
//!
//! ## Features
//!
//! - **One active connection**: establish a connection to SMSGlobal or Tropo from configuration
//! - **Fallback dispatch**: inbound payloads of unknown origin are tried against every registered gateway
//! - **Webhook processing**: framework-agnostic inbound handling with an Axum endpoint on top
//! - **Test fixtures**: sample payloads per gateway when configured with `environment = "test"`
//! - **Configuration**: layered files and environment variables
//! - **Observability**: structured logging through `tracing`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use smsgate::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gateway = Gateway::new(smsgate::default_registry());
//!     gateway.establish_connection(
//!         &GatewayConfig::new("sms_global")
//!             .with("user", "myusername")
//!             .with("password", "mypassword"),
//!     )?;
//!
//!     let response = gateway
//!         .deliver(&OutboundSms::new("61447100308", "Hello!"), &DeliverOptions::default())
//!         .await?;
//!     println!("sent: {:?}", gateway.message_id(&response)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! ```rust,ignore
//! use smsgate::config::AppConfig;
//!
//! let config = AppConfig::load()?;
//! smsgate::telemetry::init_tracing(&config.logging)?;
//! let gateway = smsgate::connect(&config)?;
//! ```

pub mod config;
pub mod telemetry;

pub use crate::config::*;

use std::sync::Arc;

use sms_core::{AdapterRegistry, Gateway, HttpTransport, ReqwestTransport, SmsError};
use sms_web_generic::WebhookProcessor;

/// Registry with every bundled gateway, in fallback order, sharing one
/// reqwest transport.
pub fn default_registry() -> AdapterRegistry {
    registry_with_transport(Arc::new(ReqwestTransport::new()))
}

/// Registry with every bundled gateway, in fallback order. Connections built
/// from it, fallback candidates included, reuse `transport`.
pub fn registry_with_transport(transport: Arc<dyn HttpTransport>) -> AdapterRegistry {
    AdapterRegistry::new()
        .with(
            sms_smsglobal::PROVIDER,
            sms_smsglobal::connection_with(transport.clone()),
        )
        .with(sms_tropo::PROVIDER, sms_tropo::connection_with(transport))
}

/// Build the facade and establish the configured gateway connection.
pub fn connect(config: &AppConfig) -> Result<Arc<Gateway>, SmsError> {
    let gateway = Gateway::new(default_registry());
    gateway.establish_connection(&config.gateway)?;
    Ok(Arc::new(gateway))
}

/// Webhook processor honoring the webhook section of `config`.
pub fn webhook_processor(gateway: Arc<Gateway>, config: &WebhookConfig) -> WebhookProcessor {
    let processor = WebhookProcessor::new(gateway);
    if config.require_authentication {
        processor
    } else {
        processor.without_authentication()
    }
}

/// Common imports for smsgate usage
pub mod prelude {
    pub use crate::config::{AppConfig, LoggingConfig, ServerConfig, WebhookConfig};
    pub use crate::{connect, default_registry, registry_with_transport, webhook_processor};
    pub use sms_core::*;
    pub use sms_web_axum::{AppState, router};
    pub use sms_web_generic::WebhookProcessor;
}

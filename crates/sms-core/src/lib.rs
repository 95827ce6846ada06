//! # SMS Core
//!
//! Gateway adapter contract and connection facade for the smsgate SMS toolkit.
//!
//! This crate provides the fundamental building blocks:
//! - [`GatewayAdapter`] trait every SMS gateway implements
//! - [`AdapterRegistry`] mapping adapter identifiers to constructors
//! - [`Gateway`] facade holding the active connection and falling back to the
//!   other registered adapters for payloads of unknown origin
//! - Common types for outbound messages, inbound payloads and errors
//!
//! ## Example
//!
//! ```rust,ignore
//! use sms_core::{Gateway, GatewayConfig, OutboundSms, DeliverOptions};
//!
//! let gateway = Gateway::new(registry);
//! gateway.establish_connection(
//!     &GatewayConfig::new("sms_global")
//!         .with("user", "myusername")
//!         .with("password", "mypassword"),
//! )?;
//!
//! let response = gateway
//!     .deliver(&OutboundSms::new("61447100308", "Hello world!"), &DeliverOptions::default())
//!     .await?;
//! assert!(gateway.delivery_request_successful(&response)?);
//! ```

pub mod adapter;
pub mod fixtures;
pub mod gateway;
pub mod registry;
pub mod transport;

pub use adapter::{AUTHENTICATION_KEY_PARAM, AdapterBase, GatewayAdapter};
pub use fixtures::{SampleFixtures, SampleOptions};
pub use gateway::{Connection, Gateway};
pub use registry::{AdapterConstructor, AdapterRegistry};
pub use transport::{HttpTransport, RequestBody};
#[cfg(feature = "reqwest")]
pub use transport::ReqwestTransport;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Errors that can occur during SMS operations
#[derive(Debug, thiserror::Error)]
pub enum SmsError {
    /// The configuration handed to `establish_connection` has no adapter identifier.
    #[error("gateway configuration does not specify an adapter")]
    AdapterNotSpecified,
    /// The configuration names an adapter nobody registered.
    #[error("configuration specifies nonexistent {0} adapter")]
    AdapterNotFound(String),
    /// A delegating operation ran before any connection was set.
    #[error("no gateway connection has been established")]
    ConnectionNotEstablished,
    /// Sample helpers were requested from an adapter built outside the test environment.
    #[error("sample fixtures are not available for the {0} adapter outside the test environment")]
    FixturesUnavailable(String),
    /// HTTP communication error
    #[error("http error: {0}")]
    Http(String),
    /// Invalid request parameters
    #[error("invalid request: {0}")]
    Invalid(String),
}

/// Web-specific error types for webhook processing
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("authentication failed")]
    Unauthenticated,
    #[error("parsing failed: {0}")]
    ParseError(String),
    #[error("payload not recognized by any registered gateway")]
    Unrecognized,
    #[error("SMS processing error: {0}")]
    SmsError(#[from] SmsError),
}

/// HTTP status code for web responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpStatus {
    Ok = 200,
    BadRequest = 400,
    Unauthorized = 401,
    InternalServerError = 500,
}

impl HttpStatus {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// Inbound gateway payload (webhook query/form parameters, possibly nested).
pub type Params = serde_json::Map<String, serde_json::Value>;

/// Lightweight header representation to avoid tying the core to any HTTP framework.
pub type Headers = Vec<(String, String)>;

/// Configuration used to build a gateway connection.
///
/// `adapter` selects the constructor in the [`AdapterRegistry`]. Gateway
/// specific values (credentials, `maxsplit`, `outgoing_token`, ...) live in
/// `settings`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter: Option<String>,
    /// `"test"` enables the adapter's sample fixtures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default)]
    pub use_ssl: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication_key: Option<String>,
    #[serde(flatten)]
    pub settings: BTreeMap<String, String>,
}

impl GatewayConfig {
    pub fn new(adapter: impl Into<String>) -> Self {
        Self {
            adapter: Some(adapter.into()),
            ..Self::default()
        }
    }

    /// Set a gateway specific value.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn with_authentication_key(mut self, key: impl Into<String>) -> Self {
        self.authentication_key = Some(key.into());
        self
    }

    pub fn with_use_ssl(mut self, use_ssl: bool) -> Self {
        self.use_ssl = use_ssl;
        self
    }

    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }

    pub fn is_test_environment(&self) -> bool {
        self.environment.as_deref() == Some("test")
    }
}

/// An outgoing text message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundSms {
    pub recipient: String,
    pub body: Option<String>,
    /// Sender alias; gateways fall back to their own default when absent.
    pub from: Option<String>,
    /// Free-form value echoed back by gateways that support it.
    pub userfield: Option<String>,
}

impl OutboundSms {
    pub fn new(recipient: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            body: Some(body.into()),
            from: None,
            userfield: None,
        }
    }

    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn with_userfield(mut self, userfield: impl Into<String>) -> Self {
        self.userfield = Some(userfield.into());
        self
    }
}

/// Per-call delivery options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliverOptions {
    /// Strip credentials echoed back in the gateway response.
    pub filter_response: bool,
}

/// Where a message id is read from: a raw delivery response or a receipt payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MessageIdSource<'a> {
    Raw(&'a str),
    Params(&'a Params),
}

impl<'a> From<&'a str> for MessageIdSource<'a> {
    fn from(raw: &'a str) -> Self {
        Self::Raw(raw)
    }
}

impl<'a> From<&'a String> for MessageIdSource<'a> {
    fn from(raw: &'a String) -> Self {
        Self::Raw(raw)
    }
}

impl<'a> From<&'a Params> for MessageIdSource<'a> {
    fn from(params: &'a Params) -> Self {
        Self::Params(params)
    }
}

/// Look up a non-empty string value following `path` through nested objects.
pub fn param_str<'a>(params: &'a Params, path: &[&str]) -> Option<&'a str> {
    let (last, parents) = path.split_last()?;
    let mut current = params;
    for key in parents {
        current = current.get(*key)?.as_object()?;
    }
    current
        .get(*last)?
        .as_str()
        .filter(|value| !value.is_empty())
}

/// Normalized view of an inbound payload after classification by the gateways.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InboundEvent {
    pub message_id: Option<String>,
    pub sender: Option<String>,
    pub text: Option<String>,
    pub status: Option<String>,
}

impl InboundEvent {
    /// True when no registered gateway recognized anything in the payload.
    pub fn is_empty(&self) -> bool {
        self.message_id.is_none()
            && self.sender.is_none()
            && self.text.is_none()
            && self.status.is_none()
    }

    pub fn is_delivery_receipt(&self) -> bool {
        self.status.is_some()
    }
}

/// Generic webhook response that can be converted to any framework's response type
#[derive(Debug, Clone)]
pub struct WebhookResponse {
    pub status: HttpStatus,
    pub body: String,
    pub content_type: String,
}

impl WebhookResponse {
    pub fn success(event: &InboundEvent) -> Self {
        Self {
            status: HttpStatus::Ok,
            body: serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string()),
            content_type: "application/json".to_string(),
        }
    }

    pub fn error(status: HttpStatus, message: &str) -> Self {
        Self {
            status,
            body: serde_json::json!({ "error": message }).to_string(),
            content_type: "application/json".to_string(),
        }
    }
}

//! The gateway adapter contract.
//!
//! Every concrete gateway follows the interface laid down by
//! [`GatewayAdapter`]. The provided methods cover what all gateways share
//! (webhook authentication, SSL toggle, service URL scheme) by delegating to
//! an [`AdapterBase`]; adapters supply the messaging specific operations and
//! keep the empty defaults for anything their gateway never reports.

use async_trait::async_trait;
use parking_lot::RwLock;
use url::Url;

use crate::fixtures::SampleFixtures;
use crate::{DeliverOptions, GatewayConfig, MessageIdSource, OutboundSms, Params, SmsError};

/// Inbound parameter carrying the shared webhook secret.
pub const AUTHENTICATION_KEY_PARAM: &str = "authentication_key";

#[async_trait]
pub trait GatewayAdapter: Send + Sync {
    /// Registry identifier, e.g. "sms_global".
    fn name(&self) -> &'static str;

    /// Shared connection state.
    fn base(&self) -> &AdapterBase;

    /// Send a single message and return the gateway's raw response body.
    async fn deliver(&self, sms: &OutboundSms, options: &DeliverOptions)
    -> Result<String, SmsError>;

    /// Whether a raw response returned by [`deliver`](Self::deliver) reports success.
    fn delivery_request_successful(&self, response: &str) -> bool;

    /// Fully qualified endpoint; `https` iff [`use_ssl`](Self::use_ssl).
    fn service_url(&self) -> Result<String, SmsError>;

    fn message_id(&self, _data: MessageIdSource<'_>) -> Option<String> {
        None
    }

    fn message_text(&self, _params: &Params) -> Option<String> {
        None
    }

    fn sender(&self, _params: &Params) -> Option<String> {
        None
    }

    fn status(&self, _delivery_receipt: &Params) -> Option<String> {
        None
    }

    /// Returns the inbound token when it matches the configured key, removing
    /// it from `params`. Leaves `params` untouched otherwise.
    fn authenticate(&self, params: &mut Params) -> Option<String> {
        self.base().authenticate(params)
    }

    fn authentication_key(&self) -> Option<String> {
        self.base().authentication_key()
    }

    fn set_authentication_key(&self, value: Option<String>) {
        self.base().set_authentication_key(value)
    }

    fn use_ssl(&self) -> bool {
        self.base().use_ssl()
    }

    fn set_use_ssl(&self, value: bool) {
        self.base().set_use_ssl(value)
    }

    /// Sample payloads for tests; only available when the connection was
    /// configured with `environment = "test"`.
    fn fixtures(&self) -> Option<&dyn SampleFixtures> {
        None
    }
}

/// Configuration shared by every adapter. `authentication_key` and `use_ssl`
/// stay mutable for the lifetime of the connection.
#[derive(Debug, Default)]
pub struct AdapterBase {
    config: RwLock<GatewayConfig>,
}

impl AdapterBase {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config: RwLock::new(config),
        }
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> GatewayConfig {
        self.config.read().clone()
    }

    pub fn setting(&self, key: &str) -> Option<String> {
        self.config.read().setting(key).map(str::to_owned)
    }

    pub fn is_test_environment(&self) -> bool {
        self.config.read().is_test_environment()
    }

    pub fn authenticate(&self, params: &mut Params) -> Option<String> {
        let matches = {
            let config = self.config.read();
            let expected = config.authentication_key.as_deref().filter(|k| !k.is_empty())?;
            params
                .get(AUTHENTICATION_KEY_PARAM)
                .and_then(|value| value.as_str())
                == Some(expected)
        };
        if !matches {
            return None;
        }
        params
            .remove(AUTHENTICATION_KEY_PARAM)
            .and_then(|value| value.as_str().map(str::to_owned))
    }

    pub fn authentication_key(&self) -> Option<String> {
        self.config.read().authentication_key.clone()
    }

    pub fn set_authentication_key(&self, value: Option<String>) {
        self.config.write().authentication_key = value;
    }

    pub fn use_ssl(&self) -> bool {
        self.config.read().use_ssl
    }

    pub fn set_use_ssl(&self, value: bool) {
        self.config.write().use_ssl = value;
    }

    /// Rewrite the scheme of `service_uri` according to `use_ssl`.
    pub fn service_url(&self, service_uri: &str) -> Result<String, SmsError> {
        let mut url = Url::parse(service_uri)
            .map_err(|e| SmsError::Invalid(format!("service url {}: {}", service_uri, e)))?;
        let scheme = if self.use_ssl() { "https" } else { "http" };
        url.set_scheme(scheme).map_err(|()| {
            SmsError::Invalid(format!("cannot use {} for {}", scheme, service_uri))
        })?;
        Ok(url.into())
    }
}

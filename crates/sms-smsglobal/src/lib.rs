//! # SMSGlobal gateway
//!
//! Adapter for the SMSGlobal HTTP API. Messages are sent as form encoded
//! POSTs; responses are plain text lines such as
//! `OK: 0; Sent queued message ID: 86b1a945370734f4 SMSGlobalMsgID:6942744494999745`.
//! Inbound messages and delivery receipts arrive as flat query parameters
//! (`from`, `msg`, `msgid`, `dlrstatus`, ...).
//!
//! ```rust,ignore
//! let registry = AdapterRegistry::new().with(sms_smsglobal::PROVIDER, sms_smsglobal::connection);
//! ```

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use sms_core::{
    AUTHENTICATION_KEY_PARAM, AdapterBase, DeliverOptions, GatewayAdapter, GatewayConfig,
    HttpTransport, MessageIdSource, OutboundSms, Params, RequestBody, SampleFixtures,
    SampleOptions, SmsError, param_str,
};
use tracing::info;

pub const PROVIDER: &str = "sms_global";
pub const SERVICE_URL: &str = "http://smsglobal.com.au/http-api.php";
pub const MESSAGE_ID_PREFIX: &str = "SMSGlobalMsgID:";

const DEFAULT_MAXSPLIT: &str = "19";
const DEFAULT_FROM: &str = "reply2email";

static MESSAGE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"SMSGlobalMsgID:\s*(\d+)").expect("valid message id pattern"));
static SUCCESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^OK").expect("valid success pattern"));

/// Registry constructor for the SMSGlobal gateway.
#[cfg(feature = "reqwest")]
pub fn connection(config: &GatewayConfig) -> Result<Arc<dyn GatewayAdapter>, SmsError> {
    Ok(Arc::new(SmsGlobalAdapter::new(config.clone())))
}

/// Registry constructor handing every connection the same transport.
pub fn connection_with(
    transport: Arc<dyn HttpTransport>,
) -> impl Fn(&GatewayConfig) -> Result<Arc<dyn GatewayAdapter>, SmsError> + Send + Sync + 'static {
    move |config: &GatewayConfig| {
        Ok(Arc::new(SmsGlobalAdapter::with_transport(config.clone(), transport.clone())) as Arc<dyn GatewayAdapter>)
    }
}

pub struct SmsGlobalAdapter {
    base: AdapterBase,
    transport: Arc<dyn HttpTransport>,
}

impl SmsGlobalAdapter {
    #[cfg(feature = "reqwest")]
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_transport(config, Arc::new(sms_core::ReqwestTransport::new()))
    }

    pub fn with_transport(config: GatewayConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            base: AdapterBase::new(config),
            transport,
        }
    }

    fn delivery_params(&self, sms: &OutboundSms) -> Vec<(String, String)> {
        let setting = |key: &str| self.base.setting(key).unwrap_or_default();
        let mut params = vec![
            ("action".to_string(), "sendsms".to_string()),
            ("user".to_string(), setting("user")),
            ("password".to_string(), setting("password")),
            (
                "maxsplit".to_string(),
                self.base
                    .setting("maxsplit")
                    .unwrap_or_else(|| DEFAULT_MAXSPLIT.to_string()),
            ),
            (
                "from".to_string(),
                sms.from.clone().unwrap_or_else(|| DEFAULT_FROM.to_string()),
            ),
            ("to".to_string(), sms.recipient.clone()),
            ("text".to_string(), sms.body.clone().unwrap_or_default()),
        ];
        if let Some(userfield) = &sms.userfield {
            params.push(("userfield".to_string(), userfield.clone()));
        }
        params
    }
}

impl std::fmt::Debug for SmsGlobalAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmsGlobalAdapter")
            .field("use_ssl", &self.base.use_ssl())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl GatewayAdapter for SmsGlobalAdapter {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn base(&self) -> &AdapterBase {
        &self.base
    }

    async fn deliver(
        &self,
        sms: &OutboundSms,
        _options: &DeliverOptions,
    ) -> Result<String, SmsError> {
        let url = self.service_url()?;
        info!(to = %sms.recipient, "Sending SMS via SMSGlobal");
        self.transport
            .post(&url, RequestBody::Form(self.delivery_params(sms)))
            .await
    }

    fn delivery_request_successful(&self, response: &str) -> bool {
        SUCCESS.is_match(response)
    }

    fn service_url(&self) -> Result<String, SmsError> {
        self.base.service_url(SERVICE_URL)
    }

    fn message_id(&self, data: MessageIdSource<'_>) -> Option<String> {
        let id = match data {
            MessageIdSource::Params(params) => param_str(params, &["msgid"]),
            MessageIdSource::Raw(raw) => MESSAGE_ID
                .captures(raw)
                .and_then(|captures| captures.get(1))
                .map(|digits| digits.as_str()),
        }?;
        Some(format!("{}{}", MESSAGE_ID_PREFIX, id))
    }

    fn message_text(&self, params: &Params) -> Option<String> {
        param_str(params, &["msg"]).map(str::to_owned)
    }

    fn sender(&self, params: &Params) -> Option<String> {
        param_str(params, &["from"]).map(str::to_owned)
    }

    fn status(&self, delivery_receipt: &Params) -> Option<String> {
        param_str(delivery_receipt, &["dlrstatus"]).map(str::to_owned)
    }

    fn fixtures(&self) -> Option<&dyn SampleFixtures> {
        self.base
            .is_test_environment()
            .then_some(self as &dyn SampleFixtures)
    }
}

const SAMPLE_MESSAGE_ID: &str = "6942744494999745";

fn bare_message_id(options: &SampleOptions) -> String {
    let id = options.message_id.as_deref().unwrap_or(SAMPLE_MESSAGE_ID);
    id.trim_start_matches(MESSAGE_ID_PREFIX).to_string()
}

fn or<'a>(value: &'a Option<String>, default: &'a str) -> String {
    value.as_deref().unwrap_or(default).to_string()
}

impl SampleFixtures for SmsGlobalAdapter {
    fn sample_configuration(&self, options: &SampleOptions) -> GatewayConfig {
        let config = GatewayConfig::new(PROVIDER)
            .with("user", "SMSGlobal User")
            .with("password", "SMSGlobal Password");
        if options.authentication_key {
            config.with_authentication_key("My Unique Authentication Key")
        } else {
            config
        }
    }

    fn sample_delivery_receipt(&self, options: &SampleOptions) -> Params {
        let mut receipt = Params::new();
        receipt.insert("msgid".into(), bare_message_id(options).into());
        receipt.insert("dlrstatus".into(), or(&options.status, "DELIVRD").into());
        receipt.insert("dlr_err".into(), or(&options.error, "000").into());
        receipt.insert("donedate".into(), or(&options.date, "1005132312").into());
        receipt
    }

    fn sample_delivery_response(&self, options: &SampleOptions) -> String {
        if options.failed {
            return "ERROR: No action requested".to_string();
        }
        format!(
            "OK: 0; Sent queued message ID: 86b1a945370734f4 {}{}",
            MESSAGE_ID_PREFIX,
            bare_message_id(options)
        )
    }

    fn sample_incoming_sms(&self, options: &SampleOptions) -> Params {
        let mut sms = Params::new();
        sms.insert("to".into(), or(&options.to, "61447100308").into());
        sms.insert("from".into(), or(&options.from, "61447100399").into());
        sms.insert("msg".into(), or(&options.message, "Endia kasdf ofeao").into());
        sms.insert("date".into(), or(&options.date, "2010-05-13 23:59:11").into());
        if options.authentic == Some(true) {
            if let Some(key) = self.base.authentication_key() {
                sms.insert(AUTHENTICATION_KEY_PARAM.into(), key.into());
            }
        }
        sms
    }

    fn sample_message_id(&self, options: &SampleOptions) -> Option<String> {
        Some(format!("{}{}", MESSAGE_ID_PREFIX, bare_message_id(options)))
    }
}

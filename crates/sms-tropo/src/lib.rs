//! # Tropo gateway
//!
//! Adapter for the Tropo session API. Outbound messages start a session by
//! POSTing an XML document carrying the outgoing token and the message as
//! session variables. Inbound messages arrive as a nested `session` object.
//! Tropo reports neither message ids nor delivery status, so those lookups
//! always come back empty.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use sms_core::{
    AUTHENTICATION_KEY_PARAM, AdapterBase, DeliverOptions, GatewayAdapter, GatewayConfig,
    HttpTransport, OutboundSms, Params, RequestBody, SampleFixtures, SampleOptions, SmsError,
    param_str,
};
use tracing::info;

pub const PROVIDER: &str = "tropo";
pub const SERVICE_URL: &str = "http://api.tropo.com/1.0/sessions";

static TOKEN_ELEMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<token>\w+</token>").expect("valid token pattern"));

/// Registry constructor for the Tropo gateway.
#[cfg(feature = "reqwest")]
pub fn connection(config: &GatewayConfig) -> Result<Arc<dyn GatewayAdapter>, SmsError> {
    Ok(Arc::new(TropoAdapter::new(config.clone())))
}

/// Registry constructor handing every connection the same transport.
pub fn connection_with(
    transport: Arc<dyn HttpTransport>,
) -> impl Fn(&GatewayConfig) -> Result<Arc<dyn GatewayAdapter>, SmsError> + Send + Sync + 'static {
    move |config: &GatewayConfig| {
        Ok(Arc::new(TropoAdapter::with_transport(config.clone(), transport.clone())) as Arc<dyn GatewayAdapter>)
    }
}

pub struct TropoAdapter {
    base: AdapterBase,
    transport: Arc<dyn HttpTransport>,
}

impl TropoAdapter {
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

    /// Session request starting an outbound message.
    fn request_xml(&self, sms: &OutboundSms) -> String {
        let token = self.base.setting("outgoing_token").unwrap_or_default();
        let mut vars = vec![
            ("to", sms.recipient.as_str()),
            ("text", sms.body.as_deref().unwrap_or_default()),
        ];
        if let Some(from) = sms.from.as_deref() {
            vars.push(("from", from));
        }

        let mut xml = format!("<sessions><token>{}</token>", escape(&token));
        for (name, value) in vars {
            xml.push_str(&format!(
                r#"<var name="{}" value="{}"/>"#,
                name,
                escape(value)
            ));
        }
        xml.push_str("</sessions>");
        xml
    }
}

// Covers attribute values and text content only; no CDATA or comments.
fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Drop the echoed outgoing token from a session response.
fn filter_response(raw_response: &str) -> String {
    TOKEN_ELEMENT.replace_all(raw_response, "").into_owned()
}

impl std::fmt::Debug for TropoAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TropoAdapter")
            .field("use_ssl", &self.base.use_ssl())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl GatewayAdapter for TropoAdapter {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn base(&self) -> &AdapterBase {
        &self.base
    }

    async fn deliver(
        &self,
        sms: &OutboundSms,
        options: &DeliverOptions,
    ) -> Result<String, SmsError> {
        let url = self.service_url()?;
        info!(to = %sms.recipient, "Sending SMS via Tropo");
        let response = self
            .transport
            .post(&url, RequestBody::Xml(self.request_xml(sms)))
            .await?;
        Ok(if options.filter_response {
            filter_response(&response)
        } else {
            response
        })
    }

    fn delivery_request_successful(&self, response: &str) -> bool {
        response.contains("<success>true</success>")
    }

    fn service_url(&self) -> Result<String, SmsError> {
        self.base.service_url(SERVICE_URL)
    }

    fn message_text(&self, params: &Params) -> Option<String> {
        param_str(params, &["session", "initial_text"]).map(str::to_owned)
    }

    fn sender(&self, params: &Params) -> Option<String> {
        param_str(params, &["session", "from", "id"]).map(str::to_owned)
    }

    fn fixtures(&self) -> Option<&dyn SampleFixtures> {
        self.base
            .is_test_environment()
            .then_some(self as &dyn SampleFixtures)
    }
}

impl SampleFixtures for TropoAdapter {
    fn sample_configuration(&self, options: &SampleOptions) -> GatewayConfig {
        let config = GatewayConfig::new(PROVIDER).with("outgoing_token", "Tropo Outgoing Token");
        if options.authentication_key {
            config.with_authentication_key("My Unique Authentication Key")
        } else {
            config
        }
    }

    /// Tropo sends no delivery receipts.
    fn sample_delivery_receipt(&self, _options: &SampleOptions) -> Params {
        Params::new()
    }

    fn sample_delivery_response(&self, options: &SampleOptions) -> String {
        if options.failed {
            "<session><success>false</success><token>abcde3214</token><reason>Invalid token</reason></session>"
                .to_string()
        } else {
            "<session><success>true</success><token>abcde3214</token><id>9865abcde</id></session>"
                .to_string()
        }
    }

    fn sample_incoming_sms(&self, options: &SampleOptions) -> Params {
        let message = options.message.as_deref().unwrap_or("Endia kasdf ofeao");
        let to = options.to.as_deref().unwrap_or("61447100308");
        let from = options.from.as_deref().unwrap_or("61447100399");
        let date = options
            .date
            .as_deref()
            .unwrap_or("Mon Oct 11 09:21:38 UTC 2010");

        let sample = json!({
            "session": {
                "id": "12349516546e59746d6a89a990466789",
                "account_id": "12345",
                "timestamp": date,
                "user_type": "HUMAN",
                "initial_text": message,
                "call_id": "123e71195545ad204bdd99f2070a7d86",
                "to": {
                    "id": to,
                    "name": "unknown",
                    "channel": "TEXT",
                    "network": "SMS"
                },
                "from": {
                    "id": from,
                    "name": "unknown",
                    "channel": "TEXT",
                    "network": "SMS"
                },
                "headers": {
                    "_max-_forwards": "70",
                    "_content-_length": "124",
                    "_contact": "<sip:11.8.93.101:5066;transport=udp>",
                    "_to": format!("<sip:1231454582@10.6.69.203:5061;to={}>", to),
                    "_c_seq": "1 INVITE",
                    "_via": "SIP/2.0/UDP 11.8.93.101:5066;branch=h0hG4bKk5sy1e",
                    "_call-_i_d": "ieeg18",
                    "_content-_type": "application/sdp",
                    "_from": format!(
                        "<sip:15EB6BAB-99DF-44C2-871DFBA75C319776@11.8.93.201;channel=private;user={};msg={};network=SMS;step=1>;tag=zm13kt",
                        to, message
                    )
                }
            }
        });

        let mut params = match sample {
            serde_json::Value::Object(map) => map,
            _ => Params::new(),
        };
        if options.authentic != Some(false) {
            if let Some(key) = self.base.authentication_key() {
                params.insert(AUTHENTICATION_KEY_PARAM.into(), key.into());
            }
        }
        params
    }

    /// Tropo does not hand out message ids.
    fn sample_message_id(&self, _options: &SampleOptions) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sms_core::MessageIdSource;
    use std::sync::Mutex;

    const RESPONSE: &str =
        "<session><success>true</success><token>abcde3214</token><id>9865abcde</id></session>";

    #[derive(Default)]
    struct RecordingTransport {
        requests: Mutex<Vec<(String, RequestBody)>>,
    }

    #[async_trait]
    impl HttpTransport for RecordingTransport {
        async fn post(&self, url: &str, body: RequestBody) -> Result<String, SmsError> {
            self.requests.lock().unwrap().push((url.to_string(), body));
            Ok(RESPONSE.to_string())
        }
    }

    fn adapter_with(config: GatewayConfig) -> (TropoAdapter, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::default());
        (
            TropoAdapter::with_transport(config, transport.clone()),
            transport,
        )
    }

    fn adapter() -> TropoAdapter {
        adapter_with(GatewayConfig::new(PROVIDER)).0
    }

    fn sent_xml(transport: &RecordingTransport) -> (String, String) {
        let requests = transport.requests.lock().unwrap();
        match requests.last().cloned() {
            Some((url, RequestBody::Xml(xml))) => (url, xml),
            other => panic!("expected an XML request, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn deliver_posts_session_request() {
        let (adapter, transport) =
            adapter_with(GatewayConfig::new(PROVIDER).with("outgoing_token", "my_token"));
        let sms = OutboundSms::new("61447100308", "fish & chips").with_from("anybody");

        let response = adapter.deliver(&sms, &DeliverOptions::default()).await.unwrap();
        assert_eq!(response, RESPONSE);

        let (url, xml) = sent_xml(&transport);
        assert_eq!(url, SERVICE_URL);
        assert_eq!(
            xml,
            concat!(
                "<sessions><token>my_token</token>",
                r#"<var name="to" value="61447100308"/>"#,
                r#"<var name="text" value="fish &amp; chips"/>"#,
                r#"<var name="from" value="anybody"/>"#,
                "</sessions>"
            )
        );
    }

    #[test]
    fn escapes_markup_in_attribute_values() {
        assert_eq!(
            escape(r#"<b>"it's" & more</b>"#),
            "&lt;b&gt;&quot;it&apos;s&quot; &amp; more&lt;/b&gt;"
        );
        assert_eq!(escape("plain text 123"), "plain text 123");
    }

    #[tokio::test]
    async fn deliver_without_body_or_sender() {
        let (adapter, transport) = adapter_with(GatewayConfig::new(PROVIDER));
        let sms = OutboundSms {
            recipient: "61447100308".into(),
            ..OutboundSms::default()
        };

        adapter.deliver(&sms, &DeliverOptions::default()).await.unwrap();

        let (_, xml) = sent_xml(&transport);
        assert!(xml.contains(r#"<var name="text" value=""/>"#));
        assert!(!xml.contains(r#"name="from""#));
    }

    #[tokio::test]
    async fn deliver_filters_token_on_request() {
        let (adapter, _) = adapter_with(GatewayConfig::new(PROVIDER));
        let sms = OutboundSms::new("61447100308", "hello");

        let filtered = adapter
            .deliver(
                &sms,
                &DeliverOptions {
                    filter_response: true,
                },
            )
            .await
            .unwrap();

        assert_eq!(
            filtered,
            "<session><success>true</success><id>9865abcde</id></session>"
        );
        assert!(adapter.delivery_request_successful(&filtered));
    }

    #[test]
    fn delivery_request_successful_parses_response() {
        let adapter = adapter();
        let options = SampleOptions::default();
        assert!(adapter.delivery_request_successful(&adapter.sample_delivery_response(&options)));
        assert!(!adapter.delivery_request_successful(&adapter.sample_delivery_response(
            &SampleOptions {
                failed: true,
                ..options
            }
        )));
    }

    #[test]
    fn never_reports_message_id_or_status() {
        let adapter = adapter();
        assert_eq!(adapter.message_id(MessageIdSource::Raw(RESPONSE)), None);
        let receipt = json!({ "status": "success" }).as_object().cloned().unwrap();
        assert_eq!(adapter.message_id((&receipt).into()), None);
        assert_eq!(adapter.status(&receipt), None);
    }

    #[test]
    fn reads_session_fields() {
        let adapter = adapter();
        let inbound = adapter.sample_incoming_sms(&SampleOptions {
            message: Some("ANYTHING".into()),
            from: Some("61447100399".into()),
            ..SampleOptions::default()
        });

        assert_eq!(adapter.message_text(&inbound).as_deref(), Some("ANYTHING"));
        assert_eq!(adapter.sender(&inbound).as_deref(), Some("61447100399"));

        let flat = json!({ "msg": "hi", "from": "61447100399" })
            .as_object()
            .cloned()
            .unwrap();
        assert_eq!(adapter.message_text(&flat), None);
        assert_eq!(adapter.sender(&flat), None);
    }

    #[test]
    fn sample_incoming_sms_is_authentic_by_default() {
        let adapter = adapter_with(
            GatewayConfig::new(PROVIDER)
                .with_environment("test")
                .with_authentication_key("my_secret_key"),
        )
        .0;

        let mut authentic = adapter.sample_incoming_sms(&SampleOptions::default());
        assert_eq!(
            adapter.authenticate(&mut authentic).as_deref(),
            Some("my_secret_key")
        );

        let mut forged = adapter.sample_incoming_sms(&SampleOptions {
            authentic: Some(false),
            ..SampleOptions::default()
        });
        assert_eq!(adapter.authenticate(&mut forged), None);
    }

    #[test]
    fn sample_configuration_and_ids() {
        let adapter = adapter_with(GatewayConfig::new(PROVIDER).with_environment("test")).0;
        let fixtures = adapter.fixtures().unwrap();
        let config = fixtures.sample_configuration(&SampleOptions::default());

        assert_eq!(config.adapter.as_deref(), Some(PROVIDER));
        assert_eq!(config.setting("outgoing_token"), Some("Tropo Outgoing Token"));
        assert!(config.authentication_key.is_none());
        assert_eq!(fixtures.sample_message_id(&SampleOptions::default()), None);
        assert!(fixtures
            .sample_delivery_receipt(&SampleOptions::default())
            .is_empty());
    }

    #[test]
    fn service_url_follows_use_ssl() {
        let adapter = adapter_with(GatewayConfig::new(PROVIDER).with_use_ssl(true)).0;
        assert_eq!(
            adapter.service_url().unwrap(),
            "https://api.tropo.com/1.0/sessions"
        );
        adapter.set_use_ssl(false);
        assert_eq!(adapter.service_url().unwrap(), SERVICE_URL);
    }
}

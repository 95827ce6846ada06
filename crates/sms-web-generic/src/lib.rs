use std::sync::Arc;

use sms_core::{
    Gateway, Headers, HttpStatus, InboundEvent, Params, WebhookError, WebhookResponse,
};
use tracing::{debug, warn};

/// Framework-agnostic webhook processor that handles the core SMS logic
///
/// Inbound payloads carry no marker of the gateway that sent them, so every
/// lookup goes through the [`Gateway`] facade and its fallback dispatch.
#[derive(Clone)]
pub struct WebhookProcessor {
    gateway: Arc<Gateway>,
    require_authentication: bool,
}

impl WebhookProcessor {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            require_authentication: true,
        }
    }

    /// Accept payloads without an `authentication_key` parameter.
    pub fn without_authentication(mut self) -> Self {
        self.require_authentication = false;
        self
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Process an incoming webhook request and return a framework-agnostic response
    pub fn process_webhook(
        &self,
        query: Option<&str>,
        headers: Headers,
        body: &[u8],
    ) -> WebhookResponse {
        match self.process_webhook_internal(query, &headers, body) {
            Ok(event) => WebhookResponse::success(&event),
            Err(e) => self.error_to_response(e),
        }
    }

    fn process_webhook_internal(
        &self,
        query: Option<&str>,
        headers: &Headers,
        body: &[u8],
    ) -> Result<InboundEvent, WebhookError> {
        let mut params = decode_params(query, headers, body)?;

        if self.require_authentication && self.gateway.authenticate(&mut params)?.is_none() {
            return Err(WebhookError::Unauthenticated);
        }

        self.classify(&params)
    }

    /// Ask the registered gateways what the payload contains.
    pub fn classify(&self, params: &Params) -> Result<InboundEvent, WebhookError> {
        let event = InboundEvent {
            message_id: self.gateway.message_id(params)?,
            sender: self.gateway.sender(params)?,
            text: self.gateway.message_text(params)?,
            status: self.gateway.status(params)?,
        };
        if event.is_empty() {
            return Err(WebhookError::Unrecognized);
        }
        debug!(
            delivery_receipt = event.is_delivery_receipt(),
            "classified inbound payload"
        );
        Ok(event)
    }

    fn error_to_response(&self, error: WebhookError) -> WebhookResponse {
        match error {
            WebhookError::Unauthenticated => {
                warn!("rejected unauthenticated webhook");
                WebhookResponse::error(HttpStatus::Unauthorized, "authentication failed")
            }
            WebhookError::ParseError(msg) => {
                WebhookResponse::error(HttpStatus::BadRequest, &format!("parse error: {}", msg))
            }
            WebhookError::Unrecognized => WebhookResponse::error(
                HttpStatus::BadRequest,
                "payload not recognized by any registered gateway",
            ),
            WebhookError::SmsError(e) => WebhookResponse::error(
                HttpStatus::InternalServerError,
                &format!("SMS error: {}", e),
            ),
        }
    }
}

/// Merge query string and body parameters. JSON bodies may be nested; form
/// and query values are flat strings. Body values win over query values.
pub fn decode_params(
    query: Option<&str>,
    headers: &Headers,
    body: &[u8],
) -> Result<Params, WebhookError> {
    let mut params = match query.filter(|q| !q.is_empty()) {
        Some(query) => decode_form(query.as_bytes())?,
        None => Params::new(),
    };

    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(params);
    }

    let is_json = headers.iter().any(|(name, value)| {
        name.eq_ignore_ascii_case("content-type") && value.contains("json")
    });
    let decoded = if is_json {
        match serde_json::from_slice::<serde_json::Value>(body) {
            Ok(serde_json::Value::Object(map)) => map,
            Ok(_) => {
                return Err(WebhookError::ParseError(
                    "expected a JSON object".to_string(),
                ));
            }
            Err(e) => return Err(WebhookError::ParseError(format!("json decode: {}", e))),
        }
    } else {
        decode_form(body)?
    };

    params.extend(decoded);
    Ok(params)
}

fn decode_form(bytes: &[u8]) -> Result<Params, WebhookError> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(bytes)
        .map_err(|e| WebhookError::ParseError(format!("form decode: {}", e)))?;
    Ok(pairs
        .into_iter()
        .map(|(key, value)| (key, serde_json::Value::String(value)))
        .collect())
}

/// Helper trait for framework adapters to convert headers
pub trait HeaderConverter {
    type HeaderType;

    fn to_generic_headers(headers: &Self::HeaderType) -> Headers;
}

/// Helper trait for framework adapters to convert responses
pub trait ResponseConverter {
    type ResponseType;

    fn from_webhook_response(response: WebhookResponse) -> Self::ResponseType;
}

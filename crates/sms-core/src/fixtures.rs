//! Sample payloads for exercising an application against a gateway without
//! talking to it.

use crate::{GatewayConfig, Params};

/// Overrides for the generated samples; unset fields fall back to gateway
/// specific defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleOptions {
    pub message: Option<String>,
    pub to: Option<String>,
    pub from: Option<String>,
    pub date: Option<String>,
    pub message_id: Option<String>,
    pub status: Option<String>,
    pub error: Option<String>,
    /// Produce the failure shaped delivery response.
    pub failed: bool,
    /// Whether the incoming sample carries the configured authentication key.
    /// Gateways choose their own default when unset.
    pub authentic: Option<bool>,
    /// Include an authentication key in the sample configuration.
    pub authentication_key: bool,
}

pub trait SampleFixtures: Send + Sync {
    fn sample_configuration(&self, options: &SampleOptions) -> GatewayConfig;

    fn sample_delivery_receipt(&self, options: &SampleOptions) -> Params;

    fn sample_delivery_response(&self, options: &SampleOptions) -> String;

    fn sample_incoming_sms(&self, options: &SampleOptions) -> Params;

    fn sample_message_id(&self, options: &SampleOptions) -> Option<String>;
}

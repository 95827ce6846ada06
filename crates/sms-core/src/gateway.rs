//! Connection facade.
//!
//! [`Gateway`] owns the active gateway connection and is the single point of
//! contact for messaging operations. Outbound operations go straight to the
//! active connection. Operations that interpret inbound payloads cannot know
//! which gateway produced the payload, so when the active connection does not
//! recognize it the facade asks every other registered adapter in
//! registration order and returns the first answer.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::fixtures::{SampleFixtures, SampleOptions};
use crate::{
    AdapterRegistry, DeliverOptions, GatewayAdapter, GatewayConfig, MessageIdSource, OutboundSms,
    Params, SmsError,
};

/// A configured gateway adapter.
pub type Connection = Arc<dyn GatewayAdapter>;

pub struct Gateway {
    registry: AdapterRegistry,
    active: RwLock<Option<Connection>>,
}

impl Gateway {
    pub fn new(registry: AdapterRegistry) -> Self {
        Self {
            registry,
            active: RwLock::new(None),
        }
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Build a connection with the adapter named by `config.adapter` and make
    /// it the active one.
    pub fn establish_connection(&self, config: &GatewayConfig) -> Result<Connection, SmsError> {
        let name = config
            .adapter
            .as_deref()
            .ok_or(SmsError::AdapterNotSpecified)?;
        let constructor = self
            .registry
            .get(name)
            .ok_or_else(|| SmsError::AdapterNotFound(name.to_string()))?;
        let connection = constructor(config)?;
        self.set_connection(Some(connection.clone()))?;
        info!(adapter = name, "gateway connection established");
        Ok(connection)
    }

    pub fn is_connected(&self) -> bool {
        self.active.read().is_some()
    }

    pub fn connection(&self) -> Result<Connection, SmsError> {
        self.active
            .read()
            .clone()
            .ok_or(SmsError::ConnectionNotEstablished)
    }

    /// Replace the active connection without going through the registry.
    pub fn set_connection(&self, connection: Option<Connection>) -> Result<(), SmsError> {
        let connection = connection.ok_or(SmsError::ConnectionNotEstablished)?;
        *self.active.write() = Some(connection);
        Ok(())
    }

    /// Drop the active connection, returning it if there was one.
    pub fn disconnect(&self) -> Option<Connection> {
        let previous = self.active.write().take();
        if let Some(connection) = &previous {
            info!(adapter = connection.name(), "gateway connection closed");
        }
        previous
    }

    // Direct delegation

    pub async fn deliver(
        &self,
        sms: &OutboundSms,
        options: &DeliverOptions,
    ) -> Result<String, SmsError> {
        let connection = self.connection()?;
        debug!(adapter = connection.name(), to = %sms.recipient, "delivering sms");
        connection.deliver(sms, options).await
    }

    pub fn delivery_request_successful(&self, response: &str) -> Result<bool, SmsError> {
        Ok(self.connection()?.delivery_request_successful(response))
    }

    pub fn authentication_key(&self) -> Result<Option<String>, SmsError> {
        Ok(self.connection()?.authentication_key())
    }

    pub fn set_authentication_key(&self, value: Option<String>) -> Result<(), SmsError> {
        self.connection()?.set_authentication_key(value);
        Ok(())
    }

    pub fn use_ssl(&self) -> Result<bool, SmsError> {
        Ok(self.connection()?.use_ssl())
    }

    pub fn set_use_ssl(&self, value: bool) -> Result<(), SmsError> {
        self.connection()?.set_use_ssl(value);
        Ok(())
    }

    pub fn service_url(&self) -> Result<String, SmsError> {
        self.connection()?.service_url()
    }

    // Fallback dispatch

    /// Verify an inbound payload against the active connection's
    /// authentication key. On success the token is removed from `params`.
    ///
    /// Fallback candidates are built without a key, so bundled adapters never
    /// authenticate on behalf of another gateway.
    pub fn authenticate(&self, params: &mut Params) -> Result<Option<String>, SmsError> {
        self.adapter_method_result("authenticate", |adapter| adapter.authenticate(params))
    }

    pub fn message_id<'a>(
        &self,
        data: impl Into<MessageIdSource<'a>>,
    ) -> Result<Option<String>, SmsError> {
        let data = data.into();
        self.adapter_method_result("message_id", |adapter| adapter.message_id(data))
    }

    pub fn message_text(&self, params: &Params) -> Result<Option<String>, SmsError> {
        self.adapter_method_result("message_text", |adapter| adapter.message_text(params))
    }

    pub fn sender(&self, params: &Params) -> Result<Option<String>, SmsError> {
        self.adapter_method_result("sender", |adapter| adapter.sender(params))
    }

    pub fn status(&self, delivery_receipt: &Params) -> Result<Option<String>, SmsError> {
        self.adapter_method_result("status", |adapter| adapter.status(delivery_receipt))
    }

    // Sample fixtures

    pub fn sample_configuration(&self, options: &SampleOptions) -> Result<GatewayConfig, SmsError> {
        self.with_fixtures(|fixtures| fixtures.sample_configuration(options))
    }

    pub fn sample_delivery_receipt(&self, options: &SampleOptions) -> Result<Params, SmsError> {
        self.with_fixtures(|fixtures| fixtures.sample_delivery_receipt(options))
    }

    pub fn sample_delivery_response(&self, options: &SampleOptions) -> Result<String, SmsError> {
        self.with_fixtures(|fixtures| fixtures.sample_delivery_response(options))
    }

    pub fn sample_incoming_sms(&self, options: &SampleOptions) -> Result<Params, SmsError> {
        self.with_fixtures(|fixtures| fixtures.sample_incoming_sms(options))
    }

    pub fn sample_message_id(&self, options: &SampleOptions) -> Result<Option<String>, SmsError> {
        self.with_fixtures(|fixtures| fixtures.sample_message_id(options))
    }

    fn with_fixtures<T>(&self, f: impl FnOnce(&dyn SampleFixtures) -> T) -> Result<T, SmsError> {
        let connection = self.connection()?;
        let fixtures = connection
            .fixtures()
            .ok_or_else(|| SmsError::FixturesUnavailable(connection.name().to_string()))?;
        Ok(f(fixtures))
    }

    /// Ask the active connection first, then every other registered adapter
    /// in registration order. The first non-empty answer wins.
    fn adapter_method_result<F>(
        &self,
        method: &'static str,
        mut call: F,
    ) -> Result<Option<String>, SmsError>
    where
        F: FnMut(&dyn GatewayAdapter) -> Option<String>,
    {
        let connection = self.connection()?;
        if let Some(result) = present(call(connection.as_ref())) {
            return Ok(Some(result));
        }

        for (name, constructor) in self.registry.iter() {
            if name == connection.name() {
                continue;
            }
            let adapter = match constructor(&GatewayConfig::new(name)) {
                Ok(adapter) => adapter,
                Err(e) => {
                    debug!(adapter = name, method, error = %e, "skipping fallback adapter");
                    continue;
                }
            };
            if let Some(result) = present(call(adapter.as_ref())) {
                debug!(adapter = name, method, "fallback adapter recognized payload");
                return Ok(Some(result));
            }
        }

        debug!(method, "payload not recognized by any registered adapter");
        Ok(None)
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("registry", &self.registry)
            .field(
                "active",
                &self.active.read().as_ref().map(|connection| connection.name()),
            )
            .finish()
    }
}

fn present(result: Option<String>) -> Option<String> {
    result.filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AdapterBase;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers every lookup with a canned value, counting calls.
    struct StubAdapter {
        name: &'static str,
        base: AdapterBase,
        answer: Option<String>,
        calls: Arc<AtomicUsize>,
    }

    impl StubAdapter {
        fn new(name: &'static str, answer: Option<&str>) -> Self {
            Self {
                name,
                base: AdapterBase::new(GatewayConfig::new(name)),
                answer: answer.map(str::to_owned),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn answer(&self) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone()
        }
    }

    #[async_trait]
    impl GatewayAdapter for StubAdapter {
        fn name(&self) -> &'static str {
            self.name
        }

        fn base(&self) -> &AdapterBase {
            &self.base
        }

        async fn deliver(
            &self,
            sms: &OutboundSms,
            options: &DeliverOptions,
        ) -> Result<String, SmsError> {
            Ok(format!(
                "{} -> {} filtered={}",
                self.name, sms.recipient, options.filter_response
            ))
        }

        fn delivery_request_successful(&self, response: &str) -> bool {
            response.starts_with(self.name)
        }

        fn service_url(&self) -> Result<String, SmsError> {
            self.base.service_url("http://example.com/send")
        }

        fn message_id(&self, _data: MessageIdSource<'_>) -> Option<String> {
            self.answer()
        }

        fn message_text(&self, _params: &Params) -> Option<String> {
            self.answer()
        }

        fn sender(&self, _params: &Params) -> Option<String> {
            self.answer()
        }

        fn status(&self, _delivery_receipt: &Params) -> Option<String> {
            self.answer()
        }

        fn authenticate(&self, params: &mut Params) -> Option<String> {
            self.answer().inspect(|_| {
                params.remove(crate::AUTHENTICATION_KEY_PARAM);
            })
        }
    }

    fn registry_with(others: Vec<(&'static str, Option<&'static str>)>) -> AdapterRegistry {
        others
            .into_iter()
            .fold(AdapterRegistry::new(), |registry, (name, answer)| {
                registry.with(name, move |_: &GatewayConfig| {
                    Ok(Arc::new(StubAdapter::new(name, answer)) as Connection)
                })
            })
    }

    fn connected(active: StubAdapter, registry: AdapterRegistry) -> Gateway {
        let gateway = Gateway::new(registry);
        gateway.set_connection(Some(Arc::new(active))).unwrap();
        gateway
    }

    #[test]
    fn establish_connection_requires_adapter() {
        let gateway = Gateway::new(registry_with(vec![("my_adapter", None)]));
        let result = gateway.establish_connection(&GatewayConfig::default());
        assert!(matches!(result, Err(SmsError::AdapterNotSpecified)));
        assert!(!gateway.is_connected());
    }

    #[test]
    fn establish_connection_rejects_unknown_adapter() {
        let gateway = Gateway::new(registry_with(vec![("my_adapter", None)]));
        let result = gateway.establish_connection(&GatewayConfig::new("clickatell"));
        match result {
            Err(SmsError::AdapterNotFound(name)) => assert_eq!(name, "clickatell"),
            other => panic!("expected AdapterNotFound, got {:?}", other.map(|c| c.name())),
        }
        assert!(!gateway.is_connected());
    }

    #[test]
    fn establish_connection_sets_active_connection() {
        let gateway = Gateway::new(registry_with(vec![("my_adapter", None)]));
        let connection = gateway
            .establish_connection(&GatewayConfig::new("my_adapter"))
            .unwrap();

        assert!(gateway.is_connected());
        assert!(Arc::ptr_eq(&connection, &gateway.connection().unwrap()));
        assert_eq!(connection.name(), "my_adapter");
    }

    #[test]
    fn establish_connection_propagates_constructor_failure() {
        let registry = AdapterRegistry::new().with("broken", |_: &GatewayConfig| {
            Err(SmsError::Invalid("missing user".into()))
        });
        let gateway = Gateway::new(registry);

        assert!(matches!(
            gateway.establish_connection(&GatewayConfig::new("broken")),
            Err(SmsError::Invalid(_))
        ));
        assert!(!gateway.is_connected());
    }

    #[test]
    fn connection_requires_establishment() {
        let gateway = Gateway::new(AdapterRegistry::new());
        assert!(matches!(
            gateway.connection(),
            Err(SmsError::ConnectionNotEstablished)
        ));
        assert!(matches!(
            gateway.sender(&Params::new()),
            Err(SmsError::ConnectionNotEstablished)
        ));
        assert!(matches!(
            gateway.service_url(),
            Err(SmsError::ConnectionNotEstablished)
        ));
    }

    #[test]
    fn set_connection_rejects_empty_value() {
        let gateway = Gateway::new(AdapterRegistry::new());
        assert!(matches!(
            gateway.set_connection(None),
            Err(SmsError::ConnectionNotEstablished)
        ));
        assert!(!gateway.is_connected());
    }

    #[test]
    fn set_connection_stores_value() {
        let gateway = Gateway::new(AdapterRegistry::new());
        let adapter: Connection = Arc::new(StubAdapter::new("manual", None));
        gateway.set_connection(Some(adapter.clone())).unwrap();

        assert!(gateway.is_connected());
        assert!(Arc::ptr_eq(&adapter, &gateway.connection().unwrap()));

        assert!(gateway.disconnect().is_some());
        assert!(!gateway.is_connected());
        assert!(gateway.disconnect().is_none());
    }

    #[test]
    fn active_answer_wins_without_fallback() {
        let other_calls = Arc::new(AtomicUsize::new(0));
        let counter = other_calls.clone();
        let registry = AdapterRegistry::new().with("another_adapter", move |_: &GatewayConfig| {
            let mut adapter = StubAdapter::new("another_adapter", Some("something else"));
            adapter.calls = counter.clone();
            Ok(Arc::new(adapter) as Connection)
        });
        let gateway = connected(StubAdapter::new("active_adapter", Some("something")), registry);

        assert_eq!(
            gateway.message_id("anything").unwrap().as_deref(),
            Some("something")
        );
        assert_eq!(other_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn falls_back_to_other_adapter() {
        let gateway = connected(
            StubAdapter::new("active_adapter", None),
            registry_with(vec![("another_adapter", Some("something else"))]),
        );
        let params = Params::new();

        assert_eq!(
            gateway.message_id("anything").unwrap().as_deref(),
            Some("something else")
        );
        assert_eq!(
            gateway.message_text(&params).unwrap().as_deref(),
            Some("something else")
        );
        assert_eq!(
            gateway.sender(&params).unwrap().as_deref(),
            Some("something else")
        );
        assert_eq!(
            gateway.status(&params).unwrap().as_deref(),
            Some("something else")
        );
    }

    #[test]
    fn no_answer_is_not_an_error() {
        let gateway = connected(
            StubAdapter::new("active_adapter", None),
            registry_with(vec![("another_adapter", None), ("third_adapter", Some(""))]),
        );
        let mut params = Params::new();

        assert_eq!(gateway.message_id("anything").unwrap(), None);
        assert_eq!(gateway.authenticate(&mut params).unwrap(), None);
        assert_eq!(gateway.status(&params).unwrap(), None);
    }

    #[test]
    fn empty_answer_counts_as_unrecognized() {
        let gateway = connected(
            StubAdapter::new("active_adapter", Some("")),
            registry_with(vec![("another_adapter", Some("something else"))]),
        );
        assert_eq!(
            gateway.sender(&Params::new()).unwrap().as_deref(),
            Some("something else")
        );
    }

    #[test]
    fn fallback_follows_registration_order() {
        let gateway = connected(
            StubAdapter::new("active_adapter", None),
            registry_with(vec![
                ("silent_adapter", None),
                ("first_adapter", Some("first")),
                ("second_adapter", Some("second")),
            ]),
        );
        assert_eq!(
            gateway.status(&Params::new()).unwrap().as_deref(),
            Some("first")
        );
    }

    #[test]
    fn fallback_skips_active_adapter_and_failing_constructors() {
        let registry = AdapterRegistry::new()
            .with("active_adapter", |_: &GatewayConfig| {
                Ok(Arc::new(StubAdapter::new("active_adapter", Some("from registry"))) as Connection)
            })
            .with("needs_config", |config: &GatewayConfig| {
                config
                    .setting("user")
                    .ok_or_else(|| SmsError::Invalid("user is required".into()))?;
                Ok(Arc::new(StubAdapter::new("needs_config", Some("unreachable"))) as Connection)
            })
            .with("another_adapter", |_: &GatewayConfig| {
                Ok(Arc::new(StubAdapter::new("another_adapter", Some("something else"))) as Connection)
            });
        let gateway = connected(StubAdapter::new("active_adapter", None), registry);

        assert_eq!(
            gateway.sender(&Params::new()).unwrap().as_deref(),
            Some("something else")
        );
    }

    #[test]
    fn authenticate_falls_back_and_strips_token() {
        let gateway = connected(
            StubAdapter::new("active_adapter", None),
            registry_with(vec![("another_adapter", Some("something else"))]),
        );
        let mut params = json!({ "authentication_key": "secret" })
            .as_object()
            .cloned()
            .unwrap();

        assert_eq!(
            gateway.authenticate(&mut params).unwrap().as_deref(),
            Some("something else")
        );
        assert!(params.is_empty());
    }

    #[tokio::test]
    async fn direct_operations_use_active_connection() {
        let gateway = connected(
            StubAdapter::new("active_adapter", None),
            registry_with(vec![("another_adapter", Some("something else"))]),
        );

        let response = gateway
            .deliver(
                &OutboundSms::new("61447100308", "hello"),
                &DeliverOptions {
                    filter_response: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(response, "active_adapter -> 61447100308 filtered=true");
        assert!(gateway.delivery_request_successful(&response).unwrap());
        assert!(!gateway.delivery_request_successful("another_adapter").unwrap());

        gateway.set_authentication_key(Some("something".into())).unwrap();
        assert_eq!(
            gateway.authentication_key().unwrap().as_deref(),
            Some("something")
        );

        gateway.set_use_ssl(true).unwrap();
        assert!(gateway.use_ssl().unwrap());
        assert_eq!(gateway.service_url().unwrap(), "https://example.com/send");
        gateway.set_use_ssl(false).unwrap();
        assert_eq!(gateway.service_url().unwrap(), "http://example.com/send");
    }

    #[test]
    fn fixtures_require_test_environment() {
        let gateway = connected(StubAdapter::new("active_adapter", None), AdapterRegistry::new());
        match gateway.sample_incoming_sms(&SampleOptions::default()) {
            Err(SmsError::FixturesUnavailable(name)) => assert_eq!(name, "active_adapter"),
            other => panic!("expected FixturesUnavailable, got {:?}", other),
        }
    }

    #[test]
    fn concurrent_readers_share_connection() {
        let gateway = Arc::new(connected(
            StubAdapter::new("active_adapter", Some("something")),
            AdapterRegistry::new(),
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gateway = gateway.clone();
                std::thread::spawn(move || gateway.sender(&Params::new()).unwrap())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().as_deref(), Some("something"));
        }
    }
}

//! HTTP POST plumbing shared by the gateway adapters.

#[cfg(feature = "reqwest")]
use std::sync::OnceLock;

use async_trait::async_trait;

use crate::SmsError;

/// Body of a gateway request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// `application/x-www-form-urlencoded` parameters.
    Form(Vec<(String, String)>),
    /// Raw XML document.
    Xml(String),
}

/// Sends a request to a gateway and hands back the raw response body.
///
/// No retries; transport failures surface as [`SmsError::Http`].
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post(&self, url: &str, body: RequestBody) -> Result<String, SmsError>;
}

/// reqwest backed transport. The client is built on the first request, so
/// adapters that only parse payloads never pay for it.
#[cfg(feature = "reqwest")]
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    http: OnceLock<reqwest::Client>,
}

#[cfg(feature = "reqwest")]
impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured client (timeouts, proxies, user agent).
    pub fn with_client(http: reqwest::Client) -> Self {
        Self {
            http: OnceLock::from(http),
        }
    }

    fn client(&self) -> &reqwest::Client {
        self.http.get_or_init(reqwest::Client::new)
    }
}

#[cfg(feature = "reqwest")]
#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(&self, url: &str, body: RequestBody) -> Result<String, SmsError> {
        let http = self.client();
        let request = match body {
            RequestBody::Form(params) => http.post(url).form(&params),
            RequestBody::Xml(xml) => http
                .post(url)
                .header(reqwest::header::CONTENT_TYPE, "application/xml")
                .body(xml),
        };

        let res = request
            .send()
            .await
            .map_err(|e| SmsError::Http(e.to_string()))?;
        let status = res.status();
        let body = res.text().await.map_err(|e| SmsError::Http(e.to_string()))?;
        tracing::debug!(%url, %status, "gateway responded");
        Ok(body)
    }
}

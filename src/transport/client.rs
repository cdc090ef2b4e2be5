//! reqwest-backed transport.
//!
//! The client is created once and shared by the search orchestrator and the
//! asset queue, so both benefit from connection pooling.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};

use super::error::TransportError;
use super::{FetchRequest, Transport};
use crate::user_agent;

/// Production [`Transport`] built on a pooled [`reqwest::Client`].
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use recipup_core::transport::{FetchRequest, HttpTransport, Transport};
/// use url::Url;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = HttpTransport::new(Duration::from_secs(15))?;
/// let request = FetchRequest::get(Url::parse("http://www.recipepuppy.com/api/?q=bacon")?, Duration::from_secs(15));
/// let body = transport.send(&request).await?;
/// println!("{} bytes", body.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Creates a transport whose connect and overall timeouts both equal
    /// `session_timeout`.
    ///
    /// # Errors
    ///
    /// Returns the reqwest builder error if the TLS backend or system
    /// configuration cannot be initialized.
    #[instrument(level = "debug")]
    pub fn new(session_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(session_timeout)
            .timeout(session_timeout)
            .user_agent(user_agent::default_user_agent())
            .gzip(true)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn send(&self, request: &FetchRequest) -> Result<Vec<u8>, TransportError> {
        let url = request.url.as_str();

        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            debug!(status = status.as_u16(), "non-success status");
            return Err(TransportError::http_status(url, status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::from_reqwest(url, &e))?;

        debug!(bytes = body.len(), "response received");
        Ok(body.to_vec())
    }
}

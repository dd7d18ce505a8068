//! Clients for invoking hops on other instances.

use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use tracing::debug;

use crate::{
    correlation::{CorrelationId, CORRELATION_ID_HEADER},
    error::ChainedCallError,
    model::{HopResult, SimulationDescriptor},
};

const SIMULATE_ROUTE: &str = "simulate";

/// Response returned by a hop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HopResponse {
    /// Status code returned by the hop.
    pub status: StatusCode,

    /// Hop result returned in the response body, if any.
    pub body: Option<HopResult>,
}

/// A client that can execute a simulation on the instance at a given address.
#[async_trait]
pub trait HopClient: Send + Sync {
    /// Sends the descriptor to the `simulate` endpoint of the instance at `uri`, propagating the correlation
    /// identifier.
    ///
    /// # Errors
    ///
    /// If the instance cannot be reached, or does not respond in time, an error is returned. A response with a
    /// non-success status code is not an error.
    async fn simulate(
        &self, uri: &str, descriptor: &SimulationDescriptor, correlation_id: &CorrelationId,
    ) -> Result<HopResponse, ChainedCallError>;
}

/// A [`HopClient`] that invokes hops over HTTP.
#[derive(Clone)]
pub struct HttpHopClient {
    inner: reqwest::Client,
    default_scheme: String,
}

impl HttpHopClient {
    /// Creates a new `HttpHopClient`.
    ///
    /// Each request is given up to `timeout` to complete. Addresses without a scheme are assumed to use
    /// `default_scheme`.
    ///
    /// # Errors
    ///
    /// If the underlying HTTP client cannot be built, an error is returned.
    pub fn new<S: Into<String>>(timeout: Duration, default_scheme: S) -> Result<Self, reqwest::Error> {
        let inner = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            inner,
            default_scheme: default_scheme.into(),
        })
    }

    fn simulate_url(&self, uri: &str) -> String {
        let base = uri.trim().trim_end_matches('/');
        if base.contains("://") {
            format!("{}/{}", base, SIMULATE_ROUTE)
        } else {
            format!("{}://{}/{}", self.default_scheme, base, SIMULATE_ROUTE)
        }
    }
}

#[async_trait]
impl HopClient for HttpHopClient {
    async fn simulate(
        &self, uri: &str, descriptor: &SimulationDescriptor, correlation_id: &CorrelationId,
    ) -> Result<HopResponse, ChainedCallError> {
        let url = reqwest::Url::parse(&self.simulate_url(uri)).map_err(|e| ChainedCallError::InvalidAddress {
            uri: uri.to_string(),
            reason: e.to_string(),
        })?;

        debug!(%url, "Sending simulation request.");

        let mut request = self.inner.post(url).json(descriptor);
        if let Some(header_value) = correlation_id.to_header_value() {
            request = request.header(CORRELATION_ID_HEADER, header_value);
        }

        let response = request.send().await.map_err(|e| classify_error(uri, e))?;
        let status = response.status();
        let body = response.bytes().await.map_err(|e| classify_error(uri, e))?;

        // Bodies are best-effort: bodyless status codes and foreign error pages simply produce no nested result.
        let body = if body.is_empty() {
            None
        } else {
            serde_json::from_slice::<HopResult>(&body).ok()
        };

        Ok(HopResponse { status, body })
    }
}

fn classify_error(uri: &str, error: reqwest::Error) -> ChainedCallError {
    if error.is_timeout() {
        ChainedCallError::TimedOut { uri: uri.to_string() }
    } else {
        ChainedCallError::Unreachable {
            uri: uri.to_string(),
            reason: error.to_string(),
        }
    }
}

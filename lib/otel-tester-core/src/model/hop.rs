use http::StatusCode;
use serde::{Deserialize, Serialize};

use super::{SimulationDescriptor, SUCCESS_MESSAGE};
use crate::{client::HopResponse, error::ChainedCallError};

const fn default_status_code() -> StatusCode {
    StatusCode::OK
}

/// Result of executing a hop.
///
/// Hop results mirror the structure of the descriptor tree they were produced from: each hop's results are nested
/// under it, in the order they were declared.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct HopResult {
    /// Address of the instance that executed the hop.
    #[serde(default)]
    pub host: String,

    /// Status code of the hop.
    ///
    /// For nested hops, this is the status code observed when invoking the hop, rather than the one it was asked to
    /// return.
    #[serde(rename = "statusCode", with = "http_serde_ext::status_code", default = "default_status_code")]
    pub status_code: StatusCode,

    /// Message returned by the hop.
    #[serde(default)]
    pub message: String,

    /// Results of the hops executed by this hop.
    #[serde(default)]
    pub hops: Vec<HopResult>,
}

impl HopResult {
    /// Creates the result of a successfully simulated hop, with the given nested results.
    pub fn simulated(descriptor: &SimulationDescriptor, hops: Vec<HopResult>) -> Self {
        Self {
            host: descriptor.uri.clone(),
            status_code: descriptor.status_code,
            message: SUCCESS_MESSAGE.to_string(),
            hops,
        }
    }

    /// Creates the result of a chained hop from the response it returned.
    ///
    /// The observed status code is always used. The message and nested results are taken from the response body when
    /// there is one, and left empty otherwise.
    pub fn from_response<H: Into<String>>(host: H, response: HopResponse) -> Self {
        let (message, hops) = response
            .body
            .map(|body| (body.message, body.hops))
            .unwrap_or_default();

        Self {
            host: host.into(),
            status_code: response.status,
            message,
            hops,
        }
    }

    /// Creates the result of a chained hop that could not be invoked.
    pub fn from_error<H: Into<String>>(host: H, error: &ChainedCallError) -> Self {
        Self {
            host: host.into(),
            status_code: error.status_code(),
            message: String::new(),
            hops: Vec::new(),
        }
    }

    /// Returns the depth of the result tree rooted at this hop.
    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        1 + self.hops.iter().map(HopResult::depth).max().unwrap_or(0)
    }
}

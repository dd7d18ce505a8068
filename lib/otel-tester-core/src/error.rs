//! Error types.

use http::StatusCode;
use snafu::Snafu;
use uuid::Uuid;

use crate::model::TestStatus;

/// A generic error.
///
/// Used for bootstrap and process-level failures where callers only need to report the error, not handle it.
pub type GenericError = anyhow::Error;

/// A test management error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum TestError {
    /// The maximum number of concurrently running tests has been reached.
    #[snafu(display("Maximum number of tests reached."))]
    AdmissionRejected {
        /// Maximum number of concurrently running tests.
        limit: usize,
    },

    /// The test could not be added to the registry, because its identity is already in use.
    #[snafu(display("Failed to start new test."))]
    RegistrationFailed {
        /// Identity of the test.
        id: Uuid,
    },

    /// The test is not in a state that allows the requested operation.
    #[snafu(display("Test is not running, cannot cancel."))]
    InvalidStateTransition {
        /// Identity of the test.
        id: Uuid,

        /// Status of the test when the operation was attempted.
        status: TestStatus,
    },

    /// No test exists with the given identity.
    #[snafu(display("Test with ID {} was not found.", id))]
    NotFound {
        /// Identity of the test.
        id: Uuid,
    },

    /// The test disappeared from the registry while it was being deleted.
    #[snafu(display("Failed to delete test."))]
    RemovalFailed {
        /// Identity of the test.
        id: Uuid,
    },

    /// The submitted test run is invalid.
    #[snafu(display("Invalid test run: {}", reason))]
    InvalidTestRun {
        /// Human-readable description of the problem.
        reason: String,
    },
}

impl TestError {
    /// Returns the HTTP status code that best represents this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AdmissionRejected { .. } | Self::InvalidStateTransition { .. } | Self::InvalidTestRun { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::RegistrationFailed { .. } | Self::RemovalFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A chained call error.
///
/// Chained call errors are contained to the hop that produced them: they are recorded in that hop's result, and never
/// abort sibling hops.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum ChainedCallError {
    /// The hop address could not be turned into a valid request URL.
    #[snafu(display("Invalid hop address '{}': {}", uri, reason))]
    InvalidAddress {
        /// Address of the hop.
        uri: String,

        /// Underlying error message.
        reason: String,
    },

    /// The hop could not be reached, or the exchange failed midway.
    #[snafu(display("Failed to reach hop '{}': {}", uri, reason))]
    Unreachable {
        /// Address of the hop.
        uri: String,

        /// Underlying error message.
        reason: String,
    },

    /// The hop did not respond in time.
    #[snafu(display("Timed out waiting for hop '{}'.", uri))]
    TimedOut {
        /// Address of the hop.
        uri: String,
    },
}

impl ChainedCallError {
    /// Returns the status code recorded for a hop that failed with this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidAddress { .. } => StatusCode::BAD_REQUEST,
            Self::Unreachable { .. } => StatusCode::BAD_GATEWAY,
            Self::TimedOut { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

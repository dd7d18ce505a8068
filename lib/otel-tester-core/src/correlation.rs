//! Correlation context.
//!
//! A correlation identifier accompanies a single originating call and every network call that it triggers, so that an
//! external observer can group all of the work caused by that call.

use std::{fmt, sync::Arc};

use http::HeaderValue;
use uuid::Uuid;

/// HTTP header carrying the correlation identifier.
///
/// Header names are case-insensitive on the wire, but `http` requires the lowercase form for static header names.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// An opaque correlation identifier.
///
/// Identifiers generated by this crate are always UUIDs, but identifiers received from other systems are accepted
/// verbatim as long as they are not blank.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct CorrelationId(Arc<str>);

impl CorrelationId {
    /// Generates a new, random correlation identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string().into())
    }

    /// Resolves the correlation identifier for an inbound request.
    ///
    /// If the header value is present, valid UTF-8, and not blank, it is reused. Otherwise, a new identifier is
    /// generated.
    pub fn from_header(value: Option<&HeaderValue>) -> Self {
        value
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Self(value.into()))
            .unwrap_or_else(Self::generate)
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the identifier as a UUID, if it is one.
    ///
    /// This is used to decide whether the identifier can double as the identity of a submitted test run.
    pub fn as_uuid(&self) -> Option<Uuid> {
        Uuid::try_parse(&self.0).ok()
    }

    /// Converts the identifier into a header value for outgoing requests.
    ///
    /// Returns `None` if the identifier contains characters that are not allowed in header values.
    pub fn to_header_value(&self) -> Option<HeaderValue> {
        HeaderValue::from_str(&self.0).ok()
    }
}

impl From<Uuid> for CorrelationId {
    fn from(id: Uuid) -> Self {
        Self(id.to_string().into())
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

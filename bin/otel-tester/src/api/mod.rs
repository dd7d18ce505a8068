//! HTTP API.

use std::future::Future;

use axum::{
    extract::Request,
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
    Router,
};
use otel_tester_core::{correlation::CORRELATION_ID_HEADER, error::GenericError, prelude::CorrelationId};
use tokio::net::TcpListener;
use tracing::{info_span, Instrument as _};

mod simulate;
pub use self::simulate::SimulationAPIHandler;

mod tester;
pub use self::tester::TestsAPIHandler;

// An API handler.
//
// API handlers define the initial state and routes for a portion of the API.
pub trait APIHandler {
    type State: Clone + Send + Sync + 'static;

    fn generate_initial_state(&self) -> Self::State;
    fn generate_routes(&self) -> Router<Self::State>;
}

/// An API builder.
///
/// Composes the API from individual handlers, and wraps every route so that each request is tagged with a correlation
/// identifier that is echoed back in the response.
#[derive(Default)]
pub struct APIBuilder {
    router: Router,
}

impl APIBuilder {
    /// Create a new `APIBuilder` with an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the given handler to this builder.
    pub fn with_handler<H>(mut self, handler: H) -> Self
    where
        H: APIHandler,
    {
        let handler_router = handler.generate_routes();
        let handler_state = handler.generate_initial_state();
        self.router = self.router.merge(handler_router.with_state(handler_state));

        self
    }

    /// Builds the router.
    pub fn build(self) -> Router {
        self.router.layer(middleware::from_fn(propagate_correlation_id))
    }

    /// Serves the API on the given listener until `shutdown` resolves.
    ///
    /// In-flight requests are allowed to finish before this returns.
    ///
    /// ## Errors
    ///
    /// If there is an error while accepting new connections, an error will be returned.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), GenericError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(listener, self.build())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(Into::into)
    }
}

async fn propagate_correlation_id(mut request: Request, next: Next) -> Response {
    let correlation_id = CorrelationId::from_header(request.headers().get(CORRELATION_ID_HEADER));
    request.extensions_mut().insert(correlation_id.clone());

    let span = info_span!(
        "request",
        correlation_id = correlation_id.as_str(),
        method = %request.method(),
        path = request.uri().path(),
    );
    let mut response = next.run(request).instrument(span).await;

    if let Some(header_value) = correlation_id.to_header_value() {
        response
            .headers_mut()
            .insert(HeaderName::from_static(CORRELATION_ID_HEADER), header_value);
    }

    response
}

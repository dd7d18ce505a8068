use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::post,
    Extension, Json, Router,
};
use otel_tester_core::{
    prelude::{ChainExecutor, CorrelationId, SimulationDescriptor},
    telemetry::record_simulation_request,
};
use tracing::debug;

use super::APIHandler;

/// State used for the simulation API handler.
#[derive(Clone)]
pub struct SimulationState {
    executor: ChainExecutor,
}

/// An API handler for executing simulations.
///
/// This handler exposes a single route, `/simulate`, which executes the posted simulation descriptor, including any
/// next hops, and responds with the resulting hop tree.
pub struct SimulationAPIHandler {
    state: SimulationState,
}

impl SimulationAPIHandler {
    pub fn new(executor: ChainExecutor) -> Self {
        Self {
            state: SimulationState { executor },
        }
    }

    async fn simulate_handler(
        State(state): State<SimulationState>, Extension(correlation_id): Extension<CorrelationId>,
        Json(descriptor): Json<SimulationDescriptor>,
    ) -> Response {
        record_simulation_request();
        debug!(uri = %descriptor.uri, hops = descriptor.next_hops.len(), "Received simulation request.");

        let outcome = state.executor.execute(&descriptor, &correlation_id).await;
        match outcome.body {
            Some(body) => (outcome.status, Json(body)).into_response(),
            None => outcome.status.into_response(),
        }
    }
}

impl APIHandler for SimulationAPIHandler {
    type State = SimulationState;

    fn generate_initial_state(&self) -> Self::State {
        self.state.clone()
    }

    fn generate_routes(&self) -> Router<Self::State> {
        Router::new().route("/simulate", post(Self::simulate_handler))
    }
}

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use otel_tester_core::prelude::{CorrelationId, Orchestrator, TestError, TestInfo, TestRun};
use tracing::debug;
use uuid::Uuid;

use super::APIHandler;

/// State used for the tests API handler.
#[derive(Clone)]
pub struct TestsState {
    orchestrator: Orchestrator,
}

/// An API handler for managing test runs.
///
/// This handler exposes routes for submitting test runs (`POST /tests`), inspecting them (`GET /tests` and
/// `GET /tests/{id}`), canceling them (`POST /tests/{id}/cancel`), and deleting them (`DELETE /tests/{id}`).
///
/// Test identities that are not valid UUIDs can never match an existing test, so they are answered with 404 Not Found.
pub struct TestsAPIHandler {
    state: TestsState,
}

impl TestsAPIHandler {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            state: TestsState { orchestrator },
        }
    }

    async fn submit_handler(
        State(state): State<TestsState>, Extension(correlation_id): Extension<CorrelationId>,
        Json(test_run): Json<TestRun>,
    ) -> Response {
        match state.orchestrator.submit(test_run, &correlation_id) {
            Ok(info) => {
                let location = format!("tests/{}", info.id());
                (StatusCode::CREATED, [(header::LOCATION, location)], Json(&*info)).into_response()
            }
            Err(e) => error_response(e),
        }
    }

    async fn list_handler(State(state): State<TestsState>) -> Response {
        let tests = state.orchestrator.list();
        if tests.is_empty() {
            return StatusCode::NO_CONTENT.into_response();
        }

        let tests = tests.iter().map(|info| &**info).collect::<Vec<&TestInfo>>();
        Json(tests).into_response()
    }

    async fn get_handler(State(state): State<TestsState>, Path(raw_id): Path<String>) -> Response {
        let Some(id) = parse_id(&raw_id) else {
            return not_found(&raw_id);
        };

        match state.orchestrator.get(id) {
            Ok(info) => Json(&*info).into_response(),
            Err(e) => error_response(e),
        }
    }

    async fn cancel_handler(State(state): State<TestsState>, Path(raw_id): Path<String>) -> Response {
        let Some(id) = parse_id(&raw_id) else {
            return not_found(&raw_id);
        };

        match state.orchestrator.cancel(id) {
            Ok(()) => StatusCode::NO_CONTENT.into_response(),
            Err(e) => error_response(e),
        }
    }

    async fn delete_handler(State(state): State<TestsState>, Path(raw_id): Path<String>) -> Response {
        let Some(id) = parse_id(&raw_id) else {
            return not_found(&raw_id);
        };

        match state.orchestrator.delete(id) {
            Ok(()) => StatusCode::NO_CONTENT.into_response(),
            Err(e) => error_response(e),
        }
    }
}

impl APIHandler for TestsAPIHandler {
    type State = TestsState;

    fn generate_initial_state(&self) -> Self::State {
        self.state.clone()
    }

    fn generate_routes(&self) -> Router<Self::State> {
        Router::new()
            .route("/tests", post(Self::submit_handler).get(Self::list_handler))
            .route("/tests/{id}", get(Self::get_handler).delete(Self::delete_handler))
            .route("/tests/{id}/cancel", post(Self::cancel_handler))
    }
}

fn parse_id(raw: &str) -> Option<Uuid> {
    let id = Uuid::try_parse(raw).ok();
    if id.is_none() {
        debug!(id = raw, "Received malformed test identity.");
    }
    id
}

fn not_found(raw: &str) -> Response {
    (StatusCode::NOT_FOUND, format!("Test with ID {} was not found.", raw)).into_response()
}

fn error_response(e: TestError) -> Response {
    (e.status_code(), e.to_string()).into_response()
}

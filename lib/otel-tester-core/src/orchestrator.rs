//! Test run orchestration.

use std::{
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use futures::FutureExt as _;
use snafu::{OptionExt as _, ResultExt as _, Snafu};
use tokio::{select, time::sleep};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, Instrument as _};
use uuid::Uuid;

use crate::{
    client::HopClient,
    correlation::CorrelationId,
    error::{AdmissionRejected, ChainedCallError, InvalidStateTransition, NotFound, RemovalFailed, TestError},
    model::{TestInfo, TestRun, TestStatus},
    registry::TestRegistry,
};

/// Default maximum number of concurrently running tests.
pub const DEFAULT_MAX_RUNNING_TESTS: usize = 3;

const PANICKED_MESSAGE: &str = "Test stopped unexpectedly.";

#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
enum RunError {
    #[snafu(display("Test was canceled."))]
    Canceled,

    #[snafu(display("{}", source))]
    StepFailed { source: ChainedCallError },
}

struct Inner {
    registry: TestRegistry,
    client: Arc<dyn HopClient>,
    max_running: usize,
    admission: Mutex<()>,
    tasks: TaskTracker,
}

/// Orchestrates test runs.
///
/// Submitted tests are admitted as long as fewer than the configured maximum are unfinished, and are then driven by a
/// dedicated background task that reports progress through the test's own [`TestInfo`]. Cloning the orchestrator
/// creates a new handle to the same registry and tasks.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Creates a new `Orchestrator` that tracks tests in `registry` and executes their steps with `client`.
    ///
    /// At most `max_running` tests are allowed to run concurrently. Values below one are raised to one.
    pub fn new(registry: TestRegistry, client: Arc<dyn HopClient>, max_running: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                client,
                max_running: max_running.max(1),
                admission: Mutex::new(()),
                tasks: TaskTracker::new(),
            }),
        }
    }

    /// Returns the maximum number of concurrently running tests.
    pub fn max_running(&self) -> usize {
        self.inner.max_running
    }

    /// Returns the registry of tests.
    pub fn registry(&self) -> &TestRegistry {
        &self.inner.registry
    }

    /// Submits a test run.
    ///
    /// The correlation identifier is used as the identity of the test when it is a UUID, and a new identity is generated
    /// otherwise. Once admitted, the test is executed in the background: the returned `TestInfo` is still in the
    /// `Created` status.
    ///
    /// # Errors
    ///
    /// If the test run is invalid, or the maximum number of running tests has been reached, or the identity of the test
    /// is already in use, an error is returned and no test is started.
    ///
    /// Admitted tests count toward the maximum from the moment they are registered, before their task has marked them
    /// as running, so that a burst of submissions cannot exceed the maximum.
    pub fn submit(&self, test_run: TestRun, correlation_id: &CorrelationId) -> Result<Arc<TestInfo>, TestError> {
        test_run.validate()?;

        // Counting and registering happen under the same lock, otherwise concurrent submissions could all observe
        // room for one more test.
        let _admission = self.inner.admission.lock().unwrap_or_else(PoisonError::into_inner);

        let limit = self.inner.max_running;
        let active = self.inner.registry.count_active();
        if active >= limit {
            debug!(internal_type = "tester", "Maximum number of tests reached: {}", limit);
            return AdmissionRejected { limit }.fail();
        }

        let id = correlation_id.as_uuid().unwrap_or_else(Uuid::new_v4);
        let info = Arc::new(TestInfo::new(id, test_run));
        if self.inner.registry.add(Arc::clone(&info)).is_err() {
            error!(internal_type = "tester", "Failed to add new test with ID {}.", id);
            return Err(TestError::RegistrationFailed { id });
        }

        let span = info_span!("test", test_id = %id, correlation_id = %correlation_id);
        self.inner.tasks.spawn(
            run_test(Arc::clone(&info), Arc::clone(&self.inner.client), correlation_id.clone()).instrument(span),
        );

        info!(internal_type = "tester", "Started new test with ID {}.", id);
        debug!(internal_type = "tester", "Active tests: {}", active + 1);

        Ok(info)
    }

    /// Gets the test with the given identity.
    ///
    /// # Errors
    ///
    /// If no test exists with the given identity, an error is returned.
    pub fn get(&self, id: Uuid) -> Result<Arc<TestInfo>, TestError> {
        self.inner.registry.get(&id).context(NotFound { id })
    }

    /// Lists all tests, most recently started first.
    ///
    /// Tests that have not started yet are listed last.
    pub fn list(&self) -> Vec<Arc<TestInfo>> {
        let mut tests = self
            .inner
            .registry
            .snapshot()
            .into_iter()
            .map(|info| (info.progress().started_at, info))
            .collect::<Vec<_>>();
        tests.sort_by(|(a, _), (b, _)| b.cmp(a));
        tests.into_iter().map(|(_, info)| info).collect()
    }

    /// Requests cancellation of a running test.
    ///
    /// The test stops at its next suspension point, after which its status becomes `Canceled`.
    ///
    /// # Errors
    ///
    /// If no test exists with the given identity, or the test is not running, an error is returned.
    pub fn cancel(&self, id: Uuid) -> Result<(), TestError> {
        let info = self.get(id)?;

        let status = info.status();
        if status != TestStatus::Running {
            debug!(internal_type = "tester", "Test with ID {} is not running, cannot cancel.", id);
            return InvalidStateTransition { id, status }.fail();
        }

        info.cancel();
        info!(internal_type = "tester", "Cancellation requested for test with ID {}.", id);
        Ok(())
    }

    /// Deletes a test, canceling it first if it has not finished yet.
    ///
    /// # Errors
    ///
    /// If no test exists with the given identity, or the test was removed concurrently, an error is returned.
    pub fn delete(&self, id: Uuid) -> Result<(), TestError> {
        let info = self.get(id)?;

        // Tests that were admitted but have not started yet are canceled too, so that their task stops as soon as it
        // starts rather than running on without being tracked.
        if !info.status().is_terminal() {
            info.cancel();
            debug!(internal_type = "tester", "Cancellation requested for test with ID {}.", id);
        }

        if self.inner.registry.remove(&id).is_none() {
            error!(internal_type = "tester", "Failed to remove test with ID {}.", id);
            return RemovalFailed { id }.fail();
        }

        info!(internal_type = "tester", "Deleted test with ID {}.", id);
        Ok(())
    }

    /// Cancels every unfinished test and waits for all test tasks to stop.
    pub async fn shutdown(&self) {
        for info in self.inner.registry.snapshot() {
            if !info.status().is_terminal() {
                info.cancel();
            }
        }

        self.inner.tasks.close();
        self.inner.tasks.wait().await;
    }
}

async fn run_test(info: Arc<TestInfo>, client: Arc<dyn HopClient>, correlation_id: CorrelationId) {
    let id = info.id();
    info.run();

    let result = AssertUnwindSafe(drive_test(&info, client.as_ref(), &correlation_id))
        .catch_unwind()
        .await;

    match result {
        Ok(Ok(())) => {
            info.complete();
            info!(internal_type = "tester", "Test {} successfully completed.", id);
        }
        Ok(Err(RunError::Canceled)) => {
            info.on_canceled();
            info!(internal_type = "tester", "Test {} was canceled.", id);
        }
        Ok(Err(e)) => {
            error!(internal_type = "tester", "Unexpected error in test {}: {}", id, e);
            info.on_failed(e.to_string());
        }
        Err(_) => {
            error!(internal_type = "tester", "Test {} panicked.", id);
            info.on_failed(PANICKED_MESSAGE);
        }
    }
}

async fn drive_test(info: &TestInfo, client: &dyn HopClient, correlation_id: &CorrelationId) -> Result<(), RunError> {
    let test_run = info.test_run();
    let cancel_token = info.cancellation_token();
    let delay = Duration::from_millis(test_run.delay_between_simulations);

    for repetition in 1..=test_run.repetitions {
        for (index, simulation) in test_run.simulations.iter().enumerate() {
            info.record_step(repetition, index);

            // The response itself is discarded: only failing to reach the instance at all stops the test.
            select! {
                biased;
                _ = cancel_token.cancelled() => return Canceled.fail(),
                result = client.simulate(&simulation.uri, simulation, correlation_id) => {
                    result.context(StepFailed)?;
                }
            }

            select! {
                biased;
                _ = cancel_token.cancelled() => return Canceled.fail(),
                _ = sleep(delay) => {}
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use http::{HeaderValue, StatusCode};

    use super::*;
    use crate::{
        client::HopResponse,
        model::{SimulationDescriptor, CANCELED_MESSAGE},
    };

    /// Records every step, optionally failing for one host, or never answering at all.
    #[derive(Default)]
    struct RecordingClient {
        steps: Mutex<Vec<(String, CorrelationId)>>,
        failing_host: Option<String>,
        hang: bool,
    }

    impl RecordingClient {
        fn failing_for(host: &str) -> Self {
            Self {
                failing_host: Some(host.to_string()),
                ..Default::default()
            }
        }

        fn hanging() -> Self {
            Self {
                hang: true,
                ..Default::default()
            }
        }

        fn steps(&self) -> Vec<String> {
            self.steps.lock().unwrap().iter().map(|(uri, _)| uri.clone()).collect()
        }
    }

    #[async_trait]
    impl HopClient for RecordingClient {
        async fn simulate(
            &self, uri: &str, _descriptor: &SimulationDescriptor, correlation_id: &CorrelationId,
        ) -> Result<HopResponse, ChainedCallError> {
            self.steps
                .lock()
                .unwrap()
                .push((uri.to_string(), correlation_id.clone()));

            if self.hang {
                futures::future::pending::<()>().await;
            }

            if self.failing_host.as_deref() == Some(uri) {
                return Err(ChainedCallError::Unreachable {
                    uri: uri.to_string(),
                    reason: "connection refused".to_string(),
                });
            }

            // Non-success statuses don't affect the test.
            Ok(HopResponse {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: None,
            })
        }
    }

    fn test_run(repetitions: u32, delay_between_simulations: u64, hosts: &[&str]) -> TestRun {
        TestRun {
            delay_between_simulations,
            repetitions,
            simulations: hosts.iter().map(|host| SimulationDescriptor::new(*host)).collect(),
        }
    }

    fn orchestrator(client: Arc<RecordingClient>) -> Orchestrator {
        Orchestrator::new(TestRegistry::new(), client, DEFAULT_MAX_RUNNING_TESTS)
    }

    async fn wait_for<F>(mut condition: F)
    where
        F: FnMut() -> bool,
    {
        for _ in 0..10_000 {
            if condition() {
                return;
            }
            sleep(Duration::from_millis(1)).await;
        }
        panic!("condition was not met in time");
    }

    async fn wait_for_status(info: &TestInfo, status: TestStatus) {
        wait_for(|| info.status() == status).await;
    }

    #[tokio::test(start_paused = true)]
    async fn executes_every_step_in_order() {
        let client = Arc::new(RecordingClient::default());
        let orchestrator = orchestrator(client.clone());

        let info = orchestrator
            .submit(test_run(3, 10, &["a", "b"]), &CorrelationId::generate())
            .unwrap();
        wait_for_status(&info, TestStatus::Completed).await;

        assert_eq!(client.steps(), vec!["a", "b", "a", "b", "a", "b"]);

        let progress = info.progress();
        assert!(progress.started_at.is_some());
        assert!(progress.completed_at.is_some());
        assert!(progress.current_repetition.is_none());
        assert!(progress.current_simulation.is_none());
        assert!(progress.error_message.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn records_progress_while_running() {
        let client = Arc::new(RecordingClient::default());
        let orchestrator = orchestrator(client.clone());

        let info = orchestrator
            .submit(test_run(2, 1_000, &["a", "b"]), &CorrelationId::generate())
            .unwrap();
        assert_eq!(info.status(), TestStatus::Created);

        wait_for(|| client.steps().len() == 3).await;
        let progress = info.progress();
        assert_eq!(progress.status, TestStatus::Running);
        assert_eq!(progress.current_repetition, Some(2));
        assert_eq!(progress.current_simulation, Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn identity_comes_from_correlation_id() {
        let client = Arc::new(RecordingClient::default());
        let orchestrator = orchestrator(client.clone());

        let id = Uuid::new_v4();
        let correlation_id = CorrelationId::from(id);
        let info = orchestrator.submit(test_run(1, 0, &["a"]), &correlation_id).unwrap();
        assert_eq!(info.id(), id);
        wait_for_status(&info, TestStatus::Completed).await;

        // Every step carries the same correlation identifier.
        assert!(client.steps.lock().unwrap().iter().all(|(_, step_id)| *step_id == correlation_id));

        // Reusing the identity is a registration failure, not an admission failure.
        let error = orchestrator.submit(test_run(1, 0, &["a"]), &correlation_id).unwrap_err();
        assert!(matches!(error, TestError::RegistrationFailed { id: failed_id } if failed_id == id));
        assert_eq!(orchestrator.registry().len(), 1);

        // Identifiers that aren't UUIDs get a fresh identity.
        let header = HeaderValue::from_static("checkout-smoke-test");
        let other = orchestrator
            .submit(test_run(1, 0, &["a"]), &CorrelationId::from_header(Some(&header)))
            .unwrap();
        assert_ne!(other.id(), id);
        assert!(orchestrator.get(other.id()).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn admission_ceiling() {
        let client = Arc::new(RecordingClient::default());
        let orchestrator = orchestrator(client.clone());

        let mut running = Vec::new();
        for _ in 0..3 {
            let info = orchestrator
                .submit(test_run(1000, 100_000, &["a"]), &CorrelationId::generate())
                .unwrap();
            wait_for_status(&info, TestStatus::Running).await;
            running.push(info);
        }

        let error = orchestrator
            .submit(test_run(1, 0, &["a"]), &CorrelationId::generate())
            .unwrap_err();
        assert!(matches!(error, TestError::AdmissionRejected { limit: 3 }));
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(orchestrator.registry().len(), 3);

        // Once one of them stops running, there is room for another.
        orchestrator.cancel(running[0].id()).unwrap();
        wait_for_status(&running[0], TestStatus::Canceled).await;

        let admitted = orchestrator
            .submit(test_run(1, 0, &["a"]), &CorrelationId::generate())
            .unwrap();
        assert_eq!(orchestrator.registry().len(), 4);
        wait_for_status(&admitted, TestStatus::Completed).await;
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_submissions_respects_ceiling() {
        let client = Arc::new(RecordingClient::default());
        let orchestrator = orchestrator(client);

        // None of these tasks get to run before the whole burst has been submitted.
        let results = (0..6)
            .map(|_| orchestrator.submit(test_run(1000, 100_000, &["a"]), &CorrelationId::generate()))
            .collect::<Vec<_>>();

        let admitted = results.iter().filter(|result| result.is_ok()).count();
        assert_eq!(admitted, 3);
        assert!(results[3..]
            .iter()
            .all(|result| matches!(result, Err(TestError::AdmissionRejected { limit: 3 }))));
        assert_eq!(orchestrator.registry().len(), 3);

        for info in results.iter().flatten() {
            wait_for_status(info, TestStatus::Running).await;
        }
        assert_eq!(orchestrator.registry().count_active(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn configurable_ceiling() {
        let client = Arc::new(RecordingClient::default());
        let orchestrator = Orchestrator::new(TestRegistry::new(), client, 0);
        assert_eq!(orchestrator.max_running(), 1);

        let info = orchestrator
            .submit(test_run(10, 100_000, &["a"]), &CorrelationId::generate())
            .unwrap();
        wait_for_status(&info, TestStatus::Running).await;

        let error = orchestrator
            .submit(test_run(1, 0, &["a"]), &CorrelationId::generate())
            .unwrap_err();
        assert!(matches!(error, TestError::AdmissionRejected { limit: 1 }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_delay() {
        let client = Arc::new(RecordingClient::default());
        let orchestrator = orchestrator(client.clone());

        let info = orchestrator
            .submit(test_run(5, 100_000, &["a", "b"]), &CorrelationId::generate())
            .unwrap();
        wait_for(|| client.steps().len() == 1).await;

        orchestrator.cancel(info.id()).unwrap();
        wait_for_status(&info, TestStatus::Canceled).await;

        let progress = info.progress();
        assert_eq!(progress.error_message.as_deref(), Some(CANCELED_MESSAGE));
        assert!(progress.completed_at.is_some());
        assert!(progress.current_repetition.is_none());
        assert!(progress.current_simulation.is_none());

        // No further steps are executed once canceled.
        sleep(Duration::from_secs(1_000)).await;
        assert_eq!(client.steps(), vec!["a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_step() {
        let client = Arc::new(RecordingClient::hanging());
        let orchestrator = orchestrator(client.clone());

        let info = orchestrator
            .submit(test_run(1, 0, &["a"]), &CorrelationId::generate())
            .unwrap();
        wait_for(|| client.steps().len() == 1).await;
        assert_eq!(info.status(), TestStatus::Running);

        orchestrator.cancel(info.id()).unwrap();
        wait_for_status(&info, TestStatus::Canceled).await;
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_requires_running_test() {
        let client = Arc::new(RecordingClient::default());
        let orchestrator = orchestrator(client);

        let error = orchestrator.cancel(Uuid::new_v4()).unwrap_err();
        assert!(matches!(error, TestError::NotFound { .. }));

        let info = orchestrator
            .submit(test_run(1, 0, &["a"]), &CorrelationId::generate())
            .unwrap();
        wait_for_status(&info, TestStatus::Completed).await;

        let error = orchestrator.cancel(info.id()).unwrap_err();
        assert!(matches!(
            error,
            TestError::InvalidStateTransition {
                status: TestStatus::Completed,
                ..
            }
        ));
        assert_eq!(info.status(), TestStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_step_fails_test() {
        let client = Arc::new(RecordingClient::failing_for("b"));
        let orchestrator = orchestrator(client.clone());

        let info = orchestrator
            .submit(test_run(3, 0, &["a", "b", "c"]), &CorrelationId::generate())
            .unwrap();
        wait_for_status(&info, TestStatus::Failed).await;

        let progress = info.progress();
        let message = progress.error_message.as_deref().unwrap();
        assert!(message.contains("connection refused"), "unexpected message: {}", message);
        assert!(progress.completed_at.is_some());
        assert_eq!(client.steps(), vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_contained_to_their_test() {
        let client = Arc::new(RecordingClient::failing_for("bad"));
        let orchestrator = orchestrator(client);

        let failing = orchestrator
            .submit(test_run(1, 0, &["bad"]), &CorrelationId::generate())
            .unwrap();
        let healthy = orchestrator
            .submit(test_run(3, 10, &["good"]), &CorrelationId::generate())
            .unwrap();

        wait_for_status(&failing, TestStatus::Failed).await;
        wait_for_status(&healthy, TestStatus::Completed).await;
    }

    #[tokio::test(start_paused = true)]
    async fn delete_running_test() {
        let client = Arc::new(RecordingClient::default());
        let orchestrator = orchestrator(client);

        let info = orchestrator
            .submit(test_run(10, 100_000, &["a"]), &CorrelationId::generate())
            .unwrap();
        wait_for_status(&info, TestStatus::Running).await;

        orchestrator.delete(info.id()).unwrap();
        assert!(matches!(orchestrator.get(info.id()), Err(TestError::NotFound { .. })));

        // The background task still observes the cancellation and stops.
        wait_for_status(&info, TestStatus::Canceled).await;
        assert!(info.progress().completed_at.is_some());

        let error = orchestrator.delete(info.id()).unwrap_err();
        assert!(matches!(error, TestError::NotFound { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn delete_finished_test() {
        let client = Arc::new(RecordingClient::default());
        let orchestrator = orchestrator(client);

        let info = orchestrator
            .submit(test_run(1, 0, &["a"]), &CorrelationId::generate())
            .unwrap();
        wait_for_status(&info, TestStatus::Completed).await;

        orchestrator.delete(info.id()).unwrap();
        assert!(orchestrator.registry().is_empty());
        assert_eq!(info.status(), TestStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn list_orders_by_start_time() {
        let client = Arc::new(RecordingClient::default());
        let registry = TestRegistry::new();
        let orchestrator = Orchestrator::new(registry.clone(), client, DEFAULT_MAX_RUNNING_TESTS);

        for _ in 0..3 {
            let info = orchestrator
                .submit(test_run(1, 0, &["a"]), &CorrelationId::generate())
                .unwrap();
            wait_for_status(&info, TestStatus::Completed).await;
        }

        // A test that never started has no start time at all.
        let pending = Arc::new(TestInfo::new(Uuid::new_v4(), test_run(1, 0, &["a"])));
        registry.add(Arc::clone(&pending)).unwrap();

        let listed = orchestrator.list();
        assert_eq!(listed.len(), 4);
        assert_eq!(listed.last().map(|info| info.id()), Some(pending.id()));

        let started_at = listed[..3]
            .iter()
            .map(|info| info.progress().started_at.unwrap())
            .collect::<Vec<_>>();
        assert!(started_at.windows(2).all(|pair| pair[0] >= pair[1]), "{:?}", started_at);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_test_run_is_rejected() {
        let client = Arc::new(RecordingClient::default());
        let orchestrator = orchestrator(client);

        let error = orchestrator
            .submit(test_run(0, 0, &["a"]), &CorrelationId::generate())
            .unwrap_err();
        assert!(matches!(error, TestError::InvalidTestRun { .. }));
        assert!(orchestrator.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_every_test() {
        let client = Arc::new(RecordingClient::default());
        let orchestrator = orchestrator(client);

        let tests = (0..3)
            .map(|_| {
                orchestrator
                    .submit(test_run(1000, 100_000, &["a"]), &CorrelationId::generate())
                    .unwrap()
            })
            .collect::<Vec<_>>();

        orchestrator.shutdown().await;
        assert!(tests.iter().all(|info| info.status() == TestStatus::Canceled));
    }
}

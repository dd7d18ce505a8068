use std::{fmt, sync::Arc};

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::{ser::SerializeStruct as _, Serialize, Serializer};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{SimulationDescriptor, TestRun};

/// Message recorded when a test is canceled.
pub const CANCELED_MESSAGE: &str = "Test was canceled by user.";

/// Status of a test.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
pub enum TestStatus {
    /// The test has been admitted, but has not started running yet.
    Created,

    /// The test is running.
    Running,

    /// The test was canceled before it could complete.
    Canceled,

    /// The test ran to completion.
    Completed,

    /// The test stopped due to an error.
    Failed,
}

impl TestStatus {
    /// Returns `true` if the status is terminal.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Canceled | Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "Created",
            Self::Running => "Running",
            Self::Canceled => "Canceled",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// Point-in-time progress of a test.
#[derive(Clone, Debug)]
pub struct TestProgress {
    /// Current status.
    pub status: TestStatus,

    /// When the test started running.
    pub started_at: Option<DateTime<Utc>>,

    /// When the test reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,

    /// Repetition currently being executed, starting at 1.
    pub current_repetition: Option<u32>,

    /// Index of the simulation currently being executed.
    pub current_simulation: Option<usize>,

    /// Error message, if the test failed or was canceled.
    pub error_message: Option<String>,
}

impl TestProgress {
    const fn created() -> Self {
        Self {
            status: TestStatus::Created,
            started_at: None,
            completed_at: None,
            current_repetition: None,
            current_simulation: None,
            error_message: None,
        }
    }
}

/// Runtime state of a submitted test run.
///
/// Progress is only ever written by the task driving the test, and is published as a whole on every update, so readers
/// always observe a consistent snapshot without contending with the writer.
pub struct TestInfo {
    id: Uuid,
    test_run: TestRun,
    cancel_token: CancellationToken,
    progress: ArcSwap<TestProgress>,
}

impl TestInfo {
    /// Creates a new `TestInfo` in the `Created` status.
    pub fn new(id: Uuid, test_run: TestRun) -> Self {
        Self {
            id,
            test_run,
            cancel_token: CancellationToken::new(),
            progress: ArcSwap::from_pointee(TestProgress::created()),
        }
    }

    /// Returns the identity of the test.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the test run configuration.
    pub fn test_run(&self) -> &TestRun {
        &self.test_run
    }

    /// Returns a snapshot of the current progress.
    pub fn progress(&self) -> Arc<TestProgress> {
        self.progress.load_full()
    }

    /// Returns the current status.
    pub fn status(&self) -> TestStatus {
        self.progress.load().status
    }

    /// Returns the cancellation token for the test.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    /// Requests cancellation of the test.
    ///
    /// Cancellation is cooperative: the test only stops at its next suspension point.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Marks the test as running.
    ///
    /// Returns `false`, leaving the test untouched, if the test had already left the `Created` status.
    pub fn run(&self) -> bool {
        self.transition(|current| {
            (current.status == TestStatus::Created).then(|| TestProgress {
                status: TestStatus::Running,
                started_at: Some(Utc::now()),
                ..current.clone()
            })
        })
    }

    /// Records the repetition and simulation currently being executed.
    pub fn record_step(&self, repetition: u32, simulation: usize) {
        self.transition(|current| {
            (current.status == TestStatus::Running).then(|| TestProgress {
                current_repetition: Some(repetition),
                current_simulation: Some(simulation),
                ..current.clone()
            })
        });
    }

    /// Marks the test as completed.
    ///
    /// Returns `false` if the test had already reached a terminal status.
    pub fn complete(&self) -> bool {
        self.finish(TestStatus::Completed, None)
    }

    /// Marks the test as canceled.
    ///
    /// Returns `false` if the test had already reached a terminal status.
    pub fn on_canceled(&self) -> bool {
        self.finish(TestStatus::Canceled, Some(CANCELED_MESSAGE.to_string()))
    }

    /// Marks the test as failed, recording the given error message.
    ///
    /// Returns `false` if the test had already reached a terminal status.
    pub fn on_failed<M: Into<String>>(&self, message: M) -> bool {
        self.finish(TestStatus::Failed, Some(message.into()))
    }

    fn finish(&self, status: TestStatus, error_message: Option<String>) -> bool {
        self.transition(|current| {
            (!current.status.is_terminal()).then(|| TestProgress {
                status,
                started_at: current.started_at,
                completed_at: Some(Utc::now()),
                current_repetition: None,
                current_simulation: None,
                error_message: error_message.clone(),
            })
        })
    }

    fn simulation_at(&self, progress: &TestProgress) -> Option<&SimulationDescriptor> {
        progress
            .current_simulation
            .and_then(|index| self.test_run.simulations.get(index))
    }

    fn transition<F>(&self, f: F) -> bool
    where
        F: Fn(&TestProgress) -> Option<TestProgress>,
    {
        let mut applied = false;
        self.progress.rcu(|current| match f(&**current) {
            Some(next) => {
                applied = true;
                Arc::new(next)
            }
            None => {
                applied = false;
                Arc::clone(current)
            }
        });
        applied
    }
}

impl fmt::Debug for TestInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestInfo")
            .field("id", &self.id)
            .field("progress", &self.progress())
            .finish_non_exhaustive()
    }
}

impl Serialize for TestInfo {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // Load progress once so that every field comes from the same snapshot.
        let progress = self.progress();
        let current_simulation = self.simulation_at(&progress);

        let mut state = serializer.serialize_struct("TestInfo", 8)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("status", &progress.status)?;
        state.serialize_field("startedAt", &progress.started_at)?;
        state.serialize_field("completedAt", &progress.completed_at)?;
        state.serialize_field("currentRepetition", &progress.current_repetition)?;
        state.serialize_field("currentSimulation", &current_simulation)?;
        state.serialize_field("errorMessage", &progress.error_message)?;
        state.serialize_field("testRun", &self.test_run)?;
        state.end()
    }
}

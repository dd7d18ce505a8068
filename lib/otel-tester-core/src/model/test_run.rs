use serde::{Deserialize, Serialize};
use snafu::ensure;

use super::SimulationDescriptor;
use crate::error::{InvalidTestRun, TestError};

const MAX_DELAY_BETWEEN_SIMULATIONS_MS: u64 = 100_000;
const MAX_REPETITIONS: u32 = 1000;

const fn default_repetitions() -> u32 {
    1
}

/// A test run configuration.
///
/// A test run repeats its simulations, in order, for the configured number of repetitions, pausing between each
/// simulation.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRun {
    /// Delay between each simulation, in milliseconds.
    #[serde(default)]
    pub delay_between_simulations: u64,

    /// Number of times to repeat the simulations.
    #[serde(default = "default_repetitions")]
    pub repetitions: u32,

    /// Simulations executed in each repetition.
    #[serde(default)]
    pub simulations: Vec<SimulationDescriptor>,
}

impl TestRun {
    /// Validates that the delay and repetition settings are within their allowed ranges.
    ///
    /// # Errors
    ///
    /// If either setting is out of range, an error is returned describing the problem.
    pub fn validate(&self) -> Result<(), TestError> {
        ensure!(
            self.delay_between_simulations <= MAX_DELAY_BETWEEN_SIMULATIONS_MS,
            InvalidTestRun {
                reason: format!(
                    "delay must be between 0 and {} milliseconds.",
                    MAX_DELAY_BETWEEN_SIMULATIONS_MS
                ),
            }
        );
        ensure!(
            (1..=MAX_REPETITIONS).contains(&self.repetitions),
            InvalidTestRun {
                reason: format!("repetitions must be between 1 and {}.", MAX_REPETITIONS),
            }
        );

        Ok(())
    }
}

//! Data model.

mod hop;
pub use self::hop::HopResult;

mod simulation;
pub use self::simulation::{can_have_body, LogLevel, SimulationDescriptor};

mod test_info;
pub use self::test_info::{TestInfo, TestProgress, TestStatus, CANCELED_MESSAGE};

mod test_run;
pub use self::test_run::TestRun;

/// Message attached to every successfully simulated hop.
pub const SUCCESS_MESSAGE: &str = "Simulation completed successfully.";

//! Core primitives for the telemetry simulation tester.
//!
//! This crate provides the simulation chain executor, which fans a single simulation request out across a tree of
//! downstream hops, and the test run orchestrator, which drives bounded numbers of repeated simulation runs in the
//! background while tracking their progress in a shared registry.
#![deny(missing_docs)]

pub mod client;
pub mod correlation;
pub mod error;
pub mod executor;
pub mod model;
pub mod orchestrator;
pub mod registry;
pub mod telemetry;

/// Common imports.
pub mod prelude {
    pub use super::client::{HopClient, HopResponse, HttpHopClient};
    pub use super::correlation::{CorrelationId, CORRELATION_ID_HEADER};
    pub use super::error::{ChainedCallError, GenericError, TestError};
    pub use super::executor::{ChainExecutor, FanOut, SimulationOutcome};
    pub use super::model::{HopResult, LogLevel, SimulationDescriptor, TestInfo, TestRun, TestStatus};
    pub use super::orchestrator::Orchestrator;
    pub use super::registry::TestRegistry;
}

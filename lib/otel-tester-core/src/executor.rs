//! Simulation chain execution.

use std::{sync::Arc, time::Duration};

use futures::future::join_all;
use http::StatusCode;
use tokio::time::sleep;
use tracing::{debug, error, info, trace, warn};

use crate::{
    client::HopClient,
    correlation::CorrelationId,
    model::{can_have_body, HopResult, LogLevel, SimulationDescriptor},
    telemetry,
};

/// Strategy for invoking the next hops of an aggregator.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum FanOut {
    /// Next hops are invoked one after another, in declaration order.
    ///
    /// Total latency is the sum of the latencies of each next hop.
    #[default]
    Sequential,

    /// Next hops are invoked concurrently.
    ///
    /// Results are still reported in declaration order, but side effects of sibling hops (logs, metrics) may
    /// interleave.
    Parallel,
}

/// Outcome of executing a simulation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SimulationOutcome {
    /// Status code to respond with.
    pub status: StatusCode,

    /// Hop result to respond with.
    ///
    /// Absent when the status code does not allow a response body.
    pub body: Option<HopResult>,
}

/// Executes simulation descriptors, forwarding next hops to the instances they target.
///
/// Each instance only executes the top-most hop of the descriptor it receives: next hops are sent on to the instance
/// at their own address, which executes them in the same way, so the chain unfolds recursively across the fleet.
#[derive(Clone)]
pub struct ChainExecutor {
    client: Arc<dyn HopClient>,
    fan_out: FanOut,
}

impl ChainExecutor {
    /// Creates a new `ChainExecutor` that invokes next hops with the given client.
    pub fn new(client: Arc<dyn HopClient>) -> Self {
        Self {
            client,
            fan_out: FanOut::Sequential,
        }
    }

    /// Sets the fan-out strategy for next hops.
    ///
    /// Defaults to [`FanOut::Sequential`].
    pub fn with_fan_out(mut self, fan_out: FanOut) -> Self {
        self.fan_out = fan_out;
        self
    }

    /// Executes the given descriptor.
    ///
    /// The artificial delay, log message, and metric tag of the descriptor are applied first. Leaves then respond with
    /// their own status code, while aggregators invoke each of their next hops and respond with the collected results.
    /// A failed next hop is recorded in the results, and does not stop its siblings from being invoked, nor change the
    /// status of the aggregator itself.
    pub async fn execute(&self, descriptor: &SimulationDescriptor, correlation_id: &CorrelationId) -> SimulationOutcome {
        if descriptor.delay_millis > 0 {
            sleep(Duration::from_millis(descriptor.delay_millis)).await;
        }

        if !descriptor.log_message.is_empty() {
            emit_simulated_log(descriptor.log_level, &descriptor.log_message);
        }

        if let Some(tag) = descriptor.metric_tag() {
            telemetry::record_tag(tag);
        }

        if descriptor.is_leaf() {
            let status = descriptor.status_code;
            let body = can_have_body(status).then(|| HopResult::simulated(descriptor, Vec::new()));
            return SimulationOutcome { status, body };
        }

        let hops = match self.fan_out {
            FanOut::Sequential => {
                let mut hops = Vec::with_capacity(descriptor.next_hops.len());
                for next_hop in &descriptor.next_hops {
                    hops.push(self.invoke_next_hop(descriptor, next_hop, correlation_id).await);
                }
                hops
            }
            FanOut::Parallel => {
                join_all(
                    descriptor
                        .next_hops
                        .iter()
                        .map(|next_hop| self.invoke_next_hop(descriptor, next_hop, correlation_id)),
                )
                .await
            }
        };

        SimulationOutcome {
            status: StatusCode::OK,
            body: Some(HopResult::simulated(descriptor, hops)),
        }
    }

    async fn invoke_next_hop(
        &self, origin: &SimulationDescriptor, next_hop: &SimulationDescriptor, correlation_id: &CorrelationId,
    ) -> HopResult {
        telemetry::record_chain_request(&origin.uri);
        info!(internal_type = "tester", next_hop = %next_hop.uri, "Chaining request.");

        match self.client.simulate(&next_hop.uri, next_hop, correlation_id).await {
            Ok(response) => {
                debug!(next_hop = %next_hop.uri, status = %response.status, "Chained request completed.");
                HopResult::from_response(next_hop.uri.as_str(), response)
            }
            Err(e) => {
                warn!(error = %e, "Chained request failed.");
                HopResult::from_error(next_hop.uri.as_str(), &e)
            }
        }
    }
}

fn emit_simulated_log(level: LogLevel, message: &str) {
    match level {
        LogLevel::Trace => trace!(log_source = "simulation", "{}", message),
        LogLevel::Debug => debug!(log_source = "simulation", "{}", message),
        LogLevel::Information => info!(log_source = "simulation", "{}", message),
        LogLevel::Warning => warn!(log_source = "simulation", "{}", message),
        LogLevel::Error | LogLevel::Critical => error!(log_source = "simulation", "{}", message),
        LogLevel::None => {}
    }
}

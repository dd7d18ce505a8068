//! Telemetry names.
//!
//! Counters are emitted through the `metrics` facade. Exporting them is left to whichever recorder the process
//! installs.

use metrics::counter;

/// Total number of requests to the `simulate` endpoint.
pub const SIMULATION_REQUESTS: &str = "oteltester.apimetrics.simulationrequests";

/// Total number of chained requests made by an instance, labeled by the originating host.
pub const CHAIN_REQUESTS: &str = "oteltester.apimetrics.chainrequests";

/// Total number of dynamically tagged counts, labeled by tag.
pub const TAGGED_COUNTER: &str = "oteltester.tagmetrics.taggedcounter";

/// Records a request to the `simulate` endpoint.
pub fn record_simulation_request() {
    counter!(SIMULATION_REQUESTS).increment(1);
}

/// Records a chained request made on behalf of `host`.
pub fn record_chain_request(host: &str) {
    counter!(CHAIN_REQUESTS, "host" => host.to_string()).increment(1);
}

/// Records an occurrence of `tag`.
pub fn record_tag(tag: &str) {
    counter!(TAGGED_COUNTER, "tag" => tag.to_string()).increment(1);
}

use http::StatusCode;
use serde::{Deserialize, Serialize};

fn default_uri() -> String {
    String::from("localhost")
}

const fn default_status_code() -> StatusCode {
    StatusCode::OK
}

/// Level at which a simulated log message is emitted.
///
/// Level names use their long forms (`Information`, `Warning`, and so on), with the shorter `tracing`-style names
/// accepted as aliases.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum LogLevel {
    /// Trace level.
    #[serde(alias = "trace")]
    Trace,

    /// Debug level.
    #[serde(alias = "debug")]
    Debug,

    /// Informational level.
    #[default]
    #[serde(alias = "info", alias = "Info")]
    Information,

    /// Warning level.
    #[serde(alias = "warn", alias = "Warn")]
    Warning,

    /// Error level.
    #[serde(alias = "error")]
    Error,

    /// Critical level.
    ///
    /// Emitted at the error level, as `tracing` has no level above it.
    #[serde(alias = "critical")]
    Critical,

    /// Suppresses the message entirely.
    #[serde(alias = "none")]
    None,
}

/// Instructions for simulating a single hop.
///
/// Descriptors nest arbitrarily deep: a descriptor without next hops is a leaf, which answers directly with its own
/// status code, while a descriptor with next hops is an aggregator, which forwards each next hop to the instance at its
/// `uri` and assembles their results.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationDescriptor {
    /// Address of the instance that executes this hop.
    ///
    /// Consists of a host, with an optional scheme and port.
    #[serde(default = "default_uri")]
    pub uri: String,

    /// Status code returned by this hop when it is a leaf.
    ///
    /// For aggregators, this is advisory only, and is reported in the hop's own result.
    #[serde(with = "http_serde_ext::status_code", default = "default_status_code")]
    pub status_code: StatusCode,

    /// Artificial processing delay, in milliseconds.
    #[serde(default, alias = "delay")]
    pub delay_millis: u64,

    /// Tag for the dynamically tagged counter, if any.
    #[serde(default)]
    pub metric_tag: Option<String>,

    /// Message to log while processing this hop, if not empty.
    #[serde(default)]
    pub log_message: String,

    /// Level to log `log_message` at.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Hops to forward to once this hop has been processed.
    #[serde(default)]
    pub next_hops: Vec<SimulationDescriptor>,
}

impl SimulationDescriptor {
    /// Creates a new leaf descriptor targeting the given address, with default settings.
    pub fn new<U: Into<String>>(uri: U) -> Self {
        Self {
            uri: uri.into(),
            status_code: default_status_code(),
            delay_millis: 0,
            metric_tag: None,
            log_message: String::new(),
            log_level: LogLevel::default(),
            next_hops: Vec::new(),
        }
    }

    /// Sets the status code.
    pub fn with_status_code(mut self, status_code: StatusCode) -> Self {
        self.status_code = status_code;
        self
    }

    /// Sets the artificial delay, in milliseconds.
    pub fn with_delay_millis(mut self, delay_millis: u64) -> Self {
        self.delay_millis = delay_millis;
        self
    }

    /// Sets the metric tag.
    pub fn with_metric_tag<T: Into<String>>(mut self, tag: T) -> Self {
        self.metric_tag = Some(tag.into());
        self
    }

    /// Sets the log message and level.
    pub fn with_log<M: Into<String>>(mut self, level: LogLevel, message: M) -> Self {
        self.log_level = level;
        self.log_message = message.into();
        self
    }

    /// Adds a next hop.
    pub fn with_next_hop(mut self, next_hop: SimulationDescriptor) -> Self {
        self.next_hops.push(next_hop);
        self
    }

    /// Returns `true` if this descriptor terminates the chain.
    pub fn is_leaf(&self) -> bool {
        self.next_hops.is_empty()
    }

    /// Returns the metric tag, if one is set and not empty.
    pub fn metric_tag(&self) -> Option<&str> {
        self.metric_tag.as_deref().filter(|tag| !tag.is_empty())
    }
}

/// Returns `true` if a response with the given status code is allowed to carry a body.
///
/// Informational (1xx) responses, `204 No Content`, and `304 Not Modified` must not include a body.
pub fn can_have_body(status: StatusCode) -> bool {
    !status.is_informational() && status != StatusCode::NO_CONTENT && status != StatusCode::NOT_MODIFIED
}

use std::{net::SocketAddr, path::Path, time::Duration};

use figment::{
    providers::{Env, Format as _, Serialized, Yaml},
    Figment,
};
use otel_tester_core::executor::FanOut;
use serde::{Deserialize, Serialize};
use snafu::{ensure, ResultExt as _, Snafu};

const ENV_PREFIX: &str = "OTEL_TESTER_";

/// A configuration error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum ConfigurationError {
    /// The configuration could not be loaded or deserialized.
    #[snafu(display("Failed to load configuration: {}", source))]
    Load { source: figment::Error },

    /// A configuration value is out of range.
    #[snafu(display("Invalid configuration value for '{}': {}", field, reason))]
    InvalidValue { field: &'static str, reason: String },
}

/// Tester configuration.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TesterConfiguration {
    /// Address the HTTP API listens on.
    pub listen_address: SocketAddr,

    /// Maximum number of tests allowed to run concurrently.
    pub max_running_tests: usize,

    /// Timeout for a single chained call, in seconds.
    pub hop_timeout_secs: u64,

    /// Scheme used for hop addresses that don't specify one.
    pub default_hop_scheme: String,

    /// Whether next hops are invoked concurrently rather than one after another.
    pub parallel_fan_out: bool,

    /// Log filtering directives.
    pub log_level: String,

    /// Whether logs are emitted as JSON.
    pub log_format_json: bool,
}

impl Default for TesterConfiguration {
    fn default() -> Self {
        Self {
            listen_address: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_running_tests: 3,
            hop_timeout_secs: 30,
            default_hop_scheme: "http".to_string(),
            parallel_fan_out: false,
            log_level: "info".to_string(),
            log_format_json: false,
        }
    }
}

impl TesterConfiguration {
    /// Loads the configuration.
    ///
    /// Values are layered, from lowest to highest precedence: built-in defaults, the YAML file at `path` (if given),
    /// and `OTEL_TESTER_`-prefixed environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX));

        Self::from_figment(&figment)
    }

    fn from_figment(figment: &Figment) -> Result<Self, ConfigurationError> {
        let config = figment.extract::<Self>().context(Load)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        ensure!(
            self.max_running_tests >= 1,
            InvalidValue {
                field: "max_running_tests",
                reason: "must be at least 1".to_string(),
            }
        );
        ensure!(
            self.hop_timeout_secs >= 1,
            InvalidValue {
                field: "hop_timeout_secs",
                reason: "must be at least 1".to_string(),
            }
        );
        ensure!(
            !self.default_hop_scheme.trim().is_empty(),
            InvalidValue {
                field: "default_hop_scheme",
                reason: "must not be empty".to_string(),
            }
        );
        Ok(())
    }

    /// Returns the timeout for a single chained call.
    pub fn hop_timeout(&self) -> Duration {
        Duration::from_secs(self.hop_timeout_secs)
    }

    /// Returns the fan-out mode for next hops.
    pub fn fan_out(&self) -> FanOut {
        if self.parallel_fan_out {
            FanOut::Parallel
        } else {
            FanOut::Sequential
        }
    }
}

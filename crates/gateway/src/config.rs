//! Gateway configuration read from the environment.

use crate::error::{GatewayError, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Which price updates a subscription forwards to its client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ForwardPolicy {
    /// Forward every update; the client evaluates its own threshold.
    #[default]
    All,
    /// Forward only updates satisfying the subscription's criteria.
    Matching,
}

impl FromStr for ForwardPolicy {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(ForwardPolicy::All),
            "matching" => Ok(ForwardPolicy::Matching),
            other => Err(GatewayError::Config(format!(
                "FORWARD_POLICY must be 'all' or 'matching', got '{}'",
                other
            ))),
        }
    }
}

/// Broker backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BrokerKind {
    #[default]
    Redis,
    Memory,
}

impl FromStr for BrokerKind {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(BrokerKind::Redis),
            "memory" => Ok(BrokerKind::Memory),
            other => Err(GatewayError::Config(format!(
                "BROKER must be 'redis' or 'memory', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub http_port: u16,
    pub metrics_port: u16,
    pub broker: BrokerKind,
    pub redis_url: String,
    pub channel: String,
    /// Bounded wait of each relay poll; also the upper bound on how long a
    /// cancelled relay may take to notice.
    pub poll_interval: Duration,
    pub forward_policy: ForwardPolicy,
    pub assets_dir: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            http_port: 7000,
            metrics_port: 9093,
            broker: BrokerKind::Redis,
            redis_url: "redis://localhost:6379".to_string(),
            channel: "gas-price".to_string(),
            poll_interval: Duration::from_secs(1),
            forward_policy: ForwardPolicy::All,
            assets_dir: None,
        }
    }
}

impl GatewayConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let poll_interval = match lookup("POLL_INTERVAL_MS") {
            Some(raw) => {
                let ms: u64 = parse_var("POLL_INTERVAL_MS", &raw)?;
                if ms == 0 {
                    return Err(GatewayError::Config(
                        "POLL_INTERVAL_MS must be greater than zero".to_string(),
                    ));
                }
                Duration::from_millis(ms)
            }
            None => defaults.poll_interval,
        };

        Ok(Self {
            http_port: lookup("HTTP_PORT")
                .map(|raw| parse_var("HTTP_PORT", &raw))
                .transpose()?
                .unwrap_or(defaults.http_port),
            metrics_port: lookup("METRICS_PORT")
                .map(|raw| parse_var("METRICS_PORT", &raw))
                .transpose()?
                .unwrap_or(defaults.metrics_port),
            broker: lookup("BROKER")
                .map(|raw| raw.parse::<BrokerKind>())
                .transpose()?
                .unwrap_or(defaults.broker),
            redis_url: lookup("REDIS_URL").unwrap_or(defaults.redis_url),
            channel: lookup("PUBSUB_CHANNEL").unwrap_or(defaults.channel),
            poll_interval,
            forward_policy: lookup("FORWARD_POLICY")
                .map(|raw| raw.parse::<ForwardPolicy>())
                .transpose()?
                .unwrap_or(defaults.forward_policy),
            assets_dir: lookup("ASSETS_DIR").map(PathBuf::from),
        })
    }
}

fn parse_var<T: FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| GatewayError::Config(format!("{} has invalid value '{}'", name, raw)))
}

use serde::Deserialize;

fn default_away_delta() -> f64 {
    10.0
}

fn default_scan_interval_secs() -> u64 {
    30
}

/// A single address or a list of addresses
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum Hosts {
    One(String),
    Many(Vec<String>),
}

/// Configuration for the Radio Thermostat integration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Thermostat addresses; thermostats are discovered on the local network when absent
    #[serde(default)]
    host: Option<Hosts>,

    /// Pin temperatures set through emberd instead of following the device schedule
    #[serde(default)]
    pub hold_temp: bool,

    /// Degrees the target moves away from comfort while away mode is on
    #[serde(default = "default_away_delta")]
    pub away_delta: f64,

    /// Seconds between two polls of each thermostat
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
}

impl Config {
    /// Configured thermostat addresses, `None` when they should be discovered
    pub fn hosts(&self) -> Option<&[String]> {
        match &self.host {
            Some(Hosts::One(host)) => Some(std::slice::from_ref(host)),
            Some(Hosts::Many(hosts)) => Some(hosts),
            None => None,
        }
    }

    pub(crate) fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if !self.away_delta.is_finite() || self.away_delta < 0.0 {
            problems.push(
                "integrations.radiotherm.away_delta must be a non-negative number".to_string(),
            );
        }
        if self.scan_interval_secs == 0 {
            problems.push(
                "integrations.radiotherm.scan_interval_secs must be at least 1".to_string(),
            );
        }
        if let Some(hosts) = self.hosts() {
            if hosts.iter().any(|h| h.trim().is_empty()) {
                problems.push(
                    "integrations.radiotherm.host must not contain empty addresses".to_string(),
                );
            }
        }
        problems
    }
}

#[cfg(test)]
impl Config {
    /// Configuration with explicit hosts, used by tests that never touch the network
    pub fn with_hosts(hosts: &[&str]) -> Self {
        Self {
            host: Some(Hosts::Many(hosts.iter().map(|h| h.to_string()).collect())),
            hold_temp: false,
            away_delta: default_away_delta(),
            scan_interval_secs: default_scan_interval_secs(),
        }
    }

    /// Configuration that relies on network discovery
    pub fn without_hosts() -> Self {
        Self {
            host: None,
            ..Self::with_hosts(&[])
        }
    }
}

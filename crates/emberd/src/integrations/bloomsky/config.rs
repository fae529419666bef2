use serde::Deserialize;

/// Public BloomSky sky data endpoint
pub const DEFAULT_ENDPOINT: &str = "https://api.bloomsky.com/api/skydata/";

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_min_refresh_secs() -> u64 {
    300
}

/// Configuration for the BloomSky integration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// API key from the BloomSky dashboard, sent as the `Authorization` header
    pub api_key: String,

    /// Sky data endpoint (default: the public BloomSky API)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Minimum time between two device refreshes, in seconds
    #[serde(default = "default_min_refresh_secs")]
    pub min_refresh_secs: u64,
}

impl Config {
    pub(crate) fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.api_key.trim().is_empty() {
            problems.push("integrations.bloomsky.api_key must not be empty".to_string());
        }
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            problems.push(format!(
                "integrations.bloomsky.endpoint must be an http(s) URL, got '{}'",
                self.endpoint
            ));
        }
        problems
    }
}

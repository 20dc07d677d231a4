//! Configuration for the client and the local backend.

use std::env;
use std::time::Duration;

/// Configuration for talking to the scene API.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL of the REST API
    pub api_url: String,
    /// Public CDN serving completed assets, if any
    pub cdn_url: Option<String>,
    /// Delay between status polls while a scene is processing
    pub poll_interval: Duration,
    /// Timeout applied to every API request
    pub request_timeout: Duration,
    /// Pause between filling skipped segments and moving the highlight
    pub advance_delay: Duration,
    /// Consecutive network failures tolerated by the poller
    pub max_poll_failures: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: String::from("http://localhost:4000"),
            cdn_url: None,
            poll_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            advance_delay: Duration::from_millis(400),
            max_poll_failures: 3,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let defaults = Self::default();

        Self {
            api_url: env::var("SPLATLINE_API_URL").unwrap_or(defaults.api_url),
            cdn_url: env::var("SPLATLINE_CDN_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            poll_interval: Duration::from_secs(
                parse_var("SPLATLINE_POLL_INTERVAL_SECS")
                    .unwrap_or(defaults.poll_interval.as_secs())
                    .clamp(1, 60),
            ),
            request_timeout: parse_var("SPLATLINE_REQUEST_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            advance_delay: parse_var("SPLATLINE_ADVANCE_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.advance_delay),
            max_poll_failures: parse_var("SPLATLINE_MAX_POLL_FAILURES")
                .map(|n: u64| n as u32)
                .unwrap_or(defaults.max_poll_failures),
        }
    }

    /// URL of a stored asset on the CDN, when one is configured.
    pub fn asset_url(&self, key: &str) -> Option<String> {
        self.cdn_url.as_ref().map(|cdn| {
            format!(
                "{}/{}",
                cdn.trim_end_matches('/'),
                key.trim_start_matches('/')
            )
        })
    }
}

fn parse_var(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Configuration for the in-memory local backend.
#[cfg(feature = "local")]
#[derive(Clone, Debug)]
pub struct LocalConfig {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: String,
    /// Externally reachable base URL, used to build upload URLs
    pub public_url: String,
    /// Time the simulated pipeline spends in each stage
    pub stage_interval: Duration,
}

#[cfg(feature = "local")]
impl LocalConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let addr = env::var("ADDR").unwrap_or_else(|_| String::from("127.0.0.1"));
        let port = env::var("PORT").unwrap_or_else(|_| String::from("4000"));
        let public_url =
            env::var("PUBLIC_URL").unwrap_or_else(|_| format!("http://{}:{}", addr, port));

        Self {
            addr,
            port,
            public_url,
            stage_interval: Duration::from_millis(
                parse_var("STAGE_INTERVAL_MS").unwrap_or(2_000),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_url() {
        let mut config = ClientConfig::default();
        assert_eq!(config.asset_url("outputs/s1/scene.splat"), None);

        config.cdn_url = Some("https://cdn.example.com/".to_string());
        assert_eq!(
            config.asset_url("/outputs/s1/scene.splat").as_deref(),
            Some("https://cdn.example.com/outputs/s1/scene.splat")
        );
    }
}

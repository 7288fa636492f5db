use std::time::Duration;

use tracing::{debug, error, warn};

const HEALTH_BODY: &str = "OK";

/// Readiness gate for the GraphQL engine: a fixed number of attempts at a
/// fixed interval, no backoff.
#[derive(Debug, Clone)]
pub struct HealthGate {
    client: reqwest::Client,
    pub max_attempts: u32,
    pub interval: Duration,
    pub request_timeout: Duration,
}

impl Default for HealthGate {
    fn default() -> Self {
        HealthGate {
            client: reqwest::Client::new(),
            max_attempts: 10,
            interval: Duration::from_secs(2),
            request_timeout: Duration::from_secs(10),
        }
    }
}

pub fn health_url(port: u16) -> String {
    format!("http://localhost:{port}/healthz")
}

impl HealthGate {
    pub fn with_policy(max_attempts: u32, interval: Duration) -> Self {
        HealthGate {
            max_attempts,
            interval,
            ..Default::default()
        }
    }

    /// One GET against `url`; healthy only on a 200 whose body is exactly `OK`.
    pub async fn check(&self, url: &str) -> bool {
        let response = match self
            .client
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!(url, error = %e, "Health check request failed");
                return false;
            }
        };

        if response.status() != reqwest::StatusCode::OK {
            debug!(url, status = %response.status(), "Health check answered with an error status");
            return false;
        }

        match response.text().await {
            Ok(body) => body == HEALTH_BODY,
            Err(e) => {
                debug!(url, error = %e, "Health check body unreadable");
                false
            }
        }
    }

    /// Polls the engine on `port` until it answers healthy or the attempts
    /// run out. No sleep follows the last attempt.
    pub async fn wait_healthy(&self, port: u16) -> bool {
        let url = health_url(port);

        for attempt in 1..=self.max_attempts {
            if self.check(&url).await {
                debug!(attempt, "GraphQL engine health check successful");
                return true;
            }
            warn!(attempt, max_attempts = self.max_attempts, "GraphQL engine health check unsuccessful");
            if attempt < self.max_attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        error!(port, "GraphQL engine health check timed out");
        false
    }
}

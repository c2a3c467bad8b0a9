use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::{build_client, join};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct ReadinessSettings {
    pub health_path: String,
    pub max_attempts: u32,
    pub interval: Duration,
    /// Extra wait after the first healthy answer; workers behind the
    /// web process tend to lag it slightly.
    pub settle: Duration,
    pub request_timeout: Duration,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            health_path: "/health".to_string(),
            max_attempts: 60,
            interval: Duration::from_secs(2),
            settle: Duration::ZERO,
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Blocks until the service answers its health check with a 200.
pub struct ReadinessPoller {
    client: Client,
    url: Url,
    settings: ReadinessSettings,
}

impl ReadinessPoller {
    pub fn new(base_url: &Url, settings: ReadinessSettings) -> Result<Self> {
        Ok(Self {
            client: build_client(settings.request_timeout)?,
            url: join(base_url, &settings.health_path)?,
            settings,
        })
    }

    /// Returns the number of attempts it took.
    ///
    /// Refused connections, timeouts and non-200 statuses all count as a
    /// failed attempt. There is no sleep after the final attempt.
    pub async fn wait(&self) -> Result<u32> {
        let max_attempts = self.settings.max_attempts;
        info!("waiting for {} to become ready", self.url);

        for attempt in 1..=max_attempts {
            match self.client.get(self.url.clone()).send().await {
                Ok(response) if response.status() == StatusCode::OK => {
                    info!("{} is ready after {attempt} attempt(s)", self.url);
                    if !self.settings.settle.is_zero() {
                        debug!(settle = ?self.settings.settle, "letting the service settle");
                        tokio::time::sleep(self.settings.settle).await;
                    }
                    return Ok(attempt);
                }
                Ok(response) => debug!(status = %response.status(), "not ready yet"),
                Err(error) => debug!(%error, "not reachable yet"),
            }

            if attempt < max_attempts {
                info!("attempt {attempt}/{max_attempts}, waiting...");
                tokio::time::sleep(self.settings.interval).await;
            }
        }

        warn!("{} is not responding after {max_attempts} attempts", self.url);
        Err(Error::Unavailable {
            url: self.url.to_string(),
            attempts: max_attempts,
        })
    }
}

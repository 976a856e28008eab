//! Single-shot reachability check
//!
//! A pure boolean filter that runs before the expensive introspection probe.
//! Failure is encoded in the result, never raised to the caller.

use std::time::Duration;
use tracing::debug;

use crate::config::ProbeConfig;

pub struct ReachabilityProbe {
    client: reqwest::Client,
    timeout: Duration,
    denylist: Vec<String>,
}

impl ReachabilityProbe {
    pub fn new(client: reqwest::Client, config: &ProbeConfig) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(config.reachability_timeout_secs),
            denylist: config.denylist.clone(),
        }
    }

    /// HEAD-style existence check with redirects followed; reachable iff the
    /// final status is in [200, 400). Denylisted hosts short-circuit to
    /// unreachable without touching the network.
    pub async fn check(&self, url: &str) -> bool {
        if let Some(host) = self.denylist.iter().find(|h| url.contains(h.as_str())) {
            debug!("Skipping denylisted host {host}: {url}");
            return false;
        }

        match self.client.head(url).timeout(self.timeout).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                (200..400).contains(&status)
            }
            Err(e) => {
                debug!("Reachability check failed {url}: {e}");
                false
            }
        }
    }
}

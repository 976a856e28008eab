//! Probe orchestration
//!
//! Fans out one task per (channel, URL) pair under a fixed-size permit pool.
//! Each task owns its pair end-to-end: reachability, then introspection only
//! if reachable, then the throughput sample. Results are addressed by
//! (channel index, URL index), never by completion order, and written into
//! disjoint slots, so no locking is needed on the playlist itself.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::ProbeConfig;
use crate::models::{Playlist, ProbeResult};
use crate::probe::{ReachabilityProbe, StreamIntrospectionProbe};

pub struct ProbeOrchestrator {
    reachability: Arc<ReachabilityProbe>,
    introspection: Arc<StreamIntrospectionProbe>,
    concurrency: usize,
    throughput_enabled: bool,
}

impl ProbeOrchestrator {
    pub async fn new(client: reqwest::Client, config: ProbeConfig) -> Self {
        let reachability = Arc::new(ReachabilityProbe::new(client.clone(), &config));
        let throughput_enabled = config.throughput_duration_secs > 0;
        let concurrency = config.concurrency.max(1);
        let introspection = Arc::new(StreamIntrospectionProbe::new(client, config).await);
        Self {
            reachability,
            introspection,
            concurrency,
            throughput_enabled,
        }
    }

    /// Probe every URL of every channel and fill the playlist's probe slots.
    ///
    /// Returns only when all scheduled tasks have completed or timed out. A
    /// task failure downgrades its own slot and never cancels siblings.
    pub async fn run(&self, playlist: &mut Playlist) {
        let scheduled: usize = playlist.total_urls();
        info!(
            "Probing {} URLs across {} channels with {} workers",
            scheduled,
            playlist.channels.len(),
            self.concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<(usize, usize, ProbeResult)> = JoinSet::new();

        for (chan_idx, channel) in playlist.channels.iter().enumerate() {
            // Zero-URL channels never occupy a worker slot.
            if channel.urls.is_empty() {
                continue;
            }
            for (url_idx, url) in channel.urls.iter().enumerate() {
                let url = url.clone();
                let semaphore = semaphore.clone();
                let reachability = self.reachability.clone();
                let introspection = self.introspection.clone();
                let throughput_enabled = self.throughput_enabled;

                tasks.spawn(async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return (chan_idx, url_idx, ProbeResult::unreachable());
                    };
                    let result = probe_one(
                        &reachability,
                        &introspection,
                        &url,
                        throughput_enabled,
                    )
                    .await;
                    (chan_idx, url_idx, result)
                });
            }
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((chan_idx, url_idx, result)) => {
                    playlist.channels[chan_idx].probes[url_idx] = result;
                }
                // A panicked task loses its indices; the slot keeps its
                // unreachable default and siblings carry on.
                Err(e) => warn!("Probe task failed: {e}"),
            }
        }
    }
}

async fn probe_one(
    reachability: &ReachabilityProbe,
    introspection: &StreamIntrospectionProbe,
    url: &str,
    throughput_enabled: bool,
) -> ProbeResult {
    if !reachability.check(url).await {
        debug!("Unreachable: {url}");
        return ProbeResult::unreachable();
    }

    let mut result = introspection.probe(url).await;
    if throughput_enabled {
        result.throughput = introspection.sample_throughput(url).await;
    }
    debug!(
        "Probed {url}: resolution={:?} buffer={:?}",
        result.resolution, result.buffer_health
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::playlist::PlaylistParser;

    // Every fixture URL points at a denylisted host, so probing is fully
    // deterministic and network-free.
    const FIXTURE: &str = "#EXTM3U\n\
#EXTINF:-1 tvg-name=\"A\",A\n\
http://fixture.invalid/a1.m3u8\n\
http://fixture.invalid/a2.m3u8\n\
#EXTINF:-1 tvg-name=\"Empty\",Empty\n\
#EXTINF:-1 tvg-name=\"B\",B\n\
http://fixture.invalid/b1.m3u8\n";

    async fn run_with_concurrency(n: usize) -> Playlist {
        let mut config = Config::default();
        config.probe.concurrency = n;
        config.probe.denylist = vec!["fixture.invalid".to_string()];
        config.probe.throughput_duration_secs = 0;

        let mut playlist = PlaylistParser::new().parse(FIXTURE);
        let orchestrator =
            ProbeOrchestrator::new(reqwest::Client::new(), config.probe).await;
        orchestrator.run(&mut playlist).await;
        playlist
    }

    #[tokio::test]
    async fn every_scheduled_url_gets_a_result() {
        let playlist = run_with_concurrency(4).await;
        for channel in &playlist.channels {
            assert_eq!(channel.probes.len(), channel.urls.len());
            for probe in &channel.probes {
                assert!(!probe.reachable);
            }
        }
    }

    #[tokio::test]
    async fn results_are_independent_of_worker_count() {
        let serial = run_with_concurrency(1).await;
        let parallel = run_with_concurrency(20).await;

        assert_eq!(serial.channels.len(), parallel.channels.len());
        for (a, b) in serial.channels.iter().zip(parallel.channels.iter()) {
            assert_eq!(a.probes, b.probes);
        }
    }
}

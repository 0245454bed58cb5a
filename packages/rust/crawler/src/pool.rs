//! Fetcher pool: locator sampling plus bounded-concurrency retrieval.
//!
//! Results come back in completion order, not request order. With a single
//! worker the two coincide, which is what makes unit hashes reproducible in
//! tests.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use rand::Rng;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use url::Url;

use hashstack_shared::{FetchBatch, FetchConfig, HashstackError, Result, SamplingConfig, SourceSpan};

use crate::fetcher::Fetcher;

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

/// Draw a sample size uniformly from `[min_sources, max_sources]`.
pub fn sample_size<R: Rng + ?Sized>(sampling: &SamplingConfig, rng: &mut R) -> usize {
    let min = sampling.min_sources;
    let max = sampling.max_sources.max(min);
    rng.gen_range(min..=max)
}

/// Parse the configured locator strings.
pub fn parse_locators(sources: &[String]) -> Result<Vec<Url>> {
    sources
        .iter()
        .map(|s| {
            Url::parse(s).map_err(|e| HashstackError::config(format!("invalid source '{s}': {e}")))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// FetcherPool
// ---------------------------------------------------------------------------

/// Runs one batch of fetches at a time under a fixed worker cap.
pub struct FetcherPool {
    fetcher: Arc<dyn Fetcher>,
    workers: usize,
    allow_private_hosts: bool,
}

impl FetcherPool {
    /// Create a pool over `fetcher` using the cap and host policy from `config`.
    pub fn new(fetcher: Arc<dyn Fetcher>, config: &FetchConfig) -> Self {
        Self {
            fetcher,
            workers: config.workers.max(1),
            allow_private_hosts: config.allow_private_hosts,
        }
    }

    /// Worker cap `W`.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Select up to `k` locators from `pool` without replacement, or all of
    /// them when the pool is smaller.
    pub fn select<R: Rng + ?Sized>(pool: &[Url], k: usize, rng: &mut R) -> Vec<Url> {
        let amount = k.min(pool.len());
        rand::seq::index::sample(rng, pool.len(), amount)
            .into_iter()
            .map(|i| pool[i].clone())
            .collect()
    }

    /// Select `k` locators and fetch them.
    pub async fn sample_and_fetch<R: Rng + ?Sized>(
        &self,
        pool: &[Url],
        k: usize,
        rng: &mut R,
    ) -> FetchBatch {
        let chosen = Self::select(pool, k, rng);
        self.fetch_all(chosen).await
    }

    /// Fetch every locator with at most `W` requests in flight.
    ///
    /// Failed or empty fetches are dropped without retry; identical text from
    /// different locators is kept.
    #[instrument(skip_all, fields(requested = locators.len(), workers = self.workers, fetcher = self.fetcher.name()))]
    pub async fn fetch_all(&self, locators: Vec<Url>) -> FetchBatch {
        let start = Instant::now();
        let requested = locators.len();

        let mut queue = locators.into_iter().filter(|locator| {
            if !self.allow_private_hosts && is_blocked_locator(locator) {
                warn!(%locator, "locator blocked by host policy");
                return false;
            }
            true
        });

        let mut in_flight: JoinSet<Option<SourceSpan>> = JoinSet::new();
        for locator in queue.by_ref().take(self.workers) {
            self.spawn_fetch(&mut in_flight, locator);
        }

        let mut spans = Vec::with_capacity(requested);
        while let Some(joined) = in_flight.join_next().await {
            match joined {
                Ok(Some(span)) => spans.push(span),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "fetch task failed"),
            }

            // Refill the freed slot.
            if let Some(locator) = queue.next() {
                self.spawn_fetch(&mut in_flight, locator);
            }
        }

        info!(
            requested,
            actual = spans.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "fetch batch complete"
        );

        FetchBatch { requested, spans }
    }

    fn spawn_fetch(&self, set: &mut JoinSet<Option<SourceSpan>>, locator: Url) {
        let fetcher = Arc::clone(&self.fetcher);
        set.spawn(async move {
            let text = fetcher.fetch(&locator).await;
            if text.trim().is_empty() {
                debug!(%locator, "empty result");
                None
            } else {
                Some(SourceSpan { locator, text })
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Host policy
// ---------------------------------------------------------------------------

/// Non-http(s) schemes and loopback/private hosts are never fetched.
fn is_blocked_locator(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    /// Fetcher with a scripted delay and body per locator.
    struct ScriptedFetcher {
        script: HashMap<String, (u64, &'static str)>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn new(entries: &[(&str, u64, &'static str)]) -> Self {
            Self {
                script: entries
                    .iter()
                    .map(|(u, delay, body)| (format!("https://{u}/"), (*delay, *body)))
                    .collect(),
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn fetch(&self, locator: &Url) -> String {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let (delay, body) = self.script.get(locator.as_str()).copied().unwrap_or((0, ""));
            tokio::time::sleep(Duration::from_millis(delay)).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            body.to_string()
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn urls(hosts: &[&str]) -> Vec<Url> {
        hosts
            .iter()
            .map(|h| Url::parse(&format!("https://{h}/")).unwrap())
            .collect()
    }

    fn pool_with(fetcher: Arc<ScriptedFetcher>, workers: usize) -> FetcherPool {
        let config = FetchConfig {
            workers,
            ..FetchConfig::default()
        };
        FetcherPool::new(fetcher, &config)
    }

    #[tokio::test]
    async fn single_worker_preserves_request_order() {
        let fetcher = Arc::new(ScriptedFetcher::new(&[
            ("a.example", 30, "alpha"),
            ("b.example", 0, "bravo"),
            ("c.example", 10, "charlie"),
        ]));
        let pool = pool_with(fetcher, 1);

        let batch = pool.fetch_all(urls(&["a.example", "b.example", "c.example"])).await;
        let texts: Vec<_> = batch.spans.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, ["alpha", "bravo", "charlie"]);
    }

    #[tokio::test]
    async fn results_arrive_in_completion_order() {
        let fetcher = Arc::new(ScriptedFetcher::new(&[
            ("slow.example", 300, "slow"),
            ("fast.example", 10, "fast"),
            ("mid.example", 120, "mid"),
        ]));
        let pool = pool_with(fetcher, 3);

        let batch = pool
            .fetch_all(urls(&["slow.example", "fast.example", "mid.example"]))
            .await;
        let texts: Vec<_> = batch.spans.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, ["fast", "mid", "slow"]);
    }

    #[tokio::test]
    async fn worker_cap_is_respected() {
        let entries: Vec<(String, u64, &'static str)> = (0..6)
            .map(|i| (format!("h{i}.example"), 40, "text"))
            .collect();
        let borrowed: Vec<(&str, u64, &'static str)> =
            entries.iter().map(|(h, d, b)| (h.as_str(), *d, *b)).collect();
        let fetcher = Arc::new(ScriptedFetcher::new(&borrowed));
        let pool = pool_with(Arc::clone(&fetcher), 2);

        let hosts: Vec<&str> = entries.iter().map(|(h, _, _)| h.as_str()).collect();
        let batch = pool.fetch_all(urls(&hosts)).await;

        assert_eq!(batch.actual(), 6);
        assert!(fetcher.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn failures_are_dropped_without_retry() {
        let fetcher = Arc::new(ScriptedFetcher::new(&[
            ("ok.example", 0, "fine"),
            ("empty.example", 0, ""),
            ("blank.example", 0, "   "),
        ]));
        let pool = pool_with(Arc::clone(&fetcher), 2);

        let batch = pool
            .fetch_all(urls(&["ok.example", "empty.example", "blank.example"]))
            .await;

        assert_eq!(batch.requested, 3);
        assert_eq!(batch.actual(), 1);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn identical_text_is_not_deduplicated() {
        let fetcher = Arc::new(ScriptedFetcher::new(&[
            ("one.example", 0, "same words"),
            ("two.example", 0, "same words"),
        ]));
        let pool = pool_with(fetcher, 1);

        let batch = pool.fetch_all(urls(&["one.example", "two.example"])).await;
        assert_eq!(batch.actual(), 2);
        assert_ne!(batch.spans[0].locator, batch.spans[1].locator);
    }

    #[tokio::test]
    async fn private_hosts_are_blocked_by_default() {
        let fetcher = Arc::new(ScriptedFetcher::new(&[]));
        let pool = pool_with(Arc::clone(&fetcher), 2);

        let locators = vec![
            Url::parse("http://127.0.0.1:8080/").unwrap(),
            Url::parse("http://localhost/").unwrap(),
            Url::parse("file:///etc/passwd").unwrap(),
            Url::parse("http://10.0.0.1/").unwrap(),
        ];
        let batch = pool.fetch_all(locators).await;

        assert_eq!(batch.requested, 4);
        assert_eq!(batch.actual(), 0);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_locator_set_yields_empty_batch() {
        let pool = pool_with(Arc::new(ScriptedFetcher::new(&[])), 4);
        let batch = pool.fetch_all(Vec::new()).await;
        assert_eq!(batch.requested, 0);
        assert!(batch.spans.is_empty());
    }

    #[tokio::test]
    async fn sample_and_fetch_clamps_to_pool() {
        let fetcher = Arc::new(ScriptedFetcher::new(&[
            ("a.example", 0, "a"),
            ("b.example", 0, "b"),
        ]));
        let pool = pool_with(fetcher, 2);
        let mut rng = StdRng::seed_from_u64(3);

        let batch = pool
            .sample_and_fetch(&urls(&["a.example", "b.example"]), 25, &mut rng)
            .await;
        assert_eq!(batch.requested, 2);
        assert_eq!(batch.actual(), 2);
    }

    #[test]
    fn select_is_without_replacement() {
        let pool = urls(&["a.x", "b.x", "c.x", "d.x", "e.x", "f.x"]);
        let mut rng = StdRng::seed_from_u64(7);

        let chosen = FetcherPool::select(&pool, 4, &mut rng);
        assert_eq!(chosen.len(), 4);
        let distinct: HashSet<_> = chosen.iter().collect();
        assert_eq!(distinct.len(), 4);

        let all = FetcherPool::select(&pool, 50, &mut rng);
        assert_eq!(all.len(), pool.len());
    }

    #[test]
    fn select_is_reproducible_with_seed() {
        let pool = urls(&["a.x", "b.x", "c.x", "d.x", "e.x", "f.x"]);
        let first = FetcherPool::select(&pool, 3, &mut StdRng::seed_from_u64(11));
        let second = FetcherPool::select(&pool, 3, &mut StdRng::seed_from_u64(11));
        assert_eq!(first, second);
    }

    #[test]
    fn sample_size_stays_in_bounds() {
        let sampling = SamplingConfig {
            min_sources: 10,
            max_sources: 30,
        };
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..200 {
            let k = sample_size(&sampling, &mut rng);
            assert!((10..=30).contains(&k));
        }
    }

    #[test]
    fn parse_locators_rejects_garbage() {
        assert!(parse_locators(&["https://example.com/".into()]).is_ok());
        assert!(parse_locators(&["not a url".into()]).is_err());
    }
}

//! Per-host request spacing.
//!
//! Broker sites are small and some block clients that hammer them, so every
//! request to a host reserves the next free slot on that host's timeline.
//! Requests to different hosts never wait for each other.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use harvester_core::download::RateLimiter;
//!
//! # async fn example() {
//! let limiter = RateLimiter::new(Duration::from_millis(500));
//!
//! limiter.acquire("https://corretora.example/a.pdf").await; // immediate
//! limiter.acquire("https://corretora.example/b.pdf").await; // waits ~500ms
//! limiter.acquire("https://other.example/c.pdf").await;     // immediate
//! # }
//! ```

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use super::constants::{CUMULATIVE_DELAY_WARNING_THRESHOLD, MAX_RETRY_AFTER};

/// Per-host rate limiter shared by all workers of a run.
///
/// Slots are reserved under the map's shard lock and the wait happens after
/// the lock is released, so concurrent callers for one host queue up in
/// reservation order without holding any lock across an await.
#[derive(Debug, Default)]
pub struct RateLimiter {
    min_interval: Duration,
    disabled: bool,
    hosts: DashMap<String, HostSlot>,
}

#[derive(Debug, Default)]
struct HostSlot {
    /// Earliest instant the next request may start. `None` until first use.
    next_free: Option<Instant>,
    /// Total wait imposed on this host so far.
    waited: Duration,
}

impl HostSlot {
    fn record_wait(&mut self, wait: Duration) -> Duration {
        self.waited = self.waited.saturating_add(wait);
        self.waited
    }
}

impl RateLimiter {
    /// Creates a limiter spacing requests to one host by `min_interval`.
    ///
    /// A zero interval behaves like [`RateLimiter::disabled`].
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            disabled: min_interval.is_zero(),
            hosts: DashMap::new(),
        }
    }

    /// Creates a limiter that never waits (`--rate-limit 0`).
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Creates a limiter from a millisecond interval as given on the command line.
    #[must_use]
    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    /// Returns whether spacing is turned off.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Returns the configured spacing.
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Waits until a request to `url`'s host may start.
    ///
    /// The first request to a host proceeds immediately.
    #[instrument(skip(self), fields(host))]
    pub async fn acquire(&self, url: &str) {
        if self.disabled {
            return;
        }

        let host = extract_domain(url);
        tracing::Span::current().record("host", host.as_str());

        let now = Instant::now();
        let (start, total_waited) = {
            let mut slot = self.hosts.entry(host.clone()).or_default();
            let start = slot.next_free.map_or(now, |free| free.max(now));
            slot.next_free = Some(start + self.min_interval);
            let total = slot.record_wait(start - now);
            (start, total)
        };

        let wait = start - now;
        if wait.is_zero() {
            return;
        }

        debug!(
            host = %host,
            wait_ms = wait.as_millis(),
            total_waited_ms = total_waited.as_millis(),
            "spacing request"
        );
        if total_waited >= CUMULATIVE_DELAY_WARNING_THRESHOLD {
            warn!(
                host = %host,
                total_waited_secs = total_waited.as_secs(),
                "long cumulative wait for host; consider a lower request volume"
            );
        }

        tokio::time::sleep_until(start).await;
    }

    /// Pushes `url`'s host back by a server-mandated `delay` (Retry-After).
    ///
    /// Later [`acquire`](Self::acquire) calls for the host wait at least until
    /// now + `delay`.
    #[instrument(skip(self), fields(host))]
    pub fn record_rate_limit(&self, url: &str, delay: Duration) {
        let host = extract_domain(url);
        tracing::Span::current().record("host", host.as_str());

        let blocked_until = Instant::now() + delay;
        let total_waited = {
            let mut slot = self.hosts.entry(host.clone()).or_default();
            slot.next_free = Some(slot.next_free.map_or(blocked_until, |free| free.max(blocked_until)));
            slot.record_wait(delay)
        };

        debug!(
            host = %host,
            delay_ms = delay.as_millis(),
            total_waited_ms = total_waited.as_millis(),
            "server asked us to back off"
        );
        if total_waited >= CUMULATIVE_DELAY_WARNING_THRESHOLD {
            warn!(
                host = %host,
                total_waited_secs = total_waited.as_secs(),
                "host keeps rate limiting us"
            );
        }
    }
}

/// Lowercased host of `url`, or `"unknown"` when it has none.
///
/// ```
/// use harvester_core::download::extract_domain;
///
/// assert_eq!(extract_domain("https://WWW.Affix.com.br/x.pdf"), "www.affix.com.br");
/// assert_eq!(extract_domain("https://localhost:8080/x"), "localhost");
/// assert_eq!(extract_domain("not a url"), "unknown");
/// ```
#[must_use]
pub fn extract_domain(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Parses a Retry-After header value (delta-seconds or HTTP-date).
///
/// Values above one hour are capped; a date in the past means no wait.
///
/// ```
/// use std::time::Duration;
/// use harvester_core::download::parse_retry_after;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("soon"), None);
/// ```
#[must_use]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    let delay = if let Ok(seconds) = header_value.parse::<u64>() {
        Duration::from_secs(seconds)
    } else {
        let when = httpdate::parse_http_date(header_value).ok()?;
        when.duration_since(std::time::SystemTime::now())
            .unwrap_or(Duration::ZERO)
    };

    if delay > MAX_RETRY_AFTER {
        warn!(
            delay_secs = delay.as_secs(),
            max_secs = MAX_RETRY_AFTER.as_secs(),
            "Retry-After too large, capping"
        );
        return Some(MAX_RETRY_AFTER);
    }
    Some(delay)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_with_zero_interval_is_disabled() {
        assert!(RateLimiter::new(Duration::ZERO).is_disabled());
        assert!(RateLimiter::from_millis(0).is_disabled());
        assert!(!RateLimiter::from_millis(250).is_disabled());
        assert_eq!(
            RateLimiter::from_millis(250).min_interval(),
            Duration::from_millis(250)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_never_waits() {
        let limiter = RateLimiter::disabled();
        let start = Instant::now();
        for i in 0..5 {
            limiter.acquire(&format!("https://example.com/{i}.pdf")).await;
        }
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_host_is_spaced() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        let start = Instant::now();

        limiter.acquire("https://example.com/1.pdf").await;
        assert!(start.elapsed() < Duration::from_millis(10));

        limiter.acquire("https://example.com/2.pdf").await;
        assert!(start.elapsed() >= Duration::from_secs(1));

        limiter.acquire("https://EXAMPLE.com/3.pdf").await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hosts_are_independent() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        limiter.acquire("https://a.example/1").await;

        let start = Instant::now();
        limiter.acquire("https://b.example/1").await;
        limiter.acquire("https://c.example/1").await;
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_get_sequential_slots() {
        let limiter = std::sync::Arc::new(RateLimiter::new(Duration::from_millis(100)));
        let start = Instant::now();

        let handles: Vec<_> = (0..3)
            .map(|i| {
                let limiter = std::sync::Arc::clone(&limiter);
                tokio::spawn(async move {
                    limiter.acquire(&format!("https://example.com/{i}")).await;
                    Instant::now()
                })
            })
            .collect();

        let mut finished = Vec::new();
        for handle in handles {
            finished.push(handle.await.unwrap() - start);
        }
        finished.sort();
        assert!(finished[0] < Duration::from_millis(10));
        assert!(finished[1] >= Duration::from_millis(100));
        assert!(finished[2] >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_rate_limit_blocks_host() {
        let limiter = RateLimiter::new(Duration::from_millis(10));
        limiter.record_rate_limit("https://example.com/a.pdf", Duration::from_secs(5));

        let start = Instant::now();
        limiter.acquire("https://example.com/b.pdf").await;
        assert!(start.elapsed() >= Duration::from_secs(5));

        let other = Instant::now();
        limiter.acquire("https://other.example/b.pdf").await;
        assert!(other.elapsed() < Duration::from_millis(10));
    }

    #[test]
    fn test_record_rate_limit_accumulates_wait() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        limiter.record_rate_limit("https://example.com/1", Duration::from_secs(5));
        limiter.record_rate_limit("https://example.com/2", Duration::from_secs(10));
        let slot = limiter.hosts.get("example.com").unwrap();
        assert_eq!(slot.waited, Duration::from_secs(15));
    }

    #[test]
    fn test_extract_domain_variants() {
        assert_eq!(extract_domain("http://example.com/path"), "example.com");
        assert_eq!(extract_domain("https://Example.COM:8443/Path"), "example.com");
        assert_eq!(extract_domain("https://192.168.1.1/file"), "192.168.1.1");
        assert_eq!(extract_domain(""), "unknown");
    }

    #[test]
    fn test_parse_retry_after_seconds_and_garbage() {
        assert_eq!(parse_retry_after("0"), Some(Duration::ZERO));
        assert_eq!(parse_retry_after("  90 "), Some(Duration::from_secs(90)));
        assert_eq!(parse_retry_after("-5"), None);
        assert_eq!(parse_retry_after(""), None);
    }

    #[test]
    fn test_parse_retry_after_caps_at_one_hour() {
        assert_eq!(parse_retry_after("7200"), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_parse_retry_after_http_dates() {
        assert_eq!(
            parse_retry_after("Wed, 01 Jan 2020 00:00:00 GMT"),
            Some(Duration::ZERO)
        );

        let future = httpdate::fmt_http_date(std::time::SystemTime::now() + Duration::from_secs(60));
        let delay = parse_retry_after(&future).unwrap();
        assert!(
            delay >= Duration::from_secs(55) && delay <= Duration::from_secs(61),
            "expected ~60s, got {delay:?}"
        );
    }
}

//! Link discovery: turns seeds into the list of document URLs to fetch.
//!
//! `link` seeds are taken as they are; `crawl` seeds are fetched once and the
//! PDF links on the page are collected. Nothing is followed further than that
//! one hop.

mod filter;
mod links;

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::download::{HttpClient, RateLimiter, RetryPolicy, run_with_retry};
use crate::seeds::{Seed, SeedKind};

pub use filter::{LinkFilter, Rejection, is_pdf_url};
pub use links::{DiscoveredLink, extract_pdf_links};

/// Resolves seeds into filtered, deduplicated document links.
#[derive(Debug, Clone)]
pub struct Discoverer {
    client: HttpClient,
    filter: LinkFilter,
    retry_policy: RetryPolicy,
    rate_limiter: Arc<RateLimiter>,
}

impl Discoverer {
    /// Creates a discoverer with the default retry policy and no request spacing.
    #[must_use]
    pub fn new(client: HttpClient, filter: LinkFilter) -> Self {
        Self {
            client,
            filter,
            retry_policy: RetryPolicy::default(),
            rate_limiter: Arc::new(RateLimiter::disabled()),
        }
    }

    /// Sets the retry policy for page fetches.
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Shares a rate limiter, typically the one the fetch engine uses.
    #[must_use]
    pub fn with_rate_limiter(mut self, rate_limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    /// Returns the active filter.
    #[must_use]
    pub fn filter(&self) -> &LinkFilter {
        &self.filter
    }

    /// Collects accepted document links from `seeds`, in first-seen order.
    ///
    /// A crawl page that cannot be fetched is logged and skipped.
    #[instrument(skip_all, fields(seeds = seeds.len()))]
    pub async fn discover(&self, seeds: &[Seed]) -> Vec<DiscoveredLink> {
        let mut seen = HashSet::new();
        let mut accepted = Vec::new();

        for seed in seeds {
            let candidates = match seed.kind {
                SeedKind::Link => vec![DiscoveredLink::new(without_fragment(&seed.url))],
                SeedKind::Crawl => self.crawl(&seed.url).await,
            };

            for link in candidates {
                if let Err(reason) = self.filter.check(&link.url) {
                    debug!(url = %link.url, seed = %seed.url, %reason, "link rejected");
                    continue;
                }
                if seen.insert(link.url.clone()) {
                    accepted.push(link);
                }
            }
        }

        info!(links = accepted.len(), "discovery complete");
        accepted
    }

    /// Fetches one crawl page and returns every PDF link on it, unfiltered.
    #[instrument(skip(self))]
    async fn crawl(&self, page_url: &str) -> Vec<DiscoveredLink> {
        let Ok(base) = Url::parse(page_url) else {
            warn!("crawl seed is not a valid URL");
            return Vec::new();
        };

        let client = &self.client;
        let fetched = run_with_retry(
            page_url,
            &self.retry_policy,
            &self.rate_limiter,
            || {},
            move || client.fetch_page(page_url),
        )
        .await;

        match fetched {
            Ok((html, _attempts)) => {
                let links = extract_pdf_links(&html, &base);
                debug!(found = links.len(), "crawl page parsed");
                links
            }
            Err((error, attempts)) => {
                warn!(error = %error, attempts, "crawl page unavailable, skipping");
                Vec::new()
            }
        }
    }
}

/// `url` with any `#fragment` removed, matching how crawled links are keyed.
fn without_fragment(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    fn fast_discoverer(filter: LinkFilter) -> Discoverer {
        Discoverer::new(HttpClient::new(), filter)
            .with_retry_policy(RetryPolicy::new(2, Duration::ZERO, Duration::ZERO, 2.0))
    }

    #[tokio::test]
    async fn test_link_seeds_pass_through_filter() {
        let discoverer = fast_discoverer(LinkFilter::new().with_years(["2025"]));
        let seeds = vec![
            Seed::link("https://example.com/2025/a.pdf"),
            Seed::link("https://example.com/2019/old.pdf"),
        ];
        let links = discoverer.discover(&seeds).await;
        assert_eq!(links, vec![DiscoveredLink::new("https://example.com/2025/a.pdf")]);
    }

    #[tokio::test]
    async fn test_link_seed_fragment_is_dropped_before_dedup() {
        let discoverer = fast_discoverer(LinkFilter::new());
        let seeds = vec![
            Seed::link("https://example.com/docs/a.pdf#page=2"),
            Seed::link("https://example.com/docs/a.pdf"),
        ];
        let links = discoverer.discover(&seeds).await;
        assert_eq!(links, vec![DiscoveredLink::new("https://example.com/docs/a.pdf")]);
    }

    #[tokio::test]
    async fn test_crawl_seed_collects_filtered_links_in_order() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let page = r#"
            <a href="/uploads/2025/b.pdf">B</a>
            <a href="/uploads/2025/a.pdf">A</a>
            <a href="/uploads/2021/old.pdf">Old</a>
            <a href="/contato">Contato</a>
        "#;
        Mock::given(method("GET"))
            .and(path("/materiais/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page))
            .expect(1)
            .mount(&mock_server)
            .await;

        let base = mock_server.uri();
        let discoverer = fast_discoverer(LinkFilter::new().with_years(["2025"]));
        let seeds = vec![
            Seed::link(format!("{base}/uploads/2025/z.pdf")),
            Seed::crawl(format!("{base}/materiais/")),
            Seed::link(format!("{base}/uploads/2025/a.pdf")),
        ];
        let links = discoverer.discover(&seeds).await;

        let urls: Vec<_> = links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                format!("{base}/uploads/2025/z.pdf"),
                format!("{base}/uploads/2025/a.pdf"),
                format!("{base}/uploads/2025/b.pdf"),
            ]
        );
        assert_eq!(links[1].title.as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn test_failed_crawl_page_contributes_nothing() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/down/"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&mock_server)
            .await;

        let base = mock_server.uri();
        let seeds = vec![
            Seed::crawl(format!("{base}/down/")),
            Seed::link(format!("{base}/ok.pdf")),
        ];
        let links = fast_discoverer(LinkFilter::new()).discover(&seeds).await;
        assert_eq!(links, vec![DiscoveredLink::new(format!("{base}/ok.pdf"))]);
    }
}

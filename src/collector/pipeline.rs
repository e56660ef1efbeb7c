use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, SourceConfig};
use crate::db::RecordStore;
use crate::error::Result;
use crate::models::Coupon;

use super::cache::DedupCache;
use super::extract::{compile_markets, Extractor, MarketPattern};
use super::fetcher::PageFetcher;
use super::normalize::Normalizer;

/// Outcome of one pass over one source.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CollectStats {
    pub found: usize,
    pub inserted: usize,
}

/// Scrapes the configured sources and writes new coupons through the store.
/// Owns the dedup cache; every pass needs `&mut self`.
pub struct Collector {
    sources: Vec<SourceConfig>,
    markets: Vec<MarketPattern>,
    fetcher: PageFetcher,
    extractor: Extractor,
    cache: DedupCache,
    store: Arc<dyn RecordStore>,
}

impl Collector {
    pub async fn new(config: &Config, store: Arc<dyn RecordStore>) -> Result<Self> {
        let fetcher = PageFetcher::new(config.http_timeout_secs.map(Duration::from_secs))?;
        let extractor = Extractor::new(Normalizer::new(&config.links)?)?;
        let cache = DedupCache::load(store.as_ref()).await?;

        Ok(Self {
            sources: config.sources.clone(),
            markets: compile_markets(&config.markets),
            fetcher,
            extractor,
            cache,
            store,
        })
    }

    pub fn cache(&self) -> &DedupCache {
        &self.cache
    }

    /// One pass over every source. A failing source is logged and the next one still runs.
    pub async fn collect_all(&mut self) -> CollectStats {
        let mut total = CollectStats::default();

        for source in self.sources.clone() {
            match self.collect_source(&source).await {
                Ok(stats) => {
                    tracing::info!(
                        url = source.url(),
                        found = stats.found,
                        inserted = stats.inserted,
                        "source collected"
                    );
                    total.found += stats.found;
                    total.inserted += stats.inserted;
                }
                Err(e) => {
                    tracing::error!(url = source.url(), error = %e, "collection pass failed");
                }
            }
        }

        total
    }

    pub async fn collect_source(&mut self, source: &SourceConfig) -> Result<CollectStats> {
        match source {
            SourceConfig::Index { url } => self.collect_index(url).await,
            SourceConfig::Table { url, market } => self.collect_table(url, market).await,
        }
    }

    async fn collect_index(&mut self, url: &str) -> Result<CollectStats> {
        let page = self.fetcher.fetch_page(url).await?;
        let cache = &self.cache;
        let posts = self
            .extractor
            .index_posts(&page, &self.markets, |id| cache.contains(id));

        let mut stats = CollectStats::default();
        for post in posts {
            // A post may have been collected through an earlier link of this pass.
            if let Some(known) = self.cache.get(&post.post_id) {
                tracing::debug!(post_id = %post.post_id, link = %known.link, "post already collected");
                continue;
            }

            for link in &post.links {
                let detail = match self.fetcher.fetch_page(&link.url).await {
                    Ok(detail) => detail,
                    Err(e) => {
                        tracing::error!(post_id = %post.post_id, url = %link.url, error = %e, "detail page fetch failed");
                        continue;
                    }
                };

                let coupons = self
                    .extractor
                    .detail_coupons(&detail, &post.post_id, &link.market);
                if coupons.is_empty() {
                    tracing::debug!(post_id = %post.post_id, url = %link.url, "no coupons on detail page");
                }
                for coupon in coupons {
                    stats.found += 1;
                    if self.persist(coupon).await? {
                        stats.inserted += 1;
                    }
                }
            }
        }

        Ok(stats)
    }

    async fn collect_table(&mut self, url: &str, market: &str) -> Result<CollectStats> {
        let page = self.fetcher.fetch_page(url).await?;
        let coupons = self.extractor.table_coupons(&page, market);

        let mut stats = CollectStats {
            found: coupons.len(),
            inserted: 0,
        };
        for coupon in coupons {
            if self.persist(coupon).await? {
                stats.inserted += 1;
            }
        }

        Ok(stats)
    }

    /// Writes the coupon and registers its post in the cache straight away, so
    /// the next tick does not fetch the same detail pages again.
    async fn persist(&mut self, coupon: Coupon) -> Result<bool> {
        let inserted = self.store.collect(&coupon).await?;
        if inserted {
            tracing::info!(post_id = %coupon.post_id, link = %coupon.link, "new coupon");
        }
        self.cache.insert(coupon);
        Ok(inserted)
    }
}

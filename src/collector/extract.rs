//! HTML extraction for the two supported listing layouts.
//!
//! Everything here is synchronous: `scraper::Html` is not `Send`, so pages are
//! parsed, walked and dropped before the collector awaits the next fetch.

use regex::Regex;
use scraper::{ElementRef, Selector};

use crate::error::{AppError, Result};
use crate::models::Coupon;

use super::fetcher::Page;
use super::normalize::Normalizer;

/// A marketplace name compiled for matching against anchor and bold text.
#[derive(Debug, Clone)]
pub struct MarketPattern {
    pub name: String,
    pub pattern: Regex,
}

/// Compiles the allow-list. Names that are not valid patterns are logged and dropped.
pub fn compile_markets(names: &[String]) -> Vec<MarketPattern> {
    names
        .iter()
        .filter_map(|name| match Regex::new(name) {
            Ok(pattern) => Some(MarketPattern {
                name: name.clone(),
                pattern,
            }),
            Err(e) => {
                tracing::error!(market = %name, error = %e, "market name is not a valid pattern, skipping");
                None
            }
        })
        .collect()
}

/// A post on an index page that mentions at least one known market.
#[derive(Debug, Clone)]
pub struct PostCandidate {
    pub post_id: String,
    pub links: Vec<DetailLink>,
}

#[derive(Debug, Clone)]
pub struct DetailLink {
    pub market: MarketPattern,
    pub url: String,
}

struct Selectors {
    article: Selector,
    anchor: Selector,
    bold: Selector,
    code: Selector,
    tbody: Selector,
    row: Selector,
    cell: Selector,
}

fn selector(css: &'static str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| AppError::Other(anyhow::anyhow!("invalid selector {css:?}: {e:?}")))
}

impl Selectors {
    fn new() -> Result<Self> {
        Ok(Self {
            article: selector("article[id]")?,
            anchor: selector("a")?,
            bold: selector("b")?,
            code: selector("code")?,
            tbody: selector("tbody")?,
            row: selector("tr")?,
            cell: selector("td")?,
        })
    }
}

pub struct Extractor {
    normalizer: Normalizer,
    sel: Selectors,
}

impl Extractor {
    pub fn new(normalizer: Normalizer) -> Result<Self> {
        Ok(Self {
            normalizer,
            sel: Selectors::new()?,
        })
    }

    /// Index layout, first level: every `article[id]` not already known, with
    /// the detail links whose anchor text names a market.
    pub fn index_posts<F>(
        &self,
        page: &Page,
        markets: &[MarketPattern],
        is_known: F,
    ) -> Vec<PostCandidate>
    where
        F: Fn(&str) -> bool,
    {
        let doc = page.document();
        let mut posts = Vec::new();

        for article in doc.select(&self.sel.article) {
            let Some(post_id) = article.value().attr("id") else {
                continue;
            };
            if is_known(post_id) {
                tracing::debug!(post_id, "post already collected");
                continue;
            }

            let mut links: Vec<DetailLink> = Vec::new();
            for anchor in article.select(&self.sel.anchor) {
                let text = text_of(anchor);
                for market in markets.iter().filter(|m| m.pattern.is_match(&text)) {
                    let Some(href) = anchor.value().attr("href") else {
                        tracing::warn!(post_id, market = %market.name, "matching anchor has no href");
                        continue;
                    };
                    let url = page.resolve(href);
                    if links
                        .iter()
                        .any(|l| l.url == url && l.market.name == market.name)
                    {
                        continue;
                    }
                    links.push(DetailLink {
                        market: market.clone(),
                        url,
                    });
                }
            }

            if !links.is_empty() {
                posts.push(PostCandidate {
                    post_id: post_id.to_string(),
                    links,
                });
            }
        }

        posts
    }

    /// Index layout, second level: bold market names on the detail page. The
    /// bold element's parent holds the shop link text and the code.
    pub fn detail_coupons(&self, page: &Page, post_id: &str, market: &MarketPattern) -> Vec<Coupon> {
        let doc = page.document();
        let mut coupons = Vec::new();

        for bold in doc.select(&self.sel.bold) {
            if !market.pattern.is_match(&text_of(bold)) {
                continue;
            }
            let Some(parent) = bold.parent().and_then(ElementRef::wrap) else {
                continue;
            };

            let link_text = parent
                .select(&self.sel.anchor)
                .next()
                .map(text_of)
                .unwrap_or_default();
            if link_text.is_empty() {
                tracing::warn!(post_id, url = %page.url, "market block has no link text");
                continue;
            }
            let raw_link = if link_text.starts_with("http://") || link_text.starts_with("https://") {
                link_text
            } else {
                format!("http://{link_text}")
            };

            let code = parent
                .select(&self.sel.code)
                .map(text_of)
                .filter(|c| !c.is_empty())
                .collect::<Vec<_>>()
                .join(" ");

            coupons.push(Coupon::new(
                post_id,
                market.name.as_str(),
                self.normalizer.normalize_link(&raw_link),
                code,
            ));
        }

        coupons
    }

    /// Table layout: rows of (date, code with link, description) in the first `tbody`.
    pub fn table_coupons(&self, page: &Page, market: &str) -> Vec<Coupon> {
        let doc = page.document();
        let Some(tbody) = doc.select(&self.sel.tbody).next() else {
            tracing::warn!(url = %page.url, "no table body on page");
            return Vec::new();
        };

        let mut coupons = Vec::new();
        for (index, row) in tbody.select(&self.sel.row).enumerate() {
            let cells: Vec<ElementRef> = row.select(&self.sel.cell).collect();
            if cells.len() < 3 {
                tracing::debug!(row = index, cells = cells.len(), "skipping short row");
                continue;
            }

            let date_text = clean_text(cells[0]);
            let date = self.normalizer.parse_date(&date_text);
            if date.is_none() {
                tracing::debug!(row = index, text = %date_text, "unparsed expiry date");
            }

            let Some(href) = cells[1]
                .select(&self.sel.anchor)
                .find_map(|a| a.value().attr("href"))
            else {
                tracing::warn!(row = index, url = %page.url, "code cell has no link, skipping row");
                continue;
            };
            let link = self.normalizer.normalize_link(&page.resolve(href));
            let code = self.normalizer.extract_code(&clean_text(cells[1]));

            coupons.push(Coupon {
                id: None,
                // Table rows carry no post id; the link is stable across scrapes.
                post_id: link.clone(),
                market: market.to_string(),
                link,
                code,
                date,
                description: clean_text(cells[2]),
            });
        }

        coupons
    }
}

fn text_of(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn clean_text(el: ElementRef) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

use chrono::NaiveDate;
use regex::Regex;
use url::Url;

use crate::config::LinkConfig;
use crate::error::Result;

/// Placeholder the table source shows for codes applied automatically by the link.
pub const AUTO_CODE: &str = "[автокод]";

const MONTHS: [(&str, u32); 12] = [
    ("январ", 1),
    ("феврал", 2),
    ("март", 3),
    ("апрел", 4),
    ("ма", 5),
    ("июн", 6),
    ("июл", 7),
    ("август", 8),
    ("сентябр", 9),
    ("октябр", 10),
    ("ноябр", 11),
    ("декабр", 12),
];

/// Turns the free text of a listing into typed coupon fields.
pub struct Normalizer {
    explicit_date: Regex,
    month_date: Regex,
    code_token: Regex,
    host_rewrites: Vec<(String, String)>,
    tracking_params: Vec<String>,
}

impl Normalizer {
    pub fn new(links: &LinkConfig) -> Result<Self> {
        Ok(Self {
            explicit_date: Regex::new(r"(\d{1,2})\.(\d{1,2})\.(\d{4})")?,
            // "март" must come before "ма[йяею]" so "марта" is not read as May.
            month_date: Regex::new(
                r"(?i)(?:\b(\d{1,2})\s+)?(январ|феврал|март|апрел|ма[йяею]|июн|июл|август|сентябр|октябр|ноябр|декабр)[а-яё]*\s+(\d{4})",
            )?,
            code_token: Regex::new(r"[A-Za-z0-9]+")?,
            host_rewrites: links.host_rewrites.clone(),
            tracking_params: links.tracking_params.clone(),
        })
    }

    /// Expiry timestamp (UTC midnight) from either `DD.MM.YYYY` or a Russian
    /// "[day] month YYYY" expression. Without a day the month's last day is used.
    /// When a span holds several explicit dates the last one wins.
    pub fn parse_date(&self, text: &str) -> Option<i64> {
        let date = self
            .explicit_date(text)
            .or_else(|| self.month_date(text))?;
        Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp())
    }

    fn explicit_date(&self, text: &str) -> Option<NaiveDate> {
        let caps = self.explicit_date.captures_iter(text).last()?;
        let day = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        let year = caps[3].parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    }

    fn month_date(&self, text: &str) -> Option<NaiveDate> {
        let caps = self.month_date.captures(text)?;
        let stem = caps[2].to_lowercase();
        let month = MONTHS
            .iter()
            .find(|(prefix, _)| stem.starts_with(prefix))
            .map(|(_, m)| *m)?;
        let year = caps[3].parse().ok()?;
        match caps.get(1) {
            Some(day) => NaiveDate::from_ymd_opt(year, month, day.as_str().parse().ok()?),
            None => last_day_of_month(year, month),
        }
    }

    /// Code cell text: the auto-code placeholder passes through untouched,
    /// anything else is reduced to its Latin alphanumeric tokens.
    pub fn extract_code(&self, text: &str) -> String {
        if text.contains(AUTO_CODE) {
            return AUTO_CODE.to_string();
        }
        self.code_token
            .find_iter(text)
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Forces https, applies host rewrites and strips tracking parameters.
    /// Text that is not a URL is returned trimmed.
    pub fn normalize_link(&self, raw: &str) -> String {
        let raw = raw.trim();
        let Ok(mut url) = Url::parse(raw) else {
            return raw.to_string();
        };

        if url.scheme() == "http" && url.set_scheme("https").is_err() {
            tracing::debug!(link = raw, "could not switch scheme");
        }

        let host = url.host_str().map(str::to_ascii_lowercase);
        if let Some(host) = host {
            if let Some((_, to)) = self
                .host_rewrites
                .iter()
                .find(|(from, _)| from.eq_ignore_ascii_case(&host))
            {
                if let Err(e) = url.set_host(Some(to)) {
                    tracing::warn!(link = raw, error = %e, "bad host rewrite");
                }
            }
        }

        if url.query().is_some() {
            let pairs: Vec<(String, String)> = url
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            let kept: Vec<&(String, String)> = pairs
                .iter()
                .filter(|(k, _)| !self.tracking_params.iter().any(|p| p == k))
                .collect();

            if kept.is_empty() {
                url.set_query(None);
            } else if kept.len() != pairs.len() {
                url.query_pairs_mut().clear().extend_pairs(kept);
            }
        }

        url.to_string()
    }
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

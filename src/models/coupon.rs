use chrono::DateTime;
use serde::{Deserialize, Serialize};

/// One scraped discount code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    /// Store key; `None` until the coupon has been read back from the database.
    pub id: Option<i64>,
    pub post_id: String,
    pub market: String,
    pub link: String,
    pub code: String,
    /// Expiry as a Unix timestamp. `None` when the listing's date could not be parsed.
    pub date: Option<i64>,
    pub description: String,
}

impl Coupon {
    pub fn new(
        post_id: impl Into<String>,
        market: impl Into<String>,
        link: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            post_id: post_id.into(),
            market: market.into(),
            link: link.into(),
            code: code.into(),
            date: None,
            description: String::new(),
        }
    }

    /// Expiry formatted as `DD.MM.YYYY`.
    pub fn expiry_label(&self) -> String {
        self.date
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.format("%d.%m.%Y").to_string())
            .unwrap_or_else(|| "не указано".to_string())
    }
}

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rusqlite::{params, Row};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{Chat, Coupon};

use super::schema::SCHEMA;
use super::store::{ChatStore, RecordStore};

const COUPON_COLUMNS: &str = "r.id, r.post_id, r.market, r.link, r.code, r.date, r.description";

// A coupon is unread for a chat when it has no read-state row or its row is
// still 0, and it has not expired more than a day ago. Unknown expiry counts
// as not expired.
const UNREAD_FROM: &str = r#"FROM records r
    LEFT OUTER JOIN (SELECT id_record, status FROM relation_chat_records WHERE id_chat = ?1) rcr
        ON r.id = rcr.id_record
    WHERE (rcr.id_record IS NULL OR rcr.status = 0)
      AND (r.date IS NULL OR r.date >= ?2)"#;

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        tracing::info!(path = db_path, "database ready");
        Ok(Self { conn })
    }

    pub async fn close(&self) -> Result<()> {
        self.conn.clone().close().await?;
        Ok(())
    }

    async fn select_unread(&self, chat_id: i64, limit: i64) -> Result<Vec<Coupon>> {
        let boundary = expiry_boundary();
        let coupons = self
            .conn
            .call(move |conn| {
                let sql = format!(
                    "SELECT {COUPON_COLUMNS} {UNREAD_FROM}
                     ORDER BY r.date IS NULL, r.date ASC, r.id ASC
                     LIMIT ?3"
                );
                let mut stmt = conn.prepare(&sql)?;
                let coupons = stmt
                    .query_map(params![chat_id, boundary, limit], coupon_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(coupons)
            })
            .await?;
        Ok(coupons)
    }
}

#[async_trait]
impl RecordStore for Repository {
    async fn collect(&self, coupon: &Coupon) -> Result<bool> {
        let coupon = coupon.clone();
        let inserted = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    r#"INSERT INTO records (post_id, market, link, code, description, date)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                       ON CONFLICT(link) DO NOTHING"#,
                    params![
                        coupon.post_id,
                        coupon.market,
                        coupon.link,
                        coupon.code,
                        coupon.description,
                        coupon.date,
                    ],
                )?;
                Ok(changed > 0)
            })
            .await?;
        Ok(inserted)
    }

    async fn load_collected(&self) -> Result<HashMap<String, Coupon>> {
        let coupons = self
            .conn
            .call(|conn| {
                let sql = format!("SELECT {COUPON_COLUMNS} FROM records r ORDER BY r.id");
                let mut stmt = conn.prepare(&sql)?;
                let coupons = stmt
                    .query_map([], coupon_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(coupons)
            })
            .await?;

        Ok(coupons
            .into_iter()
            .map(|c| (c.post_id.clone(), c))
            .collect())
    }
}

#[async_trait]
impl ChatStore for Repository {
    async fn new_chat(&self, chat: &Chat) -> Result<()> {
        let chat = chat.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO chats (id, type, user_name, first_name, last_name, active)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                       ON CONFLICT(id) DO NOTHING"#,
                    params![
                        chat.id,
                        chat.kind.as_str(),
                        chat.username,
                        chat.first_name,
                        chat.last_name,
                        chat.active,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn log_message(&self, chat_id: i64, message_id: i32, text: &str) -> Result<()> {
        let text = text.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO messages (id, id_chat, message) VALUES (?1, ?2, ?3) ON CONFLICT(id, id_chat) DO NOTHING",
                    params![message_id, chat_id, text],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn active_chats(&self) -> Result<Vec<i64>> {
        let ids = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT id FROM chats WHERE active = 1 ORDER BY id")?;
                let ids = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<i64>, _>>()?;
                Ok(ids)
            })
            .await?;
        Ok(ids)
    }

    async fn count_active_chats(&self) -> Result<u64> {
        let count = self
            .conn
            .call(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM chats WHERE active = 1", [], |row| {
                        row.get(0)
                    })?;
                Ok(count)
            })
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn set_chat_active(&self, chat_id: i64, active: bool) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE chats SET active = ?1 WHERE id = ?2",
                    params![active, chat_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn unread_coupons(&self, chat_id: i64) -> Result<Vec<Coupon>> {
        // SQLite treats a negative LIMIT as no limit.
        self.select_unread(chat_id, -1).await
    }

    async fn unread_coupons_limit(&self, chat_id: i64, limit: u32) -> Result<Vec<Coupon>> {
        self.select_unread(chat_id, i64::from(limit)).await
    }

    async fn count_unread(&self, chat_id: i64) -> Result<u64> {
        let boundary = expiry_boundary();
        let count = self
            .conn
            .call(move |conn| {
                let sql = format!("SELECT COUNT(*) {UNREAD_FROM}");
                let count: i64 =
                    conn.query_row(&sql, params![chat_id, boundary], |row| row.get(0))?;
                Ok(count)
            })
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn mark_as_read(&self, chat_id: i64, coupons: &[Coupon]) -> Result<()> {
        let ids: Vec<i64> = coupons.iter().filter_map(|c| c.id).collect();
        if ids.len() != coupons.len() {
            tracing::warn!(chat_id, "skipping coupons without a store id");
        }

        self.conn
            .call(move |conn| {
                for id in ids {
                    conn.execute(
                        r#"INSERT INTO relation_chat_records (id_record, id_chat, status)
                           VALUES (?1, ?2, 1)
                           ON CONFLICT(id_record, id_chat) DO UPDATE SET status = excluded.status"#,
                        params![id, chat_id],
                    )?;
                }
                Ok(())
            })
            .await?;
        Ok(())
    }
}

/// Coupons that expired before this instant are no longer offered.
fn expiry_boundary() -> i64 {
    (Utc::now() - Duration::days(1)).timestamp()
}

fn coupon_from_row(row: &Row) -> rusqlite::Result<Coupon> {
    Ok(Coupon {
        id: Some(row.get(0)?),
        post_id: row.get(1)?,
        market: row.get(2)?,
        link: row.get(3)?,
        code: row.get(4)?,
        date: row.get(5)?,
        description: row.get(6)?,
    })
}

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Chat, Coupon};

/// What the collector needs from storage.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Inserts the coupon unless its link is already stored. Returns whether a row was added.
    async fn collect(&self, coupon: &Coupon) -> Result<bool>;

    /// Every stored coupon keyed by post id.
    async fn load_collected(&self) -> Result<HashMap<String, Coupon>>;
}

/// Chat registration and per-chat read state, used by the bot side.
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn new_chat(&self, chat: &Chat) -> Result<()>;

    async fn log_message(&self, chat_id: i64, message_id: i32, text: &str) -> Result<()>;

    /// Ids of chats that still accept deliveries.
    async fn active_chats(&self) -> Result<Vec<i64>>;

    async fn count_active_chats(&self) -> Result<u64>;

    async fn set_chat_active(&self, chat_id: i64, active: bool) -> Result<()>;

    async fn unread_coupons(&self, chat_id: i64) -> Result<Vec<Coupon>>;

    async fn unread_coupons_limit(&self, chat_id: i64, limit: u32) -> Result<Vec<Coupon>>;

    async fn count_unread(&self, chat_id: i64) -> Result<u64>;

    /// Marks each coupon as delivered to the chat. Stops at the first failure.
    async fn mark_as_read(&self, chat_id: i64, coupons: &[Coupon]) -> Result<()>;
}

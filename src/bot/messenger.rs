//! Outbound delivery. [`Messenger`] is transport-agnostic so the notifier can be
//! exercised without Telegram; [`TelegramMessenger`] is the production impl.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{KeyboardButton, KeyboardMarkup};
use teloxide::{ApiError, RequestError};

use crate::error::{AppError, Result};

#[async_trait]
pub trait Messenger: Send + Sync {
    /// Sends a text message. A chat that blocked the bot yields [`AppError::Blocked`].
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()>;
}

pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        let keyboard = KeyboardMarkup::new(vec![vec![KeyboardButton::new("/print")]]);

        self.bot
            .send_message(ChatId(chat_id), text)
            .reply_markup(keyboard)
            .await
            .map(|_| ())
            .map_err(|e| delivery_error(chat_id, e))
    }
}

/// Failures after which the chat will never accept messages again become
/// [`AppError::Blocked`]; everything else stays a transient Telegram error.
fn delivery_error(chat_id: i64, err: RequestError) -> AppError {
    match err {
        RequestError::Api(
            ApiError::BotBlocked
            | ApiError::BotKicked
            | ApiError::BotKickedFromSupergroup
            | ApiError::UserDeactivated
            | ApiError::ChatNotFound,
        ) => AppError::Blocked(chat_id),
        e => AppError::Telegram(e.to_string()),
    }
}

#[cfg(test)]
pub mod mock {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use super::*;

    /// Records every delivery; chats in `blocked` fail like a blocked bot would.
    #[derive(Default)]
    pub struct MockMessenger {
        sent: Mutex<Vec<(i64, String)>>,
        blocked: HashSet<i64>,
    }

    impl MockMessenger {
        pub fn blocking(chats: &[i64]) -> Self {
            Self {
                sent: Mutex::default(),
                blocked: chats.iter().copied().collect(),
            }
        }

        pub fn sent(&self) -> Vec<(i64, String)> {
            self.sent.lock().unwrap().clone()
        }

        pub fn sent_to(&self, chat_id: i64) -> Vec<String> {
            self.sent()
                .into_iter()
                .filter(|(id, _)| *id == chat_id)
                .map(|(_, text)| text)
                .collect()
        }
    }

    #[async_trait]
    impl Messenger for MockMessenger {
        async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
            if self.blocked.contains(&chat_id) {
                return Err(AppError::Blocked(chat_id));
            }
            self.sent.lock().unwrap().push((chat_id, text.to_string()));
            Ok(())
        }
    }
}

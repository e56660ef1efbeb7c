use std::fmt::Write;
use std::sync::Arc;

use crate::db::ChatStore;
use crate::error::{AppError, Result};
use crate::models::Coupon;

use super::messenger::Messenger;

const ALL_RECEIVED: &str = "Вы получили все доступные купоны на данный момент.";

/// Why a batch is being sent. Only an explicit request gets an answer when
/// there is nothing new.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Command,
    Daily,
}

pub struct Notifier {
    messenger: Arc<dyn Messenger>,
    store: Arc<dyn ChatStore>,
}

impl Notifier {
    pub fn new(messenger: Arc<dyn Messenger>, store: Arc<dyn ChatStore>) -> Self {
        Self { messenger, store }
    }

    /// Delivers one message. A chat that blocked the bot is deactivated and the
    /// error is still returned to the caller.
    pub async fn send(&self, chat_id: i64, text: &str) -> Result<()> {
        match self.messenger.send_text(chat_id, text).await {
            Err(AppError::Blocked(id)) => {
                tracing::warn!(chat_id, "bot was blocked, deactivating chat");
                if let Err(e) = self.store.set_chat_active(chat_id, false).await {
                    tracing::error!(chat_id, error = %e, "failed to deactivate chat");
                }
                Err(AppError::Blocked(id))
            }
            other => other,
        }
    }

    /// Sends up to `limit` unread coupons, marks them read and follows up with
    /// the number still waiting. Returns how many coupons went out.
    pub async fn send_coupons(&self, chat_id: i64, limit: u32, mode: Delivery) -> Result<usize> {
        let coupons = self.store.unread_coupons_limit(chat_id, limit).await?;
        self.deliver(chat_id, coupons, mode).await
    }

    async fn deliver(&self, chat_id: i64, coupons: Vec<Coupon>, mode: Delivery) -> Result<usize> {
        if coupons.is_empty() {
            if mode == Delivery::Command {
                self.send(chat_id, ALL_RECEIVED).await?;
            }
            return Ok(0);
        }

        self.send(chat_id, &format_coupons(&coupons)).await?;
        self.store.mark_as_read(chat_id, &coupons).await?;

        match self.store.count_unread(chat_id).await {
            Ok(0) => {}
            Ok(remaining) => {
                self.send(chat_id, &format!("Купоны оставшиеся в базе: {remaining}"))
                    .await?;
            }
            Err(e) => {
                tracing::error!(chat_id, error = %e, "failed to count unread coupons");
            }
        }

        Ok(coupons.len())
    }

    /// Daily round: every active chat gets everything it has not read yet.
    /// Failures are logged per chat and do not stop the round.
    pub async fn deliver_daily(&self) -> usize {
        let chats = match self.store.active_chats().await {
            Ok(chats) => chats,
            Err(e) => {
                tracing::error!(error = %e, "failed to load active chats");
                return 0;
            }
        };

        let mut delivered = 0;
        for chat_id in chats {
            let result = match self.store.unread_coupons(chat_id).await {
                Ok(coupons) => self.deliver(chat_id, coupons, Delivery::Daily).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(0) => {}
                Ok(sent) => {
                    tracing::debug!(chat_id, sent, "daily coupons delivered");
                    delivered += 1;
                }
                Err(e) => {
                    tracing::error!(chat_id, error = %e, "daily delivery failed");
                }
            }
        }

        tracing::info!(delivered, "daily delivery finished");
        delivered
    }
}

/// Numbered list of coupons, one block per coupon.
pub fn format_coupons(coupons: &[Coupon]) -> String {
    let mut text = String::new();
    for (i, coupon) in coupons.iter().enumerate() {
        let _ = write!(
            text,
            "{}:\t{} \nКод--->: {}\nВремя истечения: {}\nОписание: {}\n\n",
            i + 1,
            coupon.link,
            coupon.code,
            coupon.expiry_label(),
            coupon.description
        );
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::messenger::mock::MockMessenger;
    use crate::db::{RecordStore, Repository};
    use crate::models::Chat;

    async fn setup(messenger: MockMessenger) -> (Notifier, Arc<MockMessenger>, Arc<Repository>) {
        let repo = Arc::new(Repository::new(":memory:").await.unwrap());
        let messenger = Arc::new(messenger);
        let notifier = Notifier::new(messenger.clone(), repo.clone());
        (notifier, messenger, repo)
    }

    async fn seed(repo: &Repository, count: usize) {
        for i in 0..count {
            let mut c = Coupon::new(
                format!("p{i}"),
                "ЛитРес",
                format!("https://www.litres.ru/{i}"),
                format!("C{i}"),
            );
            c.date = Some(4_102_358_400); // 2099-12-31
            repo.collect(&c).await.unwrap();
        }
    }

    #[test]
    fn formats_numbered_blocks() {
        let mut c = Coupon::new("p", "ЛитРес", "https://www.litres.ru/x", "BOOK");
        c.date = Some(1_735_603_200);
        c.description = "Скидка 20%".to_string();
        let undated = Coupon::new("q", "ЛитРес", "https://www.litres.ru/y", "[автокод]");

        let text = format_coupons(&[c, undated]);
        assert_eq!(
            text,
            "1:\thttps://www.litres.ru/x \nКод--->: BOOK\nВремя истечения: 31.12.2024\nОписание: Скидка 20%\n\n\
             2:\thttps://www.litres.ru/y \nКод--->: [автокод]\nВремя истечения: не указано\nОписание: \n\n"
        );
    }

    #[tokio::test]
    async fn batch_is_marked_read_and_footer_counts_the_rest() {
        let (notifier, messenger, repo) = setup(MockMessenger::default()).await;
        seed(&repo, 7).await;

        let sent = notifier.send_coupons(1, 5, Delivery::Command).await.unwrap();
        assert_eq!(sent, 5);

        let messages = messenger.sent_to(1);
        assert_eq!(messages.len(), 2);
        assert!(messages[0].starts_with("1:\thttps://www.litres.ru/"));
        assert!(messages[0].contains("5:\t"));
        assert_eq!(messages[1], "Купоны оставшиеся в базе: 2");
        assert_eq!(repo.count_unread(1).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn empty_batch_answers_commands_only() {
        let (notifier, messenger, _repo) = setup(MockMessenger::default()).await;

        assert_eq!(notifier.send_coupons(1, 5, Delivery::Daily).await.unwrap(), 0);
        assert!(messenger.sent().is_empty());

        assert_eq!(notifier.send_coupons(1, 5, Delivery::Command).await.unwrap(), 0);
        assert_eq!(messenger.sent_to(1), vec![ALL_RECEIVED.to_string()]);
    }

    #[tokio::test]
    async fn blocked_chat_is_deactivated_and_error_propagates() {
        let (notifier, _messenger, repo) = setup(MockMessenger::blocking(&[2])).await;
        repo.new_chat(&Chat::private(1)).await.unwrap();
        repo.new_chat(&Chat::private(2)).await.unwrap();
        seed(&repo, 1).await;

        let result = notifier.send_coupons(2, 5, Delivery::Daily).await;
        assert!(matches!(result, Err(AppError::Blocked(2))));
        assert_eq!(repo.active_chats().await.unwrap(), vec![1]);
        // Nothing was delivered, so nothing is marked read.
        assert_eq!(repo.count_unread(2).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn daily_round_sends_the_whole_backlog() {
        let (notifier, messenger, repo) = setup(MockMessenger::default()).await;
        repo.new_chat(&Chat::private(1)).await.unwrap();
        seed(&repo, 7).await;

        assert_eq!(notifier.deliver_daily().await, 1);
        let messages = messenger.sent_to(1);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("7:\t"));
        assert_eq!(repo.count_unread(1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn kicked_group_is_deactivated_by_the_daily_round() {
        let (notifier, _messenger, repo) = setup(MockMessenger::blocking(&[-100])).await;
        let mut group = Chat::private(-100);
        group.kind = crate::models::ChatKind::Supergroup;
        repo.new_chat(&group).await.unwrap();
        seed(&repo, 1).await;

        assert_eq!(notifier.deliver_daily().await, 0);
        assert!(repo.active_chats().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn daily_round_skips_failures_and_inactive_chats() {
        let (notifier, messenger, repo) = setup(MockMessenger::blocking(&[2])).await;
        for id in [1, 2, 3] {
            repo.new_chat(&Chat::private(id)).await.unwrap();
        }
        repo.set_chat_active(3, false).await.unwrap();
        seed(&repo, 2).await;

        assert_eq!(notifier.deliver_daily().await, 1);
        assert_eq!(messenger.sent_to(1).len(), 1);
        assert!(messenger.sent_to(3).is_empty());
        assert_eq!(repo.active_chats().await.unwrap(), vec![1]);

        // Next round has nothing new for chat 1 and nobody else to reach.
        assert_eq!(notifier.deliver_daily().await, 0);
        assert_eq!(messenger.sent().len(), 1);
    }
}

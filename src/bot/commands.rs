use std::sync::Arc;

use crate::db::ChatStore;
use crate::error::{AppError, Result};
use crate::models::Chat;

use super::notifier::{Delivery, Notifier};

const UNAVAILABLE: &str = "service temporary unavailable";
const ACCESS_DENIED: &str = "Доступ запрещён.";

/// Coupons sent by `/print` without a number.
const DEFAULT_BATCH: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Print(u32),
    Stat(Option<String>),
    Help,
}

impl Command {
    /// Anything that is not a known command maps to [`Command::Help`].
    pub fn parse(text: &str) -> Self {
        let mut parts = text.trim().splitn(2, char::is_whitespace);
        let head = parts.next().unwrap_or_default();
        let args = parts.next().unwrap_or_default();

        let Some(name) = head.strip_prefix('/') else {
            return Command::Help;
        };
        // "/print@xfree_bot 3" in group chats
        let name = name.split('@').next().unwrap_or_default();

        match name {
            "start" => Command::Start,
            "print" => Command::Print(parse_count(args)),
            "stat" => Command::Stat(args.split_whitespace().next().map(str::to_string)),
            _ => Command::Help,
        }
    }
}

fn parse_count(args: &str) -> u32 {
    args.split_whitespace()
        .next()
        .and_then(|s| s.parse::<u32>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_BATCH)
}

pub fn welcome_text(time_to_send: &str) -> String {
    format!(
        "Доброго времени суток, вас приветствует xFree Bot!\n\
         Бот собирает купоны и присылает их в этот чат каждый день в {time_to_send}.\n\
         Купоны будут поступать по мере их нахождения.\n\
         Если вы хотите получить купоны прямо сейчас, отправьте команду /print 5 \
         (по умолчанию {DEFAULT_BATCH} купонов)."
    )
}

/// An inbound text message, independent of the chat transport.
#[derive(Debug, Clone)]
pub struct Incoming {
    pub chat: Chat,
    pub message_id: i32,
    pub text: String,
}

pub struct CommandHandler {
    notifier: Arc<Notifier>,
    store: Arc<dyn ChatStore>,
    access_token: Option<String>,
    max_print: Option<u32>,
    welcome: String,
}

impl CommandHandler {
    pub fn new(
        notifier: Arc<Notifier>,
        store: Arc<dyn ChatStore>,
        access_token: Option<String>,
        max_print: Option<u32>,
        welcome: String,
    ) -> Self {
        Self {
            notifier,
            store,
            access_token: access_token.filter(|t| !t.is_empty()),
            max_print,
            welcome,
        }
    }

    /// Handles one message end to end; errors are answered here, never returned.
    pub async fn handle(&self, msg: &Incoming) {
        let chat_id = msg.chat.id;
        match self.dispatch(msg).await {
            Ok(()) => {}
            Err(AppError::Unauthorized) => {
                tracing::info!(chat_id, "stat request denied");
                if let Err(e) = self.notifier.send(chat_id, ACCESS_DENIED).await {
                    tracing::warn!(chat_id, error = %e, "failed to send denial");
                }
            }
            // Already deactivated by the notifier; there is nobody to answer.
            Err(AppError::Blocked(_)) => {}
            Err(e) => {
                tracing::error!(chat_id, error = %e, text = %msg.text, "failed to handle message");
                if let Err(e) = self.notifier.send(chat_id, UNAVAILABLE).await {
                    tracing::warn!(chat_id, error = %e, "failed to send error reply");
                }
            }
        }
    }

    async fn dispatch(&self, msg: &Incoming) -> Result<()> {
        let chat_id = msg.chat.id;
        self.store.new_chat(&msg.chat).await?;
        if let Err(e) = self.store.log_message(chat_id, msg.message_id, &msg.text).await {
            tracing::warn!(chat_id, error = %e, "failed to log message");
        }

        match Command::parse(&msg.text) {
            Command::Start | Command::Help => self.notifier.send(chat_id, &self.welcome).await,
            Command::Print(count) => {
                let count = self.max_print.map_or(count, |max| count.min(max));
                let sent = self
                    .notifier
                    .send_coupons(chat_id, count, Delivery::Command)
                    .await?;
                tracing::debug!(chat_id, sent, "print handled");
                Ok(())
            }
            Command::Stat(token) => self.stat(chat_id, token.as_deref()).await,
        }
    }

    async fn stat(&self, chat_id: i64, token: Option<&str>) -> Result<()> {
        match (self.access_token.as_deref(), token) {
            (Some(expected), Some(given)) if expected == given => {}
            _ => return Err(AppError::Unauthorized),
        }

        let count = self.store.count_active_chats().await?;
        self.notifier
            .send(chat_id, &format!("Активных пользователей в базе: {count}"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::messenger::mock::MockMessenger;
    use crate::collector::Collector;
    use crate::config::{Config, SourceConfig};
    use crate::db::{RecordStore, Repository};
    use crate::models::Coupon;

    #[test]
    fn parses_commands_and_arguments() {
        assert_eq!(Command::parse("/start"), Command::Start);
        assert_eq!(Command::parse("/print"), Command::Print(5));
        assert_eq!(Command::parse("/print 3"), Command::Print(3));
        assert_eq!(Command::parse("/print@xfree_bot 2 extra"), Command::Print(2));
        assert_eq!(Command::parse("/print lots"), Command::Print(5));
        assert_eq!(Command::parse("/print 0"), Command::Print(5));
        assert_eq!(Command::parse("/print 1000"), Command::Print(1000));
        assert_eq!(
            Command::parse("/stat  s3cret"),
            Command::Stat(Some("s3cret".to_string()))
        );
        assert_eq!(Command::parse("/stat"), Command::Stat(None));
        assert_eq!(Command::parse("hello"), Command::Help);
        assert_eq!(Command::parse("/unknown"), Command::Help);
    }

    struct Harness {
        handler: CommandHandler,
        messenger: Arc<MockMessenger>,
        repo: Arc<Repository>,
    }

    async fn harness(access_token: Option<&str>) -> Harness {
        harness_with_cap(access_token, None).await
    }

    async fn harness_with_cap(access_token: Option<&str>, max_print: Option<u32>) -> Harness {
        let repo = Arc::new(Repository::new(":memory:").await.unwrap());
        let messenger = Arc::new(MockMessenger::default());
        let notifier = Arc::new(Notifier::new(messenger.clone(), repo.clone()));
        let handler = CommandHandler::new(
            notifier,
            repo.clone(),
            access_token.map(str::to_string),
            max_print,
            welcome_text("19:00"),
        );
        Harness {
            handler,
            messenger,
            repo,
        }
    }

    fn incoming(chat_id: i64, message_id: i32, text: &str) -> Incoming {
        Incoming {
            chat: Chat::private(chat_id),
            message_id,
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn start_registers_chat_and_greets() {
        let h = harness(None).await;
        h.handler.handle(&incoming(5, 1, "/start")).await;

        assert_eq!(h.repo.active_chats().await.unwrap(), vec![5]);
        let sent = h.messenger.sent_to(5);
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("19:00"));

        h.handler.handle(&incoming(5, 2, "что умеешь?")).await;
        assert_eq!(h.messenger.sent_to(5)[1], sent[0]);
    }

    #[tokio::test]
    async fn stat_requires_matching_token() {
        let h = harness(Some("s3cret")).await;
        h.handler.handle(&incoming(1, 1, "/start")).await;
        h.handler.handle(&incoming(2, 1, "/stat wrong")).await;
        h.handler.handle(&incoming(2, 2, "/stat")).await;
        h.handler.handle(&incoming(2, 3, "/stat s3cret")).await;

        let replies = h.messenger.sent_to(2);
        assert_eq!(replies[0], ACCESS_DENIED);
        assert_eq!(replies[1], ACCESS_DENIED);
        assert_eq!(replies[2], "Активных пользователей в базе: 2");
    }

    async fn seed(repo: &Repository, count: usize) {
        for i in 0..count {
            let coupon = Coupon::new(
                format!("p{i}"),
                "ЛитРес",
                format!("https://www.litres.ru/{i}"),
                format!("C{i}"),
            );
            repo.collect(&coupon).await.unwrap();
        }
    }

    #[tokio::test]
    async fn print_sends_up_to_the_requested_count() {
        let h = harness(None).await;
        seed(&h.repo, 40).await;

        h.handler.handle(&incoming(3, 1, "/print 35")).await;
        let sent = h.messenger.sent_to(3);
        assert!(sent[0].contains("35:\t"));
        assert_eq!(sent[1], "Купоны оставшиеся в базе: 5");
    }

    #[tokio::test]
    async fn configured_cap_bounds_print() {
        let h = harness_with_cap(None, Some(2)).await;
        seed(&h.repo, 4).await;

        h.handler.handle(&incoming(3, 1, "/print 10")).await;
        let sent = h.messenger.sent_to(3);
        assert!(sent[0].contains("2:\t"));
        assert!(!sent[0].contains("3:\t"));
        assert_eq!(sent[1], "Купоны оставшиеся в базе: 2");
    }

    #[tokio::test]
    async fn stat_is_denied_without_configured_secret() {
        let h = harness(None).await;
        h.handler.handle(&incoming(1, 1, "/stat anything")).await;
        assert_eq!(h.messenger.sent_to(1), vec![ACCESS_DENIED.to_string()]);
    }

    #[tokio::test]
    async fn scraped_coupon_reaches_chat_once() {
        let mut server = mockito::Server::new_async().await;
        let index = format!(
            r#"<article id="post-100"><a href="{}/post/100">Промокоды ЛитРес</a></article>"#,
            server.url()
        );
        server
            .mock("GET", "/")
            .with_status(200)
            .with_body(index)
            .create_async()
            .await;
        server
            .mock("GET", "/post/100")
            .with_status(200)
            .with_body(
                r#"<p><b>ЛитРес</b> <a href="/r">li.lovikod.ru/book?lfrom=342676429</a> <code>LIT100</code></p>"#,
            )
            .create_async()
            .await;

        let h = harness(None).await;
        let source = SourceConfig::Index { url: server.url() };
        let mut config = Config::default();
        config.sources = vec![source.clone()];
        let mut collector = Collector::new(&config, h.repo.clone()).await.unwrap();

        let stats = collector.collect_all().await;
        assert_eq!(stats.inserted, 1);

        h.handler.handle(&incoming(9, 1, "/start")).await;
        assert_eq!(h.repo.unread_coupons(9).await.unwrap().len(), 1);

        h.handler.handle(&incoming(9, 2, "/print")).await;
        let sent = h.messenger.sent_to(9);
        assert_eq!(sent.len(), 2);
        assert!(sent[1].contains("https://www.litres.ru/book"));
        assert!(sent[1].contains("Код--->: LIT100"));
        assert!(h.repo.unread_coupons(9).await.unwrap().is_empty());

        // A second scrape of the same page adds nothing new.
        assert_eq!(collector.collect_all().await.inserted, 0);
        h.handler.handle(&incoming(9, 3, "/print")).await;
        assert_eq!(
            h.messenger.sent_to(9).last().map(String::as_str),
            Some("Вы получили все доступные купоны на данный момент.")
        );
    }
}

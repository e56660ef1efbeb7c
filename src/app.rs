use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveTime;
use teloxide::prelude::*;

use crate::bot::{dispatcher, welcome_text, CommandHandler, Notifier, TelegramMessenger};
use crate::collector::Collector;
use crate::config::Config;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::scheduler;

pub struct App {
    repository: Arc<Repository>,
    collector: Collector,
    notifier: Arc<Notifier>,
    commands: Arc<CommandHandler>,
    bot: Bot,
    send_time: NaiveTime,
    poll_timeout: Duration,
}

impl App {
    /// Opens storage, authorizes the bot and seeds the dedup cache. Any failure
    /// here is fatal to startup.
    pub async fn new(config: &Config) -> Result<Self> {
        let repository = Arc::new(Repository::new(&config.db_path).await?);

        let token = config
            .telegram_token()
            .ok_or_else(|| AppError::Config("telegram token is required".to_string()))?;
        let bot = Bot::new(token);
        let me = bot
            .get_me()
            .await
            .map_err(|e| AppError::Telegram(e.to_string()))?;
        tracing::info!(bot = %me.username(), "authorized on account");

        let collector = Collector::new(config, repository.clone()).await?;

        let messenger = Arc::new(TelegramMessenger::new(bot.clone()));
        let notifier = Arc::new(Notifier::new(messenger, repository.clone()));
        let commands = Arc::new(CommandHandler::new(
            notifier.clone(),
            repository.clone(),
            config.telegram.access_token.clone(),
            config.telegram.max_print,
            welcome_text(&config.time_to_send),
        ));

        Ok(Self {
            repository,
            collector,
            notifier,
            commands,
            bot,
            send_time: config.send_time()?,
            poll_timeout: Duration::from_secs(u64::from(config.telegram.update_interval_secs)),
        })
    }

    /// The daily job: scrape every source, then deliver to every active chat.
    pub async fn collect_and_notify(&mut self) {
        let stats = self.collector.collect_all().await;
        tracing::info!(
            found = stats.found,
            inserted = stats.inserted,
            cached_posts = self.collector.cache().len(),
            "collection finished"
        );
        self.notifier.deliver_daily().await;
    }

    /// One collect-then-notify pass without the chat listener.
    pub async fn run_once(mut self) -> Result<()> {
        self.collect_and_notify().await;
        self.repository.close().await
    }

    /// Runs the chat listener and the daily schedule until SIGINT/SIGTERM.
    pub async fn run(mut self) -> Result<()> {
        let listener = tokio::spawn(dispatcher::run(
            self.bot.clone(),
            self.commands.clone(),
            self.poll_timeout,
        ));

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        let signal = tokio::select! {
            signal = &mut shutdown => Some(signal),
            stats = self.collector.collect_all() => {
                tracing::info!(found = stats.found, inserted = stats.inserted, "startup collection finished");
                None
            }
        };

        let signal = match signal {
            Some(signal) => signal,
            None => loop {
                tokio::select! {
                    signal = &mut shutdown => break signal,
                    _ = scheduler::sleep_until_next(self.send_time) => {
                        tokio::select! {
                            signal = &mut shutdown => break signal,
                            _ = self.collect_and_notify() => {}
                        }
                    }
                }
            },
        };

        let signal = signal?;
        tracing::info!(signal, "received signal, exiting");
        listener.abort();
        self.repository.close().await?;
        Ok(())
    }
}

async fn shutdown_signal() -> Result<&'static str> {
    let ctrl_c = async { tokio::signal::ctrl_c().await.map(|_| "SIGINT") };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        signal(SignalKind::terminate())?.recv().await;
        Ok::<_, std::io::Error>("SIGTERM")
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<std::io::Result<&'static str>>();

    let signal = tokio::select! {
        result = ctrl_c => result?,
        result = terminate => result?,
    };
    Ok(signal)
}

use std::sync::Arc;
use std::time::Duration;

use teloxide::prelude::*;
use teloxide::update_listeners::Polling;

use crate::models::{Chat, ChatKind};

use super::commands::{CommandHandler, Incoming};

/// Long-polls Telegram and feeds every text message to the command handler.
/// Runs until the task is aborted.
pub async fn run(bot: Bot, handler: Arc<CommandHandler>, poll_timeout: Duration) {
    let listener = Polling::builder(bot.clone()).timeout(poll_timeout).build();

    let schema = Update::filter_message().endpoint(on_message);

    Dispatcher::builder(bot, schema)
        .dependencies(dptree::deps![handler])
        .default_handler(|_| async {})
        .build()
        .dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("update listener error"),
        )
        .await;
}

async fn on_message(msg: Message, handler: Arc<CommandHandler>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let incoming = Incoming {
        chat: chat_from(&msg.chat),
        message_id: msg.id.0,
        text: text.to_string(),
    };
    tracing::debug!(chat_id = incoming.chat.id, "message received");
    handler.handle(&incoming).await;
    Ok(())
}

fn chat_from(chat: &teloxide::types::Chat) -> Chat {
    let kind = if chat.is_private() {
        ChatKind::Private
    } else if chat.is_group() {
        ChatKind::Group
    } else if chat.is_supergroup() {
        ChatKind::Supergroup
    } else {
        ChatKind::Channel
    };

    Chat {
        id: chat.id.0,
        kind,
        username: chat.username().map(str::to_string),
        first_name: chat.first_name().map(str::to_string),
        last_name: chat.last_name().map(str::to_string),
        active: true,
    }
}

mod commands;
pub mod dispatcher;
mod messenger;
mod notifier;

pub use commands::{welcome_text, CommandHandler};
pub use messenger::TelegramMessenger;
pub use notifier::Notifier;

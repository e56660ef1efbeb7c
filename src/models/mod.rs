mod chat;
mod coupon;

pub use chat::{Chat, ChatKind};
pub use coupon::Coupon;

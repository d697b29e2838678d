//! 通知模块
//!
//! 业务事件发生后异步投递通知，投递失败只记录日志，不影响积分与抽奖结果

mod channels;
mod sender;
mod types;

#[cfg(test)]
pub use channels::MockNotificationChannel;
pub use channels::{LogChannel, NotificationChannel, WebhookChannel};
pub use sender::NotificationSender;
pub use types::{LoyaltyEvent, Notification};

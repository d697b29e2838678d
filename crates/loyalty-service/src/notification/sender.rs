//! 通知发送器
//!
//! 注入到各业务服务中，按事件构造通知并 fire-and-forget 投递到所有渠道

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use super::channels::{LogChannel, NotificationChannel};
use super::types::{LoyaltyEvent, Notification};

#[derive(Clone)]
pub struct NotificationSender {
    channels: Arc<Vec<Arc<dyn NotificationChannel>>>,
}

impl Default for NotificationSender {
    fn default() -> Self {
        Self::new(vec![Arc::new(LogChannel)])
    }
}

impl NotificationSender {
    pub fn new(channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        Self {
            channels: Arc::new(channels),
        }
    }

    /// 不投递任何通知
    pub fn disabled() -> Self {
        Self::new(Vec::new())
    }

    pub fn send_points_credited(&self, user_id: &str, delta: i64, new_balance: i64) {
        self.send_async(LoyaltyEvent::PointsCredited {
            user_id: user_id.to_string(),
            delta,
            new_balance,
        });
    }

    pub fn send_achievements_unlocked(&self, user_id: &str, achievements: &[String]) {
        for achievement_id in achievements {
            self.send_async(LoyaltyEvent::AchievementUnlocked {
                user_id: user_id.to_string(),
                achievement_id: achievement_id.clone(),
            });
        }
    }

    pub fn send_entries_purchased(
        &self,
        user_id: &str,
        raffle_id: Uuid,
        entries_count: i64,
        total_entries: i64,
    ) {
        self.send_async(LoyaltyEvent::EntriesPurchased {
            user_id: user_id.to_string(),
            raffle_id,
            entries_count,
            total_entries,
        });
    }

    pub fn send_raffle_won(&self, user_id: &str, raffle_id: Uuid, prize_name: &str) {
        self.send_async(LoyaltyEvent::RaffleWon {
            user_id: user_id.to_string(),
            raffle_id,
            prize_name: prize_name.to_string(),
        });
    }

    pub fn send_raffle_cancelled(&self, raffle_id: Uuid, prize_name: &str) {
        self.send_async(LoyaltyEvent::RaffleCancelled {
            raffle_id,
            prize_name: prize_name.to_string(),
        });
    }

    /// 异步投递（fire-and-forget）
    fn send_async(&self, event: LoyaltyEvent) {
        if self.channels.is_empty() {
            return;
        }
        let channels = self.channels.clone();
        let notification = Notification::new(event);

        tokio::spawn(async move {
            for channel in channels.iter() {
                match channel.deliver(&notification).await {
                    Ok(()) => debug!(
                        notification_id = %notification.notification_id,
                        channel = channel.name(),
                        "通知投递成功"
                    ),
                    Err(e) => warn!(
                        notification_id = %notification.notification_id,
                        channel = channel.name(),
                        kind = notification.event.kind(),
                        error = %e,
                        "通知投递失败"
                    ),
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoyaltyError;
    use crate::notification::MockNotificationChannel;
    use std::time::Duration;

    #[tokio::test]
    async fn test_failing_channel_does_not_stop_others() {
        let mut failing = MockNotificationChannel::new();
        failing.expect_name().return_const("failing");
        failing
            .expect_deliver()
            .times(1)
            .returning(|_| Err(LoyaltyError::Internal("down".to_string())));

        let mut healthy = MockNotificationChannel::new();
        healthy.expect_name().return_const("healthy");
        healthy
            .expect_deliver()
            .withf(|n| n.event.kind() == "raffle_won")
            .times(1)
            .returning(|_| Ok(()));

        let sender = NotificationSender::new(vec![Arc::new(failing), Arc::new(healthy)]);
        sender.send_raffle_won("u1", Uuid::nil(), "Keg");

        // 等待异步任务完成，mock 在 drop 时校验调用次数
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_disabled_sender_is_noop() {
        let sender = NotificationSender::disabled();
        sender.send_points_credited("u1", 10, 10);
    }
}

//! 通知渠道

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use super::types::Notification;
use crate::error::{LoyaltyError, Result};

/// 通知渠道
///
/// 渠道实现应无状态，可并发调用
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// 渠道名称（用于日志）
    fn name(&self) -> &'static str;

    async fn deliver(&self, notification: &Notification) -> Result<()>;
}

/// 仅写日志的渠道，本地开发默认使用
#[derive(Debug, Clone, Copy, Default)]
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, notification: &Notification) -> Result<()> {
        info!(
            notification_id = %notification.notification_id,
            kind = notification.event.kind(),
            recipient = notification.event.recipient().unwrap_or("-"),
            "通知"
        );
        Ok(())
    }
}

/// Webhook 渠道：POST JSON 到配置的地址
#[derive(Debug, Clone)]
pub struct WebhookChannel {
    client: reqwest::Client,
    url: String,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| LoyaltyError::Internal(format!("创建 HTTP 客户端失败: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn deliver(&self, notification: &Notification) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| LoyaltyError::Internal(format!("Webhook 请求失败: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoyaltyError::Internal(format!(
                "Webhook 返回非成功状态: {}",
                status
            )));
        }
        Ok(())
    }
}

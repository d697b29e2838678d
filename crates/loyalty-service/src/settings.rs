//! 运行期参数
//!
//! 由配置文件中的 `[loyalty]` 段解析而来，启动时校验一次

use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use taproom_shared::config::LoyaltyConfig;
use taproom_shared::retry::RetryPolicy;

use crate::error::{LoyaltyError, Result};
use crate::models::DuplicateWindow;

/// 重复签到策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckInPolicy {
    pub window: DuplicateWindow,
    /// 计算自然日使用的 UTC 偏移
    pub utc_offset: FixedOffset,
}

impl Default for CheckInPolicy {
    fn default() -> Self {
        Self {
            window: DuplicateWindow::CalendarDay,
            utc_offset: Utc.fix(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoyaltySettings {
    pub retry: RetryPolicy,
    pub storage_timeout: Duration,
    pub check_in: CheckInPolicy,
    pub reconciliation_interval: Option<Duration>,
    /// 对账补记签到积分前的等待时长
    pub orphan_grace: Duration,
    pub notification_webhook_url: Option<String>,
}

impl Default for LoyaltySettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::from_millis(8, 2, 50),
            storage_timeout: Duration::from_secs(3),
            check_in: CheckInPolicy::default(),
            reconciliation_interval: None,
            orphan_grace: Duration::from_secs(300),
            notification_webhook_url: None,
        }
    }
}

impl LoyaltySettings {
    pub fn from_config(config: &LoyaltyConfig) -> Result<Self> {
        let window: DuplicateWindow = config
            .duplicate_check_in_window
            .parse()
            .map_err(LoyaltyError::Validation)?;
        let offset_secs = config.check_in_utc_offset_minutes.checked_mul(60).ok_or_else(|| {
            LoyaltyError::Validation("check_in_utc_offset_minutes 超出范围".to_string())
        })?;
        let utc_offset = FixedOffset::east_opt(offset_secs).ok_or_else(|| {
            LoyaltyError::Validation(format!(
                "无效的 UTC 偏移: {} 分钟",
                config.check_in_utc_offset_minutes
            ))
        })?;

        let storage_timeout = Duration::from_millis(config.storage_timeout_ms);
        let orphan_grace = Duration::from_secs(config.orphan_grace_secs)
            .max(min_orphan_grace(storage_timeout, config.max_conflict_retries));

        Ok(Self {
            retry: RetryPolicy::from_millis(
                config.max_conflict_retries,
                config.retry_initial_delay_ms,
                config.retry_max_delay_ms,
            ),
            storage_timeout,
            check_in: CheckInPolicy { window, utc_offset },
            reconciliation_interval: (config.reconciliation_interval_secs > 0)
                .then(|| Duration::from_secs(config.reconciliation_interval_secs)),
            orphan_grace,
            notification_webhook_url: config
                .notification_webhook_url
                .clone()
                .filter(|url| !url.trim().is_empty()),
        })
    }
}

/// 一次签到入账最多经历 `max_retries + 1` 次带超时的提交，再加一次结果确认
fn min_orphan_grace(storage_timeout: Duration, max_retries: u32) -> Duration {
    storage_timeout.saturating_mul(max_retries.saturating_add(2))
}

//! 存储调用执行器
//!
//! 为每次存储调用加超时，并对乐观并发冲突按策略重试。
//! 重试耗尽的冲突与超时一律以 `StorageUnavailable` 交给调用方。

use std::future::Future;
use std::time::Duration;

use taproom_shared::observability::metrics;
use taproom_shared::retry::{RetryPolicy, retry_with_policy};
use tracing::error;

use crate::error::{LoyaltyError, Result};

#[derive(Debug, Clone)]
pub struct StorageExecutor {
    policy: RetryPolicy,
    timeout: Duration,
}

impl StorageExecutor {
    pub fn new(policy: RetryPolicy, timeout: Duration) -> Self {
        Self { policy, timeout }
    }

    /// 单次存储调用，超时视为结果未知
    pub async fn timed<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                error!(operation, timeout_ms = self.timeout.as_millis() as u64, "存储调用超时");
                Err(LoyaltyError::StorageUnavailable(format!(
                    "{} 超时 ({}ms)",
                    operation,
                    self.timeout.as_millis()
                )))
            }
        }
    }

    /// 执行一次完整的「读取-计算-提交」尝试，冲突时从读取重新开始
    pub async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let result = retry_with_policy(
            &self.policy,
            operation,
            LoyaltyError::is_retryable,
            || {
                let fut = attempt();
                async move {
                    let result = fut.await;
                    if matches!(result, Err(LoyaltyError::StorageConflict)) {
                        metrics::record_storage_conflict(operation);
                    }
                    result
                }
            },
        )
        .await;

        match result {
            Err(LoyaltyError::StorageConflict) => Err(LoyaltyError::StorageUnavailable(format!(
                "{} 并发冲突重试 {} 次后仍未成功",
                operation, self.policy.max_retries
            ))),
            other => other,
        }
    }
}

impl Default for StorageExecutor {
    fn default() -> Self {
        Self::new(RetryPolicy::from_millis(8, 2, 50), Duration::from_secs(3))
    }
}

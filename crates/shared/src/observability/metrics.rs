//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。
//! 未安装 recorder 时（如单元测试）所有记录函数均为空操作。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::ObservabilityConfig;

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

#[cfg(test)]
fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    register_common_metrics(&config.service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 注册指标描述，出现在 /metrics 端点的 HELP 注释中
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!("loyalty_check_ins_total", "Total number of venue check-ins");
    metrics::describe_counter!(
        "loyalty_points_transactions_total",
        "Committed points ledger transactions"
    );
    metrics::describe_counter!(
        "loyalty_raffle_entries_total",
        "Raffle entries recorded (sum of entries_count)"
    );
    metrics::describe_counter!(
        "loyalty_raffle_rejections_total",
        "Rejected raffle entry purchases by error code"
    );
    metrics::describe_counter!("loyalty_raffle_draws_total", "Raffle draws by outcome");
    metrics::describe_counter!(
        "loyalty_storage_conflicts_total",
        "Optimistic concurrency conflicts observed"
    );
    metrics::describe_counter!(
        "loyalty_reconciliation_drift_total",
        "Materialized views found out of sync with their ledgers"
    );
    metrics::describe_histogram!(
        "loyalty_operation_duration_seconds",
        "Core operation duration in seconds"
    );
    metrics::describe_counter!("http_requests_total", "Total number of HTTP requests");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    metrics::describe_gauge!(
        "worker_last_run_timestamp",
        "Unix timestamp of the last completed worker pass"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录签到
#[inline]
pub fn record_check_in(method: &str, status: &str) {
    metrics::counter!(
        "loyalty_check_ins_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录积分流水
#[inline]
pub fn record_points_transaction(reason: &str) {
    metrics::counter!(
        "loyalty_points_transactions_total",
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// 记录抽奖券购买
#[inline]
pub fn record_raffle_entries(entries: u64) {
    metrics::counter!("loyalty_raffle_entries_total").increment(entries);
}

/// 记录被拒绝的购买
#[inline]
pub fn record_raffle_rejection(code: &str) {
    metrics::counter!(
        "loyalty_raffle_rejections_total",
        "code" => code.to_string()
    )
    .increment(1);
}

/// 记录开奖结果
#[inline]
pub fn record_raffle_draw(outcome: &str) {
    metrics::counter!(
        "loyalty_raffle_draws_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// 记录乐观并发冲突
#[inline]
pub fn record_storage_conflict(operation: &str) {
    metrics::counter!(
        "loyalty_storage_conflicts_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// 记录对账发现的偏差
#[inline]
pub fn record_reconciliation_drift(kind: &str, count: u64) {
    metrics::counter!(
        "loyalty_reconciliation_drift_total",
        "kind" => kind.to_string()
    )
    .increment(count);
}

/// 记录操作耗时
#[inline]
pub fn record_operation_duration(operation: &str, duration_secs: f64) {
    metrics::histogram!(
        "loyalty_operation_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration_secs);
}

/// 记录 HTTP 请求
#[inline]
pub fn record_http_request(method: &str, route: &str, status: u16, duration_secs: f64) {
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "route" => route.to_string()
    )
    .record(duration_secs);
}

/// 记录 Worker 最近一次运行时间
#[inline]
pub fn set_worker_last_run(worker: &str) {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();
    metrics::gauge!("worker_last_run_timestamp", "worker" => worker.to_string()).set(now);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_functions_without_recorder() {
        record_check_in("qr", "success");
        record_points_transaction("checkin");
        record_raffle_entries(3);
        record_raffle_rejection("ENTRY_LIMIT_EXCEEDED");
        record_raffle_draw("closed");
        record_storage_conflict("apply_points");
        record_reconciliation_drift("balance", 1);
        record_operation_duration("purchase_entries", 0.01);
        set_worker_last_run("reconciliation_worker");
        record_http_request("GET", "/health", 200, 0.001);
        assert!(get_handle().is_none());
    }
}

//! 积分与抽奖服务入口

use std::sync::Arc;

use loyalty::http::{AppState, build_router};
use loyalty::notification::{LogChannel, NotificationChannel, WebhookChannel};
use loyalty::{
    LoyaltyApi, LoyaltySettings, LoyaltyStores, MemoryStore, NotificationSender, OsEntropy,
    PgVenueDirectory, ReconciliationWorker, StaticVenueDirectory, VenueDirectory,
};
use taproom_shared::{config::AppConfig, database::Database, observability};
use tokio::net::TcpListener;
use tracing::{info, warn};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load("loyalty-service").unwrap_or_else(|e| {
        eprintln!("配置加载失败，使用默认配置: {e}");
        AppConfig::default()
    });

    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!("Starting loyalty-service on {}", config.server_addr());

    let settings = LoyaltySettings::from_config(&config.loyalty)?;

    let (stores, venues, database): (LoyaltyStores, Arc<dyn VenueDirectory>, Option<Database>) =
        if config.storage.is_memory() {
            warn!("使用内存存储后端，进程退出后数据丢失");
            (
                LoyaltyStores::memory(Arc::new(MemoryStore::new())),
                Arc::new(StaticVenueDirectory::new()),
                None,
            )
        } else {
            let db = Database::connect(&config.database).await?;
            if config.storage.run_migrations {
                db.run_migrations(&MIGRATOR).await?;
            }
            (
                LoyaltyStores::postgres(db.pool().clone()),
                Arc::new(PgVenueDirectory::new(db.pool().clone())),
                Some(db),
            )
        };

    let mut channels: Vec<Arc<dyn NotificationChannel>> = vec![Arc::new(LogChannel)];
    if let Some(url) = &settings.notification_webhook_url {
        channels.push(Arc::new(WebhookChannel::new(url.clone())?));
        info!(url = %url, "Webhook 通知已启用");
    }

    let api = Arc::new(LoyaltyApi::new(
        stores,
        venues,
        &settings,
        Arc::new(OsEntropy),
        NotificationSender::new(channels),
    ));

    if let Some(interval) = settings.reconciliation_interval {
        let worker = ReconciliationWorker::new(api.reconciliation(), interval);
        tokio::spawn(async move {
            worker.run().await;
        });
        info!(interval_secs = interval.as_secs(), "对账任务已启动");
    }

    let app = build_router(AppState::new(api));

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    // 收到 SIGTERM 或 Ctrl+C 后停止接收新连接，等待处理中的请求完成
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(db) = database {
        db.close().await;
    }
    info!("Server shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "注册 Ctrl+C 处理器失败");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "注册 SIGTERM 处理器失败");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}

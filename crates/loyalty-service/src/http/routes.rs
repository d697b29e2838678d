//! 路由配置

use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};
use taproom_shared::observability::middleware as obs_middleware;
use tower_http::cors::{Any, CorsLayer};

use super::handlers;
use super::state::AppState;

fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/accounts", post(handlers::account::create_account))
        .route(
            "/accounts/{user_id}",
            delete(handlers::account::delete_account),
        )
        .route(
            "/accounts/{user_id}/balance",
            get(handlers::account::get_balance),
        )
        .route(
            "/accounts/{user_id}/transactions",
            get(handlers::account::list_transactions),
        )
        .route(
            "/accounts/{user_id}/adjustments",
            post(handlers::account::adjust_points),
        )
}

fn check_in_routes() -> Router<AppState> {
    Router::new()
        .route("/check-ins", post(handlers::check_in::check_in))
        .route(
            "/accounts/{user_id}/check-ins",
            get(handlers::check_in::list_check_ins),
        )
        .route("/venues/{venue_id}", put(handlers::check_in::upsert_venue))
}

fn raffle_routes() -> Router<AppState> {
    Router::new()
        .route("/raffles", post(handlers::raffle::create_raffle))
        .route("/raffles/{raffle_id}", get(handlers::raffle::get_raffle))
        .route(
            "/raffles/{raffle_id}/entries",
            post(handlers::raffle::purchase_entries).get(handlers::raffle::get_user_entries),
        )
        .route(
            "/raffles/{raffle_id}/entrants",
            get(handlers::raffle::get_entrants),
        )
        .route(
            "/raffles/{raffle_id}/draw",
            post(handlers::raffle::draw_winner),
        )
        .route(
            "/raffles/{raffle_id}/cancel",
            post(handlers::raffle::cancel_raffle),
        )
}

/// 构建 `/api` 下的全部路由
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(account_routes())
        .merge(check_in_routes())
        .merge(raffle_routes())
        .route(
            "/admin/reconciliation",
            post(handlers::admin::run_reconciliation),
        )
}

/// 构建完整应用路由
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", api_routes())
        .route("/health", get(handlers::admin::health_check))
        .layer(cors)
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .layer(middleware::from_fn(obs_middleware::request_id))
        .with_state(state)
}

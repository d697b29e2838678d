//! 应用状态定义

use std::sync::Arc;

use crate::service::LoyaltyApi;

/// Axum 路由共享状态
#[derive(Clone)]
pub struct AppState {
    pub api: Arc<LoyaltyApi>,
}

impl AppState {
    pub fn new(api: Arc<LoyaltyApi>) -> Self {
        Self { api }
    }
}

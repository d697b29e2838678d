//! REST 接口层
//!
//! 将 `LoyaltyApi` 暴露给 UI 与运营后台，JSON 字段统一使用 camelCase

pub mod dto;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use dto::ApiResponse;
pub use error::ApiError;
pub use routes::build_router;
pub use state::AppState;

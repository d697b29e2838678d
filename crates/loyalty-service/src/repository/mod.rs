//! 数据仓储层
//!
//! - 服务层只依赖 `traits` 中的接口，便于替换后端和 mock 测试
//! - 写操作以携带前置条件的提交下发，由后端原子执行
//! - `MemoryStore` 用于测试和本地开发，`Pg*Repository` 用于生产

mod account_repo;
mod check_in_repo;
mod memory_store;
mod raffle_repo;
mod traits;

pub use account_repo::PgAccountRepository;
pub use check_in_repo::PgCheckInRepository;
pub use memory_store::MemoryStore;
pub use raffle_repo::PgRaffleRepository;
pub use traits::*;

//! API 处理器

pub mod account;
pub mod admin;
pub mod check_in;
pub mod raffle;

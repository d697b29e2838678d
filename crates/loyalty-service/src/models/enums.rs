//! 领域枚举类型定义
//!
//! 所有枚举都支持数据库（sqlx）和 JSON（serde）序列化

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 积分变动原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum PointsReason {
    /// 场馆签到奖励（+）
    Checkin,
    /// 购买抽奖券（-）
    RaffleEntry,
    /// 运营调整（±）
    AdminAdjustment,
}

impl PointsReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Checkin => "checkin",
            Self::RaffleEntry => "raffle_entry",
            Self::AdminAdjustment => "admin_adjustment",
        }
    }
}

/// 签到方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum CheckInMethod {
    /// 扫描场馆二维码
    Qr,
    /// 地理位置校验
    Geolocation,
}

impl CheckInMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qr => "qr",
            Self::Geolocation => "geolocation",
        }
    }
}

/// 抽奖状态
///
/// 仅允许 active -> closed（已开奖）或 active -> cancelled（已取消），两者均为终态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum RaffleStatus {
    #[default]
    Active,
    Closed,
    Cancelled,
}

impl RaffleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// 重复签到窗口
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateWindow {
    /// 不限制
    None,
    /// 同一用户同一场馆每个自然日仅允许一次
    #[default]
    CalendarDay,
}

impl FromStr for DuplicateWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "calendar_day" | "day" => Ok(Self::CalendarDay),
            other => Err(format!("未知的重复签到窗口: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_reason_serialization() {
        let json = serde_json::to_string(&PointsReason::RaffleEntry).unwrap();
        assert_eq!(json, "\"raffle_entry\"");
        assert_eq!(PointsReason::AdminAdjustment.as_str(), "admin_adjustment");
    }

    #[test]
    fn test_raffle_status_terminal() {
        assert!(!RaffleStatus::Active.is_terminal());
        assert!(RaffleStatus::Closed.is_terminal());
        assert!(RaffleStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_duplicate_window_parse() {
        assert_eq!("calendar_day".parse(), Ok(DuplicateWindow::CalendarDay));
        assert_eq!("NONE".parse(), Ok(DuplicateWindow::None));
        assert!("weekly".parse::<DuplicateWindow>().is_err());
    }

    #[test]
    fn test_check_in_method_deserialize() {
        let method: CheckInMethod = serde_json::from_str("\"geolocation\"").unwrap();
        assert_eq!(method, CheckInMethod::Geolocation);
    }
}

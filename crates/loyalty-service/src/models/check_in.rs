//! 签到实体定义

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::CheckInMethod;

/// 场馆签到记录
///
/// 每次实际签到创建一条，创建后不可修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CheckIn {
    pub id: Uuid,
    pub user_id: String,
    pub venue_id: String,
    pub points_awarded: i64,
    pub method: CheckInMethod,
    pub checked_in_at: DateTime<Utc>,
}

impl CheckIn {
    /// 按给定 UTC 偏移计算签到所属自然日
    pub fn calendar_day(&self, offset: FixedOffset) -> NaiveDate {
        self.checked_in_at.with_timezone(&offset).date_naive()
    }

    /// 自然日去重键：`user:venue:YYYY-MM-DD`
    pub fn daily_dedupe_key(&self, offset: FixedOffset) -> String {
        format!(
            "{}:{}:{}",
            self.user_id,
            self.venue_id,
            self.calendar_day(offset)
        )
    }
}

/// 签到统计快照，供成就评估使用
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInStats {
    pub total_check_ins: i64,
    pub unique_venues: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn check_in_at(ts: DateTime<Utc>) -> CheckIn {
        CheckIn {
            id: Uuid::nil(),
            user_id: "user-1".to_string(),
            venue_id: "venue-9".to_string(),
            points_awarded: 50,
            method: CheckInMethod::Qr,
            checked_in_at: ts,
        }
    }

    #[test]
    fn test_daily_key_utc() {
        let ci = check_in_at(Utc.with_ymd_and_hms(2026, 3, 1, 23, 30, 0).unwrap());
        let utc = FixedOffset::east_opt(0).unwrap();
        assert_eq!(ci.daily_dedupe_key(utc), "user-1:venue-9:2026-03-01");
    }

    #[test]
    fn test_daily_key_respects_offset() {
        // UTC 23:30 在 UTC+8 已是次日
        let ci = check_in_at(Utc.with_ymd_and_hms(2026, 3, 1, 23, 30, 0).unwrap());
        let plus8 = FixedOffset::east_opt(8 * 3600).unwrap();
        assert_eq!(ci.daily_dedupe_key(plus8), "user-1:venue-9:2026-03-02");
    }
}

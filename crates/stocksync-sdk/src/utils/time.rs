//! 时间处理工具模块
//!
//! 提供统一的时钟抽象、ISO 8601 格式化与解析，支持可配置的时区
//!
//! # 设计原则
//!
//! - **业务层**: 统一通过 [`Clock`] 获取当前 UTC 时间，测试中可替换为 [`ManualClock`]
//! - **存储层**: 状态存储中的时间戳为带偏移的 ISO 8601 字符串（如 `2026-10-19T08:00:00+08:00`）
//! - **显示层**: 偏移量来自 [`TimezoneConfig`]，未配置时使用系统本地时区

use chrono::{DateTime, Duration, FixedOffset, Local, Offset, SecondsFormat, Utc};
use parking_lot::Mutex;

/// 时区配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimezoneConfig {
    /// 时区偏移（秒），例如：+08:00 = 28800, -05:00 = -18000
    pub offset_seconds: i32,
}

impl TimezoneConfig {
    /// 创建时区配置（从小时偏移）
    pub fn from_hours(hours: i32) -> Self {
        Self {
            offset_seconds: hours * 3600,
        }
    }

    /// 创建时区配置（从分钟偏移）
    pub fn from_minutes(minutes: i32) -> Self {
        Self {
            offset_seconds: minutes * 60,
        }
    }

    /// UTC
    pub fn utc() -> Self {
        Self { offset_seconds: 0 }
    }

    /// 使用系统本地时区
    pub fn local() -> Self {
        let now = Local::now();
        Self {
            offset_seconds: now.offset().local_minus_utc(),
        }
    }

    /// 获取 FixedOffset（偏移超出 ±24h 时返回 None）
    pub fn to_fixed_offset(&self) -> Option<FixedOffset> {
        FixedOffset::east_opt(self.offset_seconds)
    }
}

/// 时钟抽象
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// 系统时钟
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 手动时钟（测试 / 回放使用）
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// 时间格式化工具
#[derive(Debug, Clone, Copy)]
pub struct TimeFormatter {
    offset: FixedOffset,
}

impl TimeFormatter {
    /// 按时区配置创建；`None` 表示系统本地时区
    pub fn new(timezone: Option<TimezoneConfig>) -> Self {
        let config = timezone.unwrap_or_else(TimezoneConfig::local);
        let offset = config.to_fixed_offset().unwrap_or_else(|| Utc.fix());
        Self { offset }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// 格式化为 ISO 8601 格式
    ///
    /// 格式: "YYYY-MM-DDTHH:MM:SS+HH:MM"
    pub fn format_iso8601(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.offset)
            .to_rfc3339_opts(SecondsFormat::Secs, false)
    }

    /// 解析 ISO 8601 时间戳；空字符串或格式错误返回 None
    pub fn parse_iso8601(value: &str) -> Option<DateTime<FixedOffset>> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return None;
        }
        DateTime::parse_from_rfc3339(trimmed).ok()
    }
}

impl Default for TimeFormatter {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn format_with_configured_offset() {
        let fmt = TimeFormatter::new(Some(TimezoneConfig::from_hours(8)));
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap();
        assert_eq!(fmt.format_iso8601(at), "2026-10-19T08:00:00+08:00");

        let utc = TimeFormatter::new(Some(TimezoneConfig::utc()));
        assert_eq!(utc.format_iso8601(at), "2026-10-19T00:00:00+00:00");
    }

    #[test]
    fn parse_round_trips_instant() {
        let fmt = TimeFormatter::new(Some(TimezoneConfig::from_minutes(-300)));
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let parsed = TimeFormatter::parse_iso8601(&fmt.format_iso8601(at)).unwrap();
        assert_eq!(parsed.with_timezone(&Utc), at);
    }

    #[test]
    fn parse_rejects_empty_and_garbage() {
        assert!(TimeFormatter::parse_iso8601("").is_none());
        assert!(TimeFormatter::parse_iso8601("   ").is_none());
        assert!(TimeFormatter::parse_iso8601("yesterday").is_none());
    }

    #[test]
    fn manual_clock_advances() {
        let start = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        clock.advance(Duration::seconds(90));
        assert_eq!(clock.now(), start + Duration::seconds(90));
    }
}

use std::path::Path;

use chrono_tz::Tz;
use serde_json::json;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::models::settings::SchedulingSettings;

const MINUTES_PER_DAY: u32 = 24 * 60;
pub const MAX_SEARCH_WINDOW_DAYS: i64 = 90;

/// Loads and validates [`SchedulingSettings`] from YAML.
pub struct SettingsService;

impl SettingsService {
    pub fn from_yaml_str(content: &str) -> AppResult<SchedulingSettings> {
        let settings: SchedulingSettings = serde_yaml::from_str(content).map_err(|err| {
            AppError::validation_with_details("无法解析调度配置", json!({ "error": err.to_string() }))
        })?;
        validate(&settings)?;
        Ok(settings)
    }

    pub fn from_file(path: impl AsRef<Path>) -> AppResult<SchedulingSettings> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let settings = Self::from_yaml_str(&content)?;
        info!(target: "app::settings", path = %path.display(), timezone = %settings.timezone, "scheduling settings loaded");
        Ok(settings)
    }

    /// Reads the file when it exists, otherwise falls back to defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> AppResult<SchedulingSettings> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            debug!(target: "app::settings", path = %path.display(), "settings file missing, using defaults");
            Ok(SchedulingSettings::default())
        }
    }

    pub fn to_yaml(settings: &SchedulingSettings) -> AppResult<String> {
        serde_yaml::to_string(settings)
            .map_err(|err| AppError::other(format!("无法序列化调度配置: {err}")))
    }
}

pub fn validate(settings: &SchedulingSettings) -> AppResult<()> {
    resolve_timezone(settings)?;
    ensure_valid_minute(settings.workday_start_minute)?;
    ensure_valid_minute(settings.workday_end_minute)?;

    if settings.workday_end_minute <= settings.workday_start_minute {
        return Err(AppError::validation_with_details(
            "工作日结束时间必须晚于开始时间",
            json!({
                "workdayStartMinute": settings.workday_start_minute,
                "workdayEndMinute": settings.workday_end_minute,
            }),
        ));
    }

    if settings.min_buffer_minutes < 0 {
        return Err(AppError::validation("缓冲时间不能为负数"));
    }

    let granularity = settings.slot_granularity_minutes;
    if granularity <= 0 || (MINUTES_PER_DAY as i64) % granularity != 0 {
        return Err(AppError::validation_with_details(
            "时间粒度必须为正数且能整除一天",
            json!({ "slotGranularityMinutes": granularity }),
        ));
    }

    if settings.max_candidates == 0 || settings.max_results == 0 {
        return Err(AppError::validation("候选数量上限必须大于 0"));
    }

    validate_window_days(settings.search_window_days)?;

    if settings.min_score > 100 {
        return Err(AppError::validation("最低分数不能超过 100"));
    }

    if settings.fetch_timeout_ms == 0 {
        return Err(AppError::validation("读取超时必须大于 0"));
    }

    if matches!(settings.default_duration_minutes, Some(minutes) if minutes <= 0) {
        return Err(AppError::validation("默认持续时间必须大于 0"));
    }

    Ok(())
}

/// Search windows run from one day up to `MAX_SEARCH_WINDOW_DAYS`.
pub fn validate_window_days(days: i64) -> AppResult<()> {
    if days <= 0 || days > MAX_SEARCH_WINDOW_DAYS {
        return Err(AppError::validation_with_details(
            "搜索窗口天数无效",
            json!({ "searchWindowDays": days, "max": MAX_SEARCH_WINDOW_DAYS }),
        ));
    }
    Ok(())
}

pub fn resolve_timezone(settings: &SchedulingSettings) -> AppResult<Tz> {
    settings.timezone.parse::<Tz>().map_err(|_| {
        AppError::validation_with_details("未知的时区", json!({ "timezone": settings.timezone }))
    })
}

fn ensure_valid_minute(value: u32) -> AppResult<()> {
    if value > MINUTES_PER_DAY {
        Err(AppError::validation("时间需位于 00:00-24:00 之间"))
    } else {
        Ok(())
    }
}

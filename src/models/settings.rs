use serde::{Deserialize, Serialize};

pub const DEFAULT_WORKDAY_START: u32 = 9 * 60;
pub const DEFAULT_WORKDAY_END: u32 = 18 * 60;
pub const DEFAULT_MIN_BUFFER_MINUTES: i64 = 15;
pub const DEFAULT_SLOT_GRANULARITY_MINUTES: i64 = 30;
pub const DEFAULT_MAX_CANDIDATES: usize = 300;
pub const DEFAULT_SEARCH_WINDOW_DAYS: i64 = 7;
pub const DEFAULT_MIN_SCORE: u8 = 50;
pub const DEFAULT_MAX_RESULTS: usize = 10;
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_DURATION_MINUTES: i64 = 60;

/// Engine configuration. Passed explicitly to every scoring and generation call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulingSettings {
    /// IANA time zone used for working hours, weekdays and time-of-day constraints.
    pub timezone: String,
    pub workday_start_minute: u32,
    pub workday_end_minute: u32,
    pub min_buffer_minutes: i64,
    pub slot_granularity_minutes: i64,
    pub max_candidates: usize,
    pub search_window_days: i64,
    pub min_score: u8,
    pub max_results: usize,
    pub fetch_timeout_ms: u64,
    pub default_duration_minutes: Option<i64>,
}

impl Default for SchedulingSettings {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            workday_start_minute: DEFAULT_WORKDAY_START,
            workday_end_minute: DEFAULT_WORKDAY_END,
            min_buffer_minutes: DEFAULT_MIN_BUFFER_MINUTES,
            slot_granularity_minutes: DEFAULT_SLOT_GRANULARITY_MINUTES,
            max_candidates: DEFAULT_MAX_CANDIDATES,
            search_window_days: DEFAULT_SEARCH_WINDOW_DAYS,
            min_score: DEFAULT_MIN_SCORE,
            max_results: DEFAULT_MAX_RESULTS,
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            default_duration_minutes: Some(DEFAULT_DURATION_MINUTES),
        }
    }
}

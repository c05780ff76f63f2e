use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{AppError, AppResult};

const MINUTES_PER_DAY: u32 = 24 * 60;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "camelCase")]
pub enum PriorityTier {
    Low,
    #[default]
    Medium,
    High,
}

impl PriorityTier {
    pub fn as_str(self) -> &'static str {
        match self {
            PriorityTier::Low => "low",
            PriorityTier::Medium => "medium",
            PriorityTier::High => "high",
        }
    }

    pub fn parse(value: &str) -> AppResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(PriorityTier::Low),
            "medium" => Ok(PriorityTier::Medium),
            "high" => Ok(PriorityTier::High),
            other => Err(AppError::validation(format!("未知的优先级: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    fn as_rrule(self) -> &'static str {
        match self {
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Yearly => "YEARLY",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", tag = "type", content = "value")]
pub enum RecurrenceEnd {
    #[default]
    Never,
    Count(u32),
    Until(DateTime<Utc>),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    #[serde(default = "default_interval")]
    pub interval: u32,
    #[serde(default)]
    pub days_of_week: Vec<Weekday>,
    #[serde(default)]
    pub end: RecurrenceEnd,
}

fn default_interval() -> u32 {
    1
}

impl RecurrenceRule {
    /// Renders the rule as an RFC 5545 `RRULE` value, e.g. `FREQ=WEEKLY;INTERVAL=2;BYDAY=MO,WE`.
    pub fn to_rrule(&self) -> String {
        let mut parts = vec![format!("FREQ={}", self.frequency.as_rrule())];
        if self.interval > 1 {
            parts.push(format!("INTERVAL={}", self.interval));
        }
        if !self.days_of_week.is_empty() {
            let days = self
                .days_of_week
                .iter()
                .map(|day| weekday_code(*day))
                .collect::<Vec<_>>()
                .join(",");
            parts.push(format!("BYDAY={days}"));
        }
        match &self.end {
            RecurrenceEnd::Never => {}
            RecurrenceEnd::Count(count) => parts.push(format!("COUNT={count}")),
            RecurrenceEnd::Until(until) => {
                parts.push(format!("UNTIL={}", until.format("%Y%m%dT%H%M%SZ")))
            }
        }
        parts.join(";")
    }
}

fn weekday_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct IntentConstraints {
    /// Earliest local time of day (minutes from midnight) the event may start.
    #[serde(default)]
    pub not_before_minute: Option<u32>,
    /// Latest local time of day (minutes from midnight) the event may end.
    #[serde(default)]
    pub not_after_minute: Option<u32>,
    #[serde(default)]
    pub preferred_weekdays: Vec<Weekday>,
    #[serde(default)]
    pub avoided_weekdays: Vec<Weekday>,
    #[serde(default)]
    pub must_be_after: Option<DateTime<Utc>>,
    #[serde(default)]
    pub must_be_before: Option<DateTime<Utc>>,
}

/// Structured scheduling request produced by the intent extraction collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
    #[serde(default)]
    pub start_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub recurrence: Option<RecurrenceRule>,
    #[serde(default)]
    pub attendees: Vec<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub priority: PriorityTier,
    #[serde(default)]
    pub constraints: IntentConstraints,
    #[serde(default = "default_flexible")]
    pub flexible: bool,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub ambiguities: Vec<String>,
}

fn default_flexible() -> bool {
    true
}

fn default_confidence() -> f64 {
    1.0
}

impl Intent {
    pub fn new(title: impl Into<String>, duration_minutes: i64) -> Self {
        Self {
            title: title.into(),
            description: None,
            duration_minutes: Some(duration_minutes),
            start_at: None,
            end_at: None,
            recurrence: None,
            attendees: Vec::new(),
            location: None,
            priority: PriorityTier::default(),
            constraints: IntentConstraints::default(),
            flexible: true,
            confidence: 1.0,
            ambiguities: Vec::new(),
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.title.trim().is_empty() {
            return Err(AppError::invalid_intent("标题不能为空"));
        }

        if !(0.0..=1.0).contains(&self.confidence) || self.confidence.is_nan() {
            return Err(AppError::invalid_intent_with_details(
                "置信度必须位于 0 到 1 之间",
                json!({ "confidence": self.confidence }),
            ));
        }

        if let (Some(start), Some(end)) = (self.start_at, self.end_at) {
            if end <= start {
                return Err(AppError::invalid_intent_with_details(
                    "结束时间必须晚于开始时间",
                    json!({ "startAt": start.to_rfc3339(), "endAt": end.to_rfc3339() }),
                ));
            }
        }

        if let Some(minutes) = self.duration_minutes {
            if minutes <= 0 {
                return Err(AppError::invalid_intent_with_details(
                    "持续时间必须大于 0",
                    json!({ "durationMinutes": minutes }),
                ));
            }
        }

        let constraints = &self.constraints;
        for (label, value) in [
            ("notBeforeMinute", constraints.not_before_minute),
            ("notAfterMinute", constraints.not_after_minute),
        ] {
            if let Some(minute) = value {
                if minute > MINUTES_PER_DAY {
                    return Err(AppError::invalid_intent_with_details(
                        "时间约束超出一天范围",
                        json!({ "field": label, "value": minute }),
                    ));
                }
            }
        }
        if let (Some(not_before), Some(not_after)) =
            (constraints.not_before_minute, constraints.not_after_minute)
        {
            if not_after <= not_before {
                return Err(AppError::invalid_intent("最晚时间必须晚于最早时间"));
            }
        }
        if let (Some(after), Some(before)) = (constraints.must_be_after, constraints.must_be_before)
        {
            if before <= after {
                return Err(AppError::invalid_intent("日期约束范围为空"));
            }
        }

        if let Some(rule) = &self.recurrence {
            if rule.interval == 0 {
                return Err(AppError::invalid_intent("重复间隔必须至少为 1"));
            }
            if rule.end == RecurrenceEnd::Count(0) {
                return Err(AppError::invalid_intent("重复次数必须至少为 1"));
            }
        }

        Ok(())
    }

    /// Duration in minutes, taken from the explicit interval, then the stated
    /// duration, then the configured default.
    pub fn effective_duration(&self, default_minutes: Option<i64>) -> AppResult<i64> {
        if let (Some(start), Some(end)) = (self.start_at, self.end_at) {
            return Ok(end.signed_duration_since(start).num_minutes());
        }

        self.duration_minutes
            .or(default_minutes)
            .filter(|minutes| *minutes > 0)
            .ok_or_else(|| AppError::invalid_intent("无法推断持续时间"))
    }

    pub fn has_attendees(&self) -> bool {
        !self.attendees.is_empty()
    }
}

use std::fmt;

use rusqlite;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{error, warn};

pub type AppResult<T> = Result<T, AppError>;

/// How a caller should react to a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCategory {
    /// The request itself is wrong; retrying with the same input will fail again.
    InvalidInput,
    /// A collaborator was slow or unavailable; the same request may succeed later.
    RetryLater,
    /// The chosen slot cannot be used; another slot may work.
    PickAnotherSlot,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentSourceErrorCode {
    HttpTimeout,
    Unavailable,
    RateLimited,
    InvalidResponse,
    InvalidRequest,
    Unknown,
}

impl IntentSourceErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            IntentSourceErrorCode::HttpTimeout => "HTTP_TIMEOUT",
            IntentSourceErrorCode::Unavailable => "INTENT_SOURCE_UNAVAILABLE",
            IntentSourceErrorCode::RateLimited => "RATE_LIMITED",
            IntentSourceErrorCode::InvalidResponse => "INVALID_RESPONSE",
            IntentSourceErrorCode::InvalidRequest => "INVALID_REQUEST",
            IntentSourceErrorCode::Unknown => "UNKNOWN_INTENT_ERROR",
        }
    }
}

impl fmt::Display for IntentSourceErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("无效的日程意图: {message}")]
    InvalidIntent {
        message: String,
        details: Option<JsonValue>,
    },

    #[error("搜索窗口内没有候选时间段: {message}")]
    NoCandidatesInWindow { message: String },

    #[error("没有达到质量阈值的时间段 (最高 {best_score}, 阈值 {threshold})")]
    NoAcceptableSlot { best_score: u8, threshold: u8 },

    #[error("读取日历数据超时 ({timeout_ms} ms)")]
    DataFetchTimeout { timeout_ms: u64 },

    #[error("自动调整失败: {reason}")]
    ResolutionFailed {
        reason: String,
        blocking_event_ids: Vec<String>,
    },

    #[error("时间段不可用: {message}")]
    SlotUnavailable {
        message: String,
        conflicting_event_ids: Vec<String>,
    },

    #[error("提交失败: {message}")]
    CommitFailed { message: String },

    #[error("{message}")]
    IntentSource {
        code: IntentSourceErrorCode,
        message: String,
        correlation_id: Option<String>,
    },

    #[error("验证失败: {message}")]
    Validation {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        details: Option<JsonValue>,
    },

    #[error("数据库错误: {message}")]
    Database { message: String },

    #[error("记录未找到")]
    NotFound,

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl AppError {
    pub fn invalid_intent(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::validation", %message, "invalid intent");
        AppError::InvalidIntent {
            message,
            details: None,
        }
    }

    pub fn invalid_intent_with_details(message: impl Into<String>, details: JsonValue) -> Self {
        let message = message.into();
        warn!(target: "app::validation", %message, details = %details, "invalid intent with details");
        AppError::InvalidIntent {
            message,
            details: Some(details),
        }
    }

    pub fn no_candidates(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::scheduling", %message, "no candidates in search window");
        AppError::NoCandidatesInWindow { message }
    }

    pub fn no_acceptable_slot(best_score: u8, threshold: u8) -> Self {
        warn!(target: "app::scheduling", best_score, threshold, "no slot above quality threshold");
        AppError::NoAcceptableSlot {
            best_score,
            threshold,
        }
    }

    pub fn data_fetch_timeout(timeout_ms: u64) -> Self {
        error!(target: "app::scheduling", timeout_ms, "calendar fetch timed out");
        AppError::DataFetchTimeout { timeout_ms }
    }

    pub fn resolution_failed(reason: impl Into<String>, blocking_event_ids: Vec<String>) -> Self {
        let reason = reason.into();
        warn!(target: "app::resolution", %reason, blocking = ?blocking_event_ids, "resolution failed");
        AppError::ResolutionFailed {
            reason,
            blocking_event_ids,
        }
    }

    pub fn slot_unavailable(message: impl Into<String>, conflicting_event_ids: Vec<String>) -> Self {
        let message = message.into();
        warn!(target: "app::scheduling", %message, conflicts = ?conflicting_event_ids, "slot unavailable");
        AppError::SlotUnavailable {
            message,
            conflicting_event_ids,
        }
    }

    pub fn commit_failed(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::db", %message, "commit failed");
        AppError::CommitFailed { message }
    }

    pub fn intent_source(
        code: IntentSourceErrorCode,
        message: impl Into<String>,
        correlation_id: Option<&str>,
    ) -> Self {
        let message = message.into();
        let correlation = correlation_id.map(|value| value.to_string());
        match &correlation {
            Some(id) => warn!(
                target: "app::intent::error",
                code = %code,
                correlation_id = %id,
                %message
            ),
            None => warn!(target: "app::intent::error", code = %code, %message),
        }
        AppError::IntentSource {
            code,
            message,
            correlation_id: correlation,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::validation", %message, "validation error");
        AppError::Validation {
            message,
            source: None,
            details: None,
        }
    }

    pub fn validation_with_details(message: impl Into<String>, details: JsonValue) -> Self {
        let message = message.into();
        warn!(target: "app::validation", %message, details = %details, "validation error with details");
        AppError::Validation {
            message,
            source: None,
            details: Some(details),
        }
    }

    pub fn not_found() -> Self {
        warn!(target: "app::database", "resource not found");
        AppError::NotFound
    }

    pub fn database(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::database", %message, "database error");
        AppError::Database { message }
    }

    pub fn other(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::other", %message, "other error");
        AppError::Other(message)
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidIntent { .. } => "INVALID_INTENT",
            AppError::NoCandidatesInWindow { .. } => "NO_CANDIDATES_IN_WINDOW",
            AppError::NoAcceptableSlot { .. } => "NO_ACCEPTABLE_SLOT",
            AppError::DataFetchTimeout { .. } => "DATA_FETCH_TIMEOUT",
            AppError::ResolutionFailed { .. } => "RESOLUTION_FAILED",
            AppError::SlotUnavailable { .. } => "SLOT_UNAVAILABLE",
            AppError::CommitFailed { .. } => "COMMIT_FAILED",
            AppError::IntentSource { code, .. } => code.as_str(),
            AppError::Validation { .. } => "VALIDATION_FAILED",
            AppError::Database { .. } => "DATABASE_ERROR",
            AppError::NotFound => "NOT_FOUND",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Other(_) => "UNKNOWN",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            AppError::InvalidIntent { .. }
            | AppError::NoCandidatesInWindow { .. }
            | AppError::NoAcceptableSlot { .. }
            | AppError::Validation { .. } => ErrorCategory::InvalidInput,
            AppError::DataFetchTimeout { .. } | AppError::CommitFailed { .. } => {
                ErrorCategory::RetryLater
            }
            AppError::ResolutionFailed { .. } | AppError::SlotUnavailable { .. } => {
                ErrorCategory::PickAnotherSlot
            }
            AppError::IntentSource { code, .. } => match code {
                IntentSourceErrorCode::InvalidRequest => ErrorCategory::InvalidInput,
                IntentSourceErrorCode::InvalidResponse | IntentSourceErrorCode::Unknown => {
                    ErrorCategory::Internal
                }
                _ => ErrorCategory::RetryLater,
            },
            AppError::Database { .. }
            | AppError::NotFound
            | AppError::Serialization(_)
            | AppError::Io(_)
            | AppError::Other(_) => ErrorCategory::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::RetryLater
    }

    pub fn details(&self) -> Option<&JsonValue> {
        match self {
            AppError::InvalidIntent { details, .. } | AppError::Validation { details, .. } => {
                details.as_ref()
            }
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(error: rusqlite::Error) -> Self {
        use rusqlite::Error::{QueryReturnedNoRows, SqliteFailure};
        use rusqlite::ErrorCode;

        match &error {
            QueryReturnedNoRows => AppError::not_found(),
            SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
                AppError::commit_failed("违反唯一性或约束限制")
            }
            _ => {
                error!(target: "app::database", error = ?error, "sqlite error");
                AppError::database(error.to_string())
            }
        }
    }
}

use std::time::{Duration as StdDuration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult, IntentSourceErrorCode};
use crate::models::intent::Intent;

const PARSE_PATH: &str = "/v1/intents/parse";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IntentContext {
    pub timezone: String,
    pub reference_time: DateTime<Utc>,
}

/// Turns free text into a structured [`Intent`]. Implementations live outside
/// the engine; the engine only depends on this contract.
#[async_trait]
pub trait IntentSource: Send + Sync {
    async fn extract(&self, text: &str, context: &IntentContext) -> AppResult<Intent>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ParseRequest<'a> {
    input: &'a str,
    context: &'a IntentContext,
}

#[derive(Debug, Clone)]
pub struct HttpIntentSource {
    client: Client,
    base_url: String,
}

impl HttpIntentSource {
    pub fn try_new(base_url: impl Into<String>, timeout: StdDuration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| {
                AppError::intent_source(
                    IntentSourceErrorCode::Unknown,
                    format!("初始化意图解析客户端失败: {err}"),
                    None,
                )
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub(crate) fn map_http_error(status: StatusCode, correlation_id: &str) -> AppError {
        let (code, message) = match status {
            StatusCode::TOO_MANY_REQUESTS => (
                IntentSourceErrorCode::RateLimited,
                "意图解析请求过于频繁，请稍后重试".to_string(),
            ),
            status if status.is_server_error() => (
                IntentSourceErrorCode::Unavailable,
                format!("意图解析服务暂时不可用 (状态码 {})", status.as_u16()),
            ),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => (
                IntentSourceErrorCode::InvalidRequest,
                "意图解析请求格式无效".to_string(),
            ),
            StatusCode::NOT_FOUND => (
                IntentSourceErrorCode::InvalidRequest,
                "意图解析接口地址无效".to_string(),
            ),
            status => (
                IntentSourceErrorCode::Unknown,
                format!("意图解析服务返回错误状态码 {}", status.as_u16()),
            ),
        };
        AppError::intent_source(code, message, Some(correlation_id))
    }

    fn error_from_reqwest(err: reqwest::Error, correlation_id: &str) -> AppError {
        if err.is_timeout() {
            AppError::intent_source(
                IntentSourceErrorCode::HttpTimeout,
                "意图解析请求超时",
                Some(correlation_id),
            )
        } else if err.is_connect() {
            AppError::intent_source(
                IntentSourceErrorCode::Unavailable,
                "意图解析服务网络连接失败",
                Some(correlation_id),
            )
        } else if let Some(status) = err.status() {
            Self::map_http_error(status, correlation_id)
        } else {
            AppError::intent_source(
                IntentSourceErrorCode::Unknown,
                format!("意图解析请求失败: {err}"),
                Some(correlation_id),
            )
        }
    }
}

#[async_trait]
impl IntentSource for HttpIntentSource {
    async fn extract(&self, text: &str, context: &IntentContext) -> AppResult<Intent> {
        if text.trim().is_empty() {
            return Err(AppError::invalid_intent("输入内容不能为空"));
        }

        let correlation_id = Uuid::new_v4().to_string();
        let url = format!("{}{}", self.base_url, PARSE_PATH);
        let started = Instant::now();

        debug!(
            target: "app::intent",
            correlation_id = %correlation_id,
            input_len = text.len(),
            "requesting intent extraction"
        );

        let response = self
            .client
            .post(&url)
            .header("x-correlation-id", &correlation_id)
            .json(&ParseRequest {
                input: text,
                context,
            })
            .send()
            .await
            .map_err(|err| Self::error_from_reqwest(err, &correlation_id))?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                target: "app::intent",
                correlation_id = %correlation_id,
                status = status.as_u16(),
                "intent source returned non-success status"
            );
            return Err(Self::map_http_error(status, &correlation_id));
        }

        let body: JsonValue = response.json().await.map_err(|err| {
            AppError::intent_source(
                IntentSourceErrorCode::InvalidResponse,
                format!("意图解析响应非 JSON: {err}"),
                Some(&correlation_id),
            )
        })?;

        let payload = body.get("intent").cloned().unwrap_or(body);
        let intent: Intent = serde_json::from_value(payload).map_err(|err| {
            AppError::intent_source(
                IntentSourceErrorCode::InvalidResponse,
                format!("解析意图结构失败: {err}"),
                Some(&correlation_id),
            )
        })?;

        debug!(
            target: "app::intent",
            correlation_id = %correlation_id,
            latency_ms = started.elapsed().as_millis() as u64,
            confidence = intent.confidence,
            "intent extracted"
        );

        Ok(intent)
    }
}

//! 直连 HTTP 服务商的公共请求逻辑

use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::MIN_GATEWAY_TIMEOUT_SECS;
use crate::error::ProviderError;
use crate::utils::truncate_text;

/// 实际使用的超时，不低于 120 秒
pub fn effective_timeout(timeout: Duration) -> Duration {
    timeout.max(Duration::from_secs(MIN_GATEWAY_TIMEOUT_SECS))
}

/// 创建带超时的 HTTP 客户端（所有服务商共用）
pub fn build_http_client(
    provider: &'static str,
    timeout: Duration,
) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(effective_timeout(timeout))
        .build()
        .map_err(|e| ProviderError::ClientBuild {
            provider,
            source: Box::new(e),
        })
}

/// 发送 JSON 请求并解析 JSON 响应
///
/// 429 映射为 `RateLimited`，其余非 2xx 映射为 `BadStatus`
pub async fn send_json<B, R>(
    provider: &'static str,
    request: RequestBuilder,
    body: &B,
) -> Result<R, ProviderError>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let resp = request
        .json(body)
        .send()
        .await
        .map_err(|e| ProviderError::request_failed(provider, e))?;

    let status = resp.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        warn!("{} 请求频率限制 (retry-after: {:?})", provider, retry_after);
        return Err(ProviderError::RateLimited {
            provider,
            retry_after,
        });
    }

    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        warn!("{} 返回错误状态 {}", provider, status);
        return Err(ProviderError::BadStatus {
            provider,
            status: status.as_u16(),
            body: truncate_text(&body, 500),
        });
    }

    debug!("{} 请求成功 ({})", provider, status);

    resp.json::<R>()
        .await
        .map_err(|e| ProviderError::request_failed(provider, e))
}

//! OpenAI 评分客户端
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 客户端在首次调用时创建，之后在所有并发任务间复用
//! - 推理模型自动去掉 JSON 输出提示、temperature 和 top_p
//! - 关闭 SDK 自带的退避重试：限流和 5xx 立即作为服务商错误返回，
//!   与其他服务商一致，任务不会在闸门里长时间占用名额

use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    error::{ApiError, OpenAIError},
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs, ResponseFormat,
    },
    Client,
};
use async_trait::async_trait;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::clients::capability::{MaxTokensParam, ModelCapabilities};
use crate::clients::http::build_http_client;
use crate::clients::{finish_grade, grading_prompt, ClientSettings, GradingClient, ProviderKind};
use crate::error::{GradingResult, ProviderError};
use crate::models::{Conversation, GradeResult, QuotingMode, Rubric};

const PROVIDER: &str = "openai";

/// OpenAI 限流错误的 type / code
const RATE_LIMIT_KINDS: &[&str] = &[
    "rate_limit_exceeded",
    "insufficient_quota",
    "requests",
    "tokens",
];

/// 不重试的退避策略：第一次失败后 `next_backoff` 即返回 `None`
fn no_retry_backoff() -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_max_elapsed_time(Some(Duration::ZERO))
        .build()
}

/// 把 SDK 错误映射为服务商错误
fn map_openai_error(err: OpenAIError) -> ProviderError {
    match err {
        OpenAIError::ApiError(api) if is_rate_limit(&api) => {
            warn!("OpenAI 请求频率限制: {}", api.message);
            ProviderError::RateLimited {
                provider: PROVIDER,
                retry_after: None,
            }
        }
        other => {
            warn!("OpenAI API 调用失败: {}", other);
            ProviderError::request_failed(PROVIDER, other)
        }
    }
}

fn is_rate_limit(api: &ApiError) -> bool {
    [api.code.as_deref(), api.r#type.as_deref()]
        .into_iter()
        .flatten()
        .any(|kind| RATE_LIMIT_KINDS.contains(&kind))
}

/// OpenAI 客户端
pub struct OpenAiClient {
    settings: ClientSettings,
    capabilities: ModelCapabilities,
    client: OnceCell<Client<OpenAIConfig>>,
}

impl OpenAiClient {
    pub fn new(settings: ClientSettings) -> Self {
        let capabilities = ModelCapabilities::detect(&settings.model);
        Self {
            settings,
            capabilities,
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> Result<&Client<OpenAIConfig>, ProviderError> {
        self.client
            .get_or_try_init(|| async {
                let http = build_http_client(PROVIDER, self.settings.timeout)?;
                let openai_config = OpenAIConfig::new()
                    .with_api_key(&self.settings.api_key)
                    .with_api_base(&self.settings.api_base);
                Ok::<_, ProviderError>(Client::build(http, openai_config, no_retry_backoff()))
            })
            .await
    }

    /// 构建请求：只包含当前模型支持且已设置的参数
    #[allow(deprecated)]
    fn build_request(&self, prompt: &str) -> Result<CreateChatCompletionRequest, OpenAIError> {
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()?;

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.settings.model)
            .messages(vec![ChatCompletionRequestMessage::User(user_msg)]);

        let caps = self.capabilities;
        let tuning = self.settings.tuning;

        if caps.structured_output {
            args.response_format(ResponseFormat::JsonObject);
        }
        if caps.sampling_params {
            if let Some(temperature) = tuning.temperature {
                args.temperature(temperature);
            }
            if let Some(top_p) = tuning.top_p {
                args.top_p(top_p);
            }
        }
        if let Some(max_tokens) = tuning.max_tokens {
            match caps.max_tokens_param {
                MaxTokensParam::MaxTokens => args.max_tokens(max_tokens),
                MaxTokensParam::MaxCompletionTokens => args.max_completion_tokens(max_tokens),
            };
        }

        args.build()
    }

    /// 回复文本为空时返回空字符串，由解析器报告解析错误
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let request = self
            .build_request(prompt)
            .map_err(|e| ProviderError::request_failed(PROVIDER, e))?;

        let response = self
            .client()
            .await?
            .chat()
            .create(request)
            .await
            .map_err(map_openai_error)?;

        Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl GradingClient for OpenAiClient {
    fn provider(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn model(&self) -> &str {
        &self.settings.model
    }

    async fn grade(
        &self,
        conversation: &Conversation,
        rubric: &Rubric,
        mode: QuotingMode,
    ) -> GradingResult<GradeResult> {
        let prompt = grading_prompt(conversation, rubric, mode);
        debug!(
            "调用 OpenAI，模型: {}，提示词长度: {} 字符",
            self.settings.model,
            prompt.len()
        );

        let text = self.complete(&prompt).await?;
        finish_grade(&text, rubric, &self.settings.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::TuningParams;
    use serde_json::Value;

    fn client_for(model: &str, tuning: TuningParams) -> OpenAiClient {
        OpenAiClient::new(ClientSettings::new(
            ProviderKind::OpenAi,
            &Config::default(),
            "sk-test",
            model,
            tuning,
        ))
    }

    fn request_json(client: &OpenAiClient) -> Value {
        serde_json::to_value(client.build_request("grade me").unwrap()).unwrap()
    }

    #[test]
    fn test_standard_model_gets_all_set_params() {
        let client = client_for(
            "gpt-4o",
            TuningParams {
                temperature: Some(0.5),
                max_tokens: Some(512),
                top_p: Some(0.5),
            },
        );
        let body = request_json(&client);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "grade me");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["top_p"], 0.5);
        assert_eq!(body["max_tokens"], 512);
        assert!(body.get("max_completion_tokens").is_none());
    }

    #[test]
    fn test_unset_params_are_omitted() {
        let body = request_json(&client_for("gpt-4o-mini", TuningParams::default()));
        assert!(body.get("temperature").is_none());
        assert!(body.get("top_p").is_none());
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn test_reasoning_model_drops_unsupported_params() {
        let client = client_for(
            "o3-mini",
            TuningParams {
                temperature: Some(0.5),
                max_tokens: Some(4096),
                top_p: Some(0.5),
            },
        );
        let body = request_json(&client);
        assert!(body.get("response_format").is_none());
        assert!(body.get("temperature").is_none());
        assert!(body.get("top_p").is_none());
        assert!(body.get("max_tokens").is_none());
        assert_eq!(body["max_completion_tokens"], 4096);
    }

    mod wire {
        use super::*;
        use crate::error::{GradingError, ParseError};
        use crate::models::{GradeType, GradeValue, Message};
        use serde_json::json;
        use std::time::Duration;
        use wiremock::matchers::{header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        fn wire_client(server: &MockServer) -> OpenAiClient {
            let mut config = Config::default();
            config.openai_api_base = format!("{}/v1", server.uri());
            OpenAiClient::new(ClientSettings::new(
                ProviderKind::OpenAi,
                &config,
                "sk-test",
                "gpt-4o-mini",
                TuningParams::default(),
            ))
        }

        fn completion(content: &str) -> Value {
            json!({
                "id": "chatcmpl-1",
                "object": "chat.completion",
                "created": 1,
                "model": "gpt-4o-mini",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": content},
                    "finish_reason": "stop"
                }]
            })
        }

        async fn grade(client: &OpenAiClient) -> GradingResult<GradeResult> {
            let conv = Conversation::new(vec![Message::new("user", "hi")]);
            let rubric = Rubric::new("polite", "Is it polite?", GradeType::Bool);
            tokio::time::timeout(
                Duration::from_secs(10),
                client.grade(&conv, &rubric, QuotingMode::Optional),
            )
            .await
            .expect("请求应在 10 秒内结束")
        }

        #[tokio::test]
        async fn test_grade_over_http() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/v1/chat/completions"))
                .and(header("authorization", "Bearer sk-test"))
                .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                    r#"{"grade": true, "quotes": [], "explanation": "ok"}"#,
                )))
                .expect(1)
                .mount(&server)
                .await;

            let result = grade(&wire_client(&server)).await.unwrap();
            assert_eq!(result.grade, GradeValue::Bool(true));
            assert_eq!(result.model, "gpt-4o-mini");
        }

        #[tokio::test]
        async fn test_rate_limit_returns_after_one_request() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/v1/chat/completions"))
                .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                    "error": {
                        "message": "Rate limit reached",
                        "type": "requests",
                        "param": null,
                        "code": "rate_limit_exceeded"
                    }
                })))
                .expect(1)
                .mount(&server)
                .await;

            let err = grade(&wire_client(&server)).await.unwrap_err();
            assert!(
                matches!(err, GradingError::Provider(ProviderError::RateLimited { .. })),
                "unexpected error: {err:?}"
            );
        }

        #[tokio::test]
        async fn test_server_error_is_not_retried() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
                .expect(1)
                .mount(&server)
                .await;

            let err = grade(&wire_client(&server)).await.unwrap_err();
            assert!(matches!(
                err,
                GradingError::Provider(ProviderError::RequestFailed { .. })
            ));
        }

        #[tokio::test]
        async fn test_empty_reply_is_parse_error() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(200).set_body_json(completion("")))
                .mount(&server)
                .await;

            let err = grade(&wire_client(&server)).await.unwrap_err();
            match err {
                GradingError::Parse(ParseError::NoJsonObject { snippet }) => {
                    assert!(snippet.is_empty())
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    /// 真实调用 OpenAI
    ///
    /// 运行方式：
    /// ```bash
    /// OPENAI_API_KEY=... cargo test test_live_openai_grade -- --ignored --nocapture
    /// ```
    #[tokio::test]
    #[ignore]
    async fn test_live_openai_grade() {
        let _ = tracing_subscriber::fmt::try_init();
        let key = std::env::var("OPENAI_API_KEY").expect("需要 OPENAI_API_KEY");
        let client = OpenAiClient::new(ClientSettings::new(
            ProviderKind::OpenAi,
            &Config::from_env(),
            key,
            "gpt-4o-mini",
            TuningParams::default(),
        ));
        let conv = Conversation::new(vec![
            crate::models::Message::new("user", "What is the capital of France?"),
            crate::models::Message::new("assistant", "The capital of France is Paris."),
        ]);
        let rubric = Rubric::preset("accuracy").unwrap();
        let result = client
            .grade(&conv, &rubric, QuotingMode::Required)
            .await
            .unwrap();
        println!("{:#?}", result);
    }
}

/// Client for the external chat-completion API, with structured error
/// classification so the scheduler can tell retryable failures from fatal
/// ones.
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::OpenAiOptions;
use crate::error::{ServiceError, ServiceResult};
use crate::prompts::{self, PromptParams};
use crate::task::DocumentFormat;

const TEMPERATURE: f32 = 0.3;
const MAX_TOKENS: u32 = 4000;

#[derive(Debug, Clone)]
pub struct TranslateRequest {
    pub text: String,
    pub target_language: String,
    pub source_language: Option<String>,
    pub preserve_formatting: bool,
    /// Drives prompt selection; `None` selects the generic pair.
    pub format: Option<DocumentFormat>,
}

/// The translation seam. The HTTP client implements it for production; the
/// tests substitute counting, failing and identity doubles.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, request: &TranslateRequest) -> ServiceResult<String>;
}

pub struct HttpTranslator {
    client: reqwest::Client,
    options: OpenAiOptions,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

impl HttpTranslator {
    pub fn new(options: OpenAiOptions) -> ServiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ServiceError::Server(format!("HTTP client init failed: {}", e)))?;

        Ok(Self { client, options })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.options.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(&self, request: &TranslateRequest) -> ServiceResult<String> {
        // Whitespace-only input never leaves the process.
        if request.text.trim().is_empty() {
            return Ok(String::new());
        }

        if self.options.api_key.trim().is_empty() {
            return Err(ServiceError::Auth("missing API key".into()));
        }

        let params = PromptParams {
            source_language: request.source_language.as_deref(),
            target_language: &request.target_language,
            preserve_formatting: request.preserve_formatting,
            text: &request.text,
        };
        let system = prompts::system_prompt(&params);
        let user = prompts::user_prompt(request.format, &params);

        debug!(
            "translating {} chars into {}",
            request.text.chars().count(),
            request.target_language
        );

        let body = ChatRequest {
            model: &self.options.model,
            messages: vec![
                ChatMessage { role: "system", content: &system },
                ChatMessage { role: "user", content: &user },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.options.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::Server(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_hint(&response);
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, retry_after, &text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ResponseFormat(format!("unparseable response: {}", e)))?;

        if let Some(error) = parsed.error {
            return Err(ServiceError::ResponseFormat(format!(
                "API reported an error: {}",
                error.message
            )));
        }

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| {
                ServiceError::ResponseFormat("response carried no message content".into())
            })?;

        info!(
            "translated {} -> {} chars",
            request.text.chars().count(),
            content.chars().count()
        );

        Ok(content)
    }
}

fn classify_status(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> ServiceError {
    let detail = summarize_body(body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ServiceError::Auth(format!(
            "credential rejected (status {}): {}",
            status.as_u16(),
            detail
        )),
        StatusCode::TOO_MANY_REQUESTS => {
            let hint = retry_after
                .map(|d| format!(" (retry after {}s)", d.as_secs()))
                .unwrap_or_default();
            ServiceError::RateLimit(format!("quota exceeded{}: {}", hint, detail))
        }
        status if status.is_server_error() => ServiceError::Server(format!(
            "upstream error (status {}): {}",
            status.as_u16(),
            detail
        )),
        status => ServiceError::ResponseFormat(format!(
            "unexpected status {}: {}",
            status.as_u16(),
            detail
        )),
    }
}

/// Advisory delay from a `Retry-After` header, either delta-seconds or an
/// HTTP date.
fn retry_after_hint(response: &reqwest::Response) -> Option<Duration> {
    let value = response.headers().get(reqwest::header::RETRY_AFTER)?;
    let value = value.to_str().ok()?.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date = httpdate::parse_http_date(value).ok()?;
    date.duration_since(std::time::SystemTime::now())
        .ok()
        .or(Some(Duration::from_secs(0)))
}

fn summarize_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".into();
    }
    trimmed.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn options(base_url: &str) -> OpenAiOptions {
        OpenAiOptions {
            api_key: "sk-test".into(),
            base_url: base_url.to_string(),
            model: "gpt-3.5-turbo".into(),
        }
    }

    fn request(text: &str) -> TranslateRequest {
        TranslateRequest {
            text: text.into(),
            target_language: "French".into(),
            source_language: None,
            preserve_formatting: true,
            format: Some(DocumentFormat::Txt),
        }
    }

    #[tokio::test]
    async fn empty_text_short_circuits_without_network() {
        // Unroutable base URL: a network call would fail loudly.
        let translator = HttpTranslator::new(options("http://127.0.0.1:1")).unwrap();
        let out = translator.translate(&request("   ")).await.unwrap();
        assert_eq!(out, "");
    }

    #[tokio::test]
    async fn successful_response_returns_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "Bonjour"}}]
            })))
            .mount(&server)
            .await;

        let translator = HttpTranslator::new(options(&server.uri())).unwrap();
        let out = translator.translate(&request("Hello")).await.unwrap();
        assert_eq!(out, "Bonjour");
    }

    #[tokio::test]
    async fn unauthorized_maps_to_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let translator = HttpTranslator::new(options(&server.uri())).unwrap();
        let err = translator.translate(&request("Hello")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Auth(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn rate_limit_maps_to_retryable_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "7")
                    .set_body_string("slow down"),
            )
            .mount(&server)
            .await;

        let translator = HttpTranslator::new(options(&server.uri())).unwrap();
        let err = translator.translate(&request("Hello")).await.unwrap_err();
        match &err {
            ServiceError::RateLimit(message) => assert!(message.contains("7s")),
            other => panic!("expected RateLimit, got {other:?}"),
        }
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn server_error_maps_to_retryable_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let translator = HttpTranslator::new(options(&server.uri())).unwrap();
        let err = translator.translate(&request("Hello")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Server(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn empty_choices_map_to_response_format_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let translator = HttpTranslator::new(options(&server.uri())).unwrap();
        let err = translator.translate(&request("Hello")).await.unwrap_err();
        assert!(matches!(err, ServiceError::ResponseFormat(_)));
    }
}

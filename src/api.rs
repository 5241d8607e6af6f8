//! DashScope multimodal-generation wire format and client.

use std::time::{Duration, Instant};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::Config;
use crate::error::AnnotError;

// -- Request types --

/// Request body for the `multimodal-generation` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub model: String,
    pub input: Input,
    pub parameters: Parameters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Input {
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// "user" for the single annotation turn
    pub role: String,
    pub content: Vec<ContentBlock>,
}

/// One part of a multimodal message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// A video reference plus the frame extraction rate
    Video { video: String, fps: f64 },
    /// Plain instruction text
    Text { text: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameters {
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
}

impl GenerationRequest {
    /// Frame extraction rate carried by the request's video block.
    pub fn fps(&self) -> Option<f64> {
        self.input
            .messages
            .iter()
            .flat_map(|message| &message.content)
            .find_map(|block| match block {
                ContentBlock::Video { fps, .. } => Some(*fps),
                ContentBlock::Text { .. } => None,
            })
    }
}

// -- Response types --

#[derive(Debug, Deserialize)]
pub struct GenerationResponse {
    pub output: Output,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Output {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub struct ResponseMessage {
    pub content: ResponseContent,
}

/// The service returns content either as a bare string or as a list of parts.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ResponseContent {
    Text(String),
    Parts(Vec<ResponsePart>),
}

#[derive(Debug, Deserialize)]
pub struct ResponsePart {
    #[serde(default)]
    pub text: Option<String>,
}

impl ResponseContent {
    fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Parts(parts) => parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

/// Error body returned by the service alongside a non-success status.
#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

// -- Client --

/// Successful annotation, held only long enough to persist.
#[derive(Debug, Clone)]
pub struct Annotation {
    pub text: String,
    pub model: String,
    pub fps: f64,
    pub elapsed: Duration,
}

/// Client for the remote multimodal inference endpoint.
///
/// One blocking exchange per call, no retries; the whole exchange is bounded
/// by the configured timeout.
pub struct InferenceClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: SecretString,
    timeout: Duration,
}

impl InferenceClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            timeout: config.timeout,
        }
    }

    fn generation_url(&self) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/services/aigc/multimodal-generation/generation")
    }

    /// Submit the request and wait for the annotation.
    pub async fn call(&self, request: &GenerationRequest) -> Result<Annotation, AnnotError> {
        let url = self.generation_url();

        tracing::debug!(
            model = %request.model,
            temperature = request.parameters.temperature,
            max_tokens = request.parameters.max_tokens,
            top_p = request.parameters.top_p,
            "sending request to inference endpoint"
        );

        let start = Instant::now();

        let response = tokio::time::timeout(self.timeout, self.exchange(request, &url))
            .await
            .map_err(|_| {
                AnnotError::Transport(format!(
                    "no response within {}s",
                    self.timeout.as_secs()
                ))
            })??;

        let elapsed = start.elapsed();
        let text = response
            .output
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.into_text())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| AnnotError::Transport("response contained no annotation".to_owned()))?;

        tracing::info!(
            elapsed_secs = %format_args!("{:.1}", elapsed.as_secs_f64()),
            chars = text.chars().count(),
            request_id = response.request_id.as_deref().unwrap_or("-"),
            "annotation received"
        );

        Ok(Annotation {
            text,
            model: request.model.clone(),
            fps: request.fps().unwrap_or_default(),
            elapsed,
        })
    }

    async fn exchange(
        &self,
        request: &GenerationRequest,
        url: &str,
    ) -> Result<GenerationResponse, AnnotError> {
        let response = self
            .http
            .post(url)
            .bearer_auth(self.api_key.expose_secret())
            .json(request)
            .send()
            .await
            .map_err(|e| AnnotError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let api_err: ApiErrorBody = serde_json::from_str(&body).unwrap_or_default();
            tracing::error!(%status, body_len = body.len(), "inference endpoint returned error");
            return Err(AnnotError::RemoteService {
                status: status.as_u16(),
                code: api_err.code.unwrap_or_else(|| "unknown".to_owned()),
                message: api_err.message.unwrap_or(body),
            });
        }

        response
            .json::<GenerationResponse>()
            .await
            .map_err(|e| AnnotError::Transport(format!("failed to parse response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};

    const GENERATION_PATH: &str = "/services/aigc/multimodal-generation/generation";

    fn test_request() -> GenerationRequest {
        GenerationRequest {
            model: "qwen-vl-max-latest".to_owned(),
            input: Input {
                messages: vec![Message {
                    role: "user".to_owned(),
                    content: vec![
                        ContentBlock::Video {
                            video: "file:///tmp/clip.mp4".to_owned(),
                            fps: 1.0,
                        },
                        ContentBlock::Text {
                            text: "Describe the video.".to_owned(),
                        },
                    ],
                }],
            },
            parameters: Parameters {
                temperature: 0.3,
                max_tokens: 4000,
                top_p: 0.9,
            },
        }
    }

    async fn spawn_client(app: Router) -> InferenceClient {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        InferenceClient {
            http: reqwest::Client::new(),
            base_url: Url::parse(&format!("http://{addr}")).unwrap(),
            api_key: SecretString::from("sk-test".to_owned()),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn successful_call_returns_annotation() {
        let app = Router::new().route(
            GENERATION_PATH,
            post(|| async {
                Json(serde_json::json!({
                    "request_id": "req-1",
                    "output": {
                        "choices": [{
                            "message": {
                                "role": "assistant",
                                "content": [{"text": "Человек открывает дверь."}]
                            }
                        }]
                    }
                }))
            }),
        );
        let client = spawn_client(app).await;

        let annotation = client.call(&test_request()).await.unwrap();
        assert_eq!(annotation.text, "Человек открывает дверь.");
        assert_eq!(annotation.model, "qwen-vl-max-latest");
        assert_eq!(annotation.fps, 1.0);
        assert!(annotation.elapsed.as_secs_f64() >= 0.0);
    }

    #[tokio::test]
    async fn non_success_status_surfaces_service_code_and_message() {
        let app = Router::new().route(
            GENERATION_PATH,
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({
                        "code": "InvalidParameter",
                        "message": "fps out of range"
                    })),
                )
            }),
        );
        let client = spawn_client(app).await;

        let err = client.call(&test_request()).await.unwrap_err();
        match err {
            AnnotError::RemoteService {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 400);
                assert_eq!(code, "InvalidParameter");
                assert_eq!(message, "fps out of range");
            }
            other => panic!("expected RemoteService, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_endpoint_times_out_as_transport_error() {
        let app = Router::new().route(
            GENERATION_PATH,
            post(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Json(serde_json::json!({"output": {"choices": []}}))
            }),
        );
        let mut client = spawn_client(app).await;
        client.timeout = Duration::from_millis(200);

        let err = client.call(&test_request()).await.unwrap_err();
        match err {
            AnnotError::Transport(message) => {
                assert!(message.contains("no response within"), "got: {message}");
            }
            other => panic!("expected Transport, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn undecodable_body_is_a_transport_error() {
        let app = Router::new().route(GENERATION_PATH, post(|| async { "not json" }));
        let client = spawn_client(app).await;

        let err = client.call(&test_request()).await.unwrap_err();
        assert!(matches!(err, AnnotError::Transport(_)));
    }

    #[tokio::test]
    async fn empty_choices_is_a_transport_error() {
        let app = Router::new().route(
            GENERATION_PATH,
            post(|| async { Json(serde_json::json!({"output": {"choices": []}})) }),
        );
        let client = spawn_client(app).await;

        let err = client.call(&test_request()).await.unwrap_err();
        assert!(matches!(err, AnnotError::Transport(_)));
    }

    #[test]
    fn content_blocks_serialize_with_type_tags() {
        let request = test_request();
        let value = serde_json::to_value(&request).unwrap();
        let content = &value["input"]["messages"][0]["content"];
        assert_eq!(content[0]["type"], "video");
        assert_eq!(content[0]["video"], "file:///tmp/clip.mp4");
        assert_eq!(content[0]["fps"], 1.0);
        assert_eq!(content[1]["type"], "text");
        assert_eq!(content[1]["text"], "Describe the video.");
    }

    #[test]
    fn bare_string_content_is_accepted() {
        let raw = serde_json::json!({
            "output": {
                "choices": [{"message": {"content": "plain text"}}]
            }
        });
        let response: GenerationResponse = serde_json::from_value(raw).unwrap();
        let text = response
            .output
            .choices
            .into_iter()
            .next()
            .unwrap()
            .message
            .content
            .into_text();
        assert_eq!(text, "plain text");
    }
}

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::remote::{parse_verdict, ModelVerdict, VisionRequest};
use crate::config::SelectorConfig;
use crate::error::{ModelError, ScraperError};
use crate::traits::VisionModel;

const SYSTEM_PROMPT: &str =
    "You evaluate e-commerce product photos for advertising. Always answer with a single JSON object.";

/// OpenAI互換 chat completions API を使う画像評価モデル
pub struct OpenAiVisionModel {
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
    client: Client,
}

impl OpenAiVisionModel {
    pub fn new(config: &SelectorConfig) -> Result<Self, ScraperError> {
        let api_key = config
            .api_key()
            .ok_or_else(|| ScraperError::Config(ModelError::MissingApiKey.to_string()))?
            .to_string();
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ScraperError::Config(format!("HTTPクライアント作成失敗: {}", e)))?;

        Ok(Self {
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout,
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_body<'a>(&'a self, request: &'a VisionRequest) -> ChatRequest<'a> {
        let mut parts = vec![ContentPart::Text {
            text: request.prompt.clone(),
        }];
        parts.extend(request.images.iter().map(|img| ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: img.url.clone(),
                detail: "low",
            },
        }));

        ChatRequest {
            model: &self.model,
            temperature: 0.2,
            max_tokens: 1500,
            response_format: ResponseFormat {
                kind: "json_object",
            },
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: vec![ContentPart::Text {
                        text: SYSTEM_PROMPT.to_string(),
                    }],
                },
                ChatMessage {
                    role: "user",
                    content: parts,
                },
            ],
        }
    }
}

#[async_trait]
impl VisionModel for OpenAiVisionModel {
    async fn evaluate(&self, request: &VisionRequest) -> Result<ModelVerdict, ModelError> {
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", self.api_key);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| ModelError::Request("APIキーに使用できない文字が含まれています".into()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let body = self.build_body(request);
        debug!(
            "Calling {} with model {} ({} images)",
            self.endpoint(),
            self.model,
            request.images.len()
        );

        let resp = self
            .client
            .post(self.endpoint())
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout(self.timeout)
                } else {
                    ModelError::from(e)
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(ModelError::Status { status, body });
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| ModelError::InvalidJson(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .ok_or(ModelError::EmptyResponse)?;

        parse_verdict(&content)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    response_format: ResponseFormat,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
    detail: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("rate limited by the AI gateway")]
    RateLimited,
    #[error("AI gateway credits exhausted: {0}")]
    QuotaExhausted(String),
    #[error("AI gateway returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("parse error: {0}")]
    Parse(String),
    #[error("no text content in response")]
    NoText,
    #[error("no image data in response")]
    NoImage,
}

/// Base64 image payload as it travels to and from the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

impl InlineImage {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

#[derive(Debug, Clone)]
pub struct TextRequest {
    pub system: String,
    pub prompt: String,
    pub reference_image: Option<InlineImage>,
    pub temperature: f32,
}

/// Chat-style text generation capability.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn generate_text(&self, request: &TextRequest) -> Result<String, GeminiError>;
}

/// Prompt-to-image generation capability.
#[async_trait]
pub trait ImageModel: Send + Sync {
    async fn generate_image(&self, prompt: &str) -> Result<InlineImage, GeminiError>;
}

// Helper function to truncate base64 data in JSON for cleaner logging
fn truncate_base64_in_json(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "data" {
                    if let Value::String(s) = val {
                        let chars = s.chars().count();
                        if chars > 100 {
                            let head: String = s.chars().take(50).collect();
                            *val = Value::String(format!("{}...[truncated {} chars]", head, chars - 50));
                        }
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        _ => {}
    }
}

// The request URL carries the API key, so it never goes into the message.
fn transport(e: reqwest::Error) -> GeminiError {
    GeminiError::Http(e.without_url().to_string())
}

fn classify_status(status: StatusCode, body: String) -> GeminiError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => GeminiError::RateLimited,
        StatusCode::PAYMENT_REQUIRED => GeminiError::QuotaExhausted(body),
        s => GeminiError::Status { status: s.as_u16(), body },
    }
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    text_model: String,
    image_model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            text_model: "gemini-2.5-flash".to_string(),
            image_model: "gemini-2.5-flash-image-preview".to_string(),
        }
    }

    pub fn with_models(mut self, text_model: String, image_model: String) -> Self {
        self.text_model = text_model;
        self.image_model = image_model;
        self
    }

    async fn generate_content(&self, model: &str, body: &Value) -> Result<GeminiResponse, GeminiError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );
        info!(model, "🔗 Making request to: {}", url.replace(&self.api_key, "***"));

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(transport)?;

        if !status.is_success() {
            error!(model, %status, "❌ API Error response: {}", response_text);
            return Err(classify_status(status, response_text));
        }

        if let Ok(mut json_value) = serde_json::from_str::<Value>(&response_text) {
            truncate_base64_in_json(&mut json_value);
            debug!(model, "📥 Raw gateway response: {}", json_value);
        }

        serde_json::from_str(&response_text)
            .map_err(|e| GeminiError::Parse(format!("{}: {}", e, response_text.chars().take(500).collect::<String>())))
    }
}

#[async_trait]
impl TextModel for GeminiClient {
    async fn generate_text(&self, request: &TextRequest) -> Result<String, GeminiError> {
        let mut parts = vec![json!({ "text": request.prompt })];
        if let Some(image) = &request.reference_image {
            parts.push(json!({
                "inlineData": { "mimeType": image.mime_type, "data": image.data }
            }));
        }

        let payload = json!({
            "systemInstruction": { "parts": [{ "text": request.system }] },
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": {
                "temperature": request.temperature,
                "topP": 0.95,
                "responseMimeType": "application/json",
                "candidateCount": 1
            }
        });

        let parsed = self.generate_content(&self.text_model, &payload).await?;
        let text = extract_text(&parsed).ok_or(GeminiError::NoText)?;
        info!(chars = text.len(), "✅ Text generated");
        Ok(text)
    }
}

#[async_trait]
impl ImageModel for GeminiClient {
    async fn generate_image(&self, prompt: &str) -> Result<InlineImage, GeminiError> {
        let payload = json!({
            "contents": [{
                "parts": [{"text": prompt}]
            }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
                "temperature": 0.4,
                "topP": 0.95,
                "topK": 64,
                "candidateCount": 1
            }
        });

        let parsed = self.generate_content(&self.image_model, &payload).await?;
        match extract_first_image(&parsed) {
            Some(image) => {
                info!(mime_type = %image.mime_type, chars = image.data.len(), "🖼️ Image generated");
                Ok(image)
            }
            None => {
                info!("⚠️ No image data found in API response");
                Err(GeminiError::NoImage)
            }
        }
    }
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate { #[serde(default)] content: Content }

#[derive(Debug, Deserialize, Default)]
struct Content { #[serde(default)] parts: Vec<Part> }

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Part {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData
    },
    Text {
        text: String,
        #[serde(default)]
        thought: bool,
    },
    #[allow(dead_code)]
    Other(Value)
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
    #[serde(rename = "mimeType")]
    mime_type: String,
}

fn extract_text(resp: &GeminiResponse) -> Option<String> {
    let text: String = resp
        .candidates
        .iter()
        .take(1)
        .flat_map(|c| c.content.parts.iter())
        .filter_map(|p| match p {
            Part::Text { text, thought: false } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn extract_first_image(resp: &GeminiResponse) -> Option<InlineImage> {
    for c in &resp.candidates {
        for p in &c.content.parts {
            if let Part::Inline { inline_data } = p {
                if inline_data.data.is_empty() {
                    continue;
                }
                return Some(InlineImage {
                    mime_type: inline_data.mime_type.clone(),
                    data: inline_data.data.clone(),
                });
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;

    async fn spawn_gateway(status: StatusCode, body: &'static str) -> String {
        let app = Router::new().fallback(move || async move { (status, body) });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    fn request() -> TextRequest {
        TextRequest {
            system: "system".into(),
            prompt: "prompt".into(),
            reference_image: None,
            temperature: 0.7,
        }
    }

    #[test]
    fn text_parts_are_joined_and_thoughts_skipped() {
        let resp: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [
                { "text": "thinking...", "thought": true },
                { "text": "[{\"name\":" },
                { "text": "\"Aurelia\"}]" }
            ]}}]
        }))
        .unwrap();
        assert_eq!(extract_text(&resp).as_deref(), Some("[{\"name\":\"Aurelia\"}]"));
    }

    #[test]
    fn first_non_empty_inline_image_wins() {
        let resp: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [
                { "text": "Here is your ring" },
                { "inlineData": { "mimeType": "image/png", "data": "" } },
                { "inlineData": { "mimeType": "image/png", "data": "iVBORw0KGgo" } }
            ]}}]
        }))
        .unwrap();
        let image = extract_first_image(&resp).unwrap();
        assert_eq!(image.data_url(), "data:image/png;base64,iVBORw0KGgo");
    }

    #[test]
    fn base64_payloads_are_truncated_for_logs() {
        let mut value = json!({ "parts": [{ "inlineData": { "data": "A".repeat(400) } }] });
        truncate_base64_in_json(&mut value);
        let data = value["parts"][0]["inlineData"]["data"].as_str().unwrap();
        assert!(data.ends_with("[truncated 350 chars]"));
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let mut value = json!({ "inlineData": { "data": "é".repeat(200) } });
        truncate_base64_in_json(&mut value);
        let data = value["inlineData"]["data"].as_str().unwrap();
        assert!(data.starts_with(&"é".repeat(50)));
        assert!(data.ends_with("[truncated 150 chars]"));
    }

    #[tokio::test]
    async fn transport_errors_do_not_expose_the_api_key() {
        let client = GeminiClient::new("SECRET-KEY-123".into(), "http://127.0.0.1:1".into());
        let err = client.generate_text(&request()).await.unwrap_err();
        assert!(matches!(err, GeminiError::Http(_)));
        assert!(!err.to_string().contains("SECRET-KEY-123"));
        let surfaced = crate::error::PipelineError::from(err).to_string();
        assert!(!surfaced.contains("SECRET-KEY-123"));
        assert!(!surfaced.contains("key="));
    }

    #[tokio::test]
    async fn status_429_is_rate_limited() {
        let base = spawn_gateway(StatusCode::TOO_MANY_REQUESTS, "slow down").await;
        let client = GeminiClient::new("test-key".into(), base);
        let err = client.generate_text(&request()).await.unwrap_err();
        assert!(matches!(err, GeminiError::RateLimited));
    }

    #[tokio::test]
    async fn status_402_is_quota_exhausted() {
        let base = spawn_gateway(StatusCode::PAYMENT_REQUIRED, "add credits").await;
        let client = GeminiClient::new("test-key".into(), base);
        let err = client.generate_image("a ring").await.unwrap_err();
        assert!(matches!(err, GeminiError::QuotaExhausted(body) if body == "add credits"));
    }

    #[tokio::test]
    async fn response_without_image_is_no_image() {
        let base = spawn_gateway(
            StatusCode::OK,
            r#"{"candidates":[{"content":{"parts":[{"text":"I cannot draw that"}]}}]}"#,
        )
        .await;
        let client = GeminiClient::new("test-key".into(), base);
        let err = client.generate_image("a ring").await.unwrap_err();
        assert!(matches!(err, GeminiError::NoImage));
    }

    #[tokio::test]
    async fn text_response_is_returned_trimmed() {
        let base = spawn_gateway(
            StatusCode::OK,
            r#"{"candidates":[{"content":{"parts":[{"text":"  [] \n"}]}}]}"#,
        )
        .await;
        let client = GeminiClient::new("test-key".into(), base);
        assert_eq!(client.generate_text(&request()).await.unwrap(), "[]");
    }
}

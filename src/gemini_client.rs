use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeminiError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Gemini API error: {0}")]
    Api(String),
    #[error("Empty response from Gemini")]
    EmptyResponse,
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(rename = "generationConfig")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Part {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    pub max_output_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateContentResponse {
    pub candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata")]
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Candidate {
    pub content: Option<Content>,
    #[serde(rename = "finishReason")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UsageMetadata {
    #[serde(rename = "promptTokenCount")]
    pub prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    pub candidates_token_count: u32,
    #[serde(rename = "totalTokenCount")]
    pub total_token_count: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmbedContentRequest {
    pub model: String,
    pub content: Content,
    #[serde(rename = "outputDimensionality")]
    pub output_dimensionality: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmbedContentResponse {
    pub embedding: Embedding,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

/// The reply text plus the provider-reported token counts (when present).
#[derive(Debug)]
pub struct GeminiReply {
    pub text: String,
    pub usage: Option<UsageMetadata>,
}

pub const GENERATION_MODEL: &str = "gemini-2.5-flash";
pub const EMBEDDING_MODEL: &str = "text-embedding-004";
pub const EMBEDDING_DIMENSIONS: u32 = 768;

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }

    /// One synchronous tutoring turn: system instruction + fully assembled
    /// prompt in, reply text and token counts out.
    pub async fn generate_reply(
        &self,
        system_instruction: &str,
        prompt: &str,
    ) -> Result<GeminiReply, GeminiError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, GENERATION_MODEL, self.api_key
        );

        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt.to_string() }],
                role: Some("user".to_string()),
            }],
            system_instruction: Some(Content {
                parts: vec![Part { text: system_instruction.to_string() }],
                role: None,
            }),
            generation_config: Some(GenerationConfig {
                temperature: 0.3,
                max_output_tokens: 2000,
            }),
        };

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GeminiError::Api(error_text));
        }

        let result: GenerateContentResponse = response.json().await?;

        let text = result
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .and_then(|content| content.parts.first())
            .map(|part| part.text.clone())
            .ok_or(GeminiError::EmptyResponse)?;

        Ok(GeminiReply {
            text,
            usage: result.usage_metadata,
        })
    }

    pub async fn embed_content(&self, text: &str) -> Result<Vec<f32>, GeminiError> {
        let url = format!(
            "{}/models/{}:embedContent?key={}",
            self.base_url, EMBEDDING_MODEL, self.api_key
        );

        let request = EmbedContentRequest {
            model: format!("models/{}", EMBEDDING_MODEL),
            content: Content {
                parts: vec![Part { text: text.to_string() }],
                role: None,
            },
            output_dimensionality: Some(EMBEDDING_DIMENSIONS),
        };

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GeminiError::Api(error_text));
        }

        let result: EmbedContentResponse = response.json().await?;
        Ok(result.embedding.values)
    }
}

//! Gemini `generateContent` client implementing [`ReasoningProvider`].

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use lookbook_core::config::LlmConfig;
use lookbook_core::traits::{GenerationOptions, ReasoningProvider};
use lookbook_core::Error;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

pub struct GeminiProvider {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl GeminiProvider {
    /// `request_timeout` is a transport backstop; callers still apply their own deadline.
    pub fn new(config: &LlmConfig, request_timeout: Duration) -> Result<Self> {
        let api_key = config.api_key.clone().filter(|k| !k.trim().is_empty())
            .ok_or_else(|| anyhow!("llm.api_key is not set (APP_LLM__API_KEY)"))?;
        let client = Client::builder().timeout(request_timeout).build()?;
        let endpoint = format!("{}/v1beta/models/{}:generateContent", config.base_url.trim_end_matches('/'), config.model);
        Ok(Self { client, endpoint, api_key })
    }
}

fn classify(e: reqwest::Error) -> Error {
    if e.is_timeout() || e.is_connect() {
        Error::Transient(e.to_string())
    } else {
        Error::Provider(e.to_string())
    }
}

fn status_error(status: StatusCode, body: &str) -> Error {
    let msg = format!("gemini returned {}: {}", status, body.chars().take(200).collect::<String>());
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Error::Transient(msg)
    } else {
        Error::Provider(msg)
    }
}

#[async_trait]
impl ReasoningProvider for GeminiProvider {
    async fn generate(&self, prompt: &str, options: GenerationOptions) -> lookbook_core::Result<String> {
        let body = GenerateRequest {
            contents: [Content { parts: [Part { text: prompt }] }],
            generation_config: GenerationConfig { temperature: options.temperature, max_output_tokens: options.max_output_tokens },
        };
        let resp = self.client.post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(classify)?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(status_error(status, &text));
        }
        let parsed: GenerateResponse = resp.json().await.map_err(classify)?;
        let text: String = parsed.candidates.into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(Error::Provider("gemini returned no text".into()));
        }
        debug!(chars = text.len(), "gemini reply");
        Ok(text)
    }
}

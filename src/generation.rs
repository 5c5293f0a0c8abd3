//! Hosted chat-model client that consumes retrieved context.
//!
//! The knowledge base only produces a context string; this module wraps it in
//! a system prompt, replays the conversation history, and asks the Gemini
//! `generateContent` endpoint for a reply in the user's language.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::GenerationConfig;
use crate::error::{RagError, Result};
use crate::language::{self, Language};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Generation {
    pub text: String,
    pub language: Language,
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
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

pub struct GeminiGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    timeout: Option<Duration>,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                RagError::Config(
                    "generation API key not configured (set generation.api_key or GEMINI_API_KEY)"
                        .into(),
                )
            })?;

        let timeout = (config.timeout_secs > 0).then(|| Duration::from_secs(config.timeout_secs));
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            timeout,
        })
    }

    pub async fn generate(
        &self,
        query: &str,
        context: &str,
        history: &[ChatMessage],
    ) -> Result<Generation> {
        let language = language::detect(query).primary;
        let body = request_body(query, context, history, language);

        let response = self
            .client
            .post(format!("{}/models/{}:generateContent", self.endpoint, self.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(RagError::Provider(format!(
                "generation API returned {status}: {text}"
            )));
        }

        let parsed: GenerateResponse = response.json().await?;
        let text = first_candidate_text(parsed)
            .ok_or_else(|| RagError::Provider("generation API returned no candidates".into()))?;

        tracing::info!(language = %language, chars = text.len(), "generation complete");
        Ok(Generation { text, language })
    }
}

/// System prompt for a spoken-style assistant grounded on `context`.
pub fn system_prompt(context: &str, language: Language) -> String {
    let language_rule = match language {
        Language::Ar => "Respond in Arabic, using natural spoken Arabic.",
        Language::En => "Respond in English, using casual, friendly English.",
    };
    format!(
        "You are a friendly assistant answering questions about the documents below.\n\n\
         Knowledge base context:\n{context}\n\n\
         Response style:\n\
         - Speak naturally, like a helpful person\n\
         - Keep answers to two or three sentences\n\
         - Write numbers as words\n\
         - No lists, markdown, or special characters\n\
         - If the context does not cover the question, say so plainly\n\n\
         Language: match the user's language. {language_rule}\n\n\
         Your reply will be read aloud."
    )
}

fn request_body(
    query: &str,
    context: &str,
    history: &[ChatMessage],
    language: Language,
) -> serde_json::Value {
    let mut contents: Vec<serde_json::Value> = history
        .iter()
        .map(|msg| {
            let role = match msg.role {
                Role::User => "user",
                Role::Assistant => "model",
            };
            serde_json::json!({ "role": role, "parts": [{ "text": msg.content }] })
        })
        .collect();
    contents.push(serde_json::json!({ "role": "user", "parts": [{ "text": query }] }));

    serde_json::json!({
        "systemInstruction": { "parts": [{ "text": system_prompt(context, language) }] },
        "contents": contents,
    })
}

fn first_candidate_text(response: GenerateResponse) -> Option<String> {
    let content = response.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().map(|p| p.text).collect();
    (!text.is_empty()).then_some(text)
}

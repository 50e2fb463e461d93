//! Conversational reply generation
//!
//! External collaborator behind the `ReplyGenerator` trait: the core hands
//! it a bounded recent-history window plus the optional profile and gets
//! free text back. A Gemini-backed implementation is used when an API key
//! is configured; otherwise a deterministic offline generator keeps the
//! chatbot usable without any keys.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::error::AdvisorError;
use crate::models::{ChatMessage, MessageRole, Profile};
use crate::Result;

/// Generates the free-text part of an assistant reply. Deterministic tips
/// are appended by the chat layer, not here.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// `history` is most-recent-last and already capped by the caller.
    async fn generate_reply(
        &self,
        history: &[ChatMessage],
        profile: Option<&Profile>,
    ) -> Result<String>;
}

/// Pick a generator from the environment: Gemini when GEMINI_API_KEY is
/// set, offline otherwise.
pub fn generator_from_env() -> Arc<dyn ReplyGenerator> {
    match env::var("GEMINI_API_KEY") {
        Ok(key) if !key.trim().is_empty() => {
            info!("Reply generator: gemini");
            Arc::new(GeminiGenerator::new(key))
        }
        _ => {
            info!("Reply generator: offline");
            Arc::new(OfflineGenerator)
        }
    }
}

fn render_context(history: &[ChatMessage], profile: Option<&Profile>) -> String {
    let mut prompt = String::new();

    if let Some(profile) = profile {
        prompt.push_str(&format!(
            "User profile: {}, age {}, monthly income ₹{:.0}, fixed expenses ₹{:.0}, goals: {}.\n\n",
            profile.kind,
            profile.age,
            profile.monthly_income,
            profile.fixed_expenses,
            if profile.goals.is_empty() {
                "none listed".to_string()
            } else {
                profile.goals_text()
            }
        ));
    }

    if history.len() > 1 {
        prompt.push_str("Conversation so far:\n");
        for msg in &history[..history.len() - 1] {
            prompt.push_str(&format!("- {}: {}\n", msg.role, msg.content));
        }
        prompt.push('\n');
    }

    if let Some(last) = history.last() {
        prompt.push_str("Answer this message: ");
        prompt.push_str(&last.content);
    }

    prompt
}

//
// ================= Gemini =================
//

/// Reusable Gemini client (connection-pooled)
pub struct GeminiGenerator {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiGenerator {
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key,
            base_url: "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent".to_string(),
        }
    }
}

const SYSTEM_PROMPT: &str = r#"You are a personal finance assistant for an individual user.

Guidelines:
- Give practical guidance on savings, budgets, taxes, and financial goals
- Be concise and concrete; amounts are in Indian rupees
- Emphasize building habits over one-off fixes
- Never recommend specific securities or make guarantees"#;

#[async_trait]
impl ReplyGenerator for GeminiGenerator {
    async fn generate_reply(
        &self,
        history: &[ChatMessage],
        profile: Option<&Profile>,
    ) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(AdvisorError::Config(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let url = format!("{}?key={}", self.base_url, self.api_key);

        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: render_context(history, profile),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.3,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 1024,
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: SYSTEM_PROMPT.to_string(),
                }],
            },
        };

        info!("Calling Gemini API");

        let response = self.client.post(&url).json(&request).send().await.map_err(|e| {
            error!("Gemini API request failed: {}", e);
            AdvisorError::Llm(format!("Gemini API error: {}", e))
        })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error response: {}", error_text);
            return Err(AdvisorError::Llm(format!("Gemini API error: {}", error_text)));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            AdvisorError::Llm(format!("Gemini parse error: {}", e))
        })?;

        let answer = gemini_response
            .candidates
            .first()
            .and_then(|candidate| candidate.content.parts.first())
            .map(|part| part.text.clone())
            .ok_or_else(|| AdvisorError::Llm("Empty response from Gemini".to_string()))?;

        Ok(answer)
    }
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

//
// ================= Offline =================
//

/// Deterministic fallback used when no API key is configured. Keeps the
/// chatbot functional offline; the insight tips appended by the chat layer
/// carry the substance.
pub struct OfflineGenerator;

#[async_trait]
impl ReplyGenerator for OfflineGenerator {
    async fn generate_reply(
        &self,
        history: &[ChatMessage],
        profile: Option<&Profile>,
    ) -> Result<String> {
        let question = history
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.trim().to_string())
            .unwrap_or_default();

        let opening = if question.is_empty() {
            "Ask me about savings, budgets, taxes, or goals.".to_string()
        } else {
            format!(
                "On \"{}\": the fundamentals rarely change. Spend less than you earn, \
                 keep an emergency cushion, and automate the rest.",
                question
            )
        };

        let closing = match profile {
            Some(p) => format!(
                "Based on your profile (monthly income ₹{:.0}, fixed expenses ₹{:.0}), \
                 the tips below are tailored to you.",
                p.monthly_income, p.fixed_expenses
            ),
            None => "Save your profile in the sidebar to get tailored numbers.".to_string(),
        };

        Ok(format!("{} {}", opening, closing))
    }
}

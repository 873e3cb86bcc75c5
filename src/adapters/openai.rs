//! Remote advisor: narrative recommendations from a chat-completions API.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::domain::{Metrics, PatientInput, RiskCategory};
use crate::ports::{Advisor, RecommendationError};

const MAX_TOKENS: u32 = 500;
const TEMPERATURE: f32 = 0.7;

/// Chat-completions client.
pub struct OpenAiAdvisor {
    base_url: String,
    api_key: Zeroizing<String>,
    model: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OpenAiAdvisor {
    /// Create an advisor against `base_url` (e.g. `https://api.openai.com`).
    ///
    /// # Errors
    /// Returns `RecommendationError::NotConfigured` if the key is blank or the
    /// HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        api_key: Zeroizing<String>,
        model: &str,
        timeout_secs: u64,
    ) -> Result<Self, RecommendationError> {
        if api_key.trim().is_empty() {
            return Err(RecommendationError::NotConfigured);
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| {
                tracing::error!("Failed to create HTTP client: {}", e);
                RecommendationError::NotConfigured
            })?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            client,
            timeout_secs,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Build the single user prompt sent to the model.
#[must_use]
pub fn build_prompt(input: &PatientInput, metrics: &Metrics, risk: RiskCategory) -> String {
    format!(
        "As a medical AI assistant, provide personalized health recommendations for a patient with the following profile:\n\
         \n\
         Patient: {age}-year-old {gender}\n\
         BMI: {bmi}\n\
         TyG Index: {tyg}\n\
         TG/HDL Ratio: {ratio}\n\
         HbA1c: {hba1c}%\n\
         Diabetes Status: {diabetes}\n\
         Risk Level: {risk}\n\
         \n\
         Please provide specific recommendations for:\n\
         1. Dietary modifications\n\
         2. Exercise recommendations\n\
         3. Follow-up tests or monitoring\n\
         4. Lifestyle changes\n\
         \n\
         Use a professional medical tone and be specific with actionable advice.",
        age = input.age,
        gender = input.gender,
        bmi = metrics.bmi,
        tyg = metrics.tyg_index,
        ratio = metrics.tg_hdl_ratio,
        hba1c = input.hba1c,
        diabetes = input.diabetes_status,
        risk = risk.label(),
    )
}

impl Advisor for OpenAiAdvisor {
    fn name(&self) -> &str {
        &self.model
    }

    fn generate(
        &self,
        input: &PatientInput,
        metrics: &Metrics,
        risk: RiskCategory,
    ) -> Result<String, RecommendationError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let prompt = build_prompt(input, metrics, risk);
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: &prompt,
            }],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.as_str())
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    RecommendationError::Unreachable(format!(
                        "request timed out after {}s",
                        self.timeout_secs
                    ))
                } else if e.is_connect() {
                    RecommendationError::Unreachable(format!("cannot connect to {}", self.base_url))
                } else {
                    RecommendationError::Unreachable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(RecommendationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| RecommendationError::MalformedResponse(e.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|t| t.trim().to_string())
            .unwrap_or_default();
        if text.is_empty() {
            return Err(RecommendationError::Empty);
        }

        tracing::debug!("Advisor {} returned {} chars", self.model, text.len());
        Ok(text)
    }
}

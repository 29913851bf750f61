//! LLM-backed analyzer speaking the OpenAI-compatible chat-completions
//! protocol.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parcelwatch_model::{EmailAnalysis, LlmConfig, RawEmail};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::analyzer::Analyzer;
use crate::crypto::SecretCipher;
use crate::database::ports::settings::SettingsStore;
use crate::error::{CoreError, Result};

pub const MODULE_KEY: &str = "llm";

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const MAX_PARSE_ATTEMPTS: usize = 2;

const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an email analysis assistant. Analyze the provided email and extract purchase/shipping information.

Return ONLY valid JSON with these fields: is_relevant (bool), email_type (order_confirmation | shipment_confirmation | shipment_update | delivery_confirmation | null), order_number, tracking_number, carrier, vendor_name, vendor_domain (all string or null), status (ordered | shipment_preparing | shipped | in_transit | out_for_delivery | delivered), order_date and estimated_delivery (YYYY-MM-DD or null), total_amount (number or null), currency (string or null), items (array of {name, quantity, price} or null).

An email is ONLY relevant if at least an order_number OR a tracking_number can be extracted; otherwise return {"is_relevant": false}. Do not include any text outside the JSON object."#;

/// Analyzer backed by a configurable chat-completions endpoint.
pub struct LlmAnalyzer {
    http: reqwest::Client,
    settings: Arc<dyn SettingsStore>,
    cipher: SecretCipher,
}

impl std::fmt::Debug for LlmAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmAnalyzer").finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl LlmAnalyzer {
    pub fn new(settings: Arc<dyn SettingsStore>, cipher: SecretCipher) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("failed to build HTTP client");
        Self {
            http,
            settings,
            cipher,
        }
    }

    /// Module hook: an active config row means the analyzer can run.
    pub async fn is_configured(&self) -> Result<bool> {
        Ok(self
            .settings
            .llm_config()
            .await?
            .is_some_and(|config| config.is_active))
    }

    /// Module hook: current backend summary for the status API.
    pub async fn status_json(&self) -> Result<Option<serde_json::Value>> {
        let Some(config) = self.settings.llm_config().await? else {
            return Ok(None);
        };
        if !config.is_active {
            return Ok(None);
        }
        Ok(Some(json!({
            "provider": config.provider,
            "model": config.model_name,
        })))
    }

    async fn call_model(&self, config: &LlmConfig, user_message: &str) -> Result<String> {
        let api_key = config
            .api_key_encrypted
            .as_deref()
            .map(|token| self.cipher.decrypt(token))
            .transpose()?;

        let base = config
            .api_base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE)
            .trim_end_matches('/');
        let url = format!("{base}/chat/completions");

        let prompt = config.system_prompt.as_deref().unwrap_or(DEFAULT_SYSTEM_PROMPT);
        let body = json!({
            "model": config.model_name,
            "messages": [
                {"role": "system", "content": prompt},
                {"role": "user", "content": user_message},
            ],
            "max_tokens": 2048,
            "temperature": 0,
        });

        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CoreError::Analyzer(format!("LLM request failed: {e}")))?
            .error_for_status()
            .map_err(|e| CoreError::Analyzer(format!("LLM request rejected: {e}")))?;

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| CoreError::Analyzer(format!("invalid LLM response envelope: {e}")))?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| CoreError::Analyzer("LLM response had no choices".into()))
    }
}

#[async_trait]
impl Analyzer for LlmAnalyzer {
    async fn analyze(&self, raw: &RawEmail) -> Result<(Option<EmailAnalysis>, serde_json::Value)> {
        let Some(config) = self.settings.llm_config().await? else {
            return Ok((None, json!({"error": "no analyzer backend configured"})));
        };
        if !config.is_active {
            return Ok((None, json!({"error": "analyzer backend is inactive"})));
        }

        let user_message = serde_json::to_string_pretty(raw)?;

        let mut last_text = String::new();
        for attempt in 0..MAX_PARSE_ATTEMPTS {
            let text = self.call_model(&config, &user_message).await?;

            match parse_analysis(&text) {
                Ok((analysis, raw_value)) => return Ok((Some(analysis), raw_value)),
                Err(e) => {
                    debug!("analyzer output failed to parse (attempt {}): {e}", attempt + 1);
                    last_text = text;
                }
            }
        }

        // Malformed output after the retry: not a transport failure, so the
        // item can still complete with the evidence preserved.
        Ok((
            None,
            json!({
                "error": "failed to parse analyzer response",
                "raw": last_text,
            }),
        ))
    }
}

fn parse_analysis(text: &str) -> Result<(EmailAnalysis, serde_json::Value)> {
    let raw_value: serde_json::Value = serde_json::from_str(text.trim())?;
    let mut analysis: EmailAnalysis = serde_json::from_value(raw_value.clone())?;

    // The contract requires an anchoring identifier; a "relevant" result
    // without one is demoted.
    if analysis.is_relevant && !analysis.is_actionable() {
        analysis.is_relevant = false;
    }

    Ok((analysis, raw_value))
}

#[async_trait]
impl crate::modules::ModuleHooks for LlmAnalyzer {
    async fn is_configured(&self) -> Result<bool> {
        LlmAnalyzer::is_configured(self).await
    }

    async fn status(&self) -> Result<Option<serde_json::Value>> {
        self.status_json().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_conforming_response() {
        let text = r#"{"is_relevant": true, "order_number": "ORD-1", "status": "ordered"}"#;
        let (analysis, raw) = parse_analysis(text).unwrap();
        assert!(analysis.is_relevant);
        assert_eq!(analysis.order_number.as_deref(), Some("ORD-1"));
        assert_eq!(raw["order_number"], "ORD-1");
    }

    #[test]
    fn demotes_relevance_without_identifiers() {
        let text = r#"{"is_relevant": true, "vendor_name": "Amazon"}"#;
        let (analysis, _) = parse_analysis(text).unwrap();
        assert!(!analysis.is_relevant);
    }

    #[test]
    fn rejects_non_json_output() {
        assert!(parse_analysis("Sure! Here is the JSON you asked for: {}").is_err());
    }

    #[test]
    fn rejects_schema_violations() {
        assert!(parse_analysis(r#"{"is_relevant": "yes"}"#).is_err());
    }
}

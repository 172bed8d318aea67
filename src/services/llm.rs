use std::collections::BTreeMap;
use std::time::Duration;

use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestUserMessage, ChatCompletionRequestUserMessageContent,
    CreateChatCompletionRequestArgs, CreateChatCompletionResponse, Role,
};
use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::{Indicator, NOT_APPLICABLE};

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

const DEFAULT_MODEL: &str = "openai/gpt-4.1";
const DEFAULT_FALLBACK_MODEL: &str = "google/gemini-2.0-pro";
const DEFAULT_TIMEOUT_SECS: u64 = 100;
const RETRY_DELAY_MS: u64 = 1200;
const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI.";

/// Prompt texts loaded once at startup and passed to whoever needs them.
/// Missing file or fields degrade to defaults, never to a crash.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromptConfig {
    #[serde(default)]
    pub common_system_prompt: String,
    #[serde(default)]
    pub background: String,
}

impl PromptConfig {
    pub fn load(path: &str) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(config) => {
                    tracing::info!("Loaded prompt configuration from {path}");
                    config
                }
                Err(err) => {
                    tracing::warn!("Ignoring malformed prompt configuration {path}: {err}");
                    Self::default()
                }
            },
            Err(err) => {
                tracing::warn!("Prompt configuration {path} unreadable ({err}), using defaults");
                Self::default()
            }
        }
    }

    pub fn system_prompt(&self) -> &str {
        if self.common_system_prompt.trim().is_empty() {
            DEFAULT_SYSTEM_PROMPT
        } else {
            &self.common_system_prompt
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub fallback_model: String,
    pub timeout: Duration,
    pub retry_delay: Duration,
    pub referer: Option<String>,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        let timeout_secs = std::env::var("LLM_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Self {
            endpoint: std::env::var("LLM_ENDPOINT").unwrap_or_else(|_| OPENROUTER_URL.to_string()),
            api_key: std::env::var("LLM_API_KEY").ok(),
            model: std::env::var("LLM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            fallback_model: std::env::var("LLM_FALLBACK_MODEL")
                .unwrap_or_else(|_| DEFAULT_FALLBACK_MODEL.to_string()),
            timeout: Duration::from_secs(timeout_secs),
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
            referer: std::env::var("FRONTEND_URL").ok(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM_API_KEY is not configured")]
    MissingCredentials,
    #[error("completion request failed: {0}")]
    Request(String),
    #[error("completion timed out after {0:?}")]
    Timeout(Duration),
    #[error("completion came back empty")]
    Empty,
}

/// Chat-completion transport, kept behind a trait so report generation can be
/// exercised without a network.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<String, LlmError>;
}

/// Talks to an OpenRouter-compatible chat-completions endpoint.
pub struct OpenRouterClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    referer: Option<String>,
}

impl OpenRouterClient {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            referer: config.referer.clone(),
        }
    }
}

#[async_trait]
impl CompletionClient for OpenRouterClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<String, LlmError> {
        let api_key = self.api_key.as_deref().ok_or(LlmError::MissingCredentials)?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(chat_messages(system_prompt, user_prompt))
            .build()
            .map_err(|err| LlmError::Request(err.to_string()))?;

        let mut builder = self
            .http
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .timeout(timeout)
            .json(&request);
        if let Some(referer) = &self.referer {
            builder = builder
                .header("HTTP-Referer", referer)
                .header("X-Title", "TAI Survey");
        }

        let response = builder
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    LlmError::Timeout(timeout)
                } else {
                    LlmError::Request(err.to_string())
                }
            })?
            .error_for_status()
            .map_err(|err| LlmError::Request(err.to_string()))?;

        let completion: CreateChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| LlmError::Request(err.to_string()))?;

        let content = completion
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(LlmError::Empty);
        }
        Ok(content)
    }
}

/// The single-turn message pair every completion request carries.
fn chat_messages(system_prompt: &str, user_prompt: &str) -> Vec<ChatCompletionRequestMessage> {
    vec![
        ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
            role: Role::System,
            content: system_prompt.to_string(),
            name: None,
        }),
        ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
            role: Role::User,
            content: ChatCompletionRequestUserMessageContent::Text(user_prompt.to_string()),
            name: None,
        }),
    ]
}

/// Every state the narrative call can be in. Exhausting `Fallback` means the
/// deterministic local template takes over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    PrimaryFirst,
    PrimaryRetry,
    Fallback,
}

impl Attempt {
    fn next(self) -> Option<Attempt> {
        match self {
            Attempt::PrimaryFirst => Some(Attempt::PrimaryRetry),
            Attempt::PrimaryRetry => Some(Attempt::Fallback),
            Attempt::Fallback => None,
        }
    }

    fn model(self, config: &LlmConfig) -> &str {
        match self {
            Attempt::Fallback => &config.fallback_model,
            _ => &config.model,
        }
    }
}

/// The narrative that ends up in a report, plus where it came from.
#[derive(Debug, Clone)]
pub struct Narrative {
    pub text: String,
    pub model: String,
    pub provider: &'static str,
}

/// Produces the analysis narrative for a scored survey. Tries the primary
/// model twice and the fallback model once, then falls back to a local
/// template, so the caller always gets a non-empty text.
pub async fn generate_narrative(
    client: &dyn CompletionClient,
    config: &LlmConfig,
    prompts: &PromptConfig,
    scores: &BTreeMap<Indicator, f64>,
    overall: f64,
) -> Narrative {
    let user_prompt = build_analysis_prompt(prompts, scores);
    let mut attempt = Attempt::PrimaryFirst;

    loop {
        let model = attempt.model(config);
        match client
            .complete(prompts.system_prompt(), &user_prompt, model, config.timeout)
            .await
        {
            Ok(text) => {
                return Narrative {
                    text,
                    model: model.to_string(),
                    provider: "openrouter",
                }
            }
            Err(err) => {
                tracing::warn!("Narrative attempt {attempt:?} with model {model} failed: {err}");
                match attempt.next() {
                    Some(next) => {
                        tokio::time::sleep(config.retry_delay).await;
                        attempt = next;
                    }
                    None => {
                        tracing::warn!("All narrative attempts failed, using the local template");
                        return Narrative {
                            text: fallback_narrative(scores, overall),
                            model: "deterministic-fallback".to_string(),
                            provider: "local",
                        };
                    }
                }
            }
        }
    }
}

/// Renders the user prompt: configured background, then the countable
/// indicators ranked from highest to lowest attainment, then the not
/// applicable ones, then the report-format instruction.
pub fn build_analysis_prompt(prompts: &PromptConfig, scores: &BTreeMap<Indicator, f64>) -> String {
    let mut ranked: Vec<(Indicator, f64)> = scores
        .iter()
        .filter(|(_, score)| **score != NOT_APPLICABLE && !score.is_nan())
        .map(|(indicator, score)| (*indicator, *score))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let not_applicable: Vec<Indicator> = scores
        .iter()
        .filter(|(_, score)| **score == NOT_APPLICABLE)
        .map(|(indicator, _)| *indicator)
        .collect();

    let mut prompt = String::new();
    if !prompts.background.trim().is_empty() {
        prompt.push_str(prompts.background.trim());
        prompt.push_str("\n\n");
    }

    prompt.push_str("Attainment of the assessed indicators, ranked from highest to lowest:\n");
    for (indicator, score) in &ranked {
        prompt.push_str(&format!(
            "* [{}] {}: attainment {:.0}%\n",
            tier_phrase(*score),
            indicator.as_str(),
            score * 100.0
        ));
    }
    if ranked.is_empty() {
        prompt.push_str("* (no indicator received a countable answer)\n");
    }

    if !not_applicable.is_empty() {
        prompt.push_str("\nIndicators without countable answers, treated as not applicable:\n");
        for indicator in &not_applicable {
            prompt.push_str(&format!("* {}\n", indicator.as_str()));
        }
    }

    prompt.push_str(
        "\nWrite the assessment report in the structure the system prompt requires: \
         an overall summary, the strengths shown by the highest-ranked indicators, the risks \
         implied by the lowest-ranked ones, and the improvement plan as a Markdown table with \
         short-term (1-4 weeks), medium-term (1-3 months) and long-term (3-12 months) phases, \
         each row giving the stage, goal, key actions and acceptance criteria.",
    );
    prompt
}

// Prompt-side tier phrasing works on the 0..1 scale; sentinels are filtered
// out before it is called.
fn tier_phrase(score: f64) -> &'static str {
    if score >= 0.8 {
        "fully met"
    } else if score >= 0.6 {
        "mostly met"
    } else if score >= 0.4 {
        "partially met"
    } else {
        "not met"
    }
}

/// Local stand-in used when every model attempt failed. Names the overall
/// score and the strongest and weakest indicators so the report still says
/// something concrete.
pub fn fallback_narrative(scores: &BTreeMap<Indicator, f64>, overall: f64) -> String {
    let mut countable: Vec<(Indicator, f64)> = scores
        .iter()
        .filter(|(_, score)| **score != NOT_APPLICABLE && !score.is_nan())
        .map(|(indicator, score)| (*indicator, *score))
        .collect();
    countable.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    let preamble = format!(
        "AI analysis is unavailable right now (the language model could not be reached). \
         Overall score {overall:.2}."
    );

    match (countable.first(), countable.last()) {
        (Some((weakest, weakest_score)), Some((strongest, strongest_score))) => {
            if weakest == strongest {
                format!(
                    "{preamble} Only {} received a countable score ({:.2}). \
                     Generate the report again later for a full narrative.",
                    strongest.display_name(),
                    strongest_score
                )
            } else {
                format!(
                    "{preamble} Strongest indicator: {} ({:.2}). Needs the most attention: {} ({:.2}). \
                     Generate the report again later for a full narrative.",
                    strongest.display_name(),
                    strongest_score,
                    weakest.display_name(),
                    weakest_score
                )
            }
        }
        _ => format!(
            "{preamble} No indicator received a countable answer. \
             Generate the report again later for a full narrative."
        ),
    }
}

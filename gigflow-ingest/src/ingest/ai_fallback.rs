//! AI fallback parser
//!
//! Runs when heuristic confidence is below the configured threshold or a
//! critical field is missing. Sends subject, cleaned body and an explicit
//! reference date to a chat-completion endpoint and expects strict JSON back.
//! Every failure degrades to the heuristic result; nothing is raised to the
//! webhook caller.

use async_trait::async_trait;
use chrono::NaiveDate;
use gigflow_common::config::AiConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::patterns::RE_EMAIL;
use super::types::{ExtractedFields, FieldValue, HeuristicResult, Precision};
use crate::models::{parse_date_lenient, parse_time_lenient, ParseMethod};

/// Longest body excerpt sent to the model
const MAX_BODY_CHARS: usize = 6000;

const SYSTEM_PROMPT: &str = "You extract booking enquiry details for a working musician. \
Reply with a single JSON object and nothing else, using exactly these keys: \
clientName, clientEmail, clientPhone, eventDate, eventTime, eventEndTime, venue, \
venueAddress, eventType, gigType, estimatedValue, summary. \
Use null for anything not stated. eventDate is YYYY-MM-DD, resolved against the reference \
date given; times are 24-hour HH:MM. summary is one sentence.";

const STRICT_PROMPT: &str = "Your previous reply was not valid JSON for the required schema. \
Respond with ONLY a JSON object, no markdown fences, no commentary, no extra keys. \
Keys: clientName, clientEmail, clientPhone, eventDate, eventTime, eventEndTime, venue, \
venueAddress, eventType, gigType, estimatedValue, summary. Use null for unknown values. \
eventDate is YYYY-MM-DD; times are HH:MM.";

/// AI fallback errors
#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI fallback timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Malformed JSON: {0}")]
    MalformedJson(String),

    #[error("AI fallback not configured")]
    NotConfigured,
}

/// Chat-completion backend
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Return the raw text of the model's reply
    async fn complete(&self, system: &str, user: &str) -> Result<String, AiError>;
}

/// Client for OpenAI-compatible `/chat/completions` endpoints
pub struct OpenAiCompatibleClient {
    http_client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

impl OpenAiCompatibleClient {
    pub fn new(config: &AiConfig) -> Result<Self, AiError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(AiError::NotConfigured)?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AiError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompatibleClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, AiError> {
        let request = ChatRequest {
            model: &self.model,
            temperature: 0.0,
            messages: [
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
        };

        debug!(endpoint = %self.endpoint, model = %self.model, "Calling completion endpoint");

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AiError::Timeout
                } else {
                    AiError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AiError::Api(status.as_u16(), error_text));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| AiError::Network(e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AiError::MalformedJson("response has no message content".to_string()))
    }
}

/// Fixed schema the model must answer with
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AiExtraction {
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub client_phone: Option<String>,
    pub event_date: Option<String>,
    pub event_time: Option<String>,
    pub event_end_time: Option<String>,
    pub venue: Option<String>,
    pub venue_address: Option<String>,
    pub event_type: Option<String>,
    pub gig_type: Option<String>,
    pub estimated_value: Option<String>,
    pub summary: Option<String>,
}

/// Parse a model reply, tolerating surrounding markdown fences only
pub fn parse_reply(reply: &str) -> Result<AiExtraction, AiError> {
    let trimmed = reply.trim();
    let unfenced = match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.split_once('\n').map_or("", |(_, body)| body);
            rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
        }
        None => trimmed,
    };
    serde_json::from_str(unfenced).map_err(|e| AiError::MalformedJson(e.to_string()))
}

/// Final extraction after the optional fallback step
#[derive(Debug, Clone, PartialEq)]
pub struct RefinedExtraction {
    pub fields: ExtractedFields,
    pub confidence: f64,
    pub method: ParseMethod,
    pub response_needed: bool,
    /// Why the fallback degraded, if it did
    pub degraded_reason: Option<String>,
}

/// Language-model fallback for low-confidence extractions
#[derive(Clone)]
pub struct AiFallbackParser {
    client: Option<Arc<dyn CompletionClient>>,
    budget: Duration,
    threshold: f64,
}

impl AiFallbackParser {
    pub fn new(client: Option<Arc<dyn CompletionClient>>, budget: Duration, threshold: f64) -> Self {
        Self {
            client,
            budget,
            threshold,
        }
    }

    /// Build from configuration; a disabled or keyless config yields no client
    pub fn from_config(config: &AiConfig) -> Self {
        let client: Option<Arc<dyn CompletionClient>> = if config.is_usable() {
            match OpenAiCompatibleClient::new(config) {
                Ok(c) => Some(Arc::new(c)),
                Err(e) => {
                    warn!("AI fallback unavailable: {}", e);
                    None
                }
            }
        } else {
            info!("AI fallback disabled (not enabled or no API key)");
            None
        };
        Self::new(
            client,
            Duration::from_millis(config.timeout_ms),
            config.confidence_threshold,
        )
    }

    pub fn is_available(&self) -> bool {
        self.client.is_some()
    }

    /// Whether heuristic output is too weak to accept as-is
    pub fn should_run(&self, heuristic: &HeuristicResult) -> bool {
        heuristic.confidence < self.threshold || !heuristic.fields.missing_critical().is_empty()
    }

    /// Call the model within the time budget, retrying once on malformed JSON
    pub async fn parse(
        &self,
        subject: &str,
        body: &str,
        reference_date: NaiveDate,
    ) -> Result<AiExtraction, AiError> {
        let client = self.client.as_ref().ok_or(AiError::NotConfigured)?;
        let user_prompt = build_user_prompt(subject, body, reference_date);

        let attempt = async {
            let first = client.complete(SYSTEM_PROMPT, &user_prompt).await?;
            match parse_reply(&first) {
                Ok(parsed) => Ok(parsed),
                Err(AiError::MalformedJson(reason)) => {
                    warn!(reason = %reason, "AI reply was not valid JSON, retrying with strict prompt");
                    let second = client.complete(STRICT_PROMPT, &user_prompt).await?;
                    parse_reply(&second)
                }
                Err(e) => Err(e),
            }
        };

        match tokio::time::timeout(self.budget, attempt).await {
            Ok(result) => result,
            Err(_) => Err(AiError::Timeout),
        }
    }

    /// Accept the heuristic result or refine it through the model
    pub async fn refine(
        &self,
        heuristic: HeuristicResult,
        subject: &str,
        reference_date: NaiveDate,
    ) -> RefinedExtraction {
        if !self.should_run(&heuristic) {
            return RefinedExtraction {
                confidence: heuristic.confidence,
                fields: heuristic.fields,
                method: ParseMethod::Heuristic,
                response_needed: false,
                degraded_reason: None,
            };
        }

        if !self.is_available() {
            debug!(
                confidence = heuristic.confidence,
                "Heuristic result below threshold and no AI fallback configured"
            );
            return RefinedExtraction {
                confidence: heuristic.confidence,
                fields: heuristic.fields,
                method: ParseMethod::Heuristic,
                response_needed: true,
                degraded_reason: None,
            };
        }

        match self.parse(subject, &heuristic.cleaned_body, reference_date).await {
            Ok(ai) => {
                let fields = merge(heuristic.fields, &ai);
                let confidence = fields.confidence();
                let response_needed =
                    confidence < self.threshold || !fields.missing_critical().is_empty();
                info!(confidence, response_needed, "AI fallback refined extraction");
                RefinedExtraction {
                    fields,
                    confidence,
                    method: ParseMethod::AiAssisted,
                    response_needed,
                    degraded_reason: None,
                }
            }
            Err(e) => {
                warn!(error = %e, "AI fallback failed, keeping heuristic fields");
                RefinedExtraction {
                    fields: heuristic.fields,
                    confidence: 0.0,
                    method: ParseMethod::Degraded,
                    response_needed: true,
                    degraded_reason: Some(e.to_string()),
                }
            }
        }
    }
}

fn build_user_prompt(subject: &str, body: &str, reference_date: NaiveDate) -> String {
    let excerpt: String = body.chars().take(MAX_BODY_CHARS).collect();
    format!(
        "Reference date (today): {}\nSubject: {}\n\nMessage:\n{}",
        reference_date.format("%Y-%m-%d"),
        subject,
        excerpt
    )
}

/// Replace absent or fallback-precision slots with a model value
fn fill<T>(slot: &mut Option<FieldValue<T>>, candidate: Option<T>) {
    let replaceable = slot
        .as_ref()
        .map_or(true, |f| f.precision == Precision::Fallback);
    if let (true, Some(value)) = (replaceable, candidate) {
        *slot = Some(FieldValue::model(value));
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("null"))
        .map(str::to_string)
}

/// Merge model output over heuristic fields
///
/// Trusted heuristic matches are kept. Model dates and times that do not parse
/// are dropped rather than stored.
pub fn merge(mut fields: ExtractedFields, ai: &AiExtraction) -> ExtractedFields {
    fill(&mut fields.client_name, non_blank(&ai.client_name));
    fill(
        &mut fields.client_email,
        non_blank(&ai.client_email)
            .filter(|e| RE_EMAIL.is_match(e))
            .map(|e| e.to_ascii_lowercase()),
    );
    fill(&mut fields.client_phone, non_blank(&ai.client_phone));

    let date = non_blank(&ai.event_date).and_then(|d| parse_date_lenient(&d));
    if ai.event_date.is_some() && date.is_none() {
        debug!(raw = ?ai.event_date, "Discarding unparseable AI event date");
    }
    fill(&mut fields.event_date, date);
    fill(
        &mut fields.event_time,
        non_blank(&ai.event_time).and_then(|t| parse_time_lenient(&t)),
    );
    fill(
        &mut fields.event_end_time,
        non_blank(&ai.event_end_time).and_then(|t| parse_time_lenient(&t)),
    );
    fill(&mut fields.venue, non_blank(&ai.venue));
    fill(&mut fields.venue_address, non_blank(&ai.venue_address));
    fill(&mut fields.event_type, non_blank(&ai.event_type).map(|v| v.to_lowercase()));
    fill(&mut fields.gig_type, non_blank(&ai.gig_type).map(|v| v.to_lowercase()));
    fill(&mut fields.estimated_value, non_blank(&ai.estimated_value));
    if fields.summary.is_none() {
        fields.summary = non_blank(&ai.summary);
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::Provenance;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned replies and records the prompts it saw
    struct StubClient {
        replies: Mutex<VecDeque<Result<String, AiError>>>,
        prompts: Mutex<Vec<(String, String)>>,
        delay: Option<Duration>,
    }

    impl StubClient {
        fn new(replies: Vec<Result<String, AiError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
                delay: None,
            }
        }
    }

    #[async_trait]
    impl CompletionClient for StubClient {
        async fn complete(&self, system: &str, user: &str) -> Result<String, AiError> {
            self.prompts.lock().unwrap().push((system.to_string(), user.to_string()));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(AiError::Network("no more replies".to_string())))
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 16).unwrap()
    }

    fn weak_heuristic() -> HeuristicResult {
        let fields = ExtractedFields {
            client_email: Some(FieldValue::high("sam@example.com".to_string(), "from_header")),
            client_name: Some(FieldValue::fallback("Sam".to_string(), "local_part")),
            ..Default::default()
        };
        HeuristicResult {
            confidence: fields.confidence(),
            fields,
            provenance: Provenance::Direct,
            cleaned_body: "We'd love a band for our do next month".to_string(),
        }
    }

    fn parser(stub: Arc<StubClient>) -> AiFallbackParser {
        AiFallbackParser::new(Some(stub), Duration::from_secs(2), 0.6)
    }

    const GOOD_REPLY: &str = r#"{"clientName":"Sam Lee","clientEmail":null,"clientPhone":null,
        "eventDate":"2025-08-16","eventTime":"19:30","eventEndTime":null,"venue":"Town Hall",
        "venueAddress":null,"eventType":"Birthday","gigType":"band","estimatedValue":"£500",
        "summary":"Birthday party band booking."}"#;

    #[test]
    fn test_parse_reply_strips_fences() {
        let reply = format!("```json\n{}\n```", GOOD_REPLY);
        let parsed = parse_reply(&reply).unwrap();
        assert_eq!(parsed.venue.as_deref(), Some("Town Hall"));
    }

    #[test]
    fn test_parse_reply_rejects_unknown_keys() {
        let result = parse_reply(r#"{"clientName":"A","mood":"happy"}"#);
        assert!(matches!(result, Err(AiError::MalformedJson(_))));
    }

    #[test]
    fn test_merge_keeps_trusted_heuristics() {
        let mut fields = weak_heuristic().fields;
        fields.venue = Some(FieldValue::high("The Grand Hotel".to_string(), "at_phrase"));
        let ai = parse_reply(GOOD_REPLY).unwrap();
        let merged = merge(fields, &ai);
        assert_eq!(merged.venue.unwrap().value, "The Grand Hotel");
        let name = merged.client_name.unwrap();
        assert_eq!(name.value, "Sam Lee");
        assert_eq!(name.precision, Precision::Model);
        assert_eq!(merged.client_email.unwrap().value, "sam@example.com");
        assert_eq!(merged.event_type.unwrap().value, "birthday");
    }

    #[test]
    fn test_merge_discards_invalid_dates() {
        let ai = AiExtraction {
            event_date: Some("2025-02-30".to_string()),
            event_time: Some("7ish".to_string()),
            ..Default::default()
        };
        let merged = merge(ExtractedFields::default(), &ai);
        assert!(merged.event_date.is_none());
        assert!(merged.event_time.is_none());
    }

    #[tokio::test]
    async fn test_refine_uses_model_output() {
        let stub = Arc::new(StubClient::new(vec![Ok(GOOD_REPLY.to_string())]));
        let refined = parser(stub.clone()).refine(weak_heuristic(), "Party", today()).await;
        assert_eq!(refined.method, ParseMethod::AiAssisted);
        assert_eq!(
            refined.fields.event_date.unwrap().value,
            NaiveDate::from_ymd_opt(2025, 8, 16).unwrap()
        );
        assert!(refined.confidence > 0.6);
        assert!(!refined.response_needed);

        let prompts = stub.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].1.contains("Reference date (today): 2025-07-16"));
    }

    #[tokio::test]
    async fn test_malformed_json_retried_once_with_strict_prompt() {
        let stub = Arc::new(StubClient::new(vec![
            Ok("Sure! Here are the details: ...".to_string()),
            Ok(GOOD_REPLY.to_string()),
        ]));
        let refined = parser(stub.clone()).refine(weak_heuristic(), "Party", today()).await;
        assert_eq!(refined.method, ParseMethod::AiAssisted);

        let prompts = stub.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[1].0, STRICT_PROMPT);
    }

    #[tokio::test]
    async fn test_second_malformed_reply_degrades() {
        let stub = Arc::new(StubClient::new(vec![
            Ok("not json".to_string()),
            Ok("still not json".to_string()),
            Ok(GOOD_REPLY.to_string()),
        ]));
        let refined = parser(stub.clone()).refine(weak_heuristic(), "Party", today()).await;
        assert_eq!(refined.method, ParseMethod::Degraded);
        assert_eq!(refined.confidence, 0.0);
        assert!(refined.response_needed);
        // Heuristic fields survive
        assert_eq!(refined.fields.client_email.unwrap().value, "sam@example.com");
        assert_eq!(stub.prompts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_provider_error_is_not_retried() {
        let stub = Arc::new(StubClient::new(vec![
            Err(AiError::Api(503, "overloaded".to_string())),
            Ok(GOOD_REPLY.to_string()),
        ]));
        let refined = parser(stub.clone()).refine(weak_heuristic(), "Party", today()).await;
        assert_eq!(refined.method, ParseMethod::Degraded);
        assert!(refined.degraded_reason.unwrap().contains("503"));
        assert_eq!(stub.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_degrades() {
        let stub = Arc::new(StubClient {
            delay: Some(Duration::from_millis(500)),
            ..StubClient::new(vec![Ok(GOOD_REPLY.to_string())])
        });
        let parser = AiFallbackParser::new(Some(stub), Duration::from_millis(50), 0.6);
        let refined = parser.refine(weak_heuristic(), "Party", today()).await;
        assert_eq!(refined.method, ParseMethod::Degraded);
        assert_eq!(refined.degraded_reason.as_deref(), Some("AI fallback timed out"));
    }

    #[tokio::test]
    async fn test_confident_heuristics_skip_model() {
        let stub = Arc::new(StubClient::new(vec![]));
        let fields = ExtractedFields {
            client_name: Some(FieldValue::high("Jane Doe".to_string(), "display_name")),
            client_email: Some(FieldValue::high("jane@example.com".to_string(), "from_header")),
            event_date: Some(FieldValue::high(today(), "label")),
            venue: Some(FieldValue::high("Hall".to_string(), "label")),
            ..Default::default()
        };
        let heuristic = HeuristicResult {
            confidence: fields.confidence(),
            fields,
            provenance: Provenance::Direct,
            cleaned_body: String::new(),
        };
        let refined = parser(stub.clone()).refine(heuristic, "", today()).await;
        assert_eq!(refined.method, ParseMethod::Heuristic);
        assert!(!refined.response_needed);
        assert!(stub.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_parser_flags_for_review() {
        let parser = AiFallbackParser::new(None, Duration::from_secs(1), 0.6);
        let refined = parser.refine(weak_heuristic(), "Party", today()).await;
        assert_eq!(refined.method, ParseMethod::Heuristic);
        assert!(refined.response_needed);
    }
}

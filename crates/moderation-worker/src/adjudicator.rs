//! AI adjudicator: second opinion on items the escalation policy could not
//! settle locally.
//!
//! Every failure mode (timeout, transport, throttling, unparseable output)
//! comes back as [`AiUnavailable`]; the caller resolves library-only.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use moderation::{AiUnavailable, ComplaintItem, Priority, SeverityLevel, SeverityVerdict};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::AdjudicatorEndpoint;
use crate::store::{SubmitterHistory, HISTORY_WINDOW_DAYS};

const SYSTEM_PROMPT: &str = "You are a professional content moderator. \
Assess customer complaints for toxicity, threats, personal attacks and profanity. \
Respond with a single JSON object and nothing else.";

const MAX_TOKENS: u32 = 800;

static JSON_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("JSON_OBJECT regex should compile"));

/// What the adjudicator is told about a complaint besides its text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AiContext {
    pub submitter_id: Option<String>,
    pub category: Option<String>,
    pub priority: Priority,
    pub history: SubmitterHistory,
}

impl AiContext {
    pub fn for_item(item: &ComplaintItem, history: SubmitterHistory) -> Self {
        Self {
            submitter_id: item.metadata.submitter_id.clone(),
            category: item.metadata.category.clone(),
            priority: item.metadata.priority,
            history,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Second-opinion verdict for `text`, given the local verdict and what
    /// is known about the submitter. Must return within `timeout`.
    async fn infer(
        &self,
        text: &str,
        local: &SeverityVerdict,
        context: &AiContext,
        timeout: Duration,
    ) -> Result<SeverityVerdict, AiUnavailable>;
}

/// Stand-in used when no endpoint is configured.
pub struct DisabledAdjudicator;

#[async_trait]
impl InferenceProvider for DisabledAdjudicator {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn infer(
        &self,
        _text: &str,
        _local: &SeverityVerdict,
        _context: &AiContext,
        _timeout: Duration,
    ) -> Result<SeverityVerdict, AiUnavailable> {
        Err(AiUnavailable::Disabled)
    }
}

/// OpenAI-compatible chat-completions adjudicator.
pub struct HttpAdjudicator {
    client: reqwest::Client,
    endpoint: AdjudicatorEndpoint,
    name: String,
}

impl HttpAdjudicator {
    pub fn new(endpoint: AdjudicatorEndpoint) -> Self {
        Self::with_client(endpoint, reqwest::Client::new())
    }

    pub fn with_client(endpoint: AdjudicatorEndpoint, client: reqwest::Client) -> Self {
        let name = format!("http:{}", endpoint.model);
        Self {
            client,
            endpoint,
            name,
        }
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.endpoint.url.trim_end_matches('/')
        )
    }

    async fn call(
        &self,
        text: &str,
        local: &SeverityVerdict,
        context: &AiContext,
        timeout: Duration,
    ) -> Result<String, AiUnavailable> {
        let body = ChatRequest {
            model: &self.endpoint.model,
            temperature: 0.0,
            max_tokens: MAX_TOKENS,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: build_prompt(text, local, context),
                },
            ],
        };

        let mut request = self
            .client
            .post(self.completions_url())
            .timeout(timeout)
            .json(&body);
        if let Some(key) = &self.endpoint.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(e, timeout))?;
        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AiUnavailable::Throttled(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(AiUnavailable::Transport(format!("HTTP {status}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AiUnavailable::Malformed(format!("response body: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AiUnavailable::Malformed("response has no choices".into()))
    }
}

#[async_trait]
impl InferenceProvider for HttpAdjudicator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn infer(
        &self,
        text: &str,
        local: &SeverityVerdict,
        context: &AiContext,
        timeout: Duration,
    ) -> Result<SeverityVerdict, AiUnavailable> {
        let timeout_ms = timeout.as_millis() as u64;
        let call = self.call(text, local, context, timeout);
        let content = match tokio::time::timeout(timeout, call).await {
            Ok(result) => result?,
            Err(_) => return Err(AiUnavailable::Timeout { timeout_ms }),
        };
        debug!(adjudicator = %self.name, chars = content.len(), "AI adjudicator responded");
        parse_verdict(&content).map_err(|e| {
            warn!(adjudicator = %self.name, error = %e, "Discarding AI response");
            e
        })
    }
}

fn transport_error(e: reqwest::Error, timeout: Duration) -> AiUnavailable {
    if e.is_timeout() {
        AiUnavailable::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        AiUnavailable::Transport(e.to_string())
    }
}

fn build_prompt(text: &str, local: &SeverityVerdict, context: &AiContext) -> String {
    let concerns = if local.concerns.is_empty() {
        "none".to_string()
    } else {
        local.concerns.join("; ")
    };
    format!(
        "Analyze this customer complaint.\n\n\
         Submitter context:\n\
         - Submitter ID: {submitter}\n\
         - Complaints in the last {HISTORY_WINDOW_DAYS} days: {complaints} ({flagged} flagged)\n\
         - Complaint category: {category}\n\
         - Priority: {priority}\n\n\
         Automated screening: severity {level} (score {score:.2}), signals: {concerns}\n\n\
         Text to analyze:\n\"{text}\"\n\n\
         Respond in JSON format:\n\
         {{\n\
         \x20 \"toxicity_score\": <0-10>,\n\
         \x20 \"threat_level\": \"NONE|LOW|MEDIUM|HIGH|CRITICAL\",\n\
         \x20 \"urgency\": \"LOW|MEDIUM|HIGH|CRITICAL\",\n\
         \x20 \"content_issues\": [<list>],\n\
         \x20 \"summary\": \"<explanation>\",\n\
         \x20 \"confidence\": <0-1>,\n\
         \x20 \"requires_human_review\": <true/false>\n\
         }}",
        submitter = context.submitter_id.as_deref().unwrap_or("unknown"),
        complaints = context.history.complaint_count,
        flagged = context.history.flagged_count,
        category = context.category.as_deref().unwrap_or("general"),
        priority = context.priority,
        level = local.level,
        score = local.score,
    )
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f64,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// The assessment object the model is asked to produce.
#[derive(Debug, Deserialize)]
struct AiAssessment {
    toxicity_score: f64,
    #[serde(default)]
    threat_level: Option<String>,
    #[serde(default)]
    urgency: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    content_issues: Vec<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    requires_human_review: bool,
}

/// Parse model output into an `ai_enhanced` verdict.
///
/// The first `{...}` span is taken, so prose around the JSON is tolerated.
/// Level is the higher of `threat_level` and `urgency`.
pub fn parse_verdict(content: &str) -> Result<SeverityVerdict, AiUnavailable> {
    let json = JSON_OBJECT
        .find(content)
        .ok_or_else(|| AiUnavailable::Malformed("no JSON object in response".into()))?;
    let assessment: AiAssessment = serde_json::from_str(json.as_str())
        .map_err(|e| AiUnavailable::Malformed(format!("assessment: {e}")))?;

    if !assessment.toxicity_score.is_finite() {
        return Err(AiUnavailable::Malformed("toxicity_score is not finite".into()));
    }

    let level = [&assessment.threat_level, &assessment.urgency]
        .into_iter()
        .flatten()
        .filter_map(|l| l.parse::<SeverityLevel>().ok())
        .max()
        .ok_or_else(|| AiUnavailable::Malformed("no recognised threat_level or urgency".into()))?;

    let mut concerns = assessment.content_issues;
    if let Some(summary) = assessment.summary.filter(|s| !s.trim().is_empty()) {
        concerns.push(summary);
    }
    if assessment.requires_human_review {
        concerns.push("AI recommends human review".to_string());
    }

    Ok(SeverityVerdict::ai_enhanced(
        (assessment.toxicity_score / 10.0).clamp(0.0, 1.0),
        level,
        assessment.confidence.filter(|c| c.is_finite()).unwrap_or(0.5),
        concerns,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use moderation::{AnalysisMethod, SignalScore};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn local() -> SeverityVerdict {
        SeverityVerdict {
            score: 0.4,
            level: SeverityLevel::Medium,
            signals: vec![SignalScore::available("pattern", 0.5, vec!["crap".into()])],
            method: AnalysisMethod::LibraryOnly,
            confidence: 0.6,
            concerns: vec!["pattern score 0.50 (1 term(s): crap)".into()],
        }
    }

    #[test]
    fn test_parses_json_wrapped_in_prose() {
        let content = r#"Here is my analysis:
{"toxicity_score": 8, "threat_level": "HIGH", "urgency": "CRITICAL",
 "content_issues": ["personal attack"], "summary": "Direct insult", "confidence": 0.85,
 "requires_human_review": true}
Let me know if you need more."#;
        let verdict = parse_verdict(content).unwrap();
        assert_eq!(verdict.method, AnalysisMethod::AiEnhanced);
        assert_eq!(verdict.score, 0.8);
        assert_eq!(verdict.level, SeverityLevel::Critical);
        assert_eq!(verdict.confidence, 0.85);
        assert_eq!(
            verdict.concerns,
            vec![
                "personal attack".to_string(),
                "Direct insult".to_string(),
                "AI recommends human review".to_string(),
            ]
        );
    }

    #[test]
    fn test_missing_confidence_defaults_to_half() {
        let verdict = parse_verdict(r#"{"toxicity_score": 2, "threat_level": "low"}"#).unwrap();
        assert_eq!(verdict.confidence, 0.5);
        assert_eq!(verdict.level, SeverityLevel::Low);
    }

    #[test]
    fn test_toxicity_is_clamped() {
        let verdict = parse_verdict(r#"{"toxicity_score": 14, "urgency": "HIGH"}"#).unwrap();
        assert_eq!(verdict.score, 1.0);
    }

    #[test]
    fn test_rejects_unusable_output() {
        assert!(matches!(
            parse_verdict("I cannot help with that."),
            Err(AiUnavailable::Malformed(_))
        ));
        assert!(matches!(
            parse_verdict(r#"{"threat_level": "HIGH"}"#),
            Err(AiUnavailable::Malformed(_))
        ));
        assert!(matches!(
            parse_verdict(r#"{"toxicity_score": 5, "threat_level": "SEVERE"}"#),
            Err(AiUnavailable::Malformed(_))
        ));
    }

    #[test]
    fn test_prompt_carries_local_verdict() {
        let prompt = build_prompt("you are useless", &local(), &AiContext::default());
        assert!(prompt.contains("severity MEDIUM (score 0.40)"));
        assert!(prompt.contains("\"you are useless\""));
        assert!(prompt.contains("\"toxicity_score\": <0-10>"));
        assert!(prompt.contains("- Submitter ID: unknown"));
        assert!(prompt.contains("- Complaint category: general"));
    }

    #[test]
    fn test_prompt_carries_submitter_context() {
        let mut item = ComplaintItem::pending("c-1", "you are useless");
        item.metadata.submitter_id = Some("user-12".into());
        item.metadata.category = Some("billing".into());
        item.metadata.priority = Priority::High;
        let history = SubmitterHistory {
            complaint_count: 4,
            flagged_count: 2,
            last_complaint: None,
        };

        let context = AiContext::for_item(&item, history);
        let prompt = build_prompt("you are useless", &local(), &context);
        assert!(prompt.contains("- Submitter ID: user-12"));
        assert!(prompt.contains("- Complaints in the last 90 days: 4 (2 flagged)"));
        assert!(prompt.contains("- Complaint category: billing"));
        assert!(prompt.contains(&format!("- Priority: {}", Priority::High)));
    }

    #[tokio::test]
    async fn test_disabled_adjudicator_is_unavailable() {
        let result = DisabledAdjudicator
            .infer("text", &local(), &AiContext::default(), Duration::from_secs(1))
            .await;
        assert_eq!(result, Err(AiUnavailable::Disabled));
    }

    /// Serve one canned HTTP response after reading the full request.
    async fn serve_once(status_line: &'static str, body: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if buf.len() >= end + 4 + length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        format!("http://{addr}/v1")
    }

    fn adjudicator(url: String) -> HttpAdjudicator {
        let endpoint = AdjudicatorEndpoint {
            url,
            model: "judge".into(),
            api_key: Some("token".into()),
        };
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        HttpAdjudicator::with_client(endpoint, client)
    }

    #[tokio::test]
    async fn test_http_adjudicator_round_trip() {
        let content = r#"{"toxicity_score": 9, "threat_level": "CRITICAL", "confidence": 0.9}"#;
        let body = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })
        .to_string();
        let url = serve_once("200 OK", body).await;

        let verdict = adjudicator(url)
            .infer(
                "you are useless",
                &local(),
                &AiContext::default(),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert_eq!(verdict.level, SeverityLevel::Critical);
        assert_eq!(verdict.score, 0.9);
    }

    #[tokio::test]
    async fn test_http_429_is_throttled() {
        let url = serve_once("429 Too Many Requests", "{}".into()).await;
        let result = adjudicator(url)
            .infer("text", &local(), &AiContext::default(), Duration::from_secs(5))
            .await;
        assert!(matches!(result, Err(AiUnavailable::Throttled(_))));
    }

    async fn silent_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });
        format!("http://{addr}/v1")
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let result = adjudicator(silent_server().await)
            .infer(
                "text",
                &local(),
                &AiContext::default(),
                Duration::from_millis(100),
            )
            .await;
        assert_eq!(result, Err(AiUnavailable::Timeout { timeout_ms: 100 }));
    }

    #[tokio::test]
    async fn test_client_timeout_reports_the_budget() {
        let result = adjudicator(silent_server().await)
            .call(
                "text",
                &local(),
                &AiContext::default(),
                Duration::from_millis(150),
            )
            .await;
        assert_eq!(result, Err(AiUnavailable::Timeout { timeout_ms: 150 }));
    }
}

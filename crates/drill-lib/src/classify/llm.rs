//! Language-model shortlist delegate
//!
//! Sends the two statistics maps to an OpenAI-compatible chat completions
//! endpoint and expects a bare list literal such as `['rrt', 'timeout']`
//! in reply.

use super::shortlist::{ShortlistDelegate, StatsMap};
use crate::error::DelegateError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;

const SYSTEM_PROMPT: &str = "You compare service golden-signal statistics between a normal \
period and a fault period and name the metrics whose behaviour changed in a way that matters \
for fault diagnosis.";

/// Configuration for the HTTP delegate
#[derive(Debug, Clone)]
pub struct HttpShortlistConfig {
    /// Full chat completions URL
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Transport-level timeout; the engine applies its own per-call timeout too
    pub request_timeout: Duration,
}

/// Shortlist delegate backed by a chat completions endpoint
pub struct HttpShortlist {
    client: Client,
    config: HttpShortlistConfig,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

impl HttpShortlist {
    pub fn new(config: HttpShortlistConfig) -> Result<Self, DelegateError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { client, config })
    }

    fn user_prompt(normal: &StatsMap, fault: &StatsMap) -> Result<String, DelegateError> {
        let normal = serde_json::to_string(normal).map_err(|e| DelegateError::Parse(e.to_string()))?;
        let fault = serde_json::to_string(fault).map_err(|e| DelegateError::Parse(e.to_string()))?;
        Ok(format!(
            "Compare the normal-period and fault-period metric statistics and return the list \
of abnormal metrics formatted as ['metric1','metric2'], with no other text or explanation.\n\
Normal period statistics: {}\nFault period statistics: {}",
            normal, fault
        ))
    }
}

#[async_trait]
impl ShortlistDelegate for HttpShortlist {
    fn name(&self) -> &str {
        "llm"
    }

    async fn shortlist(
        &self,
        entity: &str,
        normal: &StatsMap,
        fault: &StatsMap,
    ) -> Result<BTreeSet<String>, DelegateError> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: Self::user_prompt(normal, fault)?,
                },
            ],
            temperature: 0.0,
        };

        let mut request = self.client.post(&self.config.endpoint).json(&body);
        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DelegateError::Status { status, body });
        }

        let reply: ChatResponse = response.json().await?;
        let content = reply
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| DelegateError::Parse("reply has no choices".to_string()))?;

        debug!(entity = %entity, reply = %content, "Shortlist delegate replied");
        ensure_known(parse_metric_list(&content)?, normal, fault)
    }
}

/// Parse a list literal like `['a', "b"]`, tolerating surrounding text
///
/// A leading `<think>...</think>` block is ignored and the last list in the
/// remaining text is taken, since reasoning preambles may contain brackets.
pub fn parse_metric_list(text: &str) -> Result<BTreeSet<String>, DelegateError> {
    let answer = strip_reasoning(text);
    let end = answer
        .rfind(']')
        .ok_or_else(|| DelegateError::Parse(format!("no list in reply: {}", text)))?;
    let start = answer[..end]
        .rfind('[')
        .ok_or_else(|| DelegateError::Parse(format!("unterminated list in reply: {}", text)))?;

    Ok(answer[start + 1..end]
        .split(',')
        .map(|item| item.trim().trim_matches(|c| c == '\'' || c == '"' || c == '`').trim())
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect())
}

fn strip_reasoning(text: &str) -> &str {
    const CLOSE: &str = "</think>";
    let trimmed = text.trim_start();
    if !trimmed.starts_with("<think>") {
        return text;
    }
    match trimmed.find(CLOSE) {
        Some(pos) => &trimmed[pos + CLOSE.len()..],
        // reasoning never closed, nothing after it is an answer
        None => "",
    }
}

/// A non-empty reply must name at least one metric that was sent
fn ensure_known(
    parsed: BTreeSet<String>,
    normal: &StatsMap,
    fault: &StatsMap,
) -> Result<BTreeSet<String>, DelegateError> {
    if parsed.is_empty() || parsed.iter().any(|m| normal.contains_key(m) || fault.contains_key(m)) {
        return Ok(parsed);
    }
    Err(DelegateError::Parse(format!(
        "reply names no known metric: {:?}",
        parsed
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::summarize;

    fn config(endpoint: String) -> HttpShortlistConfig {
        HttpShortlistConfig {
            endpoint,
            model: "test-model".to_string(),
            api_key: Some("secret".to_string()),
            request_timeout: Duration::from_secs(5),
        }
    }

    fn stats_maps() -> (StatsMap, StatsMap) {
        let mut normal = StatsMap::new();
        let mut fault = StatsMap::new();
        normal.insert("rrt".into(), summarize(&[1.0, 2.0, 3.0]).unwrap());
        fault.insert("rrt".into(), summarize(&[9.0, 9.5, 10.0]).unwrap());
        (normal, fault)
    }

    #[test]
    fn test_parse_metric_list() {
        let parsed = parse_metric_list("['rrt', \"timeout\" , `error_ratio`]").unwrap();
        assert_eq!(parsed.len(), 3);
        assert!(parsed.contains("timeout"));

        let wrapped = parse_metric_list("Abnormal metrics: ['request']\n").unwrap();
        assert_eq!(wrapped.into_iter().collect::<Vec<_>>(), vec!["request"]);

        assert!(parse_metric_list("[]").unwrap().is_empty());
        assert!(parse_metric_list("none of them").is_err());
        assert!(parse_metric_list("['rrt'").is_err());
    }

    #[test]
    fn test_parse_skips_reasoning_block() {
        let reply = "<think>rrt rose, request [normal range] did not</think>\n['rrt']";
        let parsed = parse_metric_list(reply).unwrap();
        assert_eq!(parsed.into_iter().collect::<Vec<_>>(), vec!["rrt"]);

        // the last list wins when the answer restates an earlier one
        let restated = parse_metric_list("Candidates [a, b]. Final: ['timeout']").unwrap();
        assert_eq!(restated.into_iter().collect::<Vec<_>>(), vec!["timeout"]);

        assert!(parse_metric_list("<think>maybe ['rrt']").is_err());
    }

    #[test]
    fn test_unknown_names_are_rejected() {
        let (normal, fault) = stats_maps();
        let junk: BTreeSet<String> = ["normal range".to_string()].into_iter().collect();
        assert!(matches!(
            ensure_known(junk, &normal, &fault),
            Err(DelegateError::Parse(_))
        ));

        assert!(ensure_known(BTreeSet::new(), &normal, &fault).unwrap().is_empty());
        let mixed: BTreeSet<String> = ["rrt".to_string(), "latency".to_string()].into_iter().collect();
        assert_eq!(ensure_known(mixed, &normal, &fault).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_http_shortlist_junk_reply_is_parse_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"Changed: [normal range]"}}]}"#)
            .create_async()
            .await;

        let delegate =
            HttpShortlist::new(config(format!("{}/v1/chat/completions", server.url()))).unwrap();
        let (normal, fault) = stats_maps();
        let err = delegate.shortlist("frontend", &normal, &fault).await.unwrap_err();
        assert!(matches!(err, DelegateError::Parse(_)));
    }

    #[tokio::test]
    async fn test_http_shortlist_parses_reply() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"['rrt']"}}]}"#)
            .create_async()
            .await;

        let delegate =
            HttpShortlist::new(config(format!("{}/v1/chat/completions", server.url()))).unwrap();
        let (normal, fault) = stats_maps();
        let result = delegate.shortlist("frontend", &normal, &fault).await.unwrap();

        mock.assert_async().await;
        assert_eq!(result.into_iter().collect::<Vec<_>>(), vec!["rrt"]);
    }

    #[tokio::test]
    async fn test_http_shortlist_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let delegate =
            HttpShortlist::new(config(format!("{}/v1/chat/completions", server.url()))).unwrap();
        let (normal, fault) = stats_maps();
        let err = delegate.shortlist("frontend", &normal, &fault).await.unwrap_err();

        match err {
            DelegateError::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}

//! VOI API client: one POST per correlated request, mapped to a user-facing outcome.
//!
//! A single attempt per message, no retries, no timeout override. Errors are
//! logged for operators and collapsed into fixed localized replies; raw detail
//! never reaches the chat user.

use crate::correlate::CorrelatedRequest;
use serde::Deserialize;

/// Path of the answering endpoint, appended to the configured base URL.
pub const REPORT_PATH: &str = "/api/v1/kksb-report";

/// Header carrying the correlation id (duplicated from the rquId body field).
pub const TRACE_HEADER: &str = "x-trace-id";

/// Reply when the outbound call fails at the HTTP level.
pub const FAILURE_REPLY: &str =
    "Произошла ошибка при обращении к сервису. Пожалуйста, попробуйте позже.";

/// Reply when the API answers but carries no usable answer.
pub const NO_ANSWER_REPLY: &str = "К сожалению, я не смог получить ответ. Попробуйте позже.";

#[derive(Debug, thiserror::Error)]
pub enum VoiError {
    #[error("voi request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("voi api error: {0}")]
    Api(String),
}

/// Response body contract of the VOI API. Only the first message element is consumed.
#[derive(Debug, Deserialize)]
pub struct RelayResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Vec<RelayAnswer>,
}

#[derive(Debug, Deserialize)]
pub struct RelayAnswer {
    #[serde(default)]
    pub answer: String,
}

/// Result of relaying one inbound message. Exactly one outcome per message,
/// each mapped 1:1 to one chat reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// The API returned an answer; reply with it verbatim.
    Answered(String),
    /// The API responded but had no answer (success false or empty message list).
    NoAnswer,
    /// The outbound call failed (network error, non-2xx, malformed body).
    Failure,
}

impl ReplyOutcome {
    /// Text to send back to the chat for this outcome.
    pub fn reply_text(&self) -> &str {
        match self {
            ReplyOutcome::Answered(answer) => answer,
            ReplyOutcome::NoAnswer => NO_ANSWER_REPLY,
            ReplyOutcome::Failure => FAILURE_REPLY,
        }
    }
}

/// Client for the VOI answering API.
#[derive(Clone)]
pub struct VoiClient {
    base_url: String,
    client: reqwest::Client,
}

impl VoiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Configured base URL (as reported by the health endpoint).
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST the correlated request to the answering endpoint. The correlation id
    /// travels both as the rquId body field and the x-trace-id header.
    async fn ask(&self, request: &CorrelatedRequest) -> Result<RelayResponse, VoiError> {
        let url = format!("{}{}", self.base_url, REPORT_PATH);
        let res = self
            .client
            .post(&url)
            .header(TRACE_HEADER, &request.rqu_id)
            .json(request)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(VoiError::Api(format!("{} {}", status, body)));
        }
        let data: RelayResponse = res.json().await?;
        Ok(data)
    }

    /// Relay one correlated request: a single attempt, mapped onto a ReplyOutcome.
    /// Failures are logged here with the correlation id; callers only see the outcome.
    pub async fn relay(&self, request: &CorrelatedRequest) -> ReplyOutcome {
        match self.ask(request).await {
            Ok(data) => match data.message.into_iter().next() {
                Some(first) if data.success => ReplyOutcome::Answered(first.answer),
                _ => {
                    log::warn!("voi api returned no answer (rquId {})", request.rqu_id);
                    ReplyOutcome::NoAnswer
                }
            },
            Err(e) => {
                log::warn!("voi api call failed (rquId {}): {}", request.rqu_id, e);
                ReplyOutcome::Failure
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_text_for_fixed_outcomes() {
        assert_eq!(ReplyOutcome::NoAnswer.reply_text(), NO_ANSWER_REPLY);
        assert_eq!(ReplyOutcome::Failure.reply_text(), FAILURE_REPLY);
        assert_eq!(ReplyOutcome::Answered("ответ".to_string()).reply_text(), "ответ");
    }

    #[test]
    fn response_parses_leniently() {
        let data: RelayResponse = serde_json::from_str(r#"{"success":false}"#).expect("parse");
        assert!(!data.success);
        assert!(data.message.is_empty());

        let data: RelayResponse =
            serde_json::from_str(r#"{"success":true,"message":[{"answer":"X"},{"answer":"Y"}]}"#)
                .expect("parse");
        assert!(data.success);
        assert_eq!(data.message.len(), 2);
        assert_eq!(data.message[0].answer, "X");
    }
}

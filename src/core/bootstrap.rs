//! One-shot priming request sent alongside channel establishment.

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, info};

use crate::api::{truncate_for_log, BootstrapAck, BootstrapRequest};
use crate::core::error::BootstrapError;

const BOOTSTRAP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct BootstrapClient {
    client: reqwest::Client,
    url: String,
}

impl BootstrapClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, BootstrapError> {
        let url = url.into();
        reqwest::Url::parse(&url).map_err(|err| BootstrapError::InvalidUrl {
            url: url.clone(),
            message: err.to_string(),
        })?;
        let client = reqwest::Client::builder()
            .connect_timeout(BOOTSTRAP_CONNECT_TIMEOUT.min(timeout))
            .timeout(timeout)
            .build()?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Posts `{"context": context}` and returns the service's acknowledgement.
    ///
    /// A non-2xx status and an acknowledgement carrying an `error` field are
    /// both failures.
    pub async fn prime(&self, context: &Value) -> Result<BootstrapAck, BootstrapError> {
        debug!(url = %self.url, "Sending bootstrap request");
        let response = self
            .client
            .post(&self.url)
            .json(&BootstrapRequest { context })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let ack: BootstrapAck = response.json().await?;
        if let Some(error) = ack.error.as_deref().filter(|error| !error.trim().is_empty()) {
            return Err(BootstrapError::Rejected(collapse_whitespace(error)));
        }
        info!(
            url = %self.url,
            summary = ack.summary_text().is_some(),
            "Bootstrap acknowledged"
        );
        Ok(ack)
    }
}

impl BootstrapAck {
    /// Text worth showing to the user: the `summary`, or the follow-up
    /// `next_question` some services send instead.
    pub fn summary_text(&self) -> Option<&str> {
        self.summary
            .as_deref()
            .or_else(|| self.extra.get("next_question").and_then(Value::as_str))
            .filter(|text| !text.trim().is_empty())
    }
}

fn status_error(status: StatusCode, body: &str) -> BootstrapError {
    let trimmed = body.trim();
    let body = serde_json::from_str::<Value>(trimmed)
        .ok()
        .and_then(|value| extract_error_summary(&value))
        .filter(|summary| !summary.is_empty())
        .unwrap_or_else(|| {
            if trimmed.is_empty() {
                "<empty>".to_string()
            } else {
                truncate_for_log(trimmed)
            }
        });
    BootstrapError::Status {
        status: status.as_u16(),
        body,
    }
}

fn extract_error_summary(value: &Value) -> Option<String> {
    value
        .pointer("/error/message")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                Value::String(s) => Some(s.to_string()),
                Value::Object(map) => map
                    .get("message")
                    .and_then(|message| message.as_str().map(str::to_owned)),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        })
        .map(|text| collapse_whitespace(&text))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> BootstrapClient {
        BootstrapClient::new(
            format!("{}/generate_response", server.uri()),
            Duration::from_secs(5),
        )
        .expect("valid client")
    }

    #[tokio::test]
    async fn prime_posts_context_and_returns_summary() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate_response"))
            .and(body_json(json!({"context": {"user_input": "Hi"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "user_input": "Hi",
                "summary": "Ready when you are."
            })))
            .expect(1)
            .mount(&server)
            .await;

        let ack = client_for(&server)
            .await
            .prime(&json!({"user_input": "Hi"}))
            .await
            .expect("bootstrap succeeds");
        assert_eq!(ack.summary_text(), Some("Ready when you are."));
        assert_eq!(ack.extra.get("user_input"), Some(&json!("Hi")));
    }

    #[tokio::test]
    async fn next_question_stands_in_for_a_missing_summary() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"next_question": "What is your name?"})),
            )
            .mount(&server)
            .await;

        let ack = client_for(&server).await.prime(&json!({})).await.unwrap();
        assert_eq!(ack.summary, None);
        assert_eq!(ack.summary_text(), Some("What is your name?"));
    }

    #[tokio::test]
    async fn error_field_is_a_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"error": "No user input provided."})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).await.prime(&json!({})).await.unwrap_err();
        assert!(
            matches!(&err, BootstrapError::Rejected(message) if message == "No user input provided.")
        );
    }

    #[tokio::test]
    async fn non_success_status_summarizes_the_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": {"message": "model   overloaded", "type": "server_error"}
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).await.prime(&json!({})).await.unwrap_err();
        match err {
            BootstrapError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "model overloaded");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn plain_text_error_bodies_are_kept() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("  not here \n"))
            .mount(&server)
            .await;

        let err = client_for(&server).await.prime(&json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "bootstrap returned HTTP 404: not here");
    }

    #[tokio::test]
    async fn unreachable_service_is_a_request_error() {
        let client = BootstrapClient::new(
            "http://127.0.0.1:9/generate_response",
            Duration::from_secs(2),
        )
        .unwrap();
        let err = client.prime(&json!({})).await.unwrap_err();
        assert!(matches!(err, BootstrapError::Request(_)));
    }

    #[test]
    fn invalid_url_is_rejected_up_front() {
        let err = BootstrapClient::new("not a url", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, BootstrapError::InvalidUrl { .. }));
    }

    #[test]
    fn error_summary_prefers_nested_message() {
        let nested = json!({"error": {"message": "bad\n  request"}, "message": "outer"});
        assert_eq!(extract_error_summary(&nested).as_deref(), Some("bad request"));
        let flat = json!({"message": "outer"});
        assert_eq!(extract_error_summary(&flat).as_deref(), Some("outer"));
        assert_eq!(extract_error_summary(&json!({"status": "failed"})), None);
    }
}

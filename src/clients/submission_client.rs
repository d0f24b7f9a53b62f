//! 提交客户端
//!
//! 封装与提交端点的交互：POST 格式化答案，解析裁决结果
//!
//! ## 线上协议
//! - 请求：`POST <submissionUrl>`，JSON 体 `{email, secret, url, answer}`
//! - 响应：JSON `{correct, url?, reason?}`；
//!   无法解析为 JSON 的响应体按 `{correct: false, reason: <原文>}` 处理

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{Identity, SubmissionVerdict};
use crate::utils::truncate_text;

/// 提交能力接口
#[async_trait]
pub trait Submitter: Send + Sync {
    /// 提交格式化后的答案，返回裁决结果
    async fn submit(
        &self,
        submission_url: &str,
        answer: &str,
        identity: &Identity,
        question_url: &str,
    ) -> AppResult<SubmissionVerdict>;
}

/// 裁决结果的线上格式
#[derive(Debug, Deserialize)]
struct VerdictWire {
    #[serde(default)]
    correct: bool,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// 提交客户端
pub struct SubmissionClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl SubmissionClient {
    /// 创建提交客户端
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: Duration::from_millis(config.submission_timeout_ms),
        }
    }
}

#[async_trait]
impl Submitter for SubmissionClient {
    async fn submit(
        &self,
        submission_url: &str,
        answer: &str,
        identity: &Identity,
        question_url: &str,
    ) -> AppResult<SubmissionVerdict> {
        let payload = json!({
            "email": identity.email,
            "secret": identity.secret,
            "url": question_url,
            "answer": answer,
        });

        info!("📮 提交答案到: {}", submission_url);
        debug!("答案内容: {}", truncate_text(answer, 200));

        let response = self
            .client
            .post(submission_url)
            .header("Accept", "application/json")
            .json(&payload)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                warn!("提交请求失败: {}", e);
                AppError::submission_failed(submission_url, e)
            })?;

        let body = response
            .text()
            .await
            .map_err(|e| AppError::submission_failed(submission_url, e))?;

        debug!("提交响应原文: {}", truncate_text(&body, 500));

        Ok(parse_verdict_body(&body))
    }
}

/// 解析提交端点的响应体
///
/// 无法解析为 JSON 的响应体按"答错"处理，原文放入 reason
pub fn parse_verdict_body(body: &str) -> SubmissionVerdict {
    match serde_json::from_str::<VerdictWire>(body) {
        Ok(wire) => SubmissionVerdict {
            correct: wire.correct,
            next_url: wire.url,
            reason: wire.reason,
        },
        Err(_) => SubmissionVerdict {
            correct: false,
            next_url: None,
            reason: Some(body.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_verdict_correct_with_next_url() {
        let verdict = parse_verdict_body(r#"{"correct": true, "url": "https://x/q2"}"#);

        assert!(verdict.correct);
        assert_eq!(verdict.next_url, Some("https://x/q2".to_string()));
        assert_eq!(verdict.reason, None);
    }

    #[test]
    fn test_parse_verdict_incorrect_with_reason() {
        let verdict = parse_verdict_body(r#"{"correct": false, "reason": "wrong value"}"#);

        assert!(!verdict.correct);
        assert_eq!(verdict.next_url, None);
        assert_eq!(verdict.reason, Some("wrong value".to_string()));
    }

    #[test]
    fn test_parse_verdict_non_json_body() {
        let verdict = parse_verdict_body("Internal Server Error");

        assert!(!verdict.correct);
        assert_eq!(verdict.reason, Some("Internal Server Error".to_string()));
    }

    #[test]
    fn test_parse_verdict_missing_fields_default() {
        let verdict = parse_verdict_body("{}");

        assert!(!verdict.correct);
        assert_eq!(verdict.next_url, None);
    }

    #[tokio::test]
    async fn test_submit_posts_expected_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/submit"))
            .and(body_partial_json(serde_json::json!({
                "email": "student@example.com",
                "secret": "s3cret",
                "url": "https://quiz/q1",
                "answer": "42",
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"correct": true, "url": "https://quiz/q2"})),
            )
            .mount(&server)
            .await;

        let client = SubmissionClient::new(&Config::default());
        let identity = Identity::new("student@example.com", "s3cret");
        let verdict = client
            .submit(
                &format!("{}/submit", server.uri()),
                "42",
                &identity,
                "https://quiz/q1",
            )
            .await
            .unwrap();

        assert!(verdict.correct);
        assert_eq!(verdict.next_url, Some("https://quiz/q2".to_string()));
    }

    #[tokio::test]
    async fn test_submit_treats_plain_text_as_incorrect() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = SubmissionClient::new(&Config::default());
        let identity = Identity::new("a@b.c", "k");
        let verdict = client
            .submit(&server.uri(), "x", &identity, "https://quiz/q1")
            .await
            .unwrap();

        assert!(!verdict.correct);
        assert_eq!(verdict.reason, Some("boom".to_string()));
    }
}

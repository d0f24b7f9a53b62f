//! 外部 API 调用 - 业务能力层
//!
//! 只负责"按题目指示调用外部 API 并取回数据"能力，不关心流程

use std::time::Duration;

use regex::Regex;
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{AppError, AppResult, TransportError};

/// API 调用结果
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    /// JSON 响应解析为结构化值，其他响应包装为字符串
    pub data: JsonValue,
}

/// 外部 API 调用服务
pub struct ApiCallService {
    client: reqwest::Client,
    timeout: Duration,
    endpoint_patterns: Vec<Regex>,
    header_pattern: Regex,
}

impl ApiCallService {
    /// 创建 API 调用服务
    pub fn new(config: &Config) -> Self {
        let endpoint_patterns = [
            r#"(?i)(?:GET|POST|PUT|DELETE|PATCH)\s+(https?://[^\s"'<>]+)"#,
            r#"(?i)(?:call|request|fetch|api)(?s:.*?)(https?://[^\s"'<>]+)"#,
            r#"(?i)(https?://[^\s"'<>]*api[^\s"'<>]*)"#,
            r#"(?i)(https?://[^\s"'<>]*\.json)"#,
        ]
        .iter()
        .map(|p| Regex::new(p).expect("内置正则表达式必须合法"))
        .collect();

        Self {
            client: reqwest::Client::new(),
            timeout: Duration::from_millis(config.download_timeout_ms),
            endpoint_patterns,
            header_pattern: Regex::new(r#"([A-Za-z-]+)\s*:\s*["']?([^"'\n]+)["']?"#)
                .expect("内置正则表达式必须合法"),
        }
    }

    /// GET 调用一个端点
    pub async fn call(&self, url: &str) -> AppResult<ApiResponse> {
        self.call_with(url, "GET", &[]).await
    }

    /// 按指定方法和请求头调用端点
    pub async fn call_with(
        &self,
        url: &str,
        method: &str,
        headers: &[(String, String)],
    ) -> AppResult<ApiResponse> {
        info!("🔌 API 调用: {} {}", method, url);

        let mut request = if method.eq_ignore_ascii_case("POST") {
            self.client.post(url)
        } else {
            self.client.get(url)
        };
        request = request
            .header("User-Agent", "QuizSolver/1.0")
            .header("Accept", "application/json")
            .timeout(self.timeout);
        for (key, value) in headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| {
            AppError::Transport(TransportError::RequestFailed {
                url: url.to_string(),
                source: Box::new(e),
            })
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.text().await.map_err(|e| {
            AppError::Transport(TransportError::RequestFailed {
                url: url.to_string(),
                source: Box::new(e),
            })
        })?;

        let data = if content_type.contains("json") {
            serde_json::from_str(&body).unwrap_or(JsonValue::String(body))
        } else {
            JsonValue::String(body)
        };

        debug!("API 调用完成: HTTP {}", status);
        Ok(ApiResponse { status, data })
    }

    /// 按题目文字中的指示执行 API 调用
    ///
    /// 从文字中提取端点和请求头；文字里出现 post 时用 POST，否则 GET
    pub async fn execute_instructions(&self, instructions: &str) -> AppResult<ApiResponse> {
        let url = self.extract_endpoint(instructions).ok_or_else(|| {
            AppError::Other("题目中未找到 API 端点".to_string())
        })?;

        let headers = self.extract_headers(instructions);
        let method = if instructions.to_lowercase().contains("post") {
            "POST"
        } else {
            "GET"
        };

        info!("按题目指示调用 API: {} {}", method, url);
        self.call_with(&url, method, &headers).await
    }

    /// 从文字中提取 API 端点
    pub fn extract_endpoint(&self, text: &str) -> Option<String> {
        for pattern in &self.endpoint_patterns {
            if let Some(caps) = pattern.captures(text) {
                let url = caps
                    .get(1)
                    .map(|m| m.as_str())
                    .unwrap_or_else(|| caps.get(0).map(|m| m.as_str()).unwrap_or_default());
                if !url.is_empty() {
                    return Some(url.to_string());
                }
            }
        }
        None
    }

    /// 从文字中提取请求头键值对
    ///
    /// 过滤掉 URL 方案（http/https）造成的伪匹配
    pub fn extract_headers(&self, text: &str) -> Vec<(String, String)> {
        self.header_pattern
            .captures_iter(text)
            .filter_map(|caps| {
                let key = caps.get(1)?.as_str().trim().to_string();
                let value = caps.get(2)?.as_str().trim().trim_matches(['"', '\'']).to_string();
                if key.eq_ignore_ascii_case("http") || key.eq_ignore_ascii_case("https") {
                    None
                } else {
                    Some((key, value))
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_extract_endpoint_with_method_prefix() {
        let service = ApiCallService::new(&Config::default());
        assert_eq!(
            service.extract_endpoint("Send GET https://example.com/api/items and report"),
            Some("https://example.com/api/items".to_string())
        );
    }

    #[test]
    fn test_extract_endpoint_api_in_url() {
        let service = ApiCallService::new(&Config::default());
        assert_eq!(
            service.extract_endpoint("data lives at https://api.example.com/v1/users here"),
            Some("https://api.example.com/v1/users".to_string())
        );
    }

    #[test]
    fn test_extract_endpoint_none() {
        let service = ApiCallService::new(&Config::default());
        assert_eq!(service.extract_endpoint("no urls at all"), None);
    }

    #[test]
    fn test_extract_headers() {
        let service = ApiCallService::new(&Config::default());
        let headers = service.extract_headers("use header X-Api-Key: secret123");

        assert!(headers
            .iter()
            .any(|(k, v)| k == "X-Api-Key" && v == "secret123"));
    }

    #[tokio::test]
    async fn test_call_parses_json_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/data"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"value": 7})),
            )
            .mount(&server)
            .await;

        let service = ApiCallService::new(&Config::default());
        let response = service
            .call(&format!("{}/api/data", server.uri()))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.data["value"], 7);
    }

    #[tokio::test]
    async fn test_call_with_custom_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("X-Token", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_string("plain"))
            .mount(&server)
            .await;

        let service = ApiCallService::new(&Config::default());
        let response = service
            .call_with(
                &server.uri(),
                "GET",
                &[("X-Token".to_string(), "abc".to_string())],
            )
            .await
            .unwrap();

        assert_eq!(response.data, serde_json::json!("plain"));
    }
}

//! 文件获取与解析 - 业务能力层
//!
//! 只负责"按声明的文件类型下载并解析内容"能力，不关心流程
//!
//! - CSV → 表头 + 行
//! - JSON → 结构化值
//! - PDF → 文本（委托 Python 执行器提取）
//! - 图片 / 音频 → 原始字节（图片可转 data: URI）

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{AppError, AppResult, ExtractionError};
use crate::services::code_executor::CodeExecutor;

/// 下载结果
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// 解析后的 CSV 数据
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CsvData {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvData {
    /// 按表头名取列，返回能解析为数字的值
    pub fn numeric_column(&self, name: &str) -> Option<Vec<f64>> {
        let index = self.headers.iter().position(|h| h == name)?;
        Some(
            self.rows
                .iter()
                .filter_map(|row| row.get(index))
                .filter_map(|cell| cell.trim().parse::<f64>().ok())
                .collect(),
        )
    }

    /// 生成用于提示词的文本预览（限制行数）
    pub fn preview(&self, max_rows: usize) -> String {
        let mut lines = vec![self.headers.join(",")];
        for row in self.rows.iter().take(max_rows) {
            lines.push(row.join(","));
        }
        lines.join("\n")
    }
}

/// 文件获取能力接口
#[async_trait]
pub trait FileFetcher: Send + Sync {
    /// 下载文件原始字节
    async fn download(&self, url: &str) -> AppResult<DownloadedFile>;

    /// 下载并解析 CSV
    async fn fetch_csv(&self, url: &str) -> AppResult<CsvData>;

    /// 下载并解析 JSON
    async fn fetch_json(&self, url: &str) -> AppResult<JsonValue>;

    /// 下载 PDF 并提取文本
    async fn fetch_pdf_text(&self, url: &str) -> AppResult<String>;
}

/// 基于 HTTP 的文件获取服务
pub struct HttpFileService {
    client: reqwest::Client,
    timeout: Duration,
    executor: Arc<dyn CodeExecutor>,
}

impl HttpFileService {
    /// 创建文件获取服务
    pub fn new(config: &Config, executor: Arc<dyn CodeExecutor>) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: Duration::from_millis(config.download_timeout_ms),
            executor,
        }
    }
}

#[async_trait]
impl FileFetcher for HttpFileService {
    async fn download(&self, url: &str) -> AppResult<DownloadedFile> {
        info!("⬇️ 下载文件: {}", url);

        let response = self
            .client
            .get(url)
            .header(
                "User-Agent",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36",
            )
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AppError::download_failed(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Extraction(ExtractionError::DownloadBadStatus {
                url: url.to_string(),
                status: status.as_u16(),
            }));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::download_failed(url, e))?
            .to_vec();

        debug!("下载完成: {} 字节, 类型: {}", bytes.len(), content_type);
        Ok(DownloadedFile {
            bytes,
            content_type,
        })
    }

    async fn fetch_csv(&self, url: &str) -> AppResult<CsvData> {
        let file = self.download(url).await?;
        let content = String::from_utf8_lossy(&file.bytes);
        let data = parse_csv(&content);
        debug!("CSV 解析完成: {} 列, {} 行", data.headers.len(), data.rows.len());
        Ok(data)
    }

    async fn fetch_json(&self, url: &str) -> AppResult<JsonValue> {
        let file = self.download(url).await?;
        let value = serde_json::from_slice(&file.bytes).map_err(|e| {
            AppError::Extraction(ExtractionError::ParseFailed {
                kind: "JSON".to_string(),
                source: Box::new(e),
            })
        })?;
        Ok(value)
    }

    async fn fetch_pdf_text(&self, url: &str) -> AppResult<String> {
        let file = self.download(url).await?;

        // 写入临时文件后委托 Python 提取文本
        let pdf_path = std::env::temp_dir().join(format!(
            "quiz_pdf_{}.pdf",
            chrono::Utc::now().timestamp_millis()
        ));
        tokio::fs::write(&pdf_path, &file.bytes).await?;

        let code = format!(
            r#"
try:
    from PyPDF2 import PdfReader
except ImportError:
    from pypdf import PdfReader

reader = PdfReader("{}")
text = ""
for page in reader.pages:
    text += page.extract_text() + "\n"
print(text)
"#,
            pdf_path.to_string_lossy().replace('\\', "/")
        );

        let result = self.executor.run_python(&code).await;
        let _ = tokio::fs::remove_file(&pdf_path).await;

        let text = result?;
        info!("PDF 解析完成: {} 字符", text.len());
        Ok(text)
    }
}

/// 解析 CSV 文本为表头 + 行
///
/// 简单的逗号切分，去除字段两侧的引号；空行跳过
pub fn parse_csv(content: &str) -> CsvData {
    let mut lines = content
        .trim()
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.is_empty());

    let headers = match lines.next() {
        Some(line) => split_csv_line(line),
        None => return CsvData::default(),
    };
    let rows = lines.map(split_csv_line).collect();

    CsvData { headers, rows }
}

fn split_csv_line(line: &str) -> Vec<String> {
    line.split(',')
        .map(|field| {
            field
                .trim()
                .trim_start_matches('"')
                .trim_end_matches('"')
                .to_string()
        })
        .collect()
}

/// 将字节编码为 data: URI
pub fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, BASE64.encode(bytes))
}

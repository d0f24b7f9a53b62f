//! 策略执行 - 流程层
//!
//! 核心职责：把选定的 Strategy 翻译为具体的协作方调用序列
//!
//! 每个策略对应一个固定配方：按需取回引用内容（文件 / API / 页面），
//! 构建有界长度的提示词，调用回答后端链（或代码执行器），
//! 最后统一经过 `extract_answer` 得到类型化候选答案。

use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Weekday};
use tracing::{info, warn};

use crate::error::{AppError, AppResult, StrategyError};
use crate::models::{extract_answer, AnswerCandidate, QuestionContext, Strategy};
use crate::services::api_service::ApiCallService;
use crate::services::classifier::QuestionClassifier;
use crate::services::code_executor::CodeExecutor;
use crate::services::file_service::{data_uri, CsvData, FileFetcher};
use crate::services::provider_chain::{AnswerProviderChain, AskOptions};
use crate::infrastructure::PageScope;
use crate::utils::truncate_text;

/// 重试上下文
///
/// 携带上一次（错误）答案；任何走 LLM 的配方都会在提示词前
/// 加上重新思考的指示，与具体策略无关。
#[derive(Debug, Clone, Default)]
pub struct RetryContext {
    /// 当前是第几次尝试（从0开始）
    pub attempt: usize,
    /// 上一次提交的错误答案
    pub previous_answer: Option<String>,
}

impl RetryContext {
    /// 首次尝试
    pub fn first() -> Self {
        Self::default()
    }
}

/// 策略调度器
///
/// 职责：
/// - 把 Strategy 映射为协作方调用配方
/// - 策略自身执行失败时，兜底到一次通用分析（仅用题目原文）
/// - 不持有页面资源，不做重试决策
pub struct StrategyDispatcher {
    chain: Arc<AnswerProviderChain>,
    files: Arc<dyn FileFetcher>,
    executor: Arc<dyn CodeExecutor>,
    api: Arc<ApiCallService>,
    classifier: Arc<QuestionClassifier>,
}

impl StrategyDispatcher {
    /// 创建策略调度器
    pub fn new(
        chain: Arc<AnswerProviderChain>,
        files: Arc<dyn FileFetcher>,
        executor: Arc<dyn CodeExecutor>,
        api: Arc<ApiCallService>,
        classifier: Arc<QuestionClassifier>,
    ) -> Self {
        Self {
            chain,
            files,
            executor,
            api,
            classifier,
        }
    }

    /// 执行策略，返回类型化候选答案
    pub async fn execute(
        &self,
        strategy: &Strategy,
        context: &QuestionContext,
        scope: &dyn PageScope,
        retry: &RetryContext,
    ) -> AppResult<AnswerCandidate> {
        match self.run_strategy(strategy, context, scope, retry).await {
            Ok(candidate) => Ok(candidate),
            Err(e) if !matches!(strategy, Strategy::LlmAnalysis) => {
                // 策略失败时兜底一次：只用题目原文做通用分析
                warn!("策略 {} 执行失败: {}，兜底到通用分析", strategy.name(), e);
                self.ask_generic(&context.text, retry).await.map_err(|fallback| {
                    AppError::Strategy(StrategyError::ExecutionFailed {
                        strategy: strategy.name(),
                        source: Box::new(fallback),
                    })
                })
            }
            Err(e) => Err(AppError::Strategy(StrategyError::ExecutionFailed {
                strategy: strategy.name(),
                source: Box::new(e),
            })),
        }
    }

    async fn run_strategy(
        &self,
        strategy: &Strategy,
        context: &QuestionContext,
        scope: &dyn PageScope,
        retry: &RetryContext,
    ) -> AppResult<AnswerCandidate> {
        let question = context.text.as_str();

        match strategy {
            Strategy::ProcessPdf { file_url } => self.process_pdf(file_url, question, retry).await,
            Strategy::ProcessData { file_url, format } => {
                info!("📊 处理 {} 数据...", format);
                self.process_data(file_url, question, retry).await
            }
            Strategy::ProcessJson { file_url } => {
                self.process_json(file_url, question, retry).await
            }
            Strategy::TranscribeAudio { file_url } => {
                self.transcribe_audio(file_url, question, retry).await
            }
            Strategy::AnalyzeImage { file_url } => {
                self.analyze_image(file_url.as_deref(), context, scope).await
            }
            Strategy::CallApi { endpoints } => self.call_api(endpoints, question, retry).await,
            Strategy::ScrapePage => self.scrape_page(scope, question, retry).await,
            Strategy::GenerateChart => self.generate_chart(question, retry).await,
            Strategy::CodeAnalysis => self.code_analysis(question).await,
            Strategy::DateCalculation => self.date_calculation(question).await,
            Strategy::DataCalculation => self.data_calculation(context, retry).await,
            Strategy::LlmAnalysis => self.llm_analysis(context, retry).await,
        }
    }

    // ========== 各策略配方 ==========

    /// PDF：下载 → 提取文本 → LLM 分析
    async fn process_pdf(
        &self,
        file_url: &str,
        question: &str,
        retry: &RetryContext,
    ) -> AppResult<AnswerCandidate> {
        info!("📄 处理 PDF...");
        let text = self.files.fetch_pdf_text(file_url).await?;

        let prompt = format!(
            "PDF Content:\n{}\n\nQuestion: {}\n\nAnalyze the PDF content and provide the direct answer.",
            truncate_text(&text, 8000),
            question
        );
        self.ask_and_extract(prompt, retry).await
    }

    /// 表格数据：能直接算聚合就本地算，否则 LLM 分析
    async fn process_data(
        &self,
        file_url: &str,
        question: &str,
        retry: &RetryContext,
    ) -> AppResult<AnswerCandidate> {
        let data = self.files.fetch_csv(file_url).await?;

        if let Some(candidate) = self.compute_csv_aggregate(question, &data) {
            return Ok(candidate);
        }

        let prompt = format!(
            "Analyze this CSV data and answer:\n\nQuestion: {}\n\nCSV Data (first 50 rows):\n{}\n\nProvide only the direct answer.",
            question,
            data.preview(50)
        );
        self.ask_and_extract(prompt, retry).await
    }

    /// 本地聚合：题目里有聚合意图且列名能在 CSV 表头里找到时生效
    fn compute_csv_aggregate(&self, question: &str, data: &CsvData) -> Option<AnswerCandidate> {
        let column = self.classifier.extract_column_name(question)?;
        let values = data.numeric_column(&column)?;
        let result = select_aggregate(&question.to_lowercase(), &values)?;

        info!("🧮 本地聚合计算: 列 {} → {}", column, result);
        Some(AnswerCandidate::Number(result))
    }

    /// JSON：需要变换时生成代码执行，否则 LLM 分析
    async fn process_json(
        &self,
        file_url: &str,
        question: &str,
        retry: &RetryContext,
    ) -> AppResult<AnswerCandidate> {
        info!("📋 处理 JSON...");
        let value = self.files.fetch_json(file_url).await?;
        let question_lower = question.to_lowercase();

        if question_lower.contains("filter")
            || question_lower.contains("sort")
            || question_lower.contains("transform")
        {
            let problem = format!(
                "Given this JSON data: {}\n\n{}\n\nPrint only the final answer.",
                truncate_text(&value.to_string(), 2000),
                question
            );
            let code = self.chain.generate_code(&problem).await?;
            let output = self.executor.run_python(&code).await?;
            return Ok(extract_answer(&output));
        }

        let pretty = serde_json::to_string_pretty(&value).unwrap_or_default();
        let prompt = format!(
            "JSON Data:\n{}\n\nQuestion: {}\n\nProvide the direct answer.",
            truncate_text(&pretty, 5000),
            question
        );
        self.ask_and_extract(prompt, retry).await
    }

    /// 音频：下载 → 转写链 → LLM 分析转写稿
    async fn transcribe_audio(
        &self,
        file_url: &str,
        question: &str,
        retry: &RetryContext,
    ) -> AppResult<AnswerCandidate> {
        info!("🎵 处理音频...");
        let file = self.files.download(file_url).await?;
        let filename = file_url
            .rsplit('/')
            .next()
            .and_then(|name| name.split('?').next())
            .filter(|name| !name.is_empty())
            .unwrap_or("audio.mp3");

        let transcript = self.chain.transcribe(&file.bytes, filename).await?;
        info!("转写稿: {}", truncate_text(&transcript, 200));

        let prompt = format!(
            "Audio Transcript:\n{}\n\nQuestion: {}\n\nBased on the transcript, provide the direct answer.",
            transcript, question
        );
        self.ask_and_extract(prompt, retry).await
    }

    /// 图片：按需返回 data: URI，否则走视觉链；无图片链接时对页面截图
    async fn analyze_image(
        &self,
        file_url: Option<&str>,
        context: &QuestionContext,
        scope: &dyn PageScope,
    ) -> AppResult<AnswerCandidate> {
        info!("🖼️ 处理图片...");
        let question = context.text.as_str();

        let image_url = file_url
            .map(|u| u.to_string())
            .or_else(|| context.images.first().map(|img| img.src.clone()));

        let Some(image_url) = image_url else {
            // 页面上没有图片引用：对整页截图后走视觉链
            let screenshot = scope.screenshot_data_uri().await?;
            let response = self
                .chain
                .ask_vision(
                    &screenshot,
                    &format!("{}\n\nProvide only the direct answer.", question),
                )
                .await?;
            return Ok(extract_answer(&response));
        };

        // 题目直接要 base64 / data URI 时原样返回图片数据
        let question_lower = question.to_lowercase();
        if question_lower.contains("base64") || question_lower.contains("data uri") {
            let file = self.files.download(&image_url).await?;
            let mime = file
                .content_type
                .split(';')
                .next()
                .filter(|s| !s.is_empty())
                .unwrap_or("image/png")
                .to_string();
            return Ok(AnswerCandidate::Text(data_uri(&mime, &file.bytes)));
        }

        let file = self.files.download(&image_url).await?;
        let uri = data_uri("image/png", &file.bytes);
        let response = self
            .chain
            .ask_vision(
                &uri,
                &format!("{}\n\nProvide only the direct answer.", question),
            )
            .await?;
        Ok(extract_answer(&response))
    }

    /// API：有端点就调第一个并让 LLM 分析响应，否则按题目指示执行
    async fn call_api(
        &self,
        endpoints: &[String],
        question: &str,
        retry: &RetryContext,
    ) -> AppResult<AnswerCandidate> {
        if let Some(first) = endpoints.first() {
            let response = self.api.call(first).await?;
            let pretty = serde_json::to_string_pretty(&response.data).unwrap_or_default();
            let prompt = format!(
                "API Response:\n{}\n\nQuestion: {}\n\nAnalyze the API response and provide the direct answer.",
                truncate_text(&pretty, 5000),
                question
            );
            return self.ask_and_extract(prompt, retry).await;
        }

        let response = self.api.execute_instructions(question).await?;
        Ok(AnswerCandidate::Json(response.data))
    }

    /// 页面抓取：重新提取当前页面后 LLM 分析
    async fn scrape_page(
        &self,
        scope: &dyn PageScope,
        question: &str,
        retry: &RetryContext,
    ) -> AppResult<AnswerCandidate> {
        info!("🕷️ 抓取页面...");
        let scraped = scope.extract().await?;
        let tables_json = serde_json::to_string(&scraped.tables).unwrap_or_default();

        let prompt = format!(
            "Scraped Content:\nText: {}\nTables: {}\n\nQuestion: {}\n\nProvide the direct answer.",
            truncate_text(&scraped.text, 5000),
            truncate_text(&tables_json, 2000),
            question
        );
        self.ask_and_extract(prompt, retry).await
    }

    /// 图表：生成绘图代码并执行，失败时兜底 LLM
    async fn generate_chart(
        &self,
        question: &str,
        retry: &RetryContext,
    ) -> AppResult<AnswerCandidate> {
        info!("📈 生成图表...");
        let problem = format!(
            r#"{}

Generate a chart and save it as a PNG file at '/tmp/chart.png'.
After saving, read the file and print the base64 encoded content.

Use matplotlib. Make the chart clean and readable.

import base64
# ... generate and save chart ...
with open('/tmp/chart.png', 'rb') as f:
    print('data:image/png;base64,' + base64.b64encode(f.read()).decode())"#,
            question
        );

        let code = self.chain.generate_code(&problem).await?;
        match self.executor.run_python(&code).await {
            Ok(output) => Ok(extract_answer(&output)),
            Err(e) => {
                warn!("图表生成失败: {}，兜底到通用分析", e);
                self.ask_generic(question, retry).await
            }
        }
    }

    /// 复杂分析：生成代码并执行
    async fn code_analysis(&self, question: &str) -> AppResult<AnswerCandidate> {
        info!("🐍 代码分析...");
        let code = self.chain.generate_code(question).await?;
        info!("生成代码:\n{}", truncate_text(&code, 500));

        let output = self.executor.run_python(&code).await?;
        Ok(extract_answer(&output))
    }

    /// 日期计算：周末计数本地算，其余生成代码
    async fn date_calculation(&self, question: &str) -> AppResult<AnswerCandidate> {
        info!("📅 日期计算...");

        if let Some(range) = self.classifier.extract_date_range(question) {
            if range.iso && question.to_lowercase().contains("weekend") {
                let count = count_weekend_days(&range.start, &range.end)?;
                return Ok(AnswerCandidate::Number(count as f64));
            }
        }

        let code = self.chain.generate_code(question).await?;
        let output = self.executor.run_python(&code).await?;
        Ok(extract_answer(&output))
    }

    /// 表格聚合：页面表格里能算就本地算，否则通用分析
    async fn data_calculation(
        &self,
        context: &QuestionContext,
        retry: &RetryContext,
    ) -> AppResult<AnswerCandidate> {
        info!("🧮 表格聚合计算...");
        let question = context.text.as_str();

        if let Some(table) = context.tables.first() {
            if let Some(column) = self.classifier.extract_column_name(question) {
                if let Some(values) = table.numeric_column(&column) {
                    if let Some(result) = select_aggregate(&question.to_lowercase(), &values) {
                        return Ok(AnswerCandidate::Number(result));
                    }
                }
            }
        }

        self.llm_analysis(context, retry).await
    }

    /// 通用 LLM 分析：题目原文 + 页面表格与链接摘要
    async fn llm_analysis(
        &self,
        context: &QuestionContext,
        retry: &RetryContext,
    ) -> AppResult<AnswerCandidate> {
        info!("🤖 通用 LLM 分析...");
        let mut context_block = String::new();

        if !context.tables.is_empty() {
            let tables_json = serde_json::to_string(&context.tables).unwrap_or_default();
            context_block.push_str(&format!(
                "\nTables on page:\n{}",
                truncate_text(&tables_json, 2000)
            ));
        }
        if !context.links.is_empty() {
            let urls = context
                .links
                .iter()
                .map(|l| l.url.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            context_block.push_str(&format!("\nLinks: {}", truncate_text(&urls, 500)));
        }

        let prompt = format!(
            "{}\n{}\n\nProvide the direct answer. Be precise.",
            context.text, context_block
        );
        self.ask_and_extract(prompt, retry).await
    }

    /// 兜底分析：只用题目原文
    async fn ask_generic(
        &self,
        question: &str,
        retry: &RetryContext,
    ) -> AppResult<AnswerCandidate> {
        let prompt = format!("{}\n\nProvide the direct answer. Be precise.", question);
        self.ask_and_extract(prompt, retry).await
    }

    // ========== 公共辅助 ==========

    /// 调用文本链并提取类型化答案（带重试前缀）
    async fn ask_and_extract(
        &self,
        prompt: String,
        retry: &RetryContext,
    ) -> AppResult<AnswerCandidate> {
        let (prompt, options) = apply_refinement(prompt, retry);
        let response = self.chain.ask(&prompt, &options).await?;
        Ok(extract_answer(&response))
    }
}

/// 重试时在提示词前加上重新思考的指示，并抬高采样温度
///
/// 与具体策略无关，对任何走 LLM 的配方生效
fn apply_refinement(prompt: String, retry: &RetryContext) -> (String, AskOptions) {
    match &retry.previous_answer {
        Some(previous) if retry.attempt > 0 => {
            let prefixed = format!(
                r#"Previous answer "{}" was incorrect.

{}

Provide a different answer. Consider:
- Check calculations again
- Consider different interpretations
- Be more precise with numeric answers
- Check for off-by-one errors in counts"#,
                previous, prompt
            );
            let options = AskOptions {
                temperature: Some((0.3 * retry.attempt as f32).min(1.0)),
                ..Default::default()
            };
            (prefixed, options)
        }
        _ => (prompt, AskOptions::default()),
    }
}

/// 按题目里的聚合意图对数值序列求值
fn select_aggregate(question_lower: &str, values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    if question_lower.contains("sum") || question_lower.contains("total") {
        Some(values.iter().sum())
    } else if question_lower.contains("average") || question_lower.contains("mean") {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    } else if question_lower.contains("max") {
        values.iter().copied().reduce(f64::max)
    } else if question_lower.contains("min") {
        values.iter().copied().reduce(f64::min)
    } else if question_lower.contains("count") {
        Some(values.len() as f64)
    } else {
        None
    }
}

/// 计算闭区间内的周末天数（ISO 日期）
pub fn count_weekend_days(start: &str, end: &str) -> AppResult<u32> {
    let start = NaiveDate::parse_from_str(start, "%Y-%m-%d")
        .map_err(|e| AppError::Other(format!("日期解析失败 ({}): {}", start, e)))?;
    let end = NaiveDate::parse_from_str(end, "%Y-%m-%d")
        .map_err(|e| AppError::Other(format!("日期解析失败 ({}): {}", end, e)))?;

    let mut count = 0;
    let mut current = start;
    while current <= end {
        if matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
            count += 1;
        }
        match current.succ_opt() {
            Some(next) => current = next,
            None => break,
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_aggregate_sum() {
        assert_eq!(select_aggregate("sum the amount column", &[10.0, 20.0]), Some(30.0));
    }

    #[test]
    fn test_select_aggregate_average() {
        assert_eq!(select_aggregate("average of the price", &[2.0, 4.0]), Some(3.0));
    }

    #[test]
    fn test_select_aggregate_max_min_count() {
        assert_eq!(select_aggregate("the maximum value", &[1.0, 9.0, 5.0]), Some(9.0));
        assert_eq!(select_aggregate("the minimum value", &[1.0, 9.0, 5.0]), Some(1.0));
        assert_eq!(select_aggregate("count the rows", &[1.0, 9.0, 5.0]), Some(3.0));
    }

    #[test]
    fn test_select_aggregate_no_intent() {
        assert_eq!(select_aggregate("describe the data", &[1.0]), None);
        assert_eq!(select_aggregate("sum it", &[]), None);
    }

    #[test]
    fn test_count_weekend_days() {
        // 2025-01-01 是周三；当月有 4 个周六 + 4 个周日
        assert_eq!(count_weekend_days("2025-01-01", "2025-01-31").unwrap(), 8);
        // 单日区间
        assert_eq!(count_weekend_days("2025-01-04", "2025-01-04").unwrap(), 1);
        // 起点晚于终点
        assert_eq!(count_weekend_days("2025-01-10", "2025-01-01").unwrap(), 0);
    }

    #[test]
    fn test_count_weekend_days_bad_input() {
        assert!(count_weekend_days("not-a-date", "2025-01-01").is_err());
    }

    #[test]
    fn test_apply_refinement_first_attempt_is_identity() {
        let (prompt, options) = apply_refinement("solve".to_string(), &RetryContext::first());

        assert_eq!(prompt, "solve");
        assert!(options.temperature.is_none());
    }

    #[test]
    fn test_apply_refinement_prefixes_previous_answer() {
        let retry = RetryContext {
            attempt: 2,
            previous_answer: Some("41".to_string()),
        };
        let (prompt, options) = apply_refinement("solve".to_string(), &retry);

        assert!(prompt.starts_with(r#"Previous answer "41" was incorrect."#));
        assert!(prompt.contains("solve"));
        assert_eq!(options.temperature, Some(0.6));
    }
}

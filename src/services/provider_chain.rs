//! 回答后端链 - 业务能力层
//!
//! 只负责"按固定顺序尝试多个回答后端"能力，不关心流程
//!
//! ## 设计要点
//! - 后端是实现同一能力接口的同质列表，链逻辑与具体后端无关
//! - 每条链（文本 / 视觉 / 转写）的顺序是成本、质量、可用性的
//!   权衡结果，属于配置，不允许从其他逻辑推导
//! - 链内严格顺序尝试，第一个非空结果立即返回，后续后端不再调用

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::clients::provider_client::OpenAiCompatProvider;
use crate::config::Config;
use crate::error::{AppError, AppResult, ProviderError};

/// 解题默认系统提示词
pub const QUIZ_SYSTEM_PROMPT: &str = r#"You are an expert data analyst and quiz solver. Your task is to solve data-related quiz questions accurately and concisely.

Key capabilities:
- Statistical analysis (mean, median, variance, regression, etc.)
- Data processing (filtering, sorting, aggregating, pivoting)
- Mathematical calculations (including complex formulas)
- CSV/JSON data manipulation
- Python/SQL code interpretation and execution
- Web scraping and API data extraction
- Date/time calculations
- Geo-spatial and network analysis
- Chart/visualization interpretation

CRITICAL RULES:
1. Provide ONLY the final answer - no explanations unless asked
2. For numbers, provide the exact numeric value
3. For booleans, respond with lowercase "true" or "false"
4. For JSON answers, provide valid minified JSON
5. For base64 answers, provide the complete data URI
6. Double-check all calculations
7. If you need to write code, provide executable Python code

Be extremely precise. Wrong answers are penalized."#;

/// 代码生成系统提示词
const CODE_SYSTEM_PROMPT: &str =
    "You are a Python expert. Generate only executable code, no markdown formatting.";

/// 回答后端能力接口
///
/// 每个后端暴露文本补全能力，视觉和转写能力可选；
/// 不具备某能力的后端不会出现在对应的链中。
#[async_trait]
pub trait AnswerProvider: Send + Sync {
    /// 后端名称（用于日志）
    fn name(&self) -> &str;

    /// 是否支持视觉输入
    fn supports_vision(&self) -> bool {
        false
    }

    /// 是否支持音频转写
    fn supports_transcription(&self) -> bool {
        false
    }

    /// 文本补全
    async fn complete(
        &self,
        prompt: &str,
        system_prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> AppResult<String>;

    /// 视觉补全（输入为 data: URI 图片）
    async fn complete_vision(&self, _image_data_uri: &str, _prompt: &str) -> AppResult<String> {
        Err(AppError::Provider(ProviderError::Unsupported {
            provider: self.name().to_string(),
            capability: "视觉",
        }))
    }

    /// 音频转写
    async fn transcribe(&self, _audio: Vec<u8>, _filename: &str) -> AppResult<String> {
        Err(AppError::Provider(ProviderError::Unsupported {
            provider: self.name().to_string(),
            capability: "转写",
        }))
    }
}

/// 后端注册表
///
/// 进程启动时构造一次，之后按引用传入编排层；
/// 不存在模块级的可变全局状态。
pub struct ProviderRegistry {
    /// 文本链（按固定优先级）
    pub text_chain: Vec<Arc<dyn AnswerProvider>>,
    /// 视觉链（按固定优先级，独立于文本链）
    pub vision_chain: Vec<Arc<dyn AnswerProvider>>,
    /// 转写链（按固定优先级）
    pub audio_chain: Vec<Arc<dyn AnswerProvider>>,
}

impl ProviderRegistry {
    /// 按配置构造注册表
    ///
    /// 链顺序固定：
    /// - 文本：Groq(Llama) → Groq(Mixtral) → Gemini → OpenAI → Anthropic
    /// - 视觉：Gemini → OpenAI → Groq(Vision)
    /// - 转写：Groq(Whisper) → OpenAI(Whisper)
    ///
    /// 未配置 API key 的后端不注册。
    pub fn from_config(config: &Config) -> Self {
        let mut text_chain: Vec<Arc<dyn AnswerProvider>> = Vec::new();
        let mut vision_chain: Vec<Arc<dyn AnswerProvider>> = Vec::new();
        let mut audio_chain: Vec<Arc<dyn AnswerProvider>> = Vec::new();

        if !config.groq_api_key.is_empty() {
            text_chain.push(Arc::new(OpenAiCompatProvider::text(
                "groq-llama",
                &config.groq_api_key,
                &config.groq_base_url,
                &config.groq_text_model,
            )));
            text_chain.push(Arc::new(OpenAiCompatProvider::text(
                "groq-mixtral",
                &config.groq_api_key,
                &config.groq_base_url,
                &config.groq_fallback_model,
            )));
        }
        if !config.gemini_api_key.is_empty() {
            let gemini = Arc::new(OpenAiCompatProvider::with_vision(
                "gemini",
                &config.gemini_api_key,
                &config.gemini_base_url,
                &config.gemini_model,
            ));
            text_chain.push(gemini.clone());
            vision_chain.push(gemini);
        }
        if !config.openai_api_key.is_empty() {
            let openai = Arc::new(OpenAiCompatProvider::with_vision(
                "openai",
                &config.openai_api_key,
                &config.openai_base_url,
                &config.openai_model,
            ));
            text_chain.push(openai.clone());
            vision_chain.push(openai);
        }
        if !config.groq_api_key.is_empty() {
            vision_chain.push(Arc::new(OpenAiCompatProvider::with_vision(
                "groq-vision",
                &config.groq_api_key,
                &config.groq_base_url,
                &config.groq_vision_model,
            )));
            audio_chain.push(Arc::new(OpenAiCompatProvider::transcription(
                "groq-whisper",
                &config.groq_api_key,
                &config.groq_base_url,
                &config.groq_whisper_model,
            )));
        }
        if !config.anthropic_api_key.is_empty() {
            text_chain.push(Arc::new(OpenAiCompatProvider::text(
                "anthropic",
                &config.anthropic_api_key,
                &config.anthropic_base_url,
                &config.anthropic_model,
            )));
        }
        if !config.openai_api_key.is_empty() {
            audio_chain.push(Arc::new(OpenAiCompatProvider::transcription(
                "openai-whisper",
                &config.openai_api_key,
                &config.openai_base_url,
                &config.openai_whisper_model,
            )));
        }

        Self {
            text_chain,
            vision_chain,
            audio_chain,
        }
    }

    /// 按给定链构造注册表（测试用）
    pub fn from_chains(
        text_chain: Vec<Arc<dyn AnswerProvider>>,
        vision_chain: Vec<Arc<dyn AnswerProvider>>,
        audio_chain: Vec<Arc<dyn AnswerProvider>>,
    ) -> Self {
        Self {
            text_chain,
            vision_chain,
            audio_chain,
        }
    }
}

/// 单次调用的可覆盖参数
#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    /// 系统提示词（默认为解题提示词）
    pub system_prompt: Option<String>,
    /// 采样温度
    pub temperature: Option<f32>,
    /// 最大输出 token 数
    pub max_tokens: Option<u32>,
}

/// 回答后端链
///
/// 职责：
/// - 按注册表顺序依次尝试后端，单个后端带超时
/// - 出错或返回空白结果时记录日志并尝试下一个
/// - 第一个非空结果立即短路返回
pub struct AnswerProviderChain {
    registry: Arc<ProviderRegistry>,
    call_timeout: Duration,
    default_temperature: f32,
    default_max_tokens: u32,
}

impl AnswerProviderChain {
    /// 创建后端链
    pub fn new(registry: Arc<ProviderRegistry>, config: &Config) -> Self {
        Self {
            registry,
            call_timeout: Duration::from_millis(config.provider_timeout_ms),
            default_temperature: config.llm_temperature,
            default_max_tokens: config.llm_max_tokens,
        }
    }

    /// 文本提问：依次尝试文本链，返回第一个非空结果
    pub async fn ask(&self, prompt: &str, options: &AskOptions) -> AppResult<String> {
        let system_prompt = options
            .system_prompt
            .as_deref()
            .unwrap_or(QUIZ_SYSTEM_PROMPT);
        let temperature = options.temperature.unwrap_or(self.default_temperature);
        let max_tokens = options.max_tokens.unwrap_or(self.default_max_tokens);

        for provider in &self.registry.text_chain {
            debug!("尝试文本后端: {}", provider.name());
            let call = provider.complete(prompt, system_prompt, temperature, max_tokens);
            match timeout(self.call_timeout, call).await {
                Err(_) => {
                    warn!(
                        "后端 {} 调用超时 ({}秒)，尝试下一个",
                        provider.name(),
                        self.call_timeout.as_secs()
                    );
                }
                Ok(Err(e)) => {
                    warn!("后端 {} 调用失败: {}，尝试下一个", provider.name(), e);
                }
                Ok(Ok(text)) if text.trim().is_empty() => {
                    warn!("后端 {} 返回空内容，尝试下一个", provider.name());
                }
                Ok(Ok(text)) => {
                    debug!("后端 {} 调用成功", provider.name());
                    return Ok(text.trim().to_string());
                }
            }
        }

        Err(AppError::Provider(ProviderError::AllFailed {
            capability: "文本",
            attempted: self.registry.text_chain.len(),
        }))
    }

    /// 视觉提问：依次尝试视觉链
    ///
    /// 不具备视觉能力的后端直接跳过，等同于不在链中
    pub async fn ask_vision(&self, image_data_uri: &str, prompt: &str) -> AppResult<String> {
        for provider in &self.registry.vision_chain {
            if !provider.supports_vision() {
                debug!("后端 {} 不支持视觉，跳过", provider.name());
                continue;
            }
            debug!("尝试视觉后端: {}", provider.name());
            let call = provider.complete_vision(image_data_uri, prompt);
            match timeout(self.call_timeout, call).await {
                Err(_) => {
                    warn!(
                        "视觉后端 {} 调用超时 ({}秒)，尝试下一个",
                        provider.name(),
                        self.call_timeout.as_secs()
                    );
                }
                Ok(Err(e)) => {
                    warn!("视觉后端 {} 调用失败: {}，尝试下一个", provider.name(), e);
                }
                Ok(Ok(text)) if text.trim().is_empty() => {
                    warn!("视觉后端 {} 返回空内容，尝试下一个", provider.name());
                }
                Ok(Ok(text)) => {
                    debug!("视觉后端 {} 调用成功", provider.name());
                    return Ok(text.trim().to_string());
                }
            }
        }

        Err(AppError::Provider(ProviderError::AllFailed {
            capability: "视觉",
            attempted: self.registry.vision_chain.len(),
        }))
    }

    /// 音频转写：依次尝试转写链
    ///
    /// 不具备转写能力的后端直接跳过，等同于不在链中
    pub async fn transcribe(&self, audio: &[u8], filename: &str) -> AppResult<String> {
        for provider in &self.registry.audio_chain {
            if !provider.supports_transcription() {
                debug!("后端 {} 不支持转写，跳过", provider.name());
                continue;
            }
            debug!("尝试转写后端: {}", provider.name());
            let call = provider.transcribe(audio.to_vec(), filename);
            match timeout(self.call_timeout, call).await {
                Err(_) => {
                    warn!(
                        "转写后端 {} 调用超时 ({}秒)，尝试下一个",
                        provider.name(),
                        self.call_timeout.as_secs()
                    );
                }
                Ok(Err(e)) => {
                    warn!("转写后端 {} 调用失败: {}，尝试下一个", provider.name(), e);
                }
                Ok(Ok(text)) if text.trim().is_empty() => {
                    warn!("转写后端 {} 返回空内容，尝试下一个", provider.name());
                }
                Ok(Ok(text)) => {
                    debug!("转写后端 {} 调用成功", provider.name());
                    return Ok(text);
                }
            }
        }

        Err(AppError::Provider(ProviderError::AllFailed {
            capability: "转写",
            attempted: self.registry.audio_chain.len(),
        }))
    }

    /// 生成 Python 代码解决问题
    ///
    /// 走文本链，使用代码生成系统提示词，并剥离 markdown 代码围栏
    pub async fn generate_code(&self, problem: &str) -> AppResult<String> {
        let prompt = format!(
            r#"Generate Python code to solve this problem.
Return ONLY the code, no explanations. The code should print the final answer.

Problem: {}

Requirements:
- Use only standard library + pandas, numpy, scipy if needed
- Code must be executable and print the answer
- Handle edge cases
- Be efficient

Python code:"#,
            problem
        );

        let options = AskOptions {
            system_prompt: Some(CODE_SYSTEM_PROMPT.to_string()),
            temperature: Some(0.1),
            max_tokens: None,
        };
        let code = self.ask(&prompt, &options).await?;
        Ok(strip_code_fences(&code))
    }
}

/// 剥离 markdown 代码围栏
fn strip_code_fences(code: &str) -> String {
    let mut cleaned = code.trim();
    if let Some(rest) = cleaned.strip_prefix("```python") {
        cleaned = rest;
    } else if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest;
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }
    cleaned.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 可编程的桩后端
    struct StubProvider {
        name: String,
        response: Result<String, ()>,
        calls: AtomicUsize,
    }

    impl StubProvider {
        fn returns(name: &str, text: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                response: Ok(text.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        fn fails(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                response: Err(()),
                calls: AtomicUsize::new(0),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AnswerProvider for StubProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn complete(
            &self,
            _prompt: &str,
            _system_prompt: &str,
            _temperature: f32,
            _max_tokens: u32,
        ) -> AppResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.response {
                Ok(text) => Ok(text.clone()),
                Err(_) => Err(AppError::Other("桩后端故意失败".to_string())),
            }
        }
    }

    fn chain_of(providers: Vec<Arc<dyn AnswerProvider>>) -> AnswerProviderChain {
        let registry = Arc::new(ProviderRegistry::from_chains(providers, vec![], vec![]));
        AnswerProviderChain::new(registry, &crate::config::Config::default())
    }

    #[tokio::test]
    async fn test_first_success_short_circuits() {
        let first = StubProvider::returns("first", "42");
        let second = StubProvider::returns("second", "unused");
        let chain = chain_of(vec![first.clone(), second.clone()]);

        let answer = chain.ask("q", &AskOptions::default()).await.unwrap();

        assert_eq!(answer, "42");
        assert_eq!(first.call_count(), 1);
        // 第一个后端成功后，后续后端绝不调用
        assert_eq!(second.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_result_falls_through() {
        let empty = StubProvider::returns("empty", "   ");
        let fallback = StubProvider::returns("fallback", "answer");
        let chain = chain_of(vec![empty.clone(), fallback.clone()]);

        let answer = chain.ask("q", &AskOptions::default()).await.unwrap();

        assert_eq!(answer, "answer");
        assert_eq!(empty.call_count(), 1);
        assert_eq!(fallback.call_count(), 1);
    }

    #[tokio::test]
    async fn test_error_falls_through() {
        let broken = StubProvider::fails("broken");
        let fallback = StubProvider::returns("fallback", "ok");
        let chain = chain_of(vec![broken, fallback]);

        let answer = chain.ask("q", &AskOptions::default()).await.unwrap();

        assert_eq!(answer, "ok");
    }

    #[tokio::test]
    async fn test_all_failed_errors() {
        let broken = StubProvider::fails("broken");
        let empty = StubProvider::returns("empty", "");
        let chain = chain_of(vec![broken, empty]);

        let result = chain.ask("q", &AskOptions::default()).await;

        assert!(result.is_err());
        assert!(result.unwrap_err().is_all_providers_failed());
    }

    #[tokio::test]
    async fn test_empty_chain_errors() {
        let chain = chain_of(vec![]);
        let result = chain.ask("q", &AskOptions::default()).await;

        assert!(result.unwrap_err().is_all_providers_failed());
    }

    #[tokio::test]
    async fn test_vision_chain_is_independent() {
        // 文本链有后端但视觉链为空：视觉调用直接失败
        let text_only = StubProvider::returns("text", "42");
        let registry = Arc::new(ProviderRegistry::from_chains(
            vec![text_only],
            vec![],
            vec![],
        ));
        let chain = AnswerProviderChain::new(registry, &crate::config::Config::default());

        let result = chain.ask_vision("data:image/png;base64,xx", "q").await;

        assert!(result.unwrap_err().is_all_providers_failed());
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(
            strip_code_fences("```python\nprint(1)\n```"),
            "print(1)"
        );
        assert_eq!(strip_code_fences("```\nprint(2)\n```"), "print(2)");
        assert_eq!(strip_code_fences("print(3)"), "print(3)");
    }
}

use serde::Deserialize;
use tracing::warn;

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 控制面 HTTP 服务端口
    pub server_port: u16,
    /// 学生邮箱（提交身份）
    pub student_email: String,
    /// 学生密钥（提交身份）
    pub student_secret: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- 回答后端配置 ---
    pub groq_api_key: String,
    pub groq_base_url: String,
    pub groq_text_model: String,
    pub groq_fallback_model: String,
    pub groq_vision_model: String,
    pub groq_whisper_model: String,
    pub gemini_api_key: String,
    pub gemini_base_url: String,
    pub gemini_model: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub openai_whisper_model: String,
    pub anthropic_api_key: String,
    pub anthropic_base_url: String,
    pub anthropic_model: String,
    /// LLM 采样温度默认值
    pub llm_temperature: f32,
    /// LLM 最大输出 token 数默认值
    pub llm_max_tokens: u32,
    // --- 状态机配置 ---
    /// 单题重试上限
    pub max_retries: usize,
    /// 重试间隔（毫秒）
    pub retry_delay_ms: u64,
    /// 题目链最大长度
    pub max_chain_length: usize,
    /// 整条链的时间预算（毫秒）
    pub time_budget_ms: u64,
    // --- 超时配置 ---
    /// 单个后端调用超时（毫秒）
    pub provider_timeout_ms: u64,
    /// 提交请求超时（毫秒）
    pub submission_timeout_ms: u64,
    /// 文件下载超时（毫秒）
    pub download_timeout_ms: u64,
    /// 代码执行超时（毫秒）
    pub code_timeout_ms: u64,
    /// 页面就绪等待（毫秒）
    pub page_ready_wait_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            student_email: String::new(),
            student_secret: String::new(),
            verbose_logging: false,
            groq_api_key: String::new(),
            groq_base_url: "https://api.groq.com/openai/v1".to_string(),
            groq_text_model: "llama-3.3-70b-versatile".to_string(),
            groq_fallback_model: "mixtral-8x7b-32768".to_string(),
            groq_vision_model: "llama-3.2-90b-vision-preview".to_string(),
            groq_whisper_model: "whisper-large-v3-turbo".to_string(),
            gemini_api_key: String::new(),
            gemini_base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            gemini_model: "gemini-2.0-flash".to_string(),
            openai_api_key: String::new(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_model: "gpt-4o".to_string(),
            openai_whisper_model: "whisper-1".to_string(),
            anthropic_api_key: String::new(),
            anthropic_base_url: "https://api.anthropic.com/v1".to_string(),
            anthropic_model: "claude-3-5-sonnet-20241022".to_string(),
            llm_temperature: 0.1,
            llm_max_tokens: 4000,
            max_retries: 3,
            retry_delay_ms: 2000,
            max_chain_length: 20,
            time_budget_ms: 170_000,
            provider_timeout_ms: 45_000,
            submission_timeout_ms: 30_000,
            download_timeout_ms: 30_000,
            code_timeout_ms: 30_000,
            page_ready_wait_ms: 1000,
        }
    }
}

impl Config {
    /// 加载配置：先读 solver.toml（如果存在），再用环境变量覆盖
    pub fn load() -> Self {
        let base = Self::from_file("solver.toml").unwrap_or_default();
        base.apply_env()
    }

    /// 从 TOML 文件加载配置
    pub fn from_file(path: &str) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match toml::from_str(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("配置文件解析失败 ({}): {}，使用默认配置", path, e);
                None
            }
        }
    }

    /// 用环境变量覆盖已有配置
    pub fn apply_env(self) -> Self {
        Self {
            server_port: std::env::var("SERVER_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(self.server_port),
            student_email: std::env::var("STUDENT_EMAIL").unwrap_or(self.student_email),
            student_secret: std::env::var("STUDENT_SECRET").unwrap_or(self.student_secret),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(self.verbose_logging),
            groq_api_key: std::env::var("GROQ_API_KEY").unwrap_or(self.groq_api_key),
            groq_base_url: std::env::var("GROQ_BASE_URL").unwrap_or(self.groq_base_url),
            groq_text_model: std::env::var("GROQ_TEXT_MODEL").unwrap_or(self.groq_text_model),
            groq_fallback_model: std::env::var("GROQ_FALLBACK_MODEL").unwrap_or(self.groq_fallback_model),
            groq_vision_model: std::env::var("GROQ_VISION_MODEL").unwrap_or(self.groq_vision_model),
            groq_whisper_model: std::env::var("GROQ_WHISPER_MODEL").unwrap_or(self.groq_whisper_model),
            gemini_api_key: std::env::var("GOOGLE_API_KEY").unwrap_or(self.gemini_api_key),
            gemini_base_url: std::env::var("GEMINI_BASE_URL").unwrap_or(self.gemini_base_url),
            gemini_model: std::env::var("GEMINI_MODEL").unwrap_or(self.gemini_model),
            openai_api_key: std::env::var("OPENAI_API_KEY").unwrap_or(self.openai_api_key),
            openai_base_url: std::env::var("OPENAI_BASE_URL").unwrap_or(self.openai_base_url),
            openai_model: std::env::var("OPENAI_MODEL").unwrap_or(self.openai_model),
            openai_whisper_model: std::env::var("OPENAI_WHISPER_MODEL").unwrap_or(self.openai_whisper_model),
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").unwrap_or(self.anthropic_api_key),
            anthropic_base_url: std::env::var("ANTHROPIC_BASE_URL").unwrap_or(self.anthropic_base_url),
            anthropic_model: std::env::var("ANTHROPIC_MODEL").unwrap_or(self.anthropic_model),
            llm_temperature: std::env::var("LLM_TEMPERATURE").ok().and_then(|v| v.parse().ok()).unwrap_or(self.llm_temperature),
            llm_max_tokens: std::env::var("LLM_MAX_TOKENS").ok().and_then(|v| v.parse().ok()).unwrap_or(self.llm_max_tokens),
            max_retries: std::env::var("MAX_RETRIES").ok().and_then(|v| v.parse().ok()).unwrap_or(self.max_retries),
            retry_delay_ms: std::env::var("RETRY_DELAY_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(self.retry_delay_ms),
            max_chain_length: std::env::var("MAX_CHAIN_LENGTH").ok().and_then(|v| v.parse().ok()).unwrap_or(self.max_chain_length),
            time_budget_ms: std::env::var("TIME_BUDGET_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(self.time_budget_ms),
            provider_timeout_ms: std::env::var("PROVIDER_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(self.provider_timeout_ms),
            submission_timeout_ms: std::env::var("SUBMISSION_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(self.submission_timeout_ms),
            download_timeout_ms: std::env::var("DOWNLOAD_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(self.download_timeout_ms),
            code_timeout_ms: std::env::var("CODE_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(self.code_timeout_ms),
            page_ready_wait_ms: std::env::var("PAGE_READY_WAIT_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(self.page_ready_wait_ms),
        }
    }
}

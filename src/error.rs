use std::fmt;

/// 应用程序错误类型
#[derive(Debug)]
pub enum AppError {
    /// 页面/文件内容提取错误
    Extraction(ExtractionError),
    /// 单个回答后端调用错误
    Provider(ProviderError),
    /// 策略执行错误
    Strategy(StrategyError),
    /// 提交请求传输错误
    Transport(TransportError),
    /// 其他错误（用于包装第三方库错误）
    Other(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Extraction(e) => write!(f, "提取错误: {}", e),
            AppError::Provider(e) => write!(f, "后端错误: {}", e),
            AppError::Strategy(e) => write!(f, "策略错误: {}", e),
            AppError::Transport(e) => write!(f, "传输错误: {}", e),
            AppError::Other(msg) => write!(f, "错误: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Extraction(e) => Some(e),
            AppError::Provider(e) => Some(e),
            AppError::Strategy(e) => Some(e),
            AppError::Transport(e) => Some(e),
            AppError::Other(_) => None,
        }
    }
}

/// 页面/文件内容提取错误
#[derive(Debug)]
pub enum ExtractionError {
    /// 页面加载失败
    PageLoadFailed {
        url: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 页面脚本执行失败
    EvaluateFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 页面截图失败
    ScreenshotFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 文件下载失败
    DownloadFailed {
        url: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 文件下载返回错误状态码
    DownloadBadStatus { url: String, status: u16 },
    /// 文件内容解析失败
    ParseFailed {
        kind: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for ExtractionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionError::PageLoadFailed { url, source } => {
                write!(f, "页面加载失败 ({}): {}", url, source)
            }
            ExtractionError::EvaluateFailed { source } => {
                write!(f, "页面脚本执行失败: {}", source)
            }
            ExtractionError::ScreenshotFailed { source } => {
                write!(f, "页面截图失败: {}", source)
            }
            ExtractionError::DownloadFailed { url, source } => {
                write!(f, "文件下载失败 ({}): {}", url, source)
            }
            ExtractionError::DownloadBadStatus { url, status } => {
                write!(f, "文件下载返回错误状态码 ({}): HTTP {}", url, status)
            }
            ExtractionError::ParseFailed { kind, source } => {
                write!(f, "文件解析失败 ({}): {}", kind, source)
            }
        }
    }
}

impl std::error::Error for ExtractionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExtractionError::PageLoadFailed { source, .. }
            | ExtractionError::EvaluateFailed { source }
            | ExtractionError::ScreenshotFailed { source }
            | ExtractionError::DownloadFailed { source, .. }
            | ExtractionError::ParseFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 回答后端错误
#[derive(Debug)]
pub enum ProviderError {
    /// 后端调用失败
    CallFailed {
        provider: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 后端返回空内容
    EmptyResponse { provider: String },
    /// 后端不支持该能力
    Unsupported {
        provider: String,
        capability: &'static str,
    },
    /// 所有后端都失败或返回空结果
    AllFailed { capability: &'static str, attempted: usize },
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::CallFailed { provider, source } => {
                write!(f, "后端调用失败 ({}): {}", provider, source)
            }
            ProviderError::EmptyResponse { provider } => {
                write!(f, "后端返回空内容: {}", provider)
            }
            ProviderError::Unsupported {
                provider,
                capability,
            } => {
                write!(f, "后端 {} 不支持能力: {}", provider, capability)
            }
            ProviderError::AllFailed {
                capability,
                attempted,
            } => {
                write!(f, "所有 {} 后端都失败 (共尝试 {} 个)", capability, attempted)
            }
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProviderError::CallFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 策略执行错误
#[derive(Debug)]
pub enum StrategyError {
    /// 策略执行失败（含兜底策略）
    ExecutionFailed {
        strategy: &'static str,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 代码执行失败
    CodeFailed { stderr: String },
    /// 代码执行超时
    CodeTimeout { secs: u64 },
}

impl fmt::Display for StrategyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyError::ExecutionFailed { strategy, source } => {
                write!(f, "策略 {} 执行失败: {}", strategy, source)
            }
            StrategyError::CodeFailed { stderr } => {
                write!(f, "代码执行失败: {}", stderr)
            }
            StrategyError::CodeTimeout { secs } => {
                write!(f, "代码执行超时: {}秒", secs)
            }
        }
    }
}

impl std::error::Error for StrategyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StrategyError::ExecutionFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 提交请求传输错误
#[derive(Debug)]
pub enum TransportError {
    /// 网络请求失败
    RequestFailed {
        url: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::RequestFailed { url, source } => {
                write!(f, "提交请求失败 ({}): {}", url, source)
            }
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::RequestFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
        }
    }
}

// ========== 从常见错误类型转换 ==========
// 注意：不需要手动实现 From<AppError> for anyhow::Error，
// 因为 anyhow 已经为所有实现了 std::error::Error 的类型提供了自动实现

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Extraction(ExtractionError::EvaluateFailed {
            source: Box::new(err),
        })
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Extraction(ExtractionError::ParseFailed {
            kind: "JSON".to_string(),
            source: Box::new(err),
        })
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Other(format!("IO错误: {}", err))
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建页面加载错误
    pub fn page_load_failed(
        url: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Extraction(ExtractionError::PageLoadFailed {
            url: url.into(),
            source: Box::new(source),
        })
    }

    /// 创建文件下载错误
    pub fn download_failed(
        url: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Extraction(ExtractionError::DownloadFailed {
            url: url.into(),
            source: Box::new(source),
        })
    }

    /// 创建后端调用错误
    pub fn provider_call_failed(
        provider: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Provider(ProviderError::CallFailed {
            provider: provider.into(),
            source: Box::new(source),
        })
    }

    /// 创建提交请求错误
    pub fn submission_failed(
        url: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Transport(TransportError::RequestFailed {
            url: url.into(),
            source: Box::new(source),
        })
    }

    /// 是否为"所有后端都失败"错误
    pub fn is_all_providers_failed(&self) -> bool {
        matches!(self, AppError::Provider(ProviderError::AllFailed { .. }))
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

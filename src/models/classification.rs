//! 题目分类结果与解题策略
//!
//! 分类器对题目文本和链接做纯函数式匹配，产出一个 Classification；
//! 每个 Classification 恰好携带一个按固定优先级选出的 Strategy。

use std::fmt;

/// 题目类型标签（固定词表）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuestionType {
    DownloadFile,
    ApiCall,
    ScrapeWebsite,
    SumColumn,
    Average,
    Count,
    Filter,
    Sort,
    MaxMin,
    DateCalc,
    Variance,
    Regression,
    Visualization,
    JsonTransform,
    Base64,
    Transcribe,
    ImageAnalyze,
    NetworkAnalysis,
    Geospatial,
    SqlQuery,
}

impl QuestionType {
    /// 是否为"复杂分析"类标签
    pub fn is_complex_analysis(self) -> bool {
        matches!(
            self,
            QuestionType::Regression
                | QuestionType::Variance
                | QuestionType::NetworkAnalysis
                | QuestionType::Geospatial
        )
    }
}

/// 链接指向的文件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Csv,
    Excel,
    Json,
    Image,
    Audio,
    Zip,
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileKind::Pdf => "PDF",
            FileKind::Csv => "CSV",
            FileKind::Excel => "EXCEL",
            FileKind::Json => "JSON",
            FileKind::Image => "IMAGE",
            FileKind::Audio => "AUDIO",
            FileKind::Zip => "ZIP",
        };
        write!(f, "{}", name)
    }
}

/// 已识别文件类型的链接
#[derive(Debug, Clone, PartialEq)]
pub struct FileLink {
    pub url: String,
    pub kind: FileKind,
}

/// 题目复杂度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

/// 解题策略
///
/// 每个变体携带执行该策略所需的参数，一题构造一次，之后不可变。
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    /// 下载并分析 PDF
    ProcessPdf { file_url: String },
    /// 下载并处理表格数据（CSV / Excel）
    ProcessData { file_url: String, format: FileKind },
    /// 下载并分析 JSON
    ProcessJson { file_url: String },
    /// 下载音频并转写
    TranscribeAudio { file_url: String },
    /// 分析图片（无图片链接时对页面截图）
    AnalyzeImage { file_url: Option<String> },
    /// 调用外部 API
    CallApi { endpoints: Vec<String> },
    /// 抓取当前页面内容
    ScrapePage,
    /// 生成图表
    GenerateChart,
    /// 生成并执行代码做复杂分析
    CodeAnalysis,
    /// 日期计算
    DateCalculation,
    /// 表格聚合计算
    DataCalculation,
    /// 通用 LLM 分析（兜底）
    LlmAnalysis,
}

impl Strategy {
    /// 策略名（用于日志和错误信息）
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::ProcessPdf { .. } => "PROCESS_PDF",
            Strategy::ProcessData { .. } => "PROCESS_DATA",
            Strategy::ProcessJson { .. } => "PROCESS_JSON",
            Strategy::TranscribeAudio { .. } => "TRANSCRIBE_AUDIO",
            Strategy::AnalyzeImage { .. } => "ANALYZE_IMAGE",
            Strategy::CallApi { .. } => "CALL_API",
            Strategy::ScrapePage => "SCRAPE_PAGE",
            Strategy::GenerateChart => "GENERATE_CHART",
            Strategy::CodeAnalysis => "CODE_ANALYSIS",
            Strategy::DateCalculation => "DATE_CALCULATION",
            Strategy::DataCalculation => "DATA_CALCULATION",
            Strategy::LlmAnalysis => "LLM_ANALYSIS",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 题目分类结果
///
/// 不变式：恰好一个 Strategy；复杂度是标签集合的纯函数。
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// 命中的类型标签（按规则表顺序）
    pub types: Vec<QuestionType>,
    /// 规则捕获组提取到的命名实体（如列名），按命中顺序
    pub key_entities: Vec<(QuestionType, String)>,
    /// 识别出文件类型的链接
    pub file_links: Vec<FileLink>,
    /// 疑似 API 端点的链接
    pub api_endpoints: Vec<String>,
    /// 选定的解题策略
    pub strategy: Strategy,
    /// 题目复杂度
    pub complexity: Complexity,
}

impl Classification {
    /// 是否命中某个标签
    pub fn has_type(&self, t: QuestionType) -> bool {
        self.types.contains(&t)
    }

    /// 取某个标签捕获到的实体
    pub fn entity(&self, t: QuestionType) -> Option<&str> {
        self.key_entities
            .iter()
            .find(|(tag, _)| *tag == t)
            .map(|(_, value)| value.as_str())
    }
}

//! 题目分类器 - 业务能力层
//!
//! 只负责"识别题目类型并选定策略"能力，不关心流程
//!
//! ## 设计要点
//! - 规则表是有序的 `(标签, 正则)` 列表，按表顺序逐条求值
//! - 策略选择是有序的优先级列表，自上而下第一个命中者生效
//! - `classify` 是输入的纯函数：无副作用、无网络调用

use regex::Regex;

use crate::models::{
    Classification, Complexity, FileKind, FileLink, LinkRef, QuestionType, Strategy,
};

/// 题目中提取到的日期范围
#[derive(Debug, Clone, PartialEq)]
pub struct DateRange {
    pub start: String,
    pub end: String,
    /// 是否为 ISO 格式（YYYY-MM-DD）
    pub iso: bool,
}

/// 单条类型规则
struct TagRule {
    tag: QuestionType,
    pattern: Regex,
}

/// 题目分类器
///
/// 职责：
/// - 对题干文本做有序规则匹配，得到类型标签集合
/// - 对链接做文件类型识别（每个链接只取第一个命中的类型）
/// - 按固定优先级选出唯一策略
/// - 提供题干实体提取（提交地址、列名、日期范围）
pub struct QuestionClassifier {
    tag_rules: Vec<TagRule>,
    file_rules: Vec<(FileKind, Regex)>,
    submission_patterns: Vec<Regex>,
    column_patterns: Vec<Regex>,
    date_range_iso: Regex,
    date_range_text: Regex,
}

/// 文件类型的策略优先级（高优先级在前）
const FILE_KIND_PRIORITY: &[FileKind] = &[
    FileKind::Pdf,
    FileKind::Csv,
    FileKind::Excel,
    FileKind::Json,
    FileKind::Audio,
    FileKind::Image,
];

/// 策略选择的输入
struct SelectionInput<'a> {
    types: &'a [QuestionType],
    file_links: &'a [FileLink],
    api_endpoints: &'a [String],
}

type StrategyPick = fn(&SelectionInput<'_>) -> Option<Strategy>;

/// 策略优先级列表：自上而下求值，第一个命中者生效
///
/// 顺序即优先级，作为数据维护而不是嵌套条件
const STRATEGY_PRIORITY: &[StrategyPick] = &[
    pick_file_strategy,
    pick_api_strategy,
    pick_scrape_strategy,
    pick_chart_strategy,
    pick_complex_strategy,
    pick_date_strategy,
    pick_aggregate_strategy,
];

impl QuestionClassifier {
    /// 创建分类器（规则表只编译一次）
    pub fn new() -> Self {
        Self {
            tag_rules: build_tag_rules(),
            file_rules: build_file_rules(),
            submission_patterns: compile_all(&[
                r#"(?i)post\s+(?:your\s+)?(?:answer\s+)?to\s+(https?://[^\s<>"']+)"#,
                r#"(?i)submit\s+(?:to|at)\s+(https?://[^\s<>"']+)"#,
                r#"(?i)(?:submission|endpoint)[^:]*:\s*(https?://[^\s<>"']+)"#,
                r#"(?i)(https?://[^\s<>"']*submit[^\s<>"']*)"#,
                r#"(?i)(https?://[^\s<>"']*answer[^\s<>"']*)"#,
            ]),
            column_patterns: compile_all(&[
                r#"(?i)["'](\w+)["']\s*column"#,
                r#"(?i)column\s*["'](\w+)["']"#,
                r#"(?i)(?:sum|average|mean|count|max|min)\s+(?:of\s+)?(?:the\s+)?["']?(\w+)["']?"#,
                r#"(?i)(\w+)\s+(?:field|column|values)"#,
            ]),
            date_range_iso: compile(
                r"(\d{4}-\d{2}-\d{2})\s+(?:to|and|through|-)\s+(\d{4}-\d{2}-\d{2})",
            ),
            date_range_text: compile(
                r"(?i)(\w+\s+\d{1,2},?\s+\d{4})\s+(?:to|and|through|-)\s+(\w+\s+\d{1,2},?\s+\d{4})",
            ),
        }
    }

    /// 对题目文本和链接做分类
    ///
    /// 输入的纯函数：相同输入必然产出相同的 Classification；
    /// 永远返回一个策略（兜底为通用 LLM 分析）。
    pub fn classify(&self, question_text: &str, links: &[LinkRef]) -> Classification {
        let mut types = Vec::new();
        let mut key_entities = Vec::new();

        // ========== 有序规则匹配 ==========
        for rule in &self.tag_rules {
            if let Some(caps) = rule.pattern.captures(question_text) {
                types.push(rule.tag);
                if let Some(entity) = caps.get(1) {
                    key_entities.push((rule.tag, entity.as_str().to_string()));
                }
            }
        }

        // ========== 链接文件类型识别 ==========
        // 每个链接只取第一个命中的文件类型，不重复打标
        let mut file_links = Vec::new();
        let mut api_endpoints = Vec::new();
        for link in links {
            for (kind, pattern) in &self.file_rules {
                if pattern.is_match(&link.url) {
                    file_links.push(FileLink {
                        url: link.url.clone(),
                        kind: *kind,
                    });
                    break;
                }
            }

            if looks_like_api_endpoint(&link.url) {
                api_endpoints.push(link.url.clone());
            }
        }

        // ========== 策略选择与复杂度 ==========
        let input = SelectionInput {
            types: &types,
            file_links: &file_links,
            api_endpoints: &api_endpoints,
        };
        let strategy = select_strategy(&input);
        let complexity = estimate_complexity(&types, &file_links);

        Classification {
            types,
            key_entities,
            file_links,
            api_endpoints,
            strategy,
            complexity,
        }
    }

    /// 从题干中提取提交地址
    pub fn extract_submission_url(&self, text: &str) -> Option<String> {
        for pattern in &self.submission_patterns {
            if let Some(caps) = pattern.captures(text) {
                if let Some(url) = caps.get(1) {
                    let cleaned = url
                        .as_str()
                        .trim_end_matches(['.', ',', ';', ':', '!', '?'])
                        .to_string();
                    return Some(cleaned);
                }
            }
        }
        None
    }

    /// 从题干中提取列名
    pub fn extract_column_name(&self, text: &str) -> Option<String> {
        for pattern in &self.column_patterns {
            if let Some(caps) = pattern.captures(text) {
                if let Some(name) = caps.get(1) {
                    return Some(name.as_str().to_string());
                }
            }
        }
        None
    }

    /// 从题干中提取日期范围
    pub fn extract_date_range(&self, text: &str) -> Option<DateRange> {
        if let Some(caps) = self.date_range_iso.captures(text) {
            return Some(DateRange {
                start: caps[1].to_string(),
                end: caps[2].to_string(),
                iso: true,
            });
        }
        if let Some(caps) = self.date_range_text.captures(text) {
            return Some(DateRange {
                start: caps[1].to_string(),
                end: caps[2].to_string(),
                iso: false,
            });
        }
        None
    }
}

impl Default for QuestionClassifier {
    fn default() -> Self {
        Self::new()
    }
}

// ========== 规则表 ==========

/// 类型规则表（按表顺序求值，顺序不可打乱）
fn build_tag_rules() -> Vec<TagRule> {
    let rules: &[(QuestionType, &str)] = &[
        (
            QuestionType::DownloadFile,
            r"(?i)download\s+(?:the\s+)?(?:file|pdf|csv|excel|xlsx|json)",
        ),
        (
            QuestionType::ApiCall,
            r"(?i)(?:call|fetch|request|get\s+data\s+from)\s+(?:the\s+)?(?:api|endpoint)",
        ),
        (
            QuestionType::ScrapeWebsite,
            r"(?i)(?:scrape|extract|get)\s+(?:data\s+)?from\s+(?:the\s+)?(?:website|page)",
        ),
        (
            QuestionType::SumColumn,
            r#"(?i)(?:sum|total)\s+(?:of\s+)?(?:the\s+)?["']?(\w+)["']?\s*(?:column)?"#,
        ),
        (
            QuestionType::Average,
            r#"(?i)(?:average|mean)\s+(?:of\s+)?(?:the\s+)?["']?(\w+)["']?"#,
        ),
        (
            QuestionType::Count,
            r"(?i)(?:count|number\s+of|how\s+many)",
        ),
        (QuestionType::Filter, r"(?i)(?:filter|where|only|with)\s+(?:the\s+)?"),
        (QuestionType::Sort, r"(?i)(?:sort|order)\s+(?:by\s+)?"),
        (
            QuestionType::MaxMin,
            r"(?i)(?:maximum|minimum|max|min|largest|smallest|highest|lowest)",
        ),
        (
            QuestionType::DateCalc,
            r"(?i)(?:days?\s+between|weekend|saturday|sunday|date\s+range)",
        ),
        (
            QuestionType::Variance,
            r"(?i)(?:variance|std|standard\s+deviation)",
        ),
        (
            QuestionType::Regression,
            r"(?i)(?:regression|correlation|r-squared|predict)",
        ),
        (
            QuestionType::Visualization,
            r"(?i)(?:chart|graph|plot|visualiz|histogram|scatter|bar\s+chart)",
        ),
        (
            QuestionType::JsonTransform,
            r"(?i)(?:transform|convert|restructure|reshape)\s+(?:the\s+)?json",
        ),
        (QuestionType::Base64, r"(?i)(?:base64|data\s*uri|encode\s+as)"),
        (
            QuestionType::Transcribe,
            r"(?i)(?:transcribe|audio|speech|listen|recording)",
        ),
        (
            QuestionType::ImageAnalyze,
            r"(?i)(?:image|picture|photo|screenshot|what\s+is\s+in\s+the)",
        ),
        (
            QuestionType::NetworkAnalysis,
            r"(?i)(?:network|graph\s+analysis|nodes|edges|connected|path)",
        ),
        (
            QuestionType::Geospatial,
            r"(?i)(?:geospatial|latitude|longitude|coordinates|distance|map)",
        ),
        (
            QuestionType::SqlQuery,
            r"(?i)(?:sql|query|select\s+from|database)",
        ),
    ];

    rules
        .iter()
        .map(|(tag, pattern)| TagRule {
            tag: *tag,
            pattern: compile(pattern),
        })
        .collect()
}

/// 文件类型规则表（按表顺序求值，每个链接只取第一个命中者）
fn build_file_rules() -> Vec<(FileKind, Regex)> {
    let rules: &[(FileKind, &str)] = &[
        (FileKind::Pdf, r"(?i)\.pdf(?:\?|$)"),
        (FileKind::Csv, r"(?i)\.csv(?:\?|$)"),
        (FileKind::Excel, r"(?i)\.(xlsx?|xls)(?:\?|$)"),
        (FileKind::Json, r"(?i)\.json(?:\?|$)"),
        (FileKind::Image, r"(?i)\.(png|jpg|jpeg|gif|webp|svg)(?:\?|$)"),
        (FileKind::Audio, r"(?i)\.(mp3|wav|ogg|m4a|webm)(?:\?|$)"),
        (FileKind::Zip, r"(?i)\.zip(?:\?|$)"),
    ];

    rules
        .iter()
        .map(|(kind, pattern)| (*kind, compile(pattern)))
        .collect()
}

/// 链接是否像 API / JSON 资源
fn looks_like_api_endpoint(url: &str) -> bool {
    url.contains("/api/") || url.contains("api.") || url.ends_with(".json") || url.contains("endpoint")
}

// ========== 策略选择 ==========

fn select_strategy(input: &SelectionInput<'_>) -> Strategy {
    for pick in STRATEGY_PRIORITY {
        if let Some(strategy) = pick(input) {
            return strategy;
        }
    }
    Strategy::LlmAnalysis
}

/// 1. 文件链接（按文件类型优先级取最高者）
fn pick_file_strategy(input: &SelectionInput<'_>) -> Option<Strategy> {
    for kind in FILE_KIND_PRIORITY {
        if let Some(link) = input.file_links.iter().find(|l| l.kind == *kind) {
            let strategy = match kind {
                FileKind::Pdf => Strategy::ProcessPdf {
                    file_url: link.url.clone(),
                },
                FileKind::Csv | FileKind::Excel => Strategy::ProcessData {
                    file_url: link.url.clone(),
                    format: *kind,
                },
                FileKind::Json => Strategy::ProcessJson {
                    file_url: link.url.clone(),
                },
                FileKind::Audio => Strategy::TranscribeAudio {
                    file_url: link.url.clone(),
                },
                FileKind::Image => Strategy::AnalyzeImage {
                    file_url: Some(link.url.clone()),
                },
                FileKind::Zip => continue,
            };
            return Some(strategy);
        }
    }
    None
}

/// 2. API 调用
fn pick_api_strategy(input: &SelectionInput<'_>) -> Option<Strategy> {
    if !input.api_endpoints.is_empty() || input.types.contains(&QuestionType::ApiCall) {
        return Some(Strategy::CallApi {
            endpoints: input.api_endpoints.to_vec(),
        });
    }
    None
}

/// 3. 页面抓取
fn pick_scrape_strategy(input: &SelectionInput<'_>) -> Option<Strategy> {
    input
        .types
        .contains(&QuestionType::ScrapeWebsite)
        .then_some(Strategy::ScrapePage)
}

/// 4. 可视化
fn pick_chart_strategy(input: &SelectionInput<'_>) -> Option<Strategy> {
    input
        .types
        .contains(&QuestionType::Visualization)
        .then_some(Strategy::GenerateChart)
}

/// 5. 复杂分析（回归 / 方差 / 网络 / 地理空间）
fn pick_complex_strategy(input: &SelectionInput<'_>) -> Option<Strategy> {
    input
        .types
        .iter()
        .any(|t| t.is_complex_analysis())
        .then_some(Strategy::CodeAnalysis)
}

/// 6. 日期计算
fn pick_date_strategy(input: &SelectionInput<'_>) -> Option<Strategy> {
    input
        .types
        .contains(&QuestionType::DateCalc)
        .then_some(Strategy::DateCalculation)
}

/// 7. 简单聚合计算
fn pick_aggregate_strategy(input: &SelectionInput<'_>) -> Option<Strategy> {
    let aggregate = [
        QuestionType::SumColumn,
        QuestionType::Average,
        QuestionType::MaxMin,
        QuestionType::Count,
    ];
    input
        .types
        .iter()
        .any(|t| aggregate.contains(t))
        .then_some(Strategy::DataCalculation)
}

/// 复杂度估计：标签集合（与文件链接存在性）的纯函数
fn estimate_complexity(types: &[QuestionType], file_links: &[FileLink]) -> Complexity {
    if types.len() > 2 || types.iter().any(|t| t.is_complex_analysis()) {
        Complexity::Complex
    } else if types.len() > 1 || !file_links.is_empty() {
        Complexity::Medium
    } else {
        Complexity::Simple
    }
}

// ========== 正则编译辅助 ==========

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("内置正则表达式必须合法")
}

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().map(|p| compile(p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(url: &str) -> LinkRef {
        LinkRef {
            text: String::new(),
            url: url.to_string(),
        }
    }

    #[test]
    fn test_no_tags_defaults_to_llm_analysis() {
        let classifier = QuestionClassifier::new();
        let result = classifier.classify("What is 2+2?", &[]);

        assert!(result.types.is_empty());
        assert_eq!(result.strategy, Strategy::LlmAnalysis);
        assert_eq!(result.complexity, Complexity::Simple);
    }

    #[test]
    fn test_classify_is_deterministic() {
        let classifier = QuestionClassifier::new();
        let links = vec![link("https://example.com/data.csv")];
        let first = classifier.classify("sum the amount column", &links);
        let second = classifier.classify("sum the amount column", &links);

        assert_eq!(first, second);
    }

    #[test]
    fn test_csv_link_with_sum_intent() {
        let classifier = QuestionClassifier::new();
        let links = vec![link("https://example.com/data.csv")];
        let result = classifier.classify("Download the file and sum the amount column", &links);

        assert!(result.has_type(QuestionType::SumColumn));
        assert_eq!(result.entity(QuestionType::SumColumn), Some("amount"));
        assert_eq!(
            result.strategy,
            Strategy::ProcessData {
                file_url: "https://example.com/data.csv".to_string(),
                format: FileKind::Csv,
            }
        );
        assert_eq!(result.complexity, Complexity::Medium);
    }

    #[test]
    fn test_file_kind_priority_pdf_over_csv() {
        let classifier = QuestionClassifier::new();
        // CSV 链接在前，PDF 在后：类型优先级高的 PDF 生效
        let links = vec![
            link("https://example.com/data.csv"),
            link("https://example.com/report.pdf"),
        ];
        let result = classifier.classify("Analyze the files", &links);

        assert_eq!(
            result.strategy,
            Strategy::ProcessPdf {
                file_url: "https://example.com/report.pdf".to_string(),
            }
        );
    }

    #[test]
    fn test_link_is_not_double_tagged() {
        let classifier = QuestionClassifier::new();
        let links = vec![link("https://example.com/export.csv")];
        let result = classifier.classify("process it", &links);

        assert_eq!(result.file_links.len(), 1);
        assert_eq!(result.file_links[0].kind, FileKind::Csv);
    }

    #[test]
    fn test_api_endpoint_detection() {
        let classifier = QuestionClassifier::new();
        let links = vec![link("https://example.com/api/users")];
        let result = classifier.classify("Fetch data from the API endpoint", &links);

        assert_eq!(result.api_endpoints.len(), 1);
        assert_eq!(
            result.strategy,
            Strategy::CallApi {
                endpoints: vec!["https://example.com/api/users".to_string()],
            }
        );
    }

    #[test]
    fn test_complex_analysis_tag_forces_complex() {
        let classifier = QuestionClassifier::new();
        let result = classifier.classify("Compute the regression coefficient", &[]);

        assert!(result.has_type(QuestionType::Regression));
        assert_eq!(result.strategy, Strategy::CodeAnalysis);
        assert_eq!(result.complexity, Complexity::Complex);
    }

    #[test]
    fn test_date_calculation_strategy() {
        let classifier = QuestionClassifier::new();
        let result =
            classifier.classify("How many weekend days between 2025-01-01 to 2025-01-31?", &[]);

        assert!(result.has_type(QuestionType::DateCalc));
        assert_eq!(result.strategy, Strategy::DateCalculation);
    }

    #[test]
    fn test_extract_submission_url() {
        let classifier = QuestionClassifier::new();
        assert_eq!(
            classifier.extract_submission_url("Post your answer to https://quiz.example.com/submit."),
            Some("https://quiz.example.com/submit".to_string())
        );
        assert_eq!(classifier.extract_submission_url("no url here"), None);
    }

    #[test]
    fn test_extract_column_name() {
        let classifier = QuestionClassifier::new();
        assert_eq!(
            classifier.extract_column_name(r#"sum the "amount" column"#),
            Some("amount".to_string())
        );
        assert_eq!(
            classifier.extract_column_name("average of the price"),
            Some("price".to_string())
        );
        assert_eq!(classifier.extract_column_name("nothing relevant"), None);
    }

    #[test]
    fn test_extract_date_range_iso() {
        let classifier = QuestionClassifier::new();
        let range = classifier
            .extract_date_range("count days 2025-03-01 to 2025-03-31 inclusive")
            .unwrap();

        assert_eq!(range.start, "2025-03-01");
        assert_eq!(range.end, "2025-03-31");
        assert!(range.iso);
    }

    #[test]
    fn test_strategy_priority_scrape_over_chart() {
        let classifier = QuestionClassifier::new();
        // 同时命中抓取和可视化：抓取优先
        let result = classifier.classify("Scrape data from the website and plot a chart", &[]);

        assert!(result.has_type(QuestionType::ScrapeWebsite));
        assert!(result.has_type(QuestionType::Visualization));
        assert_eq!(result.strategy, Strategy::ScrapePage);
    }
}

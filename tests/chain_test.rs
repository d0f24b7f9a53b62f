//! 题目链端到端测试
//!
//! 所有外部协作方（页面驱动、回答后端、文件获取、提交端点）
//! 都用桩实现驱动，验证编排协议本身：
//! 分类 → 解题 → 提交 → 重试 / 前进 / 停止

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::time::sleep;

use quiz_chain_solver::error::{AppError, AppResult};
use quiz_chain_solver::infrastructure::{PageDriver, PageScope};
use quiz_chain_solver::models::{
    AnswerCandidate, ChainStop, FileKind, Identity, LinkRef, QuestionContext, Strategy,
    SubmissionVerdict,
};
use quiz_chain_solver::services::file_service::{CsvData, DownloadedFile, FileFetcher};
use quiz_chain_solver::services::{
    AnswerProvider, AnswerProviderChain, ApiCallService, CodeExecutor, ProviderRegistry,
    QuestionClassifier,
};
use quiz_chain_solver::workflow::{QuestionFlow, StrategyDispatcher};
use quiz_chain_solver::{ChainProcessor, Config, Submitter};

// ========== 桩实现 ==========

/// 桩页面作用域
struct StubPageScope {
    context: QuestionContext,
}

#[async_trait]
impl PageScope for StubPageScope {
    async fn extract(&self) -> AppResult<QuestionContext> {
        Ok(self.context.clone())
    }

    async fn screenshot_data_uri(&self) -> AppResult<String> {
        Ok("data:image/png;base64,c3R1Yg==".to_string())
    }

    async fn close(&self) {}
}

/// 桩页面驱动：按地址返回预置的题目内容
struct StubPageDriver {
    pages: HashMap<String, QuestionContext>,
    open_delay: Duration,
}

impl StubPageDriver {
    fn new(pages: HashMap<String, QuestionContext>) -> Self {
        Self {
            pages,
            open_delay: Duration::ZERO,
        }
    }

    fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }
}

#[async_trait]
impl PageDriver for StubPageDriver {
    async fn open(&self, url: &str) -> AppResult<Box<dyn PageScope>> {
        if self.open_delay > Duration::ZERO {
            sleep(self.open_delay).await;
        }
        let context = self
            .pages
            .get(url)
            .cloned()
            .ok_or_else(|| AppError::Other(format!("未知题目地址: {}", url)))?;
        Ok(Box::new(StubPageScope { context }))
    }
}

/// 桩回答后端：固定返回一段文本，并统计调用次数
struct StubProvider {
    name: String,
    response: String,
    calls: AtomicUsize,
}

impl StubProvider {
    fn returns(name: &str, text: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            response: text.to_string(),
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
        Ok(self.response.clone())
    }
}

/// 桩文件获取：固定返回一份 CSV
struct StubFileFetcher {
    csv: CsvData,
}

#[async_trait]
impl FileFetcher for StubFileFetcher {
    async fn download(&self, url: &str) -> AppResult<DownloadedFile> {
        Err(AppError::Other(format!("桩不支持下载: {}", url)))
    }

    async fn fetch_csv(&self, _url: &str) -> AppResult<CsvData> {
        Ok(self.csv.clone())
    }

    async fn fetch_json(&self, url: &str) -> AppResult<JsonValue> {
        Err(AppError::Other(format!("桩不支持 JSON: {}", url)))
    }

    async fn fetch_pdf_text(&self, url: &str) -> AppResult<String> {
        Err(AppError::Other(format!("桩不支持 PDF: {}", url)))
    }
}

/// 桩代码执行器：永远失败
struct StubCodeExecutor;

#[async_trait]
impl CodeExecutor for StubCodeExecutor {
    async fn run_python(&self, _code: &str) -> AppResult<String> {
        Err(AppError::Other("桩不支持代码执行".to_string()))
    }
}

/// 桩提交端点：按题目地址依次弹出预置裁决，并记录提交的答案
#[derive(Default)]
struct StubSubmitter {
    verdicts: Mutex<HashMap<String, Vec<SubmissionVerdict>>>,
    submissions: Mutex<Vec<(String, String)>>,
}

impl StubSubmitter {
    fn script(question_url: &str, verdicts: Vec<SubmissionVerdict>) -> Self {
        let submitter = Self::default();
        submitter.add_script(question_url, verdicts);
        submitter
    }

    fn add_script(&self, question_url: &str, verdicts: Vec<SubmissionVerdict>) {
        self.verdicts
            .lock()
            .unwrap()
            .insert(question_url.to_string(), verdicts);
    }

    fn submitted(&self) -> Vec<(String, String)> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl Submitter for StubSubmitter {
    async fn submit(
        &self,
        _submission_url: &str,
        answer: &str,
        _identity: &Identity,
        question_url: &str,
    ) -> AppResult<SubmissionVerdict> {
        self.submissions
            .lock()
            .unwrap()
            .push((question_url.to_string(), answer.to_string()));

        let mut verdicts = self.verdicts.lock().unwrap();
        let queue = verdicts.get_mut(question_url);
        let verdict = queue
            .and_then(|q| {
                if q.is_empty() {
                    None
                } else {
                    Some(q.remove(0))
                }
            })
            .unwrap_or(SubmissionVerdict {
                correct: false,
                next_url: None,
                reason: Some("无预置裁决".to_string()),
            });
        Ok(verdict)
    }
}

// ========== 装配辅助 ==========

fn test_config() -> Config {
    Config {
        retry_delay_ms: 1,
        time_budget_ms: 60_000,
        ..Config::default()
    }
}

fn text_context(text: &str) -> QuestionContext {
    QuestionContext {
        text: text.to_string(),
        ..QuestionContext::default()
    }
}

fn verdict(correct: bool, next_url: Option<&str>) -> SubmissionVerdict {
    SubmissionVerdict {
        correct,
        next_url: next_url.map(|u| u.to_string()),
        reason: if correct {
            None
        } else {
            Some("wrong answer".to_string())
        },
    }
}

fn build_solver(
    config: &Config,
    driver: Arc<dyn PageDriver>,
    providers: Vec<Arc<dyn AnswerProvider>>,
    files: Arc<dyn FileFetcher>,
    submitter: Arc<dyn Submitter>,
) -> ChainProcessor {
    let registry = Arc::new(ProviderRegistry::from_chains(providers, vec![], vec![]));
    let chain = Arc::new(AnswerProviderChain::new(registry, config));
    let executor: Arc<dyn CodeExecutor> = Arc::new(StubCodeExecutor);
    let api = Arc::new(ApiCallService::new(config));
    let classifier = Arc::new(QuestionClassifier::new());

    let dispatcher = StrategyDispatcher::new(chain, files, executor, api, classifier.clone());
    let flow = QuestionFlow::new(driver, classifier, dispatcher, submitter, config);
    ChainProcessor::new(flow, config)
}

fn no_files() -> Arc<dyn FileFetcher> {
    Arc::new(StubFileFetcher {
        csv: CsvData::default(),
    })
}

fn identity() -> Identity {
    Identity::new("student@example.com", "s3cret")
}

// ========== 测试场景 ==========

/// 文本题端到端：分类为通用分析 → 后端回答 "4" → 提交 "4" → 前进到下一题
#[tokio::test]
async fn test_text_question_solves_and_advances_chain() {
    let q1 = "https://x/q1";
    let q2 = "https://x/q2";
    let mut pages = HashMap::new();
    pages.insert(q1.to_string(), text_context("What is 2+2?"));
    pages.insert(q2.to_string(), text_context("What is 3+3?"));

    let provider = StubProvider::returns("stub", "4");
    let submitter = Arc::new(StubSubmitter::script(q1, vec![verdict(true, Some(q2))]));
    submitter.add_script(q2, vec![verdict(true, None)]);

    let config = test_config();
    let solver = build_solver(
        &config,
        Arc::new(StubPageDriver::new(pages)),
        vec![provider.clone()],
        no_files(),
        submitter.clone(),
    );

    let report = solver.solve_chain(q1, &identity()).await.unwrap();

    assert_eq!(report.stopped, ChainStop::Completed);
    assert_eq!(report.questions_processed, 2);
    assert_eq!(report.attempts.len(), 2);

    let first = &report.attempts[0];
    let classification = first.classification.as_ref().unwrap();
    assert_eq!(classification.strategy, Strategy::LlmAnalysis);
    assert_eq!(first.answer, Some(AnswerCandidate::Number(4.0)));
    assert_eq!(first.formatted_answer.as_deref(), Some("4"));

    // 提交顺序与链路顺序一致
    let submitted = submitter.submitted();
    assert_eq!(submitted[0], (q1.to_string(), "4".to_string()));
    assert_eq!(submitted[1].0, q2.to_string());
}

/// CSV 题端到端：策略为 PROCESS_DATA，本地聚合出 30，不调用任何后端
#[tokio::test]
async fn test_csv_sum_computes_locally() {
    let q1 = "https://x/q1";
    let mut pages = HashMap::new();
    pages.insert(
        q1.to_string(),
        QuestionContext {
            text: "Download the file and sum the amount column".to_string(),
            links: vec![LinkRef {
                text: "data".to_string(),
                url: "https://x/data.csv".to_string(),
            }],
            ..QuestionContext::default()
        },
    );

    let provider = StubProvider::returns("stub", "should not be asked");
    let files = Arc::new(StubFileFetcher {
        csv: CsvData {
            headers: vec!["amount".to_string()],
            rows: vec![vec!["10".to_string()], vec!["20".to_string()]],
        },
    });
    let submitter = Arc::new(StubSubmitter::script(q1, vec![verdict(true, None)]));

    let config = test_config();
    let solver = build_solver(
        &config,
        Arc::new(StubPageDriver::new(pages)),
        vec![provider.clone()],
        files,
        submitter.clone(),
    );

    let report = solver.solve_chain(q1, &identity()).await.unwrap();

    assert_eq!(report.stopped, ChainStop::Completed);
    let first = &report.attempts[0];
    let classification = first.classification.as_ref().unwrap();
    assert_eq!(
        classification.strategy,
        Strategy::ProcessData {
            file_url: "https://x/data.csv".to_string(),
            format: FileKind::Csv,
        }
    );
    assert_eq!(first.formatted_answer.as_deref(), Some("30"));

    // 本地聚合成功时不触碰回答后端
    assert_eq!(provider.call_count(), 0);
}

/// 重试上限：连续答错且无下一题地址，恰好尝试 3 次后题目失败
#[tokio::test]
async fn test_retry_cap_ends_question_as_failed() {
    let q1 = "https://x/q1";
    let mut pages = HashMap::new();
    pages.insert(q1.to_string(), text_context("What is 2+2?"));

    let provider = StubProvider::returns("stub", "4");
    let submitter = Arc::new(StubSubmitter::script(
        q1,
        vec![
            verdict(false, None),
            verdict(false, None),
            verdict(false, None),
        ],
    ));

    let config = test_config();
    let solver = build_solver(
        &config,
        Arc::new(StubPageDriver::new(pages)),
        vec![provider.clone()],
        no_files(),
        submitter.clone(),
    );

    let report = solver.solve_chain(q1, &identity()).await.unwrap();

    assert_eq!(report.stopped, ChainStop::QuestionFailed);
    assert_eq!(report.questions_processed, 1);
    // 恰好 3 次尝试，每次都走到了提交
    assert_eq!(report.attempts.len(), 3);
    assert_eq!(submitter.submitted().len(), 3);
    assert_eq!(provider.call_count(), 3);
    assert!(report
        .attempts
        .iter()
        .all(|a| a.verdict.as_ref().is_some_and(|v| !v.correct)));
}

/// 答错但裁决带下一题地址：立即前进，不消耗重试
#[tokio::test]
async fn test_wrong_answer_with_next_url_advances() {
    let q1 = "https://x/q1";
    let q2 = "https://x/q2";
    let mut pages = HashMap::new();
    pages.insert(q1.to_string(), text_context("What is 2+2?"));
    pages.insert(q2.to_string(), text_context("What is 3+3?"));

    let provider = StubProvider::returns("stub", "5");
    let submitter = Arc::new(StubSubmitter::script(q1, vec![verdict(false, Some(q2))]));
    submitter.add_script(q2, vec![verdict(true, None)]);

    let config = test_config();
    let solver = build_solver(
        &config,
        Arc::new(StubPageDriver::new(pages)),
        vec![provider],
        no_files(),
        submitter.clone(),
    );

    let report = solver.solve_chain(q1, &identity()).await.unwrap();

    assert_eq!(report.stopped, ChainStop::Completed);
    assert_eq!(report.questions_processed, 2);
    // 第一题只尝试了一次
    assert_eq!(
        report
            .attempts
            .iter()
            .filter(|a| a.question_url == q1)
            .count(),
        1
    );
    assert!(!report.attempts[0].verdict.as_ref().unwrap().correct);
}

/// 时间预算：超出预算后不再开始新题，结果中没有未开始题目的尝试记录
#[tokio::test]
async fn test_time_budget_stops_before_next_question() {
    let q1 = "https://x/q1";
    let q2 = "https://x/q2";
    let mut pages = HashMap::new();
    pages.insert(q1.to_string(), text_context("What is 2+2?"));
    pages.insert(q2.to_string(), text_context("What is 3+3?"));

    let provider = StubProvider::returns("stub", "4");
    let submitter = Arc::new(StubSubmitter::script(q1, vec![verdict(true, Some(q2))]));
    submitter.add_script(q2, vec![verdict(true, None)]);

    // 每次打开页面耗时 50ms，预算 30ms：第一题结束后预算已超
    let config = Config {
        time_budget_ms: 30,
        retry_delay_ms: 1,
        ..Config::default()
    };
    let driver =
        StubPageDriver::new(pages).with_open_delay(Duration::from_millis(50));
    let solver = build_solver(
        &config,
        Arc::new(driver),
        vec![provider],
        no_files(),
        submitter.clone(),
    );

    let report = solver.solve_chain(q1, &identity()).await.unwrap();

    assert_eq!(report.stopped, ChainStop::TimeBudgetExceeded);
    assert_eq!(report.questions_processed, 1);
    // 未开始的题目没有任何尝试记录
    assert!(report.attempts.iter().all(|a| a.question_url == q1));
}

/// 链最大长度：裁决一直给下一题地址时，处理满上限后停止
#[tokio::test]
async fn test_max_chain_length_stops_chain() {
    let mut pages = HashMap::new();
    let submitter = Arc::new(StubSubmitter::default());
    for i in 1..=5 {
        let url = format!("https://x/q{}", i);
        let next = format!("https://x/q{}", i + 1);
        pages.insert(url.clone(), text_context("What is 2+2?"));
        submitter.add_script(&url, vec![verdict(true, Some(next.as_str()))]);
    }

    let provider = StubProvider::returns("stub", "4");
    let config = Config {
        max_chain_length: 3,
        retry_delay_ms: 1,
        ..Config::default()
    };
    let solver = build_solver(
        &config,
        Arc::new(StubPageDriver::new(pages)),
        vec![provider],
        no_files(),
        submitter.clone(),
    );

    let report = solver
        .solve_chain("https://x/q1", &identity())
        .await
        .unwrap();

    assert_eq!(report.stopped, ChainStop::MaxChainLength);
    assert_eq!(report.questions_processed, 3);
}

//! 尝试记录与链路会话状态

use std::time::{Duration, Instant};

use crate::models::answer::AnswerCandidate;
use crate::models::classification::Classification;

/// 提交身份（邮箱 + 密钥）
#[derive(Debug, Clone)]
pub struct Identity {
    pub email: String,
    pub secret: String,
}

impl Identity {
    pub fn new(email: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            secret: secret.into(),
        }
    }
}

/// 提交端点的裁决结果
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionVerdict {
    /// 答案是否正确
    pub correct: bool,
    /// 下一题地址（如果有）
    pub next_url: Option<String>,
    /// 裁决说明（如果有）
    pub reason: Option<String>,
}

/// 单题单次尝试的完整记录
#[derive(Debug, Clone)]
pub struct Attempt {
    /// 题目地址
    pub question_url: String,
    /// 分类结果
    pub classification: Option<Classification>,
    /// 候选答案
    pub answer: Option<AnswerCandidate>,
    /// 提交后的格式化答案
    pub formatted_answer: Option<String>,
    /// 裁决结果（提交成功时）
    pub verdict: Option<SubmissionVerdict>,
    /// 本次尝试的错误（未走到提交时）
    pub error: Option<String>,
}

/// 单题处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum QuestionOutcome {
    /// 答对
    Correct { next_url: Option<String> },
    /// 答错但裁决给出了下一题地址，直接前进
    WrongButAdvanced { next_url: String },
    /// 用尽重试次数后失败
    Failed { reason: String },
    /// 时间预算在重试期间用尽
    BudgetExhausted,
}

/// 链路终止原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStop {
    /// 裁决不再给出下一题，链路正常完成
    Completed,
    /// 超出时间预算
    TimeBudgetExceeded,
    /// 达到链路最大长度
    MaxChainLength,
    /// 某题用尽重试次数
    QuestionFailed,
}

/// 链路运行状态
///
/// 由状态机独占持有：链路开始时创建，结束时丢弃；
/// 不存在多条链路共享同一会话的情况。
#[derive(Debug)]
pub struct ChainSession {
    /// 当前题目地址
    pub current_url: String,
    /// 已处理题目数
    pub questions_processed: usize,
    /// 链路开始时间
    pub started_at: Instant,
    /// 累积的尝试记录
    pub attempts: Vec<Attempt>,
}

impl ChainSession {
    /// 创建新的链路会话
    pub fn new(initial_url: impl Into<String>) -> Self {
        Self {
            current_url: initial_url.into(),
            questions_processed: 0,
            started_at: Instant::now(),
            attempts: Vec::new(),
        }
    }

    /// 链路已运行时长
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// 记录一次尝试
    pub fn record(&mut self, attempt: Attempt) {
        self.attempts.push(attempt);
    }
}

/// 链路运行报告
#[derive(Debug)]
pub struct ChainReport {
    /// 处理过的题目数
    pub questions_processed: usize,
    /// 总耗时（秒）
    pub total_secs: f64,
    /// 全部尝试记录（与真实时间顺序一致）
    pub attempts: Vec<Attempt>,
    /// 终止原因
    pub stopped: ChainStop,
}

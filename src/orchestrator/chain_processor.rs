//! 题目链处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块负责沿着"下一题地址"驱动整条题目链，是链级别的编排器。
//!
//! ## 核心功能
//!
//! 1. **链循环**：按裁决给出的下一题地址逐题前进
//! 2. **上限控制**：链最大长度（默认 20 题）
//! 3. **时间预算**：在每道新题开始前检查（软限制，不抢占进行中的调用）
//! 4. **结果汇总**：保留全部尝试记录，产出链路报告
//!
//! 执行是单线程协作式的：同一时刻只解一道题，一道题内
//! 同一时刻只有一次尝试在进行。

use std::time::Duration;

use anyhow::Result;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::models::{ChainReport, ChainSession, ChainStop, Identity, QuestionOutcome};
use crate::workflow::{QuestionCtx, QuestionFlow};

/// 题目链处理器
pub struct ChainProcessor {
    flow: QuestionFlow,
    max_chain_length: usize,
    time_budget: Duration,
}

impl ChainProcessor {
    /// 创建链处理器
    pub fn new(flow: QuestionFlow, config: &Config) -> Self {
        Self {
            flow,
            max_chain_length: config.max_chain_length,
            time_budget: Duration::from_millis(config.time_budget_ms),
        }
    }

    /// 从初始地址开始解整条题目链
    pub async fn solve_chain(&self, initial_url: &str, identity: &Identity) -> Result<ChainReport> {
        log_chain_start(initial_url, &identity.email);

        let mut session = ChainSession::new(initial_url);
        let mut current = Some(initial_url.to_string());
        let stopped;

        loop {
            let Some(url) = current.clone() else {
                stopped = ChainStop::Completed;
                break;
            };

            // 上限与时间预算都在新题开始前检查
            if session.questions_processed >= self.max_chain_length {
                warn!("⚠️ 已达链最大长度 ({} 题)，停止", self.max_chain_length);
                stopped = ChainStop::MaxChainLength;
                break;
            }
            if session.elapsed() > self.time_budget {
                warn!(
                    "⏰ 接近时间预算 ({} 秒)，停止",
                    session.elapsed().as_secs()
                );
                stopped = ChainStop::TimeBudgetExceeded;
                break;
            }

            session.questions_processed += 1;
            session.current_url = url.clone();
            let ctx = QuestionCtx::new(session.questions_processed, url);
            log_question_start(&ctx, session.elapsed());

            match self.flow.run(&ctx, identity, &mut session).await? {
                QuestionOutcome::Correct {
                    next_url: Some(next),
                } => {
                    info!("➡️ 前进到下一题: {}", next);
                    current = Some(next);
                }
                QuestionOutcome::Correct { next_url: None } => {
                    info!("🏁 题目链完成");
                    stopped = ChainStop::Completed;
                    break;
                }
                QuestionOutcome::WrongButAdvanced { next_url } => {
                    info!("➡️ 前进到下一题: {}", next_url);
                    current = Some(next_url);
                }
                QuestionOutcome::Failed { reason } => {
                    error!("❌ 题目处理失败: {}", reason);
                    stopped = ChainStop::QuestionFailed;
                    break;
                }
                QuestionOutcome::BudgetExhausted => {
                    stopped = ChainStop::TimeBudgetExceeded;
                    break;
                }
            }
        }

        let report = ChainReport {
            questions_processed: session.questions_processed,
            total_secs: session.elapsed().as_secs_f64(),
            attempts: session.attempts,
            stopped,
        };
        log_chain_complete(&report);

        Ok(report)
    }
}

// ========== 日志辅助函数 ==========

fn log_chain_start(initial_url: &str, email: &str) {
    info!("{}", "=".repeat(60));
    info!("🚀 题目链求解开始");
    info!("初始地址: {}", initial_url);
    info!("身份: {}", email);
    info!("{}", "=".repeat(60));
}

fn log_question_start(ctx: &QuestionCtx, elapsed: Duration) {
    info!("\n{}", "=".repeat(40));
    info!("📝 第 {} 题 (已用 {} 秒)", ctx.chain_index, elapsed.as_secs());
    info!("地址: {}", ctx.question_url);
    info!("{}", "=".repeat(40));
}

fn log_chain_complete(report: &ChainReport) {
    info!("\n{}", "=".repeat(60));
    info!(
        "✅ 链路结束: 共 {} 题, 耗时 {:.2} 秒 ({:?})",
        report.questions_processed, report.total_secs, report.stopped
    );
    info!("尝试记录: {} 条", report.attempts.len());
    info!("{}", "=".repeat(60));
}

//! 单题处理流程 - 流程层
//!
//! 核心职责：驱动一道题走完完整状态机
//!
//! 状态顺序：
//! 抓取 → 提取 → 分类 → 解题 → 提交 → {答对 | 答错 | 尝试出错}
//!
//! 答错 / 出错时按固定间隔重试，最多到重试上限；
//! 答错但裁决带下一题地址时立即前进（不消耗重试）；
//! 每次尝试都独占一个新页面，且在任何退出路径上先释放页面。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::clients::submission_client::Submitter;
use crate::config::Config;
use crate::error::AppResult;
use crate::infrastructure::{PageDriver, PageScope};
use crate::models::{
    format_answer, Attempt, ChainSession, Identity, QuestionOutcome, SubmissionVerdict,
};
use crate::services::classifier::QuestionClassifier;
use crate::utils::truncate_text;
use crate::workflow::question_ctx::QuestionCtx;
use crate::workflow::strategy::{RetryContext, StrategyDispatcher};

/// 单次尝试走到提交后的结果
struct AttemptResult {
    attempt: Attempt,
    verdict: SubmissionVerdict,
    formatted_answer: String,
}

/// 单题处理流程
///
/// - 编排完整的单题状态机
/// - 决定何时重试、何时前进、何时放弃
/// - 不持有页面资源，每次尝试向驱动器申请
pub struct QuestionFlow {
    driver: Arc<dyn PageDriver>,
    classifier: Arc<QuestionClassifier>,
    dispatcher: StrategyDispatcher,
    submitter: Arc<dyn Submitter>,
    max_retries: usize,
    retry_delay: Duration,
    time_budget: Duration,
}

impl QuestionFlow {
    /// 创建单题处理流程
    pub fn new(
        driver: Arc<dyn PageDriver>,
        classifier: Arc<QuestionClassifier>,
        dispatcher: StrategyDispatcher,
        submitter: Arc<dyn Submitter>,
        config: &Config,
    ) -> Self {
        Self {
            driver,
            classifier,
            dispatcher,
            submitter,
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            time_budget: Duration::from_millis(config.time_budget_ms),
        }
    }

    /// 处理一道题目
    pub async fn run(
        &self,
        ctx: &QuestionCtx,
        identity: &Identity,
        session: &mut ChainSession,
    ) -> Result<QuestionOutcome> {
        let mut previous_answer: Option<String> = None;
        let mut last_reason: Option<String> = None;
        let mut attempt_index = 0;

        while attempt_index < self.max_retries {
            // 时间预算在重试边界上软检查，不抢占进行中的调用
            if session.elapsed() > self.time_budget {
                warn!("{} ⏰ 时间预算已用尽，停止重试", ctx);
                return Ok(QuestionOutcome::BudgetExhausted);
            }

            let retry = RetryContext {
                attempt: attempt_index,
                previous_answer: previous_answer.clone(),
            };

            match self.attempt_once(ctx, identity, &retry).await {
                Ok(result) => {
                    let verdict = result.verdict.clone();
                    session.record(result.attempt);

                    if verdict.correct {
                        info!("{} ✅ 答对！", ctx);
                        return Ok(QuestionOutcome::Correct {
                            next_url: verdict.next_url,
                        });
                    }

                    warn!(
                        "{} ❌ 答错 (第 {}/{} 次): {}",
                        ctx,
                        attempt_index + 1,
                        self.max_retries,
                        verdict.reason.as_deref().unwrap_or("未知原因")
                    );

                    // 答错但拿到下一题地址：直接前进，不再消耗重试
                    if let Some(next_url) = verdict.next_url {
                        info!("{} 📌 答错但拿到下一题地址，直接前进", ctx);
                        return Ok(QuestionOutcome::WrongButAdvanced { next_url });
                    }

                    previous_answer = Some(result.formatted_answer);
                    last_reason = verdict.reason;
                }
                Err(e) => {
                    error!("{} 💥 第 {} 次尝试出错: {}", ctx, attempt_index + 1, e);
                    last_reason = Some(e.to_string());
                    session.record(Attempt {
                        question_url: ctx.question_url.clone(),
                        classification: None,
                        answer: None,
                        formatted_answer: None,
                        verdict: None,
                        error: Some(e.to_string()),
                    });
                }
            }

            attempt_index += 1;
            if attempt_index < self.max_retries {
                info!("{} ⏳ {:.1} 秒后重试...", ctx, self.retry_delay.as_secs_f32());
                sleep(self.retry_delay).await;
            }
        }

        Ok(QuestionOutcome::Failed {
            reason: last_reason.unwrap_or_else(|| "已达最大重试次数".to_string()),
        })
    }

    /// 单次尝试：申请页面 → 解题 → 释放页面
    ///
    /// 页面在所有路径上（成功、裁决、出错）都先释放，再返回结果
    async fn attempt_once(
        &self,
        ctx: &QuestionCtx,
        identity: &Identity,
        retry: &RetryContext,
    ) -> AppResult<AttemptResult> {
        info!("{} 🌐 加载题目页面...", ctx);
        let scope = self.driver.open(&ctx.question_url).await?;

        let result = self
            .solve_with_scope(ctx, identity, retry, scope.as_ref())
            .await;

        scope.close().await;
        result
    }

    async fn solve_with_scope(
        &self,
        ctx: &QuestionCtx,
        identity: &Identity,
        retry: &RetryContext,
        scope: &dyn PageScope,
    ) -> AppResult<AttemptResult> {
        // 提取
        let context = scope.extract().await?;
        info!("{} 📋 题目: {}", ctx, truncate_text(&context.text, 200));

        // 分类
        let classification = self.classifier.classify(&context.text, &context.links);
        info!(
            "{} 🔍 策略: {} (复杂度: {:?})",
            ctx, classification.strategy, classification.complexity
        );

        // 提交端点：题干声明 → 表单 action → 源站 /submit
        let submission_url = self.resolve_submission_url(&context, &ctx.question_url);
        info!("{} 📮 提交端点: {}", ctx, submission_url);

        // 解题
        let candidate = self
            .dispatcher
            .execute(&classification.strategy, &context, scope, retry)
            .await?;

        // 规范化并提交
        let formatted = format_answer(&candidate);
        info!("{} 💡 答案: {}", ctx, truncate_text(&formatted, 200));

        let verdict = self
            .submitter
            .submit(&submission_url, &formatted, identity, &ctx.question_url)
            .await?;
        info!(
            "{} 📬 裁决: correct={} next={:?}",
            ctx, verdict.correct, verdict.next_url
        );

        Ok(AttemptResult {
            attempt: Attempt {
                question_url: ctx.question_url.clone(),
                classification: Some(classification),
                answer: Some(candidate),
                formatted_answer: Some(formatted.clone()),
                verdict: Some(verdict.clone()),
                error: None,
            },
            verdict,
            formatted_answer: formatted,
        })
    }

    /// 解析提交端点地址
    fn resolve_submission_url(
        &self,
        context: &crate::models::QuestionContext,
        question_url: &str,
    ) -> String {
        self.classifier
            .extract_submission_url(&context.text)
            .or_else(|| context.form_action.clone())
            .unwrap_or_else(|| origin_submit_url(question_url))
    }
}

/// 默认提交端点：题目地址的源站 + /submit
fn origin_submit_url(question_url: &str) -> String {
    match reqwest::Url::parse(question_url) {
        Ok(url) => format!("{}/submit", url.origin().ascii_serialization()),
        Err(_) => format!("{}/submit", question_url.trim_end_matches('/')),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_submit_url() {
        assert_eq!(
            origin_submit_url("https://quiz.example.com/demo/q1?x=1"),
            "https://quiz.example.com/submit"
        );
        assert_eq!(
            origin_submit_url("http://localhost:8080/q"),
            "http://localhost:8080/submit"
        );
    }
}

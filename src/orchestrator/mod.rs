//! 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责资源装配与生命周期管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：启动浏览器、构建后端注册表、装配各层服务
//! 2. **资源所有者**：页面驱动器是唯一持有浏览器的模块
//! 3. **向下委托**：委托 chain_processor 处理单条题目链
//! 4. **对外入口**：运行控制面 HTTP 服务接受解题请求

pub mod chain_processor;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::api;
use crate::browser;
use crate::clients::{SubmissionClient, Submitter};
use crate::config::Config;
use crate::infrastructure::{BrowserDriver, PageDriver};
use crate::services::{
    AnswerProviderChain, ApiCallService, CodeExecutor, FileFetcher, HttpFileService,
    ProviderRegistry, PythonExecutor, QuestionClassifier,
};
use crate::workflow::{QuestionFlow, StrategyDispatcher};

pub use chain_processor::ChainProcessor;

/// 应用主结构
pub struct App {
    config: Config,
    solver: Arc<ChainProcessor>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        log_startup(&config);

        // 预启动浏览器（跨题目链复用）
        let browser = browser::launch_browser().await?;
        let driver: Arc<dyn PageDriver> = Arc::new(BrowserDriver::new(browser, &config));

        let solver = Arc::new(build_chain_processor(&config, driver));

        Ok(Self { config, solver })
    }

    /// 运行控制面服务
    pub async fn run(&self) -> Result<()> {
        api::serve(self.config.clone(), self.solver.clone()).await
    }
}

/// 装配链处理器
///
/// 后端注册表在这里构造一次，之后按引用传入各层；
/// 不存在模块级的可变全局状态。
pub fn build_chain_processor(config: &Config, driver: Arc<dyn PageDriver>) -> ChainProcessor {
    let registry = Arc::new(ProviderRegistry::from_config(config));
    let chain = Arc::new(AnswerProviderChain::new(registry, config));

    let executor: Arc<dyn CodeExecutor> = Arc::new(PythonExecutor::new(config));
    let files: Arc<dyn FileFetcher> = Arc::new(HttpFileService::new(config, executor.clone()));
    let api_service = Arc::new(ApiCallService::new(config));
    let classifier = Arc::new(QuestionClassifier::new());

    let dispatcher = StrategyDispatcher::new(
        chain,
        files,
        executor,
        api_service,
        classifier.clone(),
    );
    let submitter: Arc<dyn Submitter> = Arc::new(SubmissionClient::new(config));
    let flow = QuestionFlow::new(driver, classifier, dispatcher, submitter, config);

    ChainProcessor::new(flow, config)
}

fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 题目链自动求解");
    info!("📊 重试上限: {} 次, 链最大长度: {} 题", config.max_retries, config.max_chain_length);
    info!("⏱️ 时间预算: {} 秒", config.time_budget_ms / 1000);
    info!("{}", "=".repeat(60));
}

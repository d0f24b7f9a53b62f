//! # Quiz Chain Solver
//!
//! 一个用于自动求解链式测验题目的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（浏览器），只暴露能力
//! - `PageDriver` - 唯一的浏览器 owner，提供页面提取能力
//!
//! ### ② 业务能力层（Services / Clients）
//! - `services/` - 描述"我能做什么"，只处理单个题目
//! - `QuestionClassifier` - 题目分类与策略选择能力
//! - `AnswerProviderChain` - 多后端回答能力（带顺序兜底）
//! - `HttpFileService` / `PythonExecutor` / `ApiCallService` - 内容获取与计算能力
//! - `clients/` - 具体后端与提交端点的客户端
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一道题"的完整处理流程
//! - `QuestionCtx` - 上下文封装（链序号 + 题目地址）
//! - `StrategyDispatcher` - 策略到配方的映射
//! - `QuestionFlow` - 状态机编排（提取 → 分类 → 解题 → 提交 → 重试）
//!
//! ### ④ 编排层（Orchestration / API）
//! - `orchestrator/chain_processor` - 题目链处理器，管理链循环与预算
//! - `orchestrator::App` - 资源装配与生命周期
//! - `api/` - 控制面 HTTP 服务
//!
//! ## 模块结构

pub mod api;
pub mod browser;
pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{SubmissionClient, Submitter};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::{PageDriver, PageScope};
pub use models::{
    format_answer, AnswerCandidate, ChainReport, ChainStop, Classification, Identity,
    QuestionContext, QuestionOutcome, Strategy, SubmissionVerdict,
};
pub use orchestrator::{build_chain_processor, App, ChainProcessor};
pub use services::{AnswerProvider, AnswerProviderChain, ProviderRegistry, QuestionClassifier};
pub use workflow::{QuestionCtx, QuestionFlow, StrategyDispatcher};

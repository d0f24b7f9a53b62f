//! 代码执行器 - 业务能力层
//!
//! 只负责"执行一段 Python 代码并取回输出"能力，不关心流程
//!
//! 执行方式：写入临时文件 → 子进程运行 → 带超时等待 → 清理临时文件

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error};

use crate::config::Config;
use crate::error::{AppError, AppResult, StrategyError};
use crate::utils::truncate_text;

/// 代码执行能力接口
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    /// 执行 Python 代码，返回标准输出
    async fn run_python(&self, code: &str) -> AppResult<String>;
}

/// Python 执行器
pub struct PythonExecutor {
    timeout: Duration,
}

impl PythonExecutor {
    /// 创建 Python 执行器
    pub fn new(config: &Config) -> Self {
        Self {
            timeout: Duration::from_millis(config.code_timeout_ms),
        }
    }

    fn script_path() -> PathBuf {
        std::env::temp_dir().join(format!(
            "quiz_solver_{}.py",
            chrono::Utc::now().timestamp_millis()
        ))
    }
}

#[async_trait]
impl CodeExecutor for PythonExecutor {
    async fn run_python(&self, code: &str) -> AppResult<String> {
        // 补充常用 import，保证生成的代码片段可以直接运行
        let full_code = format!(
            r#"
import sys
import json
import math
from datetime import datetime, timedelta, date

try:
    import pandas as pd
    import numpy as np
except ImportError:
    pass

# 生成的代码
{}
"#,
            code
        );

        let script_path = Self::script_path();
        tokio::fs::write(&script_path, &full_code).await?;
        debug!("执行 Python 代码: {}", truncate_text(code, 200));

        let result = timeout(
            self.timeout,
            Command::new("python")
                .arg(&script_path)
                .env("PYTHONIOENCODING", "utf-8")
                .output(),
        )
        .await;

        // 无论成败都清理临时文件
        let _ = tokio::fs::remove_file(&script_path).await;

        let output = match result {
            Err(_) => {
                error!("Python 执行超时 ({}秒)", self.timeout.as_secs());
                return Err(AppError::Strategy(StrategyError::CodeTimeout {
                    secs: self.timeout.as_secs(),
                }));
            }
            Ok(io_result) => io_result?,
        };

        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            debug!("Python 输出: {}", truncate_text(&stdout, 200));
            Ok(stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            error!("Python 执行失败: {}", truncate_text(&stderr, 500));
            Err(AppError::Strategy(StrategyError::CodeFailed { stderr }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 需要本机安装 python，默认忽略
    /// 运行方式：cargo test test_run_python -- --ignored
    #[tokio::test]
    #[ignore]
    async fn test_run_python_prints_answer() {
        let executor = PythonExecutor::new(&Config::default());
        let output = executor.run_python("print(40 + 2)").await.unwrap();

        assert_eq!(output, "42");
    }

    #[tokio::test]
    #[ignore]
    async fn test_run_python_surfaces_stderr() {
        let executor = PythonExecutor::new(&Config::default());
        let result = executor.run_python("raise ValueError('bad input')").await;

        match result {
            Err(AppError::Strategy(StrategyError::CodeFailed { stderr })) => {
                assert!(stderr.contains("bad input"));
            }
            other => panic!("预期代码执行失败，实际: {:?}", other.map(|_| ())),
        }
    }
}

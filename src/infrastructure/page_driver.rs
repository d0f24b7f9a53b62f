//! 页面驱动器 - 基础设施层
//!
//! 持有唯一的浏览器资源，只暴露"打开题目页面并提取内容"的能力
//!
//! ## 资源模型
//! - 浏览器实例长期存活，跨题目复用
//! - 每次题目尝试从驱动器获取一个新的逻辑页面（PageScope），
//!   该页面被当前尝试独占，且保证在下一次尝试开始前释放
//! - 不认识 Classification / Strategy，不处理业务流程

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, Page};
use tokio::time::sleep;
use tracing::debug;

use crate::config::Config;
use crate::error::{AppError, AppResult, ExtractionError};
use crate::models::QuestionContext;
use crate::services::file_service::data_uri;

/// 题目内容提取脚本
///
/// 一次性取回页面文本、链接、图片、音频、表格和表单提交地址
const EXTRACT_SCRIPT: &str = r#"
(() => {
    const result = {
        text: '',
        links: [],
        images: [],
        audio: [],
        tables: [],
        formAction: null
    };

    result.text = document.body.innerText || document.body.textContent || '';

    document.querySelectorAll('a[href]').forEach(a => {
        result.links.push({ text: a.textContent.trim(), url: a.href });
    });

    document.querySelectorAll('img[src]').forEach(img => {
        result.images.push({ src: img.src, alt: img.alt || '' });
    });

    document.querySelectorAll('audio source, audio[src]').forEach(audio => {
        const src = audio.src || (audio.querySelector && audio.querySelector('source') && audio.querySelector('source').src);
        if (src) result.audio.push(src);
    });

    const form = document.querySelector('form[action]');
    if (form) {
        result.formAction = form.action;
    }

    document.querySelectorAll('table').forEach(table => {
        const headers = [];
        const rows = [];
        table.querySelectorAll('th').forEach(th => headers.push(th.textContent.trim()));
        table.querySelectorAll('tr').forEach(tr => {
            const row = [];
            tr.querySelectorAll('td').forEach(td => row.push(td.textContent.trim()));
            if (row.length) rows.push(row);
        });
        result.tables.push({ headers, rows });
    });

    return result;
})()
"#;

/// 页面驱动能力接口
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// 打开题目页面，返回被当前尝试独占的页面作用域
    async fn open(&self, url: &str) -> AppResult<Box<dyn PageScope>>;
}

/// 单次尝试独占的页面作用域
///
/// 每条退出路径（成功、裁决、抛错）都必须调用 `close` 释放页面
#[async_trait]
pub trait PageScope: Send + Sync {
    /// 提取题目内容
    async fn extract(&self) -> AppResult<QuestionContext>;

    /// 对当前页面截图，返回 data: URI
    async fn screenshot_data_uri(&self) -> AppResult<String>;

    /// 释放页面（永不失败）
    async fn close(&self);
}

/// 基于 chromiumoxide 的页面驱动器
pub struct BrowserDriver {
    browser: Browser,
    ready_wait: Duration,
}

impl BrowserDriver {
    /// 创建页面驱动器（接管浏览器实例）
    pub fn new(browser: Browser, config: &Config) -> Self {
        Self {
            browser,
            ready_wait: Duration::from_millis(config.page_ready_wait_ms),
        }
    }
}

#[async_trait]
impl PageDriver for BrowserDriver {
    async fn open(&self, url: &str) -> AppResult<Box<dyn PageScope>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| AppError::page_load_failed(url, e))?;

        page.goto(url)
            .await
            .map_err(|e| AppError::page_load_failed(url, e))?;
        page.wait_for_navigation()
            .await
            .map_err(|e| AppError::page_load_failed(url, e))?;

        // 等待页面脚本渲染完成
        sleep(self.ready_wait).await;
        debug!("页面已就绪: {}", url);

        Ok(Box::new(BrowserPageScope { page }))
    }
}

/// chromiumoxide 页面作用域
struct BrowserPageScope {
    page: Page,
}

#[async_trait]
impl PageScope for BrowserPageScope {
    async fn extract(&self) -> AppResult<QuestionContext> {
        let result = self
            .page
            .evaluate(EXTRACT_SCRIPT)
            .await
            .map_err(|e| {
                AppError::Extraction(ExtractionError::EvaluateFailed {
                    source: Box::new(e),
                })
            })?;

        let context: QuestionContext = result.into_value().map_err(|e| {
            AppError::Extraction(ExtractionError::EvaluateFailed {
                source: Box::new(e),
            })
        })?;

        debug!(
            "提取完成: {} 字符, {} 链接, {} 表格",
            context.text.len(),
            context.links.len(),
            context.tables.len()
        );
        Ok(context)
    }

    async fn screenshot_data_uri(&self) -> AppResult<String> {
        let bytes = self
            .page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .build(),
            )
            .await
            .map_err(|e| {
                AppError::Extraction(ExtractionError::ScreenshotFailed {
                    source: Box::new(e),
                })
            })?;

        Ok(data_uri("image/png", &bytes))
    }

    async fn close(&self) {
        if let Err(e) = self.page.clone().close().await {
            debug!("页面关闭失败（忽略）: {}", e);
        }
    }
}

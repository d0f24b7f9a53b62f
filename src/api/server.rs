//! 控制面 HTTP 服务
//!
//! 对外入口：接受 `{email, secret, url}` 解题请求，校验身份后
//! 异步启动链路求解，立即返回受理确认；链路结果只通过日志可见。
//!
//! 端点：
//! - `GET /` 服务信息
//! - `GET /health` 健康检查
//! - `GET /quiz` 使用说明
//! - `POST /quiz` 提交解题请求

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::models::Identity;
use crate::orchestrator::ChainProcessor;

/// 各处理函数共享的应用状态
pub struct AppState {
    config: Config,
    solver: Arc<ChainProcessor>,
    start_time: Instant,
}

/// 请求被拒绝的原因
#[derive(Debug, Error)]
pub enum ApiRejection {
    #[error("Request body must be valid JSON")]
    InvalidJson,
    #[error("email, secret, and url are required")]
    MissingFields,
    #[error("Email or secret is incorrect")]
    InvalidCredentials,
    #[error("URL must start with http:// or https://")]
    InvalidUrl,
}

impl ApiRejection {
    fn status(&self) -> StatusCode {
        match self {
            ApiRejection::InvalidCredentials => StatusCode::FORBIDDEN,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn title(&self) -> &'static str {
        match self {
            ApiRejection::InvalidJson => "Invalid JSON",
            ApiRejection::MissingFields => "Missing required fields",
            ApiRejection::InvalidCredentials => "Invalid secret",
            ApiRejection::InvalidUrl => "Invalid URL",
        }
    }
}

impl IntoResponse for ApiRejection {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.title(),
            "message": self.to_string(),
        });
        (self.status(), Json(body)).into_response()
    }
}

/// 解题请求体
#[derive(Debug, Deserialize)]
pub struct SolveRequest {
    email: Option<String>,
    secret: Option<String>,
    url: Option<String>,
}

/// 启动控制面服务
pub async fn serve(config: Config, solver: Arc<ChainProcessor>) -> Result<()> {
    let port = config.server_port;
    let state = Arc::new(AppState {
        config,
        solver,
        start_time: Instant::now(),
    });

    let app = Router::new()
        .route("/", get(service_info))
        .route("/health", get(health))
        .route("/quiz", get(quiz_doc).post(solve_quiz))
        .fallback(not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    info!("🌐 控制面服务已启动: http://{}", addr);
    info!("等待解题请求...");

    axum::serve(listener, app).await?;
    Ok(())
}

/// GET / - 服务信息
async fn service_info(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "name": "Quiz Chain Solver API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Automated quiz-chain solving agent with multi-backend fallback",
        "endpoints": {
            "health": "GET /health - Health check",
            "quiz_info": "GET /quiz - API documentation",
            "quiz_solve": "POST /quiz - Solve quiz (requires email, secret, url)",
        },
        "student": state.config.student_email,
        "status": "running",
    }))
}

/// GET /health - 健康检查
async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// GET /quiz - 使用说明
async fn quiz_doc() -> Json<serde_json::Value> {
    Json(json!({
        "endpoint": "POST /quiz",
        "description": "Submit a quiz URL to be solved automatically",
        "required_fields": {
            "email": "Student email address",
            "secret": "Student secret key",
            "url": "Quiz URL to solve",
        },
        "response_codes": {
            "200": "Valid request, quiz solving started",
            "400": "Invalid JSON or missing fields",
            "403": "Invalid secret",
        },
    }))
}

/// POST /quiz - 受理解题请求并异步启动链路
async fn solve_quiz(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SolveRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiRejection> {
    let Json(request) = payload.map_err(|_| {
        warn!("收到非法 JSON 请求");
        ApiRejection::InvalidJson
    })?;

    // 字段校验
    let (email, secret, url) = match (request.email, request.secret, request.url) {
        (Some(email), Some(secret), Some(url))
            if !email.is_empty() && !secret.is_empty() && !url.is_empty() =>
        {
            (email, secret, url)
        }
        _ => {
            warn!("请求缺少必填字段");
            return Err(ApiRejection::MissingFields);
        }
    };

    // 身份校验
    if email != state.config.student_email || secret != state.config.student_secret {
        warn!("身份校验失败: {}", email);
        return Err(ApiRejection::InvalidCredentials);
    }

    // URL 校验
    if !url.starts_with("http://") && !url.starts_with("https://") {
        warn!("非法 URL: {}", url);
        return Err(ApiRejection::InvalidUrl);
    }

    info!("✓ 已受理解题请求: {}", url);

    // 后台启动链路求解，立即返回受理确认
    let solver = state.solver.clone();
    let identity = Identity::new(email, secret);
    let chain_url = url.clone();
    tokio::spawn(async move {
        match solver.solve_chain(&chain_url, &identity).await {
            Ok(report) => {
                info!(
                    "链路求解完成: {} 题, 耗时 {:.2} 秒",
                    report.questions_processed, report.total_secs
                );
            }
            Err(e) => {
                error!("链路求解失败: {}", e);
            }
        }
    });

    Ok(Json(json!({
        "status": "accepted",
        "message": "Quiz solving started",
        "url": url,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

/// 404 处理
async fn not_found(method: Method, uri: Uri) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Not found",
            "message": format!("Endpoint {} {} does not exist", method, uri.path()),
        })),
    )
}

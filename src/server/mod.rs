//! HTTPサーバ
//!
//! - `POST /verify_signatures`: 署名画像2枚を照合
//! - `GET /case_studies/:folder`: 保存済みレポートの取得
//! - `GET /health`: 死活監視

pub mod upload;

use crate::case_study;
use crate::config::Config;
use crate::error::{Result, SignVerifyError};
use crate::verifier::{self, VerifyOptions};
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use sign_verify_common::{CaseReport, ErrorResponse, VerifyResponse};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self { config: Arc::new(config) }
    }
}

impl IntoResponse for SignVerifyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "リクエスト処理に失敗");
        } else {
            debug!(error = %self, status = %status, "リクエストを拒否");
        }
        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/verify_signatures", post(verify_signatures))
        .route("/case_studies/:folder", get(case_study_report))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 設定のアドレスで待ち受け
pub async fn serve(config: Config) -> Result<()> {
    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    serve_with_listener(listener, config).await
}

/// 既存のリスナーで待ち受け（テストではポート0で使用）
pub async fn serve_with_listener(listener: TcpListener, config: Config) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, case_dir = %config.case_dir.display(), "サーバ起動");

    axum::serve(listener, router(AppState::new(config))).await?;
    Ok(())
}

async fn verify_signatures(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<VerifyResponse>> {
    // multipart以外のリクエストはファイルなしと同じ扱い
    let multipart = multipart.map_err(|e| {
        debug!(reason = %e.body_text(), "multipartではないリクエスト");
        SignVerifyError::MissingImages
    })?;
    let (image1, image2) = upload::read_image_pair(multipart).await?;

    let request_dir = state.config.upload_dir.join(Uuid::new_v4().to_string());
    let outcome = run_verification(&state, &request_dir, image1, image2).await;

    if let Err(e) = tokio::fs::remove_dir_all(&request_dir).await {
        warn!(dir = %request_dir.display(), error = %e, "アップロード一時フォルダの削除に失敗");
    }

    let result = outcome?;
    Ok(Json(result.to_response()))
}

async fn run_verification(
    state: &AppState,
    request_dir: &std::path::Path,
    image1: upload::UploadedImage,
    image2: upload::UploadedImage,
) -> Result<verifier::MatchResult> {
    let (path1, path2) = upload::store_pair(request_dir, image1, image2).await?;
    let options = VerifyOptions::from(state.config.as_ref());

    // 特徴抽出はCPUバウンドなのでブロッキングスレッドで実行
    tokio::task::spawn_blocking(move || verifier::verify_signatures(&path1, &path2, &options))
        .await
        .map_err(|e| SignVerifyError::Task(e.to_string()))?
}

async fn case_study_report(
    State(state): State<AppState>,
    axum::extract::Path(folder): axum::extract::Path<String>,
) -> Result<Json<CaseReport>> {
    let report = case_study::load_report(&state.config.case_dir, &folder)?;
    Ok(Json(report))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

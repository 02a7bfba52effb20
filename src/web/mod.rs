// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 查看服务 (Detection viewer)
///
/// - `/`            直播页面 (HLS 播放 + 最近检测列表)
/// - `/detections`  最近 N 条检测记录 (JSON, 新的在前)
/// - `/images/*`    标注帧目录
/// - `/hls/*`       HLS 输出目录
use std::future::Future;
use std::path::PathBuf;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::SinkError;
use crate::sink::{PostgresHistory, RecentDetection};

pub const DEFAULT_RECENT_LIMIT: i64 = 20;

const INDEX_HTML: &str = include_str!("index.html");

/// 检测记录的只读来源
pub trait DetectionHistory: Clone + Send + Sync + 'static {
    fn recent(&self, limit: i64) -> impl Future<Output = Result<Vec<RecentDetection>, SinkError>> + Send;
}

impl DetectionHistory for PostgresHistory {
    fn recent(&self, limit: i64) -> impl Future<Output = Result<Vec<RecentDetection>, SinkError>> + Send {
        PostgresHistory::recent(self, limit)
    }
}

#[derive(Debug, Clone)]
pub struct ViewerConfig {
    pub frame_dir: PathBuf,
    pub hls_dir: PathBuf,
    pub playlist: String,
    pub recent_limit: i64,
}

/// `/detections` 返回的一行
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionView {
    pub device_name: String,
    pub class_name: String,
    pub confidence: f32,
    pub timestamp: String,
    pub frame_path: String,
    pub image_url: Option<String>,
}

impl From<RecentDetection> for DetectionView {
    fn from(row: RecentDetection) -> Self {
        let image_url = row.file_name().map(|name| format!("/images/{name}"));
        Self {
            device_name: row.device_name,
            class_name: row.class_name,
            confidence: row.confidence,
            timestamp: row.timestamp,
            frame_path: row.frame_path,
            image_url,
        }
    }
}

#[derive(Clone)]
struct ViewerState<H> {
    history: H,
    index: String,
    limit: i64,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

/// 查询失败 → 503
struct ViewerError(SinkError);

impl IntoResponse for ViewerError {
    fn into_response(self) -> Response {
        warn!("⚠️ 查询检测记录失败: {}", self.0);
        let body = ErrorBody {
            message: self.0.to_string(),
        };
        (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
    }
}

pub fn router<H: DetectionHistory>(history: H, config: &ViewerConfig) -> Router {
    let state = ViewerState {
        history,
        index: INDEX_HTML.replace("{{playlist}}", &config.playlist),
        limit: config.recent_limit.max(1),
    };

    Router::new()
        .route("/", get(index::<H>))
        .route("/detections", get(detections::<H>))
        .nest_service("/images", ServeDir::new(&config.frame_dir))
        .nest_service("/hls", ServeDir::new(&config.hls_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index<H: DetectionHistory>(State(state): State<ViewerState<H>>) -> Html<String> {
    Html(state.index)
}

async fn detections<H: DetectionHistory>(
    State(state): State<ViewerState<H>>,
) -> Result<Json<Vec<DetectionView>>, ViewerError> {
    let rows = state.history.recent(state.limit).await.map_err(ViewerError)?;
    Ok(Json(rows.into_iter().map(DetectionView::from).collect()))
}

/// 运行查看服务直到 `shutdown` 完成
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("🌐 查看服务: http://{addr}");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

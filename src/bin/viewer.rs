// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 流哨兵查看服务 (Stream Sentinel viewer)
///
/// 与 sentinel 共用数据库和输出目录, 独立进程运行:
/// 直播页面 + 最近检测记录 + 标注帧/HLS 静态文件
use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use stream_sentinel::sink::PostgresHistory;
use stream_sentinel::telemetry::init_tracing;
use stream_sentinel::web::{self, ViewerConfig};
use stream_sentinel::ViewerArgs;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let args = ViewerArgs::parse();
    init_tracing("info,tower_http=info");

    info!("🚀 查看服务启动");
    let history = PostgresHistory::connect(&args.db.connection_url(), args.db_pool_size)
        .await
        .context("failed to connect to PostgreSQL")?;

    let config = ViewerConfig {
        frame_dir: args.frame_dir.clone(),
        hls_dir: args.hls_dir.clone(),
        playlist: args.playlist.clone(),
        recent_limit: args.recent,
    };
    let app = web::router(history, &config);

    let listener = TcpListener::bind(args.bind.as_str())
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;

    web::serve(listener, app, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("🛑 收到停止信号");
    })
    .await
    .context("viewer server failed")?;
    Ok(())
}

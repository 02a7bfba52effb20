// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 流哨兵 (Stream Sentinel)
///
/// RTSP 拉流 → HLS 滚动归档 + YOLOv8 目标检测入库
///
/// 系统架构:
/// 1. 拉流线程: 读包并分发到两个队列 (ingest)
/// 2. 归档线程: 时间戳修正 + HLS 分段 (archive)
/// 3. 检测线程: 解码 + 推理 + 保存标注帧 + 入库 (detect)
/// 4. 主线程:   等待回车或输入源结束, 然后按顺序停止
use std::io::BufRead;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::select;
use mimalloc::MiMalloc;
use tracing::info;

use stream_sentinel::detection::Annotator;
use stream_sentinel::media::ffmpeg::{self, FfmpegDecoderOpener, FfmpegHlsOpener, FfmpegSource};
use stream_sentinel::models::YoloV8;
use stream_sentinel::sink::{connect_with_retry, PostgresSink};
use stream_sentinel::telemetry::init_tracing;
use stream_sentinel::{Args, Pipeline};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    init_tracing("info");

    info!("🚀 流哨兵启动");
    info!("📹 RTSP地址: {}", args.source);
    info!("📦 检测模型: {}", args.model.display());

    std::fs::create_dir_all(&args.hls_dir)
        .with_context(|| format!("failed to create {}", args.hls_dir.display()))?;
    std::fs::create_dir_all(&args.frame_dir)
        .with_context(|| format!("failed to create {}", args.frame_dir.display()))?;

    ffmpeg::init().context("failed to initialize FFmpeg")?;

    // 入库 (启动阶段重试)
    let url = args.db.connection_url();
    let sink = connect_with_retry(args.db.db_retries, args.db.retry_delay(), || {
        PostgresSink::connect(&url)
    })
    .context("failed to connect to PostgreSQL")?;

    let detector = YoloV8::load(&args.model, args.inf_size)?;
    let annotator = Annotator::load(&args.font)?;
    info!("🔤 标签字体: {}", args.font.display());

    let pipeline = Pipeline::start(
        args.pipeline_config(),
        FfmpegSource,
        &FfmpegHlsOpener,
        FfmpegDecoderOpener,
        detector,
        sink,
        annotator,
    )
    .context("failed to start pipeline")?;

    info!("✅ 系统就绪, 按回车键停止...");

    // 回车或输入源结束
    let (enter_tx, enter_rx) = crossbeam_channel::bounded::<()>(1);
    std::thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            let mut line = String::new();
            let _ = std::io::stdin().lock().read_line(&mut line);
            let _ = enter_tx.send(());
        })
        .context("failed to spawn stdin thread")?;

    let finished = pipeline.source_finished();
    select! {
        recv(enter_rx) -> _ => info!("⌨️ 收到停止指令"),
        recv(finished) -> _ => info!("📭 输入源已结束"),
    }

    let report = pipeline.shutdown();
    info!("📊 运行统计: {report:#?}");
    Ok(())
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 视频处理流水线 (Video Processing Pipeline)
///
/// 三线程架构, 通过两个阻塞队列通信:
/// - ingest:  拉流读包 (StreamIngestor)
/// - archive: HLS 归档 (ArchiveWriter), 无界队列, 不丢包
/// - detect:  解码 + 推理 + 入库 (DetectionWorker), 有界策略, 满了在生产端丢弃
///
/// 启动顺序: 打开输入源 → 初始化归档 → 创建队列 → 启动两个消费线程 → 启动拉流
/// 停止顺序: 停止拉流 (join) → 停止两个队列 → 等待两个消费线程退出
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::Receiver;
use tracing::{info, warn};

use crate::archive::{run_archive_worker, ArchiveStats, ArchiveWriter};
use crate::detection::{run_detection_worker, Annotator, DetectionSettings, DetectionStats};
use crate::error::PipelineError;
use crate::input::{IngestStats, StreamIngestor};
use crate::media::{
    DecoderOpener, MediaPacket, MuxerOpener, SegmentOptions, SourceOpener, StreamDescriptor,
    TransportOptions,
};
use crate::models::Detector;
use crate::queue::BlockingQueue;
use crate::sink::DetectionSink;

/// 检测队列默认上限
pub const DEFAULT_DETECT_QUEUE_LIMIT: usize = 30;

/// 管线配置
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub source: String,
    pub transport: TransportOptions,
    pub segment: SegmentOptions,
    pub detect_queue_limit: usize,
    pub detection: DetectionSettings,
}

impl PipelineConfig {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            transport: TransportOptions::default(),
            segment: SegmentOptions::default(),
            detect_queue_limit: DEFAULT_DETECT_QUEUE_LIMIT,
            detection: DetectionSettings::default(),
        }
    }
}

/// 停止后的汇总统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineReport {
    pub ingest: Option<IngestStats>,
    pub archive: Option<ArchiveStats>,
    pub detection: Option<DetectionStats>, // 解码器打开失败时为 None
}

pub struct Pipeline<S: SourceOpener> {
    ingestor: StreamIngestor<S>,
    descriptor: Arc<StreamDescriptor>,
    archive_queue: Arc<BlockingQueue<MediaPacket>>,
    detect_queue: Arc<BlockingQueue<MediaPacket>>,
    archive_worker: Option<JoinHandle<ArchiveStats>>,
    detect_worker: Option<JoinHandle<Option<DetectionStats>>>,
}

impl<S: SourceOpener> Pipeline<S> {
    /// 启动全部组件; 任何启动失败都在拉流开始之前返回
    pub fn start<MO, DO, M, K>(
        config: PipelineConfig,
        source: S,
        muxer_opener: &MO,
        decoder_opener: DO,
        detector: M,
        sink: K,
        annotator: Annotator,
    ) -> Result<Self, PipelineError>
    where
        MO: MuxerOpener,
        DO: DecoderOpener,
        M: Detector,
        K: DetectionSink,
    {
        // 1. 打开输入源
        let mut ingestor = StreamIngestor::new(source, config.transport, config.detect_queue_limit);
        let descriptor = ingestor.open(&config.source)?;
        let time_base = ingestor.time_base()?;

        // 2. 初始化归档
        let mut writer = ArchiveWriter::new();
        writer.init(muxer_opener, &config.segment, &descriptor, time_base)?;

        // 3. 队列
        let archive_queue = Arc::new(BlockingQueue::new());
        let detect_queue = Arc::new(BlockingQueue::new());

        // 4. 消费线程
        let archive_worker = {
            let queue = archive_queue.clone();
            std::thread::Builder::new()
                .name("archive".into())
                .spawn(move || run_archive_worker(&queue, writer))
                .map_err(|source| PipelineError::Spawn { name: "archive", source })?
        };

        let detect_worker = {
            let queue = detect_queue.clone();
            let stream = descriptor.clone();
            let settings = config.detection;
            std::thread::Builder::new().name("detect".into()).spawn(move || {
                run_detection_worker(decoder_opener, stream, detector, sink, annotator, settings, &queue)
            })
        };
        let detect_worker = match detect_worker {
            Ok(handle) => handle,
            Err(source) => {
                archive_queue.stop();
                let _ = archive_worker.join();
                return Err(PipelineError::Spawn { name: "detect", source });
            }
        };

        let mut pipeline = Self {
            ingestor,
            descriptor,
            archive_queue,
            detect_queue,
            archive_worker: Some(archive_worker),
            detect_worker: Some(detect_worker),
        };

        // 5. 启动拉流
        if let Err(e) = pipeline
            .ingestor
            .start(pipeline.archive_queue.clone(), pipeline.detect_queue.clone())
        {
            pipeline.stop_all();
            return Err(e.into());
        }

        info!("🚀 管线已启动: {}", config.source);
        Ok(pipeline)
    }

    pub fn descriptor(&self) -> &Arc<StreamDescriptor> {
        &self.descriptor
    }

    /// 输入源结束或失败时就绪
    pub fn source_finished(&self) -> Receiver<()> {
        self.ingestor.finished()
    }

    /// 按顺序停止所有组件并返回统计
    pub fn shutdown(mut self) -> PipelineReport {
        self.stop_all()
    }

    fn stop_all(&mut self) -> PipelineReport {
        if self.archive_worker.is_none() && self.detect_worker.is_none() {
            return PipelineReport::default();
        }
        info!("⏹️ 正在停止管线...");

        let ingest = self.ingestor.stop();
        self.archive_queue.stop();
        self.detect_queue.stop();

        let archive = self.archive_worker.take().and_then(|h| match h.join() {
            Ok(stats) => Some(stats),
            Err(_) => {
                warn!("⚠️ 归档线程异常退出");
                None
            }
        });
        let detection = self.detect_worker.take().and_then(|h| match h.join() {
            Ok(stats) => stats,
            Err(_) => {
                warn!("⚠️ 检测线程异常退出");
                None
            }
        });

        let report = PipelineReport {
            ingest,
            archive,
            detection,
        };
        info!("✅ 管线已停止: {report:?}");
        report
    }
}

impl<S: SourceOpener> Drop for Pipeline<S> {
    fn drop(&mut self) {
        self.stop_all();
    }
}

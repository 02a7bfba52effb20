// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测线程 (Detection worker)
///
/// 流程: 取包 → 解码 → RGB 转换 → 推理 → 绘制 → 保存 → 入库
///
/// - 解码器在线程内根据共享的流描述打开一次, 之后持续复用
/// - 转换上下文按第一帧尺寸惰性创建, 尺寸变化时重建
/// - 连续解码失败达到阈值时重新打开解码器, 重开失败则线程退出 (归档不受影响)
use std::path::PathBuf;
use std::sync::Arc;

use image::RgbImage;
use tracing::{debug, error, info, warn};

use super::annotate::Annotator;
use super::snapshot::{capture_timestamp, SnapshotWriter};
use super::DetectionRecord;
use crate::error::DecodeError;
use crate::media::{DecoderOpener, FrameDecoder, MediaPacket, PixelConverter, StreamDescriptor, VideoFrame};
use crate::models::Detector;
use crate::queue::BlockingQueue;
use crate::sink::DetectionSink;

/// 检测参数
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionSettings {
    pub source_id: String,
    pub frame_dir: PathBuf,
    pub conf_threshold: f32,
    pub nms_threshold: f32,
    pub max_decode_failures: u32, // 连续失败多少次后重开解码器
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            source_id: "cam1".to_string(),
            frame_dir: PathBuf::from("detected_frames"),
            conf_threshold: 0.4,
            nms_threshold: 0.4,
            max_decode_failures: 50,
        }
    }
}

/// 检测统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectionStats {
    pub packets: u64,
    pub frames: u64,
    pub detections: u64,
    pub snapshots: u64,
    pub persisted: u64,
    pub sink_failures: u64,
    pub decode_failures: u64,
    pub decoder_resets: u64,
}

/// 转换上下文状态机: Uninitialized → Ready{w,h} → Closed
enum ConverterState<C> {
    Uninitialized,
    Ready { converter: C, width: u32, height: u32 },
    Closed,
}

impl<C> ConverterState<C> {
    fn matches(&self, w: u32, h: u32) -> bool {
        matches!(self, ConverterState::Ready { width, height, .. } if (*width, *height) == (w, h))
    }
}

type Frame<O> = <<O as DecoderOpener>::Decoder as FrameDecoder>::Frame;
type Converter<O> = <<O as DecoderOpener>::Decoder as FrameDecoder>::Converter;

pub struct DetectionWorker<O: DecoderOpener, M: Detector, S: DetectionSink> {
    opener: O,
    stream: Arc<StreamDescriptor>,
    decoder: O::Decoder,
    converter: ConverterState<Converter<O>>,
    detector: M,
    sink: S,
    annotator: Annotator,
    snapshots: SnapshotWriter,
    settings: DetectionSettings,
    stats: DetectionStats,
    consecutive_failures: u32,
}

impl<O: DecoderOpener, M: Detector, S: DetectionSink> DetectionWorker<O, M, S> {
    /// 打开解码器; 失败时线程应直接退出
    pub fn open(
        opener: O,
        stream: Arc<StreamDescriptor>,
        detector: M,
        sink: S,
        annotator: Annotator,
        settings: DetectionSettings,
    ) -> Result<Self, DecodeError> {
        let decoder = opener.open(&stream)?;
        info!("🧠 检测线程已就绪: 解码器 {} ({}x{})", stream.codec, stream.width, stream.height);
        Ok(Self {
            opener,
            stream,
            decoder,
            converter: ConverterState::Uninitialized,
            detector,
            sink,
            annotator,
            snapshots: SnapshotWriter::new(settings.frame_dir.clone()),
            settings,
            stats: DetectionStats::default(),
            consecutive_failures: 0,
        })
    }

    /// 主循环: 取包直到队列结束
    pub fn run(mut self, queue: &BlockingQueue<MediaPacket>) -> DetectionStats {
        while let Some(packet) = queue.pop() {
            self.stats.packets += 1;
            if !self.handle_packet(packet) {
                error!("❌ 解码器无法恢复, 检测线程退出");
                break;
            }
        }
        self.converter = ConverterState::Closed;
        info!("🛑 检测线程已停止: {:?}", self.stats);
        self.stats
    }

    pub fn stats(&self) -> DetectionStats {
        self.stats
    }

    /// 处理一个包, 返回 false 表示解码器不可用
    fn handle_packet(&mut self, packet: MediaPacket) -> bool {
        if let Err(e) = self.decoder.send_packet(&packet) {
            return self.on_decode_failure(e);
        }
        drop(packet);
        self.consecutive_failures = 0;

        loop {
            match self.decoder.receive_frame() {
                Ok(frame) => self.process_frame(&frame),
                Err(DecodeError::Again) | Err(DecodeError::EndOfStream) => break,
                Err(e) => return self.on_decode_failure(e),
            }
        }
        true
    }

    fn on_decode_failure(&mut self, e: DecodeError) -> bool {
        self.stats.decode_failures += 1;
        self.consecutive_failures += 1;
        warn!("⚠️ 解码失败, 跳过此包: {e}");

        if self.consecutive_failures < self.settings.max_decode_failures.max(1) {
            return true;
        }

        warn!("🔄 连续 {} 次解码失败, 重新打开解码器", self.consecutive_failures);
        match self.opener.open(&self.stream) {
            Ok(decoder) => {
                self.decoder = decoder;
                self.converter = ConverterState::Uninitialized;
                self.consecutive_failures = 0;
                self.stats.decoder_resets += 1;
                true
            }
            Err(e) => {
                error!("❌ 重新打开解码器失败: {e}");
                false
            }
        }
    }

    fn process_frame(&mut self, frame: &Frame<O>) {
        let (w, h) = (frame.width(), frame.height());
        if matches!(self.converter, ConverterState::Closed) {
            return;
        }
        if !self.converter.matches(w, h) {
            match self.decoder.converter(w, h) {
                Ok(converter) => {
                    info!("🎨 创建色彩转换上下文: {w}x{h} → RGB24");
                    self.converter = ConverterState::Ready {
                        converter,
                        width: w,
                        height: h,
                    };
                }
                Err(e) => {
                    warn!("⚠️ 创建转换上下文失败: {e}");
                    return;
                }
            }
        }
        let ConverterState::Ready { converter, .. } = &mut self.converter else {
            return;
        };
        let image = match converter.convert(frame) {
            Ok(image) => image,
            Err(e) => {
                warn!("⚠️ 帧转换失败: {e}");
                return;
            }
        };
        self.stats.frames += 1;
        self.infer(image);
    }

    fn infer(&mut self, mut image: RgbImage) {
        let detections = match self.detector.detect(
            &image,
            self.settings.conf_threshold,
            self.settings.nms_threshold,
        ) {
            Ok(d) => d,
            Err(e) => {
                warn!("⚠️ 推理失败: {e:#}");
                return;
            }
        };
        if detections.is_empty() {
            return;
        }
        self.stats.detections += detections.len() as u64;

        self.annotator.draw(&mut image, &detections);
        let timestamp = capture_timestamp();
        let path = match self.snapshots.save(&image, &timestamp) {
            Ok(path) => path,
            Err(e) => {
                warn!("⚠️ 保存标注帧失败, 丢弃 {} 条记录: {e:#}", detections.len());
                return;
            }
        };
        self.stats.snapshots += 1;
        info!("🎯 检测到 {} 个目标 → {}", detections.len(), path.display());

        for det in &detections {
            let record = DetectionRecord::new(&self.settings.source_id, det, &timestamp, path.clone());
            match self.sink.insert(&record) {
                Ok(()) => self.stats.persisted += 1,
                Err(e) => {
                    self.stats.sink_failures += 1;
                    warn!("⚠️ 入库失败: {e}");
                }
            }
        }
        debug!("帧处理完成: {:?}", self.stats);
    }
}

/// 检测线程入口: 打开解码器后运行主循环; 打开失败返回 `None`
pub fn run_detection_worker<O, M, S>(
    opener: O,
    stream: Arc<StreamDescriptor>,
    detector: M,
    sink: S,
    annotator: Annotator,
    settings: DetectionSettings,
    queue: &BlockingQueue<MediaPacket>,
) -> Option<DetectionStats>
where
    O: DecoderOpener,
    M: Detector,
    S: DetectionSink,
{
    match DetectionWorker::open(opener, stream, detector, sink, annotator, settings) {
        Ok(worker) => Some(worker.run(queue)),
        Err(e) => {
            error!("❌ 打开解码器失败, 检测线程退出: {e}");
            None
        }
    }
}

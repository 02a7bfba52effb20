// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 测试桩: 可脚本化的输入源、记录型封装器、解码器、推理引擎与入库
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::RgbImage;
use parking_lot::Mutex;

use crate::detection::{Annotator, Detection, DetectionRecord, DEFAULT_FONT};
use crate::error::{ArchiveError, DecodeError, DemuxError, IngestError, MuxError, SinkError};
use crate::media::{
    DecoderOpener, Demuxer, FrameDecoder, MediaKind, MediaPacket, MuxerOpener, OpenedSource,
    PixelConverter, Rational, SegmentMuxer, SegmentOptions, SourceOpener, StreamDescriptor,
    TransportOptions, VideoFrame,
};
use crate::models::Detector;
use crate::sink::DetectionSink;
use crate::Bbox;

pub const TEST_TIME_BASE: Rational = Rational::new(1, 90_000);

/// Initialize tracing for tests with appropriate settings
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// 仓库自带的标签字体
pub fn bundled_font() -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_FONT)
}

pub fn annotator() -> Annotator {
    Annotator::load(&bundled_font()).unwrap()
}

pub fn video_descriptor(index: usize) -> StreamDescriptor {
    StreamDescriptor::video(index, "h264", TEST_TIME_BASE, 640, 480)
}

fn audio_descriptor(index: usize) -> StreamDescriptor {
    StreamDescriptor {
        kind: MediaKind::Audio,
        codec: "aac".into(),
        width: 0,
        height: 0,
        ..video_descriptor(index)
    }
}

/// 一个 8x8 帧的压缩包
pub fn packet(stream: usize, pts: Option<i64>) -> MediaPacket {
    MediaPacket::new(vec![8u8, 8, 0xAB], stream, TEST_TIME_BASE).with_timestamps(pts, pts, 3600)
}

/// 解码后尺寸为 `w x h` 的包; `w == 0` 表示损坏
pub fn frame_packet(w: u8, h: u8) -> MediaPacket {
    MediaPacket::new(vec![w, h], 0, TEST_TIME_BASE)
}

// ========== 输入源 ==========

enum Script {
    Packets(VecDeque<MediaPacket>),
    Endless(i64),
}

pub struct MockDemuxer {
    script: Script,
    reads: Arc<AtomicUsize>,
}

impl Demuxer for MockDemuxer {
    fn read_packet(&mut self) -> Result<MediaPacket, DemuxError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        match &mut self.script {
            Script::Packets(queue) => queue.pop_front().ok_or(DemuxError::EndOfStream),
            Script::Endless(pts) => {
                // 模拟直播源的包间隔
                std::thread::sleep(Duration::from_millis(1));
                *pts += 3600;
                Ok(packet(0, Some(*pts)))
            }
        }
    }
}

pub struct MockSource {
    streams: Vec<StreamDescriptor>,
    script: Mutex<Option<Script>>,
    reachable: bool,
    pub reads: Arc<AtomicUsize>,
}

impl MockSource {
    fn build(streams: Vec<StreamDescriptor>, script: Script, reachable: bool) -> Self {
        Self {
            streams,
            script: Mutex::new(Some(script)),
            reachable,
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 单个视频流 (#0)
    pub fn new(packets: Vec<MediaPacket>) -> Self {
        Self::build(vec![video_descriptor(0)], Script::Packets(packets.into()), true)
    }

    /// 音频流 #0 + 视频流 #1
    pub fn with_audio(packets: Vec<MediaPacket>) -> Self {
        Self::build(
            vec![audio_descriptor(0), video_descriptor(1)],
            Script::Packets(packets.into()),
            true,
        )
    }

    pub fn audio_only() -> Self {
        Self::build(vec![audio_descriptor(0)], Script::Packets(VecDeque::new()), true)
    }

    pub fn endless() -> Self {
        Self::build(vec![video_descriptor(0)], Script::Endless(0), true)
    }

    pub fn unreachable() -> Self {
        Self::build(vec![], Script::Packets(VecDeque::new()), false)
    }
}

impl SourceOpener for MockSource {
    type Demuxer = MockDemuxer;

    fn open(
        &self,
        address: &str,
        _options: &TransportOptions,
    ) -> Result<OpenedSource<MockDemuxer>, IngestError> {
        if !self.reachable {
            return Err(IngestError::Connection {
                address: address.to_string(),
                reason: "connection refused".into(),
            });
        }
        let script = self
            .script
            .lock()
            .take()
            .unwrap_or(Script::Packets(VecDeque::new()));
        Ok(OpenedSource {
            demuxer: MockDemuxer {
                script,
                reads: self.reads.clone(),
            },
            streams: self.streams.clone(),
        })
    }
}

// ========== 封装器 ==========

#[derive(Default)]
pub struct MuxLog {
    pub packets: Vec<MediaPacket>,
    pub finished: usize,
}

pub struct MockMuxer {
    log: Arc<Mutex<MuxLog>>,
    fail_writes: bool,
}

impl SegmentMuxer for MockMuxer {
    fn time_base(&self) -> Rational {
        TEST_TIME_BASE
    }

    fn write_packet(&mut self, packet: MediaPacket) -> Result<(), MuxError> {
        if self.fail_writes {
            return Err(MuxError::Write("disk full".into()));
        }
        self.log.lock().packets.push(packet);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), MuxError> {
        self.log.lock().finished += 1;
        Ok(())
    }
}

pub struct MockMuxerOpener {
    pub log: Arc<Mutex<MuxLog>>,
    fail_open: bool,
    fail_writes: bool,
}

impl MockMuxerOpener {
    pub fn new() -> Self {
        Self {
            log: Arc::default(),
            fail_open: false,
            fail_writes: false,
        }
    }

    pub fn failing_open() -> Self {
        Self {
            fail_open: true,
            ..Self::new()
        }
    }

    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Self::new()
        }
    }
}

impl MuxerOpener for MockMuxerOpener {
    type Muxer = MockMuxer;

    fn open(&self, options: &SegmentOptions, _stream: &StreamDescriptor) -> Result<MockMuxer, ArchiveError> {
        if self.fail_open {
            return Err(ArchiveError::OutputOpen {
                path: options.playlist.display().to_string(),
                reason: "permission denied".into(),
            });
        }
        Ok(MockMuxer {
            log: self.log.clone(),
            fail_writes: self.fail_writes,
        })
    }
}

// ========== 解码器 ==========

pub struct StubFrame {
    width: u32,
    height: u32,
}

impl VideoFrame for StubFrame {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}

pub struct StubConverter;

impl PixelConverter<StubFrame> for StubConverter {
    fn convert(&mut self, frame: &StubFrame) -> Result<RgbImage, DecodeError> {
        Ok(RgbImage::new(frame.width, frame.height))
    }
}

pub struct StubDecoder {
    pending: VecDeque<StubFrame>,
    converters: Arc<AtomicUsize>,
}

impl FrameDecoder for StubDecoder {
    type Frame = StubFrame;
    type Converter = StubConverter;

    fn send_packet(&mut self, packet: &MediaPacket) -> Result<(), DecodeError> {
        match packet.data.first() {
            Some(&w) if w > 0 => {
                let h = packet.data.get(1).copied().unwrap_or(w).max(1);
                self.pending.push_back(StubFrame {
                    width: w as u32,
                    height: h as u32,
                });
                Ok(())
            }
            _ => Err(DecodeError::Decode("invalid data found when processing input".into())),
        }
    }

    fn receive_frame(&mut self) -> Result<StubFrame, DecodeError> {
        self.pending.pop_front().ok_or(DecodeError::Again)
    }

    fn converter(&self, _width: u32, _height: u32) -> Result<StubConverter, DecodeError> {
        self.converters.fetch_add(1, Ordering::SeqCst);
        Ok(StubConverter)
    }
}

#[derive(Default)]
pub struct StubDecoderOpener {
    pub opens: Arc<AtomicUsize>,
    pub converters: Arc<AtomicUsize>,
    max_opens: Option<usize>,
}

impl StubDecoderOpener {
    pub fn opens_once() -> Self {
        Self {
            max_opens: Some(1),
            ..Default::default()
        }
    }

    pub fn broken() -> Self {
        Self {
            max_opens: Some(0),
            ..Default::default()
        }
    }
}

impl DecoderOpener for StubDecoderOpener {
    type Decoder = StubDecoder;

    fn open(&self, stream: &StreamDescriptor) -> Result<StubDecoder, DecodeError> {
        let n = self.opens.fetch_add(1, Ordering::SeqCst) + 1;
        if self.max_opens.is_some_and(|max| n > max) {
            return Err(DecodeError::Open(format!("decoder for {} unavailable", stream.codec)));
        }
        Ok(StubDecoder {
            pending: VecDeque::new(),
            converters: self.converters.clone(),
        })
    }
}

// ========== 推理引擎 ==========

pub struct StubDetector {
    detections: Vec<Detection>,
}

impl StubDetector {
    /// 每帧返回 person 0.9 (0,0,10,10)
    pub fn person() -> Self {
        Self {
            detections: vec![Detection::new(Bbox::new(0., 0., 10., 10., 0, 0.9), "person")],
        }
    }

    pub fn empty() -> Self {
        Self { detections: vec![] }
    }
}

impl Detector for StubDetector {
    fn detect(&mut self, _image: &RgbImage, _conf: f32, _nms: f32) -> anyhow::Result<Vec<Detection>> {
        Ok(self.detections.clone())
    }
}

// ========== 入库 ==========

#[derive(Clone, Default)]
pub struct RecordingSink {
    pub records: Arc<Mutex<Vec<DetectionRecord>>>,
}

impl DetectionSink for RecordingSink {
    fn insert(&mut self, record: &DetectionRecord) -> Result<(), SinkError> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

pub struct FailingSink;

impl DetectionSink for FailingSink {
    fn insert(&mut self, _record: &DetectionRecord) -> Result<(), SinkError> {
        Err(SinkError::Insert("connection reset".into()))
    }
}

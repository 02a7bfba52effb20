// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 媒体接口层 (Media seams)
///
/// # 架构说明
///
/// 管线核心只依赖这里的 trait, 具体实现由适配器提供:
/// - **拉流/解复用**: `SourceOpener` → `Demuxer`
/// - **分段封装 (HLS)**: `MuxerOpener` → `SegmentMuxer`
/// - **解码/色彩转换**: `DecoderOpener` → `FrameDecoder` → `PixelConverter`
///
/// FFmpeg 适配器位于 `ffmpeg.rs` (需要 `ffmpeg` feature)
pub mod types;

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

use std::path::PathBuf;
use std::time::Duration;

use image::RgbImage;

use crate::error::{ArchiveError, DecodeError, DemuxError, IngestError, MuxError};
pub use types::{MediaKind, MediaPacket, Rational, StreamDescriptor};

/// RTSP 传输协议
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RtspTransport {
    #[default]
    Tcp,
    Udp,
}

impl RtspTransport {
    pub fn as_str(&self) -> &'static str {
        match self {
            RtspTransport::Tcp => "tcp",
            RtspTransport::Udp => "udp",
        }
    }
}

/// 拉流参数
#[derive(Debug, Clone, PartialEq)]
pub struct TransportOptions {
    pub protocol: RtspTransport,
    pub buffer_size: usize,              // 接收缓冲区 (字节)
    pub max_delay: Duration,             // 最大包间延迟
    pub read_timeout: Option<Duration>,  // 套接字读超时, None 表示一直等待
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            protocol: RtspTransport::Tcp,
            buffer_size: 1_024_000,
            max_delay: Duration::from_millis(500),
            read_timeout: Some(Duration::from_secs(10)),
        }
    }
}

/// HLS 分段参数
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentOptions {
    pub playlist: PathBuf,
    pub segment_duration: Duration,
    pub list_size: u32,
    pub delete_segments: bool,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self {
            playlist: PathBuf::from("hls_output").join("stream.m3u8"),
            segment_duration: Duration::from_secs(2),
            list_size: 5,
            delete_segments: false,
        }
    }
}

/// 解复用器: 逐个读取压缩数据包
pub trait Demuxer: Send + 'static {
    /// 读取下一个包; 任何错误 (包括 `EndOfStream`) 都结束读包循环
    fn read_packet(&mut self) -> Result<MediaPacket, DemuxError>;
}

/// open 成功后的输入源
pub struct OpenedSource<D> {
    pub demuxer: D,
    pub streams: Vec<StreamDescriptor>,
}

/// 输入源打开器
pub trait SourceOpener {
    type Demuxer: Demuxer;

    fn open(
        &self,
        address: &str,
        options: &TransportOptions,
    ) -> Result<OpenedSource<Self::Demuxer>, IngestError>;
}

/// 分段封装会话
pub trait SegmentMuxer: Send + 'static {
    /// 输出流的时间基 (写入头部后由封装器确定)
    fn time_base(&self) -> Rational;

    fn write_packet(&mut self, packet: MediaPacket) -> Result<(), MuxError>;

    /// 写入尾部并关闭输出, 只会被调用一次
    fn finish(&mut self) -> Result<(), MuxError>;
}

/// 分段封装器打开器 (复制编码参数 + 打开输出 + 写入头部)
pub trait MuxerOpener {
    type Muxer: SegmentMuxer;

    fn open(
        &self,
        options: &SegmentOptions,
        stream: &StreamDescriptor,
    ) -> Result<Self::Muxer, ArchiveError>;
}

/// 解码后的视频帧
pub trait VideoFrame {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
}

/// 色彩空间转换 (→ RGB24)
pub trait PixelConverter<F> {
    fn convert(&mut self, frame: &F) -> Result<RgbImage, DecodeError>;
}

/// 持久化解码器
pub trait FrameDecoder {
    type Frame: VideoFrame;
    type Converter: PixelConverter<Self::Frame>;

    fn send_packet(&mut self, packet: &MediaPacket) -> Result<(), DecodeError>;

    /// 取出一帧; `Again` / `EndOfStream` 表示当前包已取完
    fn receive_frame(&mut self) -> Result<Self::Frame, DecodeError>;

    /// 按帧尺寸创建转换上下文
    fn converter(&self, width: u32, height: u32) -> Result<Self::Converter, DecodeError>;
}

/// 解码器打开器, 在检测线程内调用
pub trait DecoderOpener: Send + 'static {
    type Decoder: FrameDecoder;

    fn open(&self, stream: &StreamDescriptor) -> Result<Self::Decoder, DecodeError>;
}

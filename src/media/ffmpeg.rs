// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// FFmpeg 适配器 (需要 `ffmpeg` feature 与系统 FFmpeg 开发库)
///
/// - FfmpegSource:        RTSP 拉流 + 解复用
/// - FfmpegHlsOpener:     HLS 分段封装 (流复制, 不转码)
/// - FfmpegDecoderOpener: 视频解码 + swscale 转 RGB24
use bytes::Bytes;
use ffmpeg_next as ffmpeg;
use ffmpeg::codec::{self, packet::Flags as PacketFlags};
use ffmpeg::format::{self, Pixel};
use ffmpeg::software::scaling::{self, flag::Flags as ScaleFlags};
use ffmpeg::util::error::EAGAIN;
use ffmpeg::util::frame::video::Video;
use ffmpeg::{encoder, ffi, media, Dictionary, Packet};
use image::RgbImage;
use tracing::debug;

use super::{
    DecoderOpener, Demuxer, FrameDecoder, MediaKind, MediaPacket, MuxerOpener, OpenedSource,
    PixelConverter, Rational, SegmentMuxer, SegmentOptions, SourceOpener, StreamDescriptor,
    TransportOptions, VideoFrame,
};
use crate::error::{ArchiveError, DecodeError, DemuxError, IngestError, MuxError};

/// 初始化 FFmpeg (网络模块 + 日志级别)
pub fn init() -> Result<(), ffmpeg::Error> {
    ffmpeg::init()?;
    format::network::init();
    ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Error);
    Ok(())
}

fn to_rational(r: ffmpeg::Rational) -> Rational {
    Rational::new(r.numerator(), r.denominator())
}

fn to_ffmpeg(r: Rational) -> ffmpeg::Rational {
    ffmpeg::Rational::new(r.num, r.den)
}

fn media_kind(t: media::Type) -> MediaKind {
    match t {
        media::Type::Video => MediaKind::Video,
        media::Type::Audio => MediaKind::Audio,
        media::Type::Subtitle => MediaKind::Subtitle,
        media::Type::Data => MediaKind::Data,
        _ => MediaKind::Unknown,
    }
}

/// 根据流描述重建编码参数 (codec id / 尺寸 / extradata)
fn parameters_for(stream: &StreamDescriptor) -> Result<codec::Parameters, String> {
    let codec = ffmpeg::decoder::find_by_name(&stream.codec)
        .ok_or_else(|| format!("unknown codec {:?}", stream.codec))?;
    let mut params = codec::Parameters::new();
    unsafe {
        let p = params.as_mut_ptr();
        (*p).codec_type = codec.medium().into();
        (*p).codec_id = codec.id().into();
        (*p).width = stream.width as i32;
        (*p).height = stream.height as i32;
        if !stream.extradata.is_empty() {
            let size = stream.extradata.len();
            let buf = ffi::av_mallocz(size + ffi::AV_INPUT_BUFFER_PADDING_SIZE as usize) as *mut u8;
            if buf.is_null() {
                return Err("failed to allocate extradata".into());
            }
            std::ptr::copy_nonoverlapping(stream.extradata.as_ptr(), buf, size);
            // 由 avcodec_parameters_free 释放
            (*p).extradata = buf;
            (*p).extradata_size = size as i32;
        }
    }
    Ok(params)
}

fn describe(index: usize, stream: &format::stream::Stream) -> StreamDescriptor {
    let params = stream.parameters();
    let (width, height, extradata) = unsafe {
        let p = params.as_ptr();
        let extradata = if (*p).extradata.is_null() || (*p).extradata_size <= 0 {
            Bytes::new()
        } else {
            Bytes::copy_from_slice(std::slice::from_raw_parts(
                (*p).extradata,
                (*p).extradata_size as usize,
            ))
        };
        ((*p).width.max(0) as u32, (*p).height.max(0) as u32, extradata)
    };
    StreamDescriptor {
        index,
        kind: media_kind(params.medium()),
        codec: params.id().name().to_string(),
        extradata,
        time_base: to_rational(stream.time_base()),
        width,
        height,
    }
}

// ========== 拉流 ==========

#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegSource;

pub struct FfmpegDemuxer {
    input: format::context::Input,
    time_bases: Vec<Rational>,
}

impl SourceOpener for FfmpegSource {
    type Demuxer = FfmpegDemuxer;

    fn open(
        &self,
        address: &str,
        options: &TransportOptions,
    ) -> Result<OpenedSource<FfmpegDemuxer>, IngestError> {
        let mut opts = Dictionary::new();
        opts.set("rtsp_transport", options.protocol.as_str());
        opts.set("buffer_size", &options.buffer_size.to_string());
        opts.set("max_delay", &options.max_delay.as_micros().to_string());
        if let Some(timeout) = options.read_timeout {
            opts.set("timeout", &timeout.as_micros().to_string());
        }

        let input = format::input_with_dictionary(&address, opts).map_err(|e| {
            IngestError::Connection {
                address: address.to_string(),
                reason: e.to_string(),
            }
        })?;

        let streams: Vec<StreamDescriptor> = input
            .streams()
            .enumerate()
            .map(|(i, s)| describe(i, &s))
            .collect();
        let time_bases = streams.iter().map(|s| s.time_base).collect();
        debug!("输入流: {streams:?}");

        Ok(OpenedSource {
            demuxer: FfmpegDemuxer { input, time_bases },
            streams,
        })
    }
}

impl Demuxer for FfmpegDemuxer {
    fn read_packet(&mut self) -> Result<MediaPacket, DemuxError> {
        let mut packet = Packet::empty();
        loop {
            match packet.read(&mut self.input) {
                Ok(()) => break,
                Err(ffmpeg::Error::Other { errno }) if errno == EAGAIN => continue,
                Err(ffmpeg::Error::Eof) => return Err(DemuxError::EndOfStream),
                Err(e) => return Err(DemuxError::Read(e.to_string())),
            }
        }

        let index = packet.stream();
        Ok(MediaPacket {
            data: Bytes::copy_from_slice(packet.data().unwrap_or(&[])),
            stream_index: index,
            pts: packet.pts(),
            dts: packet.dts(),
            duration: packet.duration(),
            time_base: self.time_bases.get(index).copied().unwrap_or_default(),
            keyframe: packet.is_key(),
        })
    }
}

// ========== HLS 封装 ==========

#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegHlsOpener;

pub struct FfmpegHlsMuxer {
    output: format::context::Output,
    time_base: Rational,
}

impl MuxerOpener for FfmpegHlsOpener {
    type Muxer = FfmpegHlsMuxer;

    fn open(
        &self,
        options: &SegmentOptions,
        stream: &StreamDescriptor,
    ) -> Result<FfmpegHlsMuxer, ArchiveError> {
        let params = parameters_for(stream).map_err(ArchiveError::CodecCopy)?;

        let mut output = format::output_as(&options.playlist, "hls").map_err(|e| {
            ArchiveError::OutputOpen {
                path: options.playlist.display().to_string(),
                reason: e.to_string(),
            }
        })?;

        {
            let mut ost = output
                .add_stream(encoder::find(codec::Id::None))
                .map_err(|e| ArchiveError::CodecCopy(e.to_string()))?;
            ost.set_parameters(params);
            ost.set_time_base(to_ffmpeg(stream.time_base));
            unsafe {
                (*(*ost.as_mut_ptr()).codecpar).codec_tag = 0;
            }
        }

        let mut opts = Dictionary::new();
        opts.set("hls_time", &options.segment_duration.as_secs_f64().to_string());
        opts.set("hls_list_size", &options.list_size.to_string());
        if options.delete_segments {
            opts.set("hls_flags", "delete_segments");
        }
        output
            .write_header_with(opts)
            .map_err(|e| ArchiveError::HeaderWrite(e.to_string()))?;

        let time_base = output
            .stream(0)
            .map(|s| to_rational(s.time_base()))
            .ok_or_else(|| ArchiveError::HeaderWrite("output stream missing".into()))?;

        Ok(FfmpegHlsMuxer { output, time_base })
    }
}

impl SegmentMuxer for FfmpegHlsMuxer {
    fn time_base(&self) -> Rational {
        self.time_base
    }

    fn write_packet(&mut self, packet: MediaPacket) -> Result<(), MuxError> {
        let mut pkt = Packet::copy(&packet.data);
        pkt.set_stream(0);
        pkt.set_pts(packet.pts);
        pkt.set_dts(packet.dts);
        pkt.set_duration(packet.duration);
        pkt.set_position(-1);
        if packet.keyframe {
            pkt.set_flags(PacketFlags::KEY);
        }
        pkt.write_interleaved(&mut self.output)
            .map_err(|e| MuxError::Write(e.to_string()))
    }

    fn finish(&mut self) -> Result<(), MuxError> {
        self.output
            .write_trailer()
            .map_err(|e| MuxError::Trailer(e.to_string()))
    }
}

// ========== 解码 ==========

#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegDecoderOpener;

pub struct FfmpegDecoder {
    decoder: ffmpeg::decoder::Video,
}

pub struct FfmpegFrame(Video);

pub struct FfmpegConverter {
    ctx: scaling::Context,
}

impl DecoderOpener for FfmpegDecoderOpener {
    type Decoder = FfmpegDecoder;

    fn open(&self, stream: &StreamDescriptor) -> Result<FfmpegDecoder, DecodeError> {
        let params = parameters_for(stream).map_err(DecodeError::Open)?;
        let ctx = codec::context::Context::from_parameters(params)
            .map_err(|e| DecodeError::Open(e.to_string()))?;
        let decoder = ctx
            .decoder()
            .video()
            .map_err(|e| DecodeError::Open(e.to_string()))?;
        Ok(FfmpegDecoder { decoder })
    }
}

fn decode_error(e: ffmpeg::Error) -> DecodeError {
    match e {
        ffmpeg::Error::Other { errno } if errno == EAGAIN => DecodeError::Again,
        ffmpeg::Error::Eof => DecodeError::EndOfStream,
        e => DecodeError::Decode(e.to_string()),
    }
}

impl FrameDecoder for FfmpegDecoder {
    type Frame = FfmpegFrame;
    type Converter = FfmpegConverter;

    fn send_packet(&mut self, packet: &MediaPacket) -> Result<(), DecodeError> {
        let mut pkt = Packet::copy(&packet.data);
        pkt.set_pts(packet.pts);
        pkt.set_dts(packet.dts);
        pkt.set_duration(packet.duration);
        if packet.keyframe {
            pkt.set_flags(PacketFlags::KEY);
        }
        self.decoder.send_packet(&pkt).map_err(decode_error)
    }

    fn receive_frame(&mut self) -> Result<FfmpegFrame, DecodeError> {
        let mut frame = Video::empty();
        self.decoder
            .receive_frame(&mut frame)
            .map_err(decode_error)?;
        Ok(FfmpegFrame(frame))
    }

    fn converter(&self, width: u32, height: u32) -> Result<FfmpegConverter, DecodeError> {
        let ctx = scaling::Context::get(
            self.decoder.format(),
            width,
            height,
            Pixel::RGB24,
            width,
            height,
            ScaleFlags::BILINEAR,
        )
        .map_err(|e| DecodeError::Convert(e.to_string()))?;
        Ok(FfmpegConverter { ctx })
    }
}

impl VideoFrame for FfmpegFrame {
    fn width(&self) -> u32 {
        self.0.width()
    }

    fn height(&self) -> u32 {
        self.0.height()
    }
}

impl PixelConverter<FfmpegFrame> for FfmpegConverter {
    fn convert(&mut self, frame: &FfmpegFrame) -> Result<RgbImage, DecodeError> {
        let mut rgb = Video::empty();
        self.ctx
            .run(&frame.0, &mut rgb)
            .map_err(|e| DecodeError::Convert(e.to_string()))?;

        // 按行拷贝, 去掉 stride 对齐填充
        let (w, h) = (rgb.width() as usize, rgb.height() as usize);
        let stride = rgb.stride(0);
        let data = rgb.data(0);
        let mut buf = Vec::with_capacity(w * h * 3);
        for row in 0..h {
            let start = row * stride;
            buf.extend_from_slice(&data[start..start + w * 3]);
        }
        RgbImage::from_raw(w as u32, h as u32, buf)
            .ok_or_else(|| DecodeError::Convert("rgb buffer size mismatch".into()))
    }
}

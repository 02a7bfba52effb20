// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 媒体数据结构定义
/// Data structures shared by the demuxer, muxer and decoder seams
use bytes::Bytes;

/// 时间基 (rational time unit)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// 将 `value` 从当前时间基换算到 `to`
    ///
    /// 四舍五入 (远离零), 与 FFmpeg 的 `AV_ROUND_NEAR_INF` 一致;
    /// 任一时间基非法时原样返回
    pub fn rescale(self, value: i64, to: Rational) -> i64 {
        let n = value as i128 * self.num as i128 * to.den as i128;
        let d = self.den as i128 * to.num as i128;
        if d <= 0 || self.num <= 0 {
            return value;
        }
        let r = if n >= 0 {
            (n + d / 2) / d
        } else {
            -((-n + d / 2) / d)
        };
        r.clamp(i64::MIN as i128 + 1, i64::MAX as i128) as i64
    }
}

impl Default for Rational {
    fn default() -> Self {
        // RTP 视频默认时钟
        Self::new(1, 90_000)
    }
}

impl std::fmt::Display for Rational {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// 流类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
    Subtitle,
    Data,
    Unknown,
}

/// 流描述 (open 成功后只读共享)
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    pub index: usize,
    pub kind: MediaKind,
    pub codec: String,     // 编码名称, 例如 "h264"
    pub extradata: Bytes,  // SPS/PPS 等额外配置
    pub time_base: Rational,
    pub width: u32,
    pub height: u32,
}

impl StreamDescriptor {
    pub fn video(index: usize, codec: &str, time_base: Rational, width: u32, height: u32) -> Self {
        Self {
            index,
            kind: MediaKind::Video,
            codec: codec.to_string(),
            extradata: Bytes::new(),
            time_base,
            width,
            height,
        }
    }

    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }
}

/// 压缩数据包
///
/// 每个消费者持有自己的一份 (按值移动), 负载 `Bytes` 不可变
#[derive(Debug, Clone, PartialEq)]
pub struct MediaPacket {
    pub data: Bytes,
    pub stream_index: usize,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub duration: i64,
    pub time_base: Rational,
    pub keyframe: bool,
}

impl MediaPacket {
    pub fn new(data: impl Into<Bytes>, stream_index: usize, time_base: Rational) -> Self {
        Self {
            data: data.into(),
            stream_index,
            pts: None,
            dts: None,
            duration: 0,
            time_base,
            keyframe: false,
        }
    }

    pub fn with_timestamps(mut self, pts: Option<i64>, dts: Option<i64>, duration: i64) -> Self {
        self.pts = pts;
        self.dts = dts;
        self.duration = duration;
        self
    }

    pub fn with_keyframe(mut self, keyframe: bool) -> Self {
        self.keyframe = keyframe;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 命令行参数 (Command line arguments)
///
/// 数据库参数可从环境变量 / `.env` 读取
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args as ClapArgs, Parser, ValueEnum};

use crate::detection::{DetectionSettings, DEFAULT_FONT, INF_SIZE};
use crate::media::{RtspTransport, SegmentOptions, TransportOptions};
use crate::pipeline::{PipelineConfig, DEFAULT_DETECT_QUEUE_LIMIT};

/// 传输协议
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    Tcp,
    Udp,
}

impl From<Transport> for RtspTransport {
    fn from(t: Transport) -> Self {
        match t {
            Transport::Tcp => RtspTransport::Tcp,
            Transport::Udp => RtspTransport::Udp,
        }
    }
}

/// 流哨兵参数
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "流哨兵 - RTSP 归档与目标检测", long_about = None)]
pub struct Args {
    /// RTSP流地址
    pub source: String,

    /// ONNX 检测模型路径
    pub model: PathBuf,

    /// 设备名称 (入库 device_name)
    #[arg(long, default_value = "cam1")]
    pub source_id: String,

    /// HLS 输出目录
    #[arg(long, default_value = "hls_output")]
    pub hls_dir: PathBuf,

    /// 播放列表文件名
    #[arg(long, default_value = "stream.m3u8")]
    pub playlist: String,

    /// 标注帧保存目录
    #[arg(long, default_value = "detected_frames")]
    pub frame_dir: PathBuf,

    /// 分段时长 (秒)
    #[arg(long, default_value_t = 2)]
    pub segment_secs: u64,

    /// 播放列表保留的分段数
    #[arg(long, default_value_t = 5)]
    pub segment_count: u32,

    /// 删除滑出播放列表的分段
    #[arg(long)]
    pub delete_segments: bool,

    /// 检测队列上限, 超过后丢弃
    #[arg(long, default_value_t = DEFAULT_DETECT_QUEUE_LIMIT)]
    pub detect_queue_limit: usize,

    /// 置信度阈值
    #[arg(long, default_value_t = 0.4)]
    pub conf: f32,

    /// NMS IoU 阈值
    #[arg(long, default_value_t = 0.4)]
    pub nms: f32,

    /// 推理输入尺寸
    #[arg(long, default_value_t = INF_SIZE)]
    pub inf_size: u32,

    /// 标签字体 (TTF/OTF), 加载失败时启动报错
    #[arg(long, default_value = DEFAULT_FONT)]
    pub font: PathBuf,

    /// RTSP 传输协议
    #[arg(long, value_enum, default_value_t = Transport::Tcp)]
    pub transport: Transport,

    /// 读超时 (秒), 0 表示不超时
    #[arg(long, default_value_t = 10)]
    pub read_timeout_secs: u64,

    /// 连续解码失败多少次后重开解码器
    #[arg(long, default_value_t = 50)]
    pub max_decode_failures: u32,

    #[command(flatten)]
    pub db: DbArgs,
}

/// 数据库参数
#[derive(ClapArgs, Debug, Clone, PartialEq)]
pub struct DbArgs {
    #[arg(long = "db-host", env = "DB_HOST", default_value = "localhost")]
    pub host: String,

    #[arg(long = "db-port", env = "DB_PORT", default_value_t = 5432)]
    pub port: u16,

    #[arg(long = "db-user", env = "POSTGRES_USER", default_value = "admin")]
    pub user: String,

    #[arg(long = "db-password", env = "POSTGRES_PASSWORD", default_value = "password", hide_env_values = true)]
    pub password: String,

    #[arg(long = "db-name", env = "POSTGRES_DB", default_value = "analytics_db")]
    pub name: String,

    /// 启动时连接重试次数
    #[arg(long, default_value_t = 5)]
    pub db_retries: u32,

    /// 重试间隔 (秒)
    #[arg(long, default_value_t = 2)]
    pub db_retry_delay_secs: u64,
}

/// 查看服务参数
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "流哨兵查看服务 - 直播与最近检测", long_about = None)]
pub struct ViewerArgs {
    /// 监听地址
    #[arg(long, env = "VIEWER_BIND", default_value = "0.0.0.0:9090")]
    pub bind: String,

    /// HLS 输出目录
    #[arg(long, default_value = "hls_output")]
    pub hls_dir: PathBuf,

    /// 播放列表文件名
    #[arg(long, default_value = "stream.m3u8")]
    pub playlist: String,

    /// 标注帧目录
    #[arg(long, default_value = "detected_frames")]
    pub frame_dir: PathBuf,

    /// 返回最近多少条检测
    #[arg(long, default_value_t = 20)]
    pub recent: i64,

    /// 连接池大小
    #[arg(long, default_value_t = 4)]
    pub db_pool_size: u32,

    #[command(flatten)]
    pub db: DbArgs,
}

impl DbArgs {
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.db_retry_delay_secs)
    }
}

impl Args {
    pub fn playlist_path(&self) -> PathBuf {
        self.hls_dir.join(&self.playlist)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            source: self.source.clone(),
            transport: TransportOptions {
                protocol: self.transport.into(),
                read_timeout: (self.read_timeout_secs > 0)
                    .then(|| Duration::from_secs(self.read_timeout_secs)),
                ..Default::default()
            },
            segment: SegmentOptions {
                playlist: self.playlist_path(),
                segment_duration: Duration::from_secs(self.segment_secs.max(1)),
                list_size: self.segment_count,
                delete_segments: self.delete_segments,
            },
            detect_queue_limit: self.detect_queue_limit,
            detection: DetectionSettings {
                source_id: self.source_id.clone(),
                frame_dir: self.frame_dir.clone(),
                conf_threshold: self.conf,
                nms_threshold: self.nms,
                max_decode_failures: self.max_decode_failures,
            },
        }
    }
}

/// 视频输入系统 (Video Input System)
///
/// 独立工作线程, 负责 RTSP 拉流与数据包分发
/// - StreamIngestor: 打开输入源, 读包并复制给归档/检测两个队列
pub mod ingestor;

pub use ingestor::{IngestStats, StreamIngestor};

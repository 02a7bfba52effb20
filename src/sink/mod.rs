// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测结果入库 (Persistence sink)
///
/// 检测线程逐条调用 `insert`, 每条记录相互独立, 失败只记录日志
use std::time::Duration;

use tracing::warn;

use crate::detection::DetectionRecord;
use crate::error::SinkError;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "postgres")]
pub use postgres::{PostgresHistory, PostgresSink};

/// 建表语句 (幂等)
pub const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS detections (\
    id SERIAL PRIMARY KEY, \
    device_name TEXT, \
    class_name TEXT, \
    confidence REAL, \
    timestamp TEXT, \
    frame_path TEXT)";

pub const INSERT_SQL: &str = "INSERT INTO detections (device_name, class_name, confidence, timestamp, frame_path) \
    VALUES ($1, $2, $3, $4, $5)";

/// 最近的检测记录, 新的在前
pub const RECENT_SQL: &str = "SELECT device_name, class_name, confidence, timestamp, frame_path \
    FROM detections ORDER BY id DESC LIMIT $1";

/// 查询返回的一行
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecentDetection {
    pub device_name: String,
    pub class_name: String,
    pub confidence: f32,
    pub timestamp: String,
    pub frame_path: String,
}

impl RecentDetection {
    /// 标注帧文件名 (不含目录)
    pub fn file_name(&self) -> Option<&str> {
        std::path::Path::new(&self.frame_path)
            .file_name()
            .and_then(|n| n.to_str())
    }
}

impl From<&DetectionRecord> for RecentDetection {
    fn from(record: &DetectionRecord) -> Self {
        Self {
            device_name: record.source_id.clone(),
            class_name: record.class_name.clone(),
            confidence: record.confidence,
            timestamp: record.timestamp.clone(),
            frame_path: record.frame_path.to_string_lossy().into_owned(),
        }
    }
}

pub trait DetectionSink: Send + 'static {
    fn insert(&mut self, record: &DetectionRecord) -> Result<(), SinkError>;
}

impl<T: DetectionSink + ?Sized> DetectionSink for Box<T> {
    fn insert(&mut self, record: &DetectionRecord) -> Result<(), SinkError> {
        (**self).insert(record)
    }
}

/// 启动阶段的连接重试: 最多尝试 `attempts` 次, 每次间隔 `delay`
pub fn connect_with_retry<T, F>(attempts: u32, delay: Duration, mut connect: F) -> Result<T, SinkError>
where
    F: FnMut() -> Result<T, SinkError>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match connect() {
            Ok(v) => return Ok(v),
            Err(e) if attempt < attempts => {
                warn!("⚠️ 数据库连接失败 ({attempt}/{attempts}): {e}, {delay:?} 后重试");
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

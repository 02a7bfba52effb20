/// 检测系统 (Detection System)
///
/// 独立工作线程, 负责智能分析
/// - DetectionWorker: 解码 → 转换 → 推理 → 入库
/// - Annotator:       检测框与标签绘制
/// - SnapshotWriter:  标注帧保存
pub mod annotate;
pub mod snapshot;
pub mod types;
pub mod worker;

pub use annotate::{Annotator, DEFAULT_FONT};
pub use snapshot::{capture_timestamp, SnapshotWriter};
pub use types::{Detection, DetectionRecord, INF_SIZE};
pub use worker::{run_detection_worker, DetectionSettings, DetectionStats, DetectionWorker};

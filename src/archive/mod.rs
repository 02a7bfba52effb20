/// 归档系统 (Archive System)
///
/// 消费归档队列, 修正时间戳后写入滚动 HLS 分段
pub mod timestamp;
pub mod writer;

pub use timestamp::TimestampRepair;
pub use writer::{run_archive_worker, ArchiveStats, ArchiveWriter};

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 错误类型定义
/// Error taxonomy of the pipeline
///
/// 启动阶段错误 (Ingest/Archive) 为致命错误, 运行期错误 (Demux/Mux/Decode/Sink) 按包/按记录处理
use thiserror::Error;

/// 拉流错误 (Stream ingestor)
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to connect to source {address:?}: {reason}")]
    Connection { address: String, reason: String },
    #[error("no video stream found in {address:?}")]
    NoVideoStream { address: String },
    #[error("stream ingestor has not been opened")]
    NotReady,
    #[error("stream ingestor is already running")]
    AlreadyRunning,
    #[error("failed to spawn ingest thread")]
    Spawn(#[source] std::io::Error),
}

/// 读包错误, 任意一种都会结束读包循环
#[derive(Debug, Error)]
pub enum DemuxError {
    #[error("end of stream")]
    EndOfStream,
    #[error("failed to read packet: {0}")]
    Read(String),
}

/// HLS 归档初始化错误
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to copy codec parameters: {0}")]
    CodecCopy(String),
    #[error("failed to open output {path:?}: {reason}")]
    OutputOpen { path: String, reason: String },
    #[error("failed to write container header: {0}")]
    HeaderWrite(String),
    #[error("archive writer was already initialized")]
    AlreadyInitialized,
}

/// 单包写入错误 (只记录, 不中断)
#[derive(Debug, Error)]
pub enum MuxError {
    #[error("failed to write packet: {0}")]
    Write(String),
    #[error("failed to write trailer: {0}")]
    Trailer(String),
}

/// 解码错误
///
/// `Again` / `EndOfStream` 是哨兵值, 只结束当前包的取帧循环
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("decoder needs more input")]
    Again,
    #[error("decoder reached end of stream")]
    EndOfStream,
    #[error("failed to open decoder: {0}")]
    Open(String),
    #[error("failed to decode packet: {0}")]
    Decode(String),
    #[error("failed to convert frame: {0}")]
    Convert(String),
}

/// 入库错误
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to connect to detection sink: {0}")]
    Connect(String),
    #[error("failed to create detection schema: {0}")]
    Schema(String),
    #[error("failed to insert detection: {0}")]
    Insert(String),
    #[error("failed to query detections: {0}")]
    Query(String),
}

/// 编排器启动错误
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("failed to spawn {name} thread")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

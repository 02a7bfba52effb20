// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 拉流线程 (Stream ingestor)
///
/// 打开输入源, 选中第一个视频流, 在独立线程 `ingest` 中循环读包,
/// 每个视频包复制给两个队列:
/// - 归档队列: 无条件写入 (无损)
/// - 检测队列: 长度低于 `detect_limit` 时才写入, 否则丢弃 (背压)
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use crate::error::{DemuxError, IngestError};
use crate::media::{Demuxer, MediaPacket, Rational, SourceOpener, StreamDescriptor, TransportOptions};
use crate::queue::BlockingQueue;

/// 统计日志间隔
const STATS_INTERVAL: Duration = Duration::from_secs(10);

/// 读包统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub packets_read: u64,
    pub archived: u64,
    pub detect_enqueued: u64,
    pub detect_dropped: u64,
    pub foreign_packets: u64, // 非视频流的包
}

pub struct StreamIngestor<O: SourceOpener> {
    opener: O,
    transport: TransportOptions,
    detect_limit: usize,
    demuxer: Option<O::Demuxer>,
    video: Option<Arc<StreamDescriptor>>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<IngestStats>>,
    started: bool,
    // 线程退出时丢弃发送端, 接收端随即就绪
    finished_tx: Option<Sender<()>>,
    finished_rx: Receiver<()>,
}

impl<O: SourceOpener> StreamIngestor<O> {
    pub fn new(opener: O, transport: TransportOptions, detect_limit: usize) -> Self {
        let (finished_tx, finished_rx) = crossbeam_channel::bounded(0);
        Self {
            opener,
            transport,
            detect_limit,
            demuxer: None,
            video: None,
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
            started: false,
            finished_tx: Some(finished_tx),
            finished_rx,
        }
    }

    /// 打开输入源并定位第一个视频流
    pub fn open(&mut self, address: &str) -> Result<Arc<StreamDescriptor>, IngestError> {
        if self.started {
            return Err(IngestError::AlreadyRunning);
        }
        let opened = self.opener.open(address, &self.transport)?;
        let video = opened
            .streams
            .into_iter()
            .find(|s| s.is_video())
            .ok_or_else(|| IngestError::NoVideoStream {
                address: address.to_string(),
            })?;

        info!(
            "📡 已打开输入源 {address}: 视频流 #{} {} {}x{} tb={}",
            video.index, video.codec, video.width, video.height, video.time_base
        );

        let video = Arc::new(video);
        self.demuxer = Some(opened.demuxer);
        self.video = Some(video.clone());
        Ok(video)
    }

    /// 视频流编码参数 (共享只读)
    pub fn codec_parameters(&self) -> Result<Arc<StreamDescriptor>, IngestError> {
        self.video.clone().ok_or(IngestError::NotReady)
    }

    pub fn time_base(&self) -> Result<Rational, IngestError> {
        self.video
            .as_ref()
            .map(|v| v.time_base)
            .ok_or(IngestError::NotReady)
    }

    /// 启动读包线程
    pub fn start(
        &mut self,
        archive: Arc<BlockingQueue<MediaPacket>>,
        detect: Arc<BlockingQueue<MediaPacket>>,
    ) -> Result<(), IngestError> {
        if self.started {
            return Err(IngestError::AlreadyRunning);
        }
        let (demuxer, video) = match (self.demuxer.take(), self.video.as_ref()) {
            (Some(d), Some(v)) => (d, v.index),
            (demuxer, _) => {
                self.demuxer = demuxer;
                return Err(IngestError::NotReady);
            }
        };

        // 启动前的 stop() 不影响本次运行
        self.stop.store(false, Ordering::SeqCst);
        let stop = self.stop.clone();
        let limit = self.detect_limit;
        let finished = self.finished_tx.take();
        let handle = std::thread::Builder::new()
            .name("ingest".into())
            .spawn(move || {
                let stats = read_loop(demuxer, video, &archive, &detect, limit, &stop);
                drop(finished);
                stats
            })
            .map_err(IngestError::Spawn)?;

        self.worker = Some(handle);
        self.started = true;
        Ok(())
    }

    /// 读包线程退出 (源结束或失败) 时就绪
    pub fn finished(&self) -> Receiver<()> {
        self.finished_rx.clone()
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// 停止并等待读包线程退出; 只有第一次返回统计
    pub fn stop(&mut self) -> Option<IngestStats> {
        self.stop.store(true, Ordering::SeqCst);
        let handle = self.worker.take()?;
        match handle.join() {
            Ok(stats) => {
                info!("🛑 拉流线程已停止: {stats:?}");
                Some(stats)
            }
            Err(_) => {
                warn!("⚠️ 拉流线程异常退出");
                None
            }
        }
    }
}

impl<O: SourceOpener> Drop for StreamIngestor<O> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_loop<D: Demuxer>(
    mut demuxer: D,
    video: usize,
    archive: &BlockingQueue<MediaPacket>,
    detect: &BlockingQueue<MediaPacket>,
    limit: usize,
    stop: &AtomicBool,
) -> IngestStats {
    let mut stats = IngestStats::default();
    let mut last_report = Instant::now();

    while !stop.load(Ordering::SeqCst) {
        let packet = match demuxer.read_packet() {
            Ok(p) => p,
            Err(DemuxError::EndOfStream) => {
                info!("📭 输入源已结束");
                break;
            }
            Err(e) => {
                warn!("❌ 读包失败, 停止拉流: {e}");
                break;
            }
        };
        stats.packets_read += 1;

        if packet.stream_index != video {
            stats.foreign_packets += 1;
            continue;
        }

        let for_detect = (detect.len() < limit).then(|| packet.clone());
        archive.push(packet);
        stats.archived += 1;
        match for_detect {
            Some(p) => {
                detect.push(p);
                stats.detect_enqueued += 1;
            }
            None => stats.detect_dropped += 1,
        }

        if last_report.elapsed() >= STATS_INTERVAL {
            info!(
                packets = stats.packets_read,
                archived = stats.archived,
                detect_dropped = stats.detect_dropped,
                "📊 拉流统计"
            );
            last_report = Instant::now();
        }
    }

    debug!("拉流循环退出");
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{packet, MockSource};
    use crossbeam_channel::RecvTimeoutError;

    fn queues() -> (Arc<BlockingQueue<MediaPacket>>, Arc<BlockingQueue<MediaPacket>>) {
        (Arc::new(BlockingQueue::new()), Arc::new(BlockingQueue::new()))
    }

    #[test]
    fn test_open_selects_first_video_stream() {
        let mut ingestor = StreamIngestor::new(MockSource::with_audio(vec![]), TransportOptions::default(), 30);
        assert!(matches!(ingestor.time_base(), Err(IngestError::NotReady)));
        assert!(matches!(ingestor.codec_parameters(), Err(IngestError::NotReady)));

        let video = ingestor.open("rtsp://cam").unwrap();
        assert_eq!(video.index, 1);
        assert_eq!(ingestor.time_base().unwrap(), video.time_base);
        assert!(Arc::ptr_eq(&video, &ingestor.codec_parameters().unwrap()));
    }

    #[test]
    fn test_open_failures() {
        let mut ingestor = StreamIngestor::new(MockSource::unreachable(), TransportOptions::default(), 30);
        assert!(matches!(ingestor.open("rtsp://x"), Err(IngestError::Connection { .. })));

        let mut ingestor = StreamIngestor::new(MockSource::audio_only(), TransportOptions::default(), 30);
        assert!(matches!(ingestor.open("rtsp://x"), Err(IngestError::NoVideoStream { .. })));
    }

    #[test]
    fn test_start_before_open_is_not_ready() {
        let mut ingestor = StreamIngestor::new(MockSource::new(vec![]), TransportOptions::default(), 30);
        let (a, d) = queues();
        assert!(matches!(ingestor.start(a, d), Err(IngestError::NotReady)));
    }

    #[test]
    fn test_fan_out_to_both_queues() {
        // stream 0 为音频, stream 1 为视频
        let script = vec![
            packet(0, Some(1)),
            packet(1, Some(10)),
            packet(0, Some(2)),
            packet(1, Some(20)),
            packet(1, Some(30)),
        ];
        let mut ingestor = StreamIngestor::new(MockSource::with_audio(script), TransportOptions::default(), 30);
        ingestor.open("rtsp://cam").unwrap();
        let (a, d) = queues();
        ingestor.start(a.clone(), d.clone()).unwrap();
        assert_eq!(
            ingestor.finished().recv_timeout(Duration::from_secs(2)),
            Err(RecvTimeoutError::Disconnected)
        );
        let stats = ingestor.stop().unwrap();

        assert_eq!(stats.packets_read, 5);
        assert_eq!(stats.foreign_packets, 2);
        assert_eq!(stats.archived, 3);
        assert_eq!(stats.detect_enqueued, 3);

        // 两个队列各拿到一份视频包, 顺序一致
        a.stop();
        d.stop();
        let archived: Vec<_> = std::iter::from_fn(|| a.pop()).map(|p| (p.stream_index, p.pts)).collect();
        let detected: Vec<_> = std::iter::from_fn(|| d.pop()).map(|p| (p.stream_index, p.pts)).collect();
        assert_eq!(archived, vec![(1, Some(10)), (1, Some(20)), (1, Some(30))]);
        assert_eq!(detected, archived);
    }

    #[test]
    fn test_detect_queue_respects_limit() {
        let script: Vec<_> = (0..10).map(|i| packet(1, Some(i))).collect();
        let mut ingestor = StreamIngestor::new(MockSource::with_audio(script), TransportOptions::default(), 3);
        ingestor.open("rtsp://cam").unwrap();
        let (a, d) = queues();
        ingestor.start(a.clone(), d.clone()).unwrap();
        assert_eq!(
            ingestor.finished().recv_timeout(Duration::from_secs(2)),
            Err(RecvTimeoutError::Disconnected)
        );
        let stats = ingestor.stop().unwrap();

        assert_eq!(a.len(), 10);
        assert_eq!(d.len(), 3);
        assert_eq!(stats.archived, 10);
        assert_eq!(stats.detect_enqueued, 3);
        assert_eq!(stats.detect_dropped, 7);

        // 检测队列拿到的是最早的三个包
        d.stop();
        let pts: Vec<_> = std::iter::from_fn(|| d.pop()).map(|p| p.pts).collect();
        assert_eq!(pts, vec![Some(0), Some(1), Some(2)]);
    }

    #[test]
    fn test_start_twice_and_stop_idempotent() {
        let mut ingestor = StreamIngestor::new(MockSource::endless(), TransportOptions::default(), 30);
        ingestor.open("rtsp://cam").unwrap();
        let (a, d) = queues();
        ingestor.start(a.clone(), d.clone()).unwrap();
        assert!(matches!(ingestor.start(a, d), Err(IngestError::AlreadyRunning)));

        std::thread::sleep(Duration::from_millis(20));
        assert!(ingestor.stop().is_some());
        assert!(ingestor.stop().is_none());
        assert!(!ingestor.is_running());
    }

    #[test]
    fn test_stop_before_start_returns_none() {
        let mut ingestor = StreamIngestor::new(MockSource::new(vec![]), TransportOptions::default(), 30);
        ingestor.open("rtsp://cam").unwrap();
        assert!(ingestor.stop().is_none());
    }

    #[test]
    fn test_start_after_early_stop_still_reads() {
        let script: Vec<_> = (0..4).map(|i| packet(0, Some(i))).collect();
        let mut ingestor = StreamIngestor::new(MockSource::new(script), TransportOptions::default(), 30);
        ingestor.open("rtsp://cam").unwrap();
        assert!(ingestor.stop().is_none());

        let (a, d) = queues();
        ingestor.start(a.clone(), d).unwrap();
        assert_eq!(
            ingestor.finished().recv_timeout(Duration::from_secs(2)),
            Err(RecvTimeoutError::Disconnected)
        );
        let stats = ingestor.stop().unwrap();
        assert_eq!(stats.archived, 4);
        assert_eq!(a.len(), 4);
    }
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// HLS 归档写入器 (Archive writer)
///
/// 状态机: Inactive → Active(会话) → Finished
/// - init: 打开分段封装会话 (复制编码参数 + 打开输出 + 写入头部)
/// - write_packet: 时间戳修正后写入, 单包失败只记录日志
/// - finish: 写入尾部并释放会话, 幂等
use tracing::{error, info, warn};

use super::timestamp::TimestampRepair;
use crate::error::ArchiveError;
use crate::media::{MediaPacket, MuxerOpener, Rational, SegmentMuxer, SegmentOptions, StreamDescriptor};
use crate::queue::BlockingQueue;

/// 归档统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    pub written: u64,
    pub repaired: u64,
    pub write_failures: u64,
    pub skipped_empty: u64,
}

struct Session<M> {
    muxer: M,
    repair: TimestampRepair,
}

enum State<M> {
    Inactive,
    Active(Session<M>),
    Finished,
}

pub struct ArchiveWriter<M: SegmentMuxer> {
    state: State<M>,
    stats: ArchiveStats,
}

impl<M: SegmentMuxer> ArchiveWriter<M> {
    pub fn new() -> Self {
        Self {
            state: State::Inactive,
            stats: ArchiveStats::default(),
        }
    }

    /// 打开分段输出会话, `time_base` 为输入流时间基
    pub fn init<O>(
        &mut self,
        opener: &O,
        options: &SegmentOptions,
        stream: &StreamDescriptor,
        time_base: Rational,
    ) -> Result<(), ArchiveError>
    where
        O: MuxerOpener<Muxer = M>,
    {
        if !matches!(self.state, State::Inactive) {
            return Err(ArchiveError::AlreadyInitialized);
        }
        let muxer = opener.open(options, stream)?;
        let output = muxer.time_base();
        info!(
            "🎞️ HLS 归档已启动: {} (分段 {:?} x {}) tb {} → {}",
            options.playlist.display(),
            options.segment_duration,
            options.list_size,
            time_base,
            output
        );
        self.state = State::Active(Session {
            muxer,
            repair: TimestampRepair::new(time_base, output),
        });
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, State::Active(_))
    }

    /// 写入一个包; 未激活或空包时直接丢弃
    pub fn write_packet(&mut self, mut packet: MediaPacket) {
        let State::Active(session) = &mut self.state else {
            return;
        };
        if packet.is_empty() {
            self.stats.skipped_empty += 1;
            return;
        }

        if session.repair.apply(&mut packet) {
            self.stats.repaired += 1;
        }
        packet.stream_index = 0;

        match session.muxer.write_packet(packet) {
            Ok(()) => self.stats.written += 1,
            Err(e) => {
                self.stats.write_failures += 1;
                warn!("⚠️ 写入分段失败: {e}");
            }
        }
    }

    /// 写入尾部并关闭输出 (幂等)
    pub fn finish(&mut self) {
        if !self.is_active() {
            return;
        }
        if let State::Active(mut session) = std::mem::replace(&mut self.state, State::Finished) {
            match session.muxer.finish() {
                Ok(()) => info!("✅ HLS 归档已关闭: {:?}", self.stats),
                Err(e) => error!("❌ 写入 HLS 尾部失败: {e}"),
            }
        }
    }

    pub fn stats(&self) -> ArchiveStats {
        self.stats
    }
}

impl<M: SegmentMuxer> Default for ArchiveWriter<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: SegmentMuxer> Drop for ArchiveWriter<M> {
    fn drop(&mut self) {
        self.finish();
    }
}

/// 归档线程主循环: 取包直到队列结束, 然后关闭会话
pub fn run_archive_worker<M: SegmentMuxer>(
    queue: &BlockingQueue<MediaPacket>,
    mut writer: ArchiveWriter<M>,
) -> ArchiveStats {
    while let Some(packet) = queue.pop() {
        writer.write_packet(packet);
    }
    writer.finish();
    writer.stats()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{packet, video_descriptor, MockMuxerOpener};

    fn active_writer(opener: &MockMuxerOpener) -> ArchiveWriter<crate::test_support::MockMuxer> {
        let mut writer = ArchiveWriter::new();
        let stream = video_descriptor(0);
        writer
            .init(opener, &SegmentOptions::default(), &stream, stream.time_base)
            .unwrap();
        writer
    }

    #[test]
    fn test_inactive_writer_ignores_packets() {
        let mut writer: ArchiveWriter<crate::test_support::MockMuxer> = ArchiveWriter::new();
        writer.write_packet(packet(0, Some(1)));
        writer.finish();
        assert_eq!(writer.stats(), ArchiveStats::default());
        assert!(!writer.is_active());
    }

    #[test]
    fn test_writes_repaired_packets_to_stream_zero() {
        let opener = MockMuxerOpener::new();
        let mut writer = active_writer(&opener);
        for pts in [5, 5, 3, 9] {
            writer.write_packet(packet(2, Some(pts)));
        }
        writer.write_packet(MediaPacket::new(Vec::<u8>::new(), 2, Default::default()));
        writer.finish();

        let log = opener.log.lock();
        let pts: Vec<_> = log.packets.iter().map(|p| p.pts).collect();
        assert_eq!(pts, vec![Some(5), Some(6), Some(7), Some(9)]);
        assert!(log.packets.iter().all(|p| p.stream_index == 0));
        assert_eq!(log.finished, 1);

        let stats = writer.stats();
        assert_eq!(stats.written, 4);
        assert_eq!(stats.repaired, 2);
        assert_eq!(stats.skipped_empty, 1);
    }

    #[test]
    fn test_finish_is_idempotent() {
        let opener = MockMuxerOpener::new();
        let mut writer = active_writer(&opener);
        writer.finish();
        writer.finish();
        drop(writer);
        assert_eq!(opener.log.lock().finished, 1);
    }

    #[test]
    fn test_drop_finishes_session() {
        let opener = MockMuxerOpener::new();
        let writer = active_writer(&opener);
        drop(writer);
        assert_eq!(opener.log.lock().finished, 1);
    }

    #[test]
    fn test_write_failure_does_not_abort() {
        let opener = MockMuxerOpener::failing_writes();
        let mut writer = active_writer(&opener);
        writer.write_packet(packet(0, Some(1)));
        writer.write_packet(packet(0, Some(2)));
        assert!(writer.is_active());
        assert_eq!(writer.stats().write_failures, 2);
        writer.finish();
        assert_eq!(opener.log.lock().finished, 1);
    }

    #[test]
    fn test_init_errors() {
        let opener = MockMuxerOpener::failing_open();
        let stream = video_descriptor(0);
        let mut writer = ArchiveWriter::new();
        let err = writer
            .init(&opener, &SegmentOptions::default(), &stream, stream.time_base)
            .unwrap_err();
        assert!(matches!(err, ArchiveError::OutputOpen { .. }));
        assert!(!writer.is_active());

        let opener = MockMuxerOpener::new();
        let mut writer = active_writer(&opener);
        assert!(matches!(
            writer.init(&opener, &SegmentOptions::default(), &stream, stream.time_base),
            Err(ArchiveError::AlreadyInitialized)
        ));
        writer.finish();
        assert!(matches!(
            writer.init(&opener, &SegmentOptions::default(), &stream, stream.time_base),
            Err(ArchiveError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_worker_drains_queue_then_finishes() {
        let opener = MockMuxerOpener::new();
        let writer = active_writer(&opener);
        let queue = BlockingQueue::new();
        for pts in 0..10 {
            queue.push(packet(0, Some(pts)));
        }
        queue.stop();

        let stats = run_archive_worker(&queue, writer);
        assert_eq!(stats.written, 10);
        let log = opener.log.lock();
        assert_eq!(log.packets.len(), 10);
        assert_eq!(log.finished, 1);
    }
}

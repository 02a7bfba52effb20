// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 时间戳修正
///
/// 把 pts/dts/duration 从输入时间基换算到输出时间基,
/// 并保证写入同一分段会话的 pts 严格递增
use crate::media::{MediaPacket, Rational};

#[derive(Debug, Clone)]
pub struct TimestampRepair {
    input: Rational,
    output: Rational,
    last_pts: Option<i64>,
    repaired: u64,
}

impl TimestampRepair {
    pub fn new(input: Rational, output: Rational) -> Self {
        Self {
            input,
            output,
            last_pts: None,
            repaired: 0,
        }
    }

    /// 原地修正, 返回是否改写了 pts
    ///
    /// 在第一个有效 pts 之前, 缺失 pts 的包保持未设置
    pub fn apply(&mut self, packet: &mut MediaPacket) -> bool {
        let mut pts = packet.pts.map(|v| self.input.rescale(v, self.output));
        let mut dts = packet.dts.map(|v| self.input.rescale(v, self.output));
        let duration = self.input.rescale(packet.duration, self.output);

        let mut fixed = false;
        if let Some(last) = self.last_pts {
            if pts.map_or(true, |p| p <= last) {
                // 上限处饱和, 不再递增
                pts = Some(last.saturating_add(1));
                dts = pts;
                fixed = true;
            }
        }

        if pts.is_some() {
            self.last_pts = pts;
        }
        if fixed {
            self.repaired += 1;
        }

        packet.pts = pts;
        packet.dts = dts;
        packet.duration = duration;
        packet.time_base = self.output;
        fixed
    }

    pub fn last_pts(&self) -> Option<i64> {
        self.last_pts
    }

    pub fn repaired(&self) -> u64 {
        self.repaired
    }
}

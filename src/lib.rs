#![allow(clippy::type_complexity)]
// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod archive; // HLS 归档系统
pub mod config; // 命令行参数
pub mod detection; // 智能检测系统
pub mod error; // 错误类型
pub mod input; // 视频输入系统
pub mod media; // 媒体接口层
pub mod models; // 模型接口与具体实现
pub mod pipeline; // 管线编排
pub mod queue; // 阻塞队列
pub mod sink; // 检测结果入库
pub mod telemetry; // 日志初始化
#[cfg(feature = "web")]
pub mod web; // 查看服务

#[cfg(test)]
pub(crate) mod test_support;

pub use crate::config::{Args, ViewerArgs};
pub use crate::detection::{Detection, DetectionRecord, DetectionWorker};
pub use crate::error::{
    ArchiveError, DecodeError, DemuxError, IngestError, MuxError, PipelineError, SinkError,
};
pub use crate::media::{MediaPacket, Rational, StreamDescriptor};
pub use crate::models::Detector;
pub use crate::pipeline::{Pipeline, PipelineConfig, PipelineReport};
pub use crate::queue::BlockingQueue;

/// 贪心 NMS: 按置信度降序, 丢弃与已保留框 IoU 超过阈值的框
pub fn non_max_suppression(xs: &mut Vec<Bbox>, iou_threshold: f32) {
    xs.sort_by(|b1, b2| {
        b2.confidence()
            .partial_cmp(&b1.confidence())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            let iou = xs[prev_index].iou(&xs[index]);
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Bbox {
    // a bounding box around an object
    xmin: f32,
    ymin: f32,
    width: f32,
    height: f32,
    id: usize,
    confidence: f32,
}

impl Bbox {
    pub fn new_from_xywh(xmin: f32, ymin: f32, width: f32, height: f32) -> Self {
        Self {
            xmin,
            ymin,
            width,
            height,
            ..Default::default()
        }
    }

    pub fn new(xmin: f32, ymin: f32, width: f32, height: f32, id: usize, confidence: f32) -> Self {
        Self {
            xmin,
            ymin,
            width,
            height,
            id,
            confidence,
        }
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn xmin(&self) -> f32 {
        self.xmin
    }

    pub fn ymin(&self) -> f32 {
        self.ymin
    }

    pub fn xmax(&self) -> f32 {
        self.xmin + self.width
    }

    pub fn ymax(&self) -> f32 {
        self.ymin + self.height
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn intersection_area(&self, another: &Bbox) -> f32 {
        let l = self.xmin.max(another.xmin);
        let r = (self.xmin + self.width).min(another.xmin + another.width);
        let t = self.ymin.max(another.ymin);
        let b = (self.ymin + self.height).min(another.ymin + another.height);
        (r - l + 1.).max(0.) * (b - t + 1.).max(0.)
    }

    pub fn union(&self, another: &Bbox) -> f32 {
        self.area() + another.area() - self.intersection_area(another)
    }

    pub fn iou(&self, another: &Bbox) -> f32 {
        self.intersection_area(another) / self.union(another)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou_identical_and_disjoint() {
        let a = Bbox::new_from_xywh(0., 0., 100., 100.);
        let b = Bbox::new_from_xywh(500., 500., 10., 10.);
        assert!(a.iou(&a) > 0.99);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_nms_keeps_highest_confidence() {
        let mut boxes = vec![
            Bbox::new(0., 0., 100., 100., 0, 0.6),
            Bbox::new(2., 2., 100., 100., 0, 0.9),
            Bbox::new(300., 300., 50., 50., 2, 0.5),
        ];
        non_max_suppression(&mut boxes, 0.45);
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].confidence(), 0.9);
        assert_eq!(boxes[1].id(), 2);
    }

    #[test]
    fn test_nms_tolerates_nan_confidence() {
        let mut boxes = vec![
            Bbox::new(0., 0., 10., 10., 0, f32::NAN),
            Bbox::new(50., 50., 10., 10., 0, 0.8),
        ];
        non_max_suppression(&mut boxes, 0.45);
        assert_eq!(boxes.len(), 2);
    }
}

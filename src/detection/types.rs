// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测系统数据结构定义
/// Data structures of the detection worker
use std::path::PathBuf;

use crate::Bbox;

// ========== 公共常量 ==========

/// YOLOv8推理输入尺寸
pub const INF_SIZE: u32 = 640;

// ========== 数据结构 ==========

/// 单个检测结果 (推理引擎 → 检测线程)
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_id: usize,
    pub class_name: String,
    pub confidence: f32,
    pub bbox: Bbox,
}

impl Detection {
    pub fn new(bbox: Bbox, class_name: impl Into<String>) -> Self {
        Self {
            class_id: bbox.id(),
            class_name: class_name.into(),
            confidence: bbox.confidence(),
            bbox,
        }
    }

    /// 标签文本, 例如 "person: 0.90"
    pub fn label(&self) -> String {
        format!("{}: {:.2}", self.class_name, self.confidence)
    }
}

/// 入库记录 (检测线程 → 入库接口)
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRecord {
    pub source_id: String,
    pub class_id: usize,
    pub class_name: String,
    pub confidence: f32,
    pub bbox: Bbox,
    pub timestamp: String,   // YYYYmmdd_HHMMSS_mmm
    pub frame_path: PathBuf, // 已保存的标注帧
}

impl DetectionRecord {
    pub fn new(source_id: &str, detection: &Detection, timestamp: &str, frame_path: PathBuf) -> Self {
        Self {
            source_id: source_id.to_string(),
            class_id: detection.class_id,
            class_name: detection.class_name.clone(),
            confidence: detection.confidence,
            bbox: detection.bbox.clone(),
            timestamp: timestamp.to_string(),
            frame_path,
        }
    }
}

/// 模型统一接口与实现
///
/// # 架构说明
///
/// ## Detector Trait
/// 检测线程只依赖 `Detector`, 标准流程: preprocess → run → postprocess
///
/// ## YOLOv8
/// - 预处理 (letterbox) 与后处理 (置信度过滤 + NMS) 为纯 Rust 实现
/// - 推理 (`YoloV8`) 基于 ONNX Runtime, 需要 `onnx` feature
/// - 文件: `yolov8.rs`
///
/// ## 使用示例
/// ```ignore
/// use stream_sentinel::models::{Detector, YoloV8};
///
/// let mut model = YoloV8::load("yolov8n.onnx", 640)?;
/// let detections = model.detect(&image, 0.4, 0.4)?;
/// ```
use anyhow::Result;
use image::RgbImage;

use crate::detection::Detection;

pub mod yolov8;

#[cfg(feature = "onnx")]
pub use yolov8::YoloV8;
pub use yolov8::{YoloV8Postprocessor, COCO_NAMES};

/// 推理引擎接口
pub trait Detector: Send + 'static {
    /// 对一帧 RGB 图像做检测, 返回经过置信度过滤和 NMS 的结果
    fn detect(&mut self, image: &RgbImage, conf: f32, nms: f32) -> Result<Vec<Detection>>;
}

impl<T: Detector + ?Sized> Detector for Box<T> {
    fn detect(&mut self, image: &RgbImage, conf: f32, nms: f32) -> Result<Vec<Detection>> {
        (**self).detect(image, conf, nms)
    }
}

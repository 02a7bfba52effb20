// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8 模型实现
// 包含: 预处理、后处理、ONNX 推理 (onnx feature)

use anyhow::{bail, Result};
use image::RgbImage;
use ndarray::{s, Array, ArrayViewD, Axis, IxDyn};

use crate::detection::Detection;
use crate::{non_max_suppression, Bbox};

/// COCO 80 类
pub const COCO_NAMES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

const CXYWH_OFFSET: usize = 4;

fn scale_wh(w0: f32, h0: f32, w1: f32, h1: f32) -> (f32, f32, f32) {
    let r = (w1 / w0).min(h1 / h0);
    (r, (w0 * r).round(), (h0 * r).round())
}

/// letterbox 预处理 → NCHW, 其余区域填充 144/255
pub fn preprocess(image: &RgbImage, width: u32, height: u32) -> Array<f32, IxDyn> {
    let mut ys = Array::ones((1, 3, height as usize, width as usize)).into_dyn();
    ys.fill(144.0 / 255.0);

    let (w0, h0) = image.dimensions();
    if w0 == 0 || h0 == 0 {
        return ys;
    }
    let (_, w_new, h_new) = scale_wh(w0 as f32, h0 as f32, width as f32, height as f32);
    let img = image::imageops::resize(
        image,
        (w_new as u32).clamp(1, width),
        (h_new as u32).clamp(1, height),
        image::imageops::FilterType::Triangle,
    );

    for (x, y, rgb) in img.enumerate_pixels() {
        let x = x as usize;
        let y = y as usize;
        let [r, g, b] = rgb.0;
        ys[[0, 0, y, x]] = (r as f32) / 255.0;
        ys[[0, 1, y, x]] = (g as f32) / 255.0;
        ys[[0, 2, y, x]] = (b as f32) / 255.0;
    }
    ys
}

/// YOLOv8 后处理器
///
/// 输入 `[1, 4 + nc, anchors]`, 每个 anchor 为 (cx, cy, w, h, cls_0 .. cls_nc)
#[derive(Debug, Clone)]
pub struct YoloV8Postprocessor {
    pub width: u32,  // 模型输入宽
    pub height: u32, // 模型输入高
    pub names: Vec<String>,
}

impl YoloV8Postprocessor {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            names: COCO_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn class_name(&self, id: usize) -> String {
        self.names
            .get(id)
            .cloned()
            .unwrap_or_else(|| "Unknown".to_string())
    }

    pub fn postprocess(
        &self,
        preds: ArrayViewD<'_, f32>,
        width_original: u32,
        height_original: u32,
        conf: f32,
        iou: f32,
    ) -> Result<Vec<Detection>> {
        if preds.ndim() != 3 || preds.shape()[1] <= CXYWH_OFFSET {
            bail!("unexpected YOLOv8 output shape {:?}", preds.shape());
        }
        let width_original = width_original as f32;
        let height_original = height_original as f32;
        let ratio =
            (self.width as f32 / width_original).min(self.height as f32 / height_original);

        let anchor = preds.index_axis(Axis(0), 0);
        let mut data: Vec<Bbox> = Vec::new();
        for pred in anchor.axis_iter(Axis(1)) {
            let bbox = pred.slice(s![0..CXYWH_OFFSET]);
            let clss = pred.slice(s![CXYWH_OFFSET..]);

            let Some((id, &confidence)) = clss
                .into_iter()
                .enumerate()
                .reduce(|max, x| if x.1 > max.1 { x } else { max })
            else {
                continue;
            };

            if confidence < conf {
                continue;
            }

            let cx = bbox[0] / ratio;
            let cy = bbox[1] / ratio;
            let w = bbox[2] / ratio;
            let h = bbox[3] / ratio;
            let x = (cx - w / 2.).max(0.0f32).min(width_original);
            let y = (cy - h / 2.).max(0.0f32).min(height_original);
            data.push(Bbox::new(
                x,
                y,
                w.min(width_original - x),
                h.min(height_original - y),
                id,
                confidence,
            ));
        }

        non_max_suppression(&mut data, iou);

        Ok(data
            .into_iter()
            .map(|b| {
                let name = self.class_name(b.id());
                Detection::new(b, name)
            })
            .collect())
    }
}

#[cfg(feature = "onnx")]
mod engine {
    use std::path::Path;

    use anyhow::{Context, Result};
    use image::RgbImage;
    use ort::session::builder::GraphOptimizationLevel;
    use ort::session::Session;
    use ort::value::Tensor;
    use tracing::info;

    use super::{preprocess, YoloV8Postprocessor};
    use crate::detection::Detection;
    use crate::models::Detector;

    /// YOLOv8 ONNX 推理
    pub struct YoloV8 {
        session: Session,
        post: YoloV8Postprocessor,
    }

    impl YoloV8 {
        pub fn load(path: impl AsRef<Path>, inf_size: u32) -> Result<Self> {
            let path = path.as_ref();
            let session = Session::builder()?
                .with_optimization_level(GraphOptimizationLevel::Level3)?
                .commit_from_file(path)
                .with_context(|| format!("failed to load model {}", path.display()))?;
            info!("✅ 模型加载成功: {} ({inf_size}x{inf_size})", path.display());
            Ok(Self {
                session,
                post: YoloV8Postprocessor::new(inf_size, inf_size),
            })
        }
    }

    impl Detector for YoloV8 {
        fn detect(&mut self, image: &RgbImage, conf: f32, nms: f32) -> Result<Vec<Detection>> {
            let xs = preprocess(image, self.post.width, self.post.height);
            let input = Tensor::from_array(xs)?;
            let outputs = self.session.run(ort::inputs![input])?;
            let preds = outputs[0].try_extract_array::<f32>()?;
            self.post
                .postprocess(preds, image.width(), image.height(), conf, nms)
        }
    }
}

#[cfg(feature = "onnx")]
pub use engine::YoloV8;

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    /// 构造 [1, 4 + nc, anchors] 的输出
    fn output(nc: usize, anchors: &[([f32; 4], usize, f32)]) -> Array3<f32> {
        let mut out = Array3::<f32>::zeros((1, 4 + nc, anchors.len()));
        for (i, (b, cls, score)) in anchors.iter().enumerate() {
            for k in 0..4 {
                out[[0, k, i]] = b[k];
            }
            out[[0, 4 + cls, i]] = *score;
        }
        out
    }

    #[test]
    fn test_preprocess_letterbox() {
        let image = RgbImage::from_pixel(100, 50, image::Rgb([255, 0, 0]));
        let xs = preprocess(&image, 64, 64);
        assert_eq!(xs.shape(), &[1, 3, 64, 64]);
        assert!((xs[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        // 下半部分为填充色
        assert!((xs[[0, 1, 63, 0]] - 144.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_postprocess_filters_and_rescales() {
        let post = YoloV8Postprocessor::new(640, 640);
        let out = output(
            80,
            &[
                ([320., 320., 64., 64.], 0, 0.9),
                ([100., 100., 10., 10.], 2, 0.1),
            ],
        );
        // 原图 1280x1280 → ratio 0.5
        let dets = post.postprocess(out.view().into_dyn(), 1280, 1280, 0.4, 0.4).unwrap();
        assert_eq!(dets.len(), 1);
        let d = &dets[0];
        assert_eq!(d.class_name, "person");
        assert!((d.bbox.xmin() - 576.).abs() < 1e-3);
        assert!((d.bbox.width() - 128.).abs() < 1e-3);
    }

    #[test]
    fn test_postprocess_applies_nms_and_clamps() {
        let post = YoloV8Postprocessor::new(640, 640);
        let out = output(
            3,
            &[
                ([10., 10., 40., 40.], 1, 0.8),
                ([12., 12., 40., 40.], 1, 0.7),
                ([630., 630., 40., 40.], 2, 0.6),
            ],
        );
        let dets = post.postprocess(out.view().into_dyn(), 640, 640, 0.5, 0.45).unwrap();
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].class_name, "bicycle");
        assert_eq!(dets[0].bbox.xmin(), 0.0);
        assert!(dets[1].bbox.xmax() <= 640.0);
    }

    #[test]
    fn test_postprocess_rejects_bad_shape() {
        let post = YoloV8Postprocessor::new(640, 640);
        let bad = Array::<f32, _>::zeros((2, 3)).into_dyn();
        assert!(post.postprocess(bad.view(), 640, 640, 0.4, 0.4).is_err());
    }
}

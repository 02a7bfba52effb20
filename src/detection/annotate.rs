// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测框绘制 (Overlay drawing)
///
/// 绿色边框 + "name: 0.90" 标签; 字体必须能加载, 否则启动失败
use std::path::Path;

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use super::Detection;

const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const THICKNESS: i32 = 2;
const LABEL_SCALE: f32 = 16.0;

/// 默认标签字体 (随仓库分发)
pub const DEFAULT_FONT: &str = "assets/font/DejaVuSansMono.ttf";

#[derive(Clone)]
pub struct Annotator {
    font: FontArc,
}

impl Annotator {
    /// 加载 TTF/OTF 字体
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read font {}", path.display()))?;
        let font = FontArc::try_from_vec(bytes)
            .with_context(|| format!("invalid font file {}", path.display()))?;
        Ok(Self { font })
    }

    pub fn draw(&self, image: &mut RgbImage, detections: &[Detection]) {
        for det in detections {
            let x = det.bbox.xmin().round() as i32;
            let y = det.bbox.ymin().round() as i32;
            let w = det.bbox.width().round().max(1.0) as u32;
            let h = det.bbox.height().round().max(1.0) as u32;

            // 边框 (逐像素内缩模拟线宽)
            for t in 0..THICKNESS {
                let (tw, th) = (w.saturating_sub(2 * t as u32).max(1), h.saturating_sub(2 * t as u32).max(1));
                draw_hollow_rect_mut(image, Rect::at(x + t, y + t).of_size(tw, th), GREEN);
            }

            // 标签 (框上方, 顶部越界时下移)
            let label = det.label();
            let scale = PxScale::from(LABEL_SCALE);
            let (tw, _) = text_size(scale, &self.font, &label);
            let scaled = self.font.as_scaled(scale);
            let th = (scaled.ascent() - scaled.descent()).ceil() as i32;
            let top = y.max(th) - th;
            draw_filled_rect_mut(image, Rect::at(x, top).of_size(tw.max(1), th.max(1) as u32), GREEN);
            draw_text_mut(image, BLACK, x, top, scale, &self.font, &label);
        }
    }
}

impl std::fmt::Debug for Annotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Annotator").finish_non_exhaustive()
    }
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 标注帧保存
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::RgbImage;

/// 可排序的捕获时间戳: `YYYYmmdd_HHMMSS_mmm` (本地时间)
pub fn capture_timestamp() -> String {
    format_timestamp(chrono::Local::now())
}

pub fn format_timestamp<Tz: chrono::TimeZone>(t: chrono::DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    t.format("%Y%m%d_%H%M%S_%3f").to_string()
}

#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    dir: PathBuf,
}

impl SnapshotWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `frame_<ts>.jpg`, 同一毫秒内的后续帧为 `frame_<ts>_<n>.jpg`
    pub fn path_for(&self, timestamp: &str, n: u32) -> PathBuf {
        match n {
            0 => self.dir.join(format!("frame_{timestamp}.jpg")),
            n => self.dir.join(format!("frame_{timestamp}_{n}.jpg")),
        }
    }

    /// 保存为 JPEG, 返回文件路径; 不覆盖已有文件
    pub fn save(&self, image: &RgbImage, timestamp: &str) -> Result<PathBuf> {
        let mut n = 0;
        let mut path = self.path_for(timestamp, n);
        while path.exists() {
            n += 1;
            path = self.path_for(timestamp, n);
        }
        image
            .save_with_format(&path, image::ImageFormat::Jpeg)
            .with_context(|| format!("failed to save frame {}", path.display()))?;
        Ok(path)
    }
}

//! 检测框叠加: 计数类别粗蓝框, 其它类别细白框

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::detection::Detection;
use crate::sink::{CycleReport, EngineStatus, ResultSink};

const COUNTED_COLOR: Rgb<u8> = Rgb([30, 144, 255]);
const OTHER_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const COUNTED_THICKNESS: i32 = 3;

/// 在帧上绘制全部检测
pub fn draw_detections(image: &DynamicImage, detections: &[Detection], count_class: &str) -> RgbImage {
    let mut canvas = image.to_rgb8();
    for det in detections {
        let (color, thickness) = if det.class == count_class {
            (COUNTED_COLOR, COUNTED_THICKNESS)
        } else {
            (OTHER_COLOR, 1)
        };
        for t in 0..thickness {
            let w = det.bbox.width.round() as i32 - 2 * t;
            let h = det.bbox.height.round() as i32 - 2 * t;
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(det.bbox.x.round() as i32 + t, det.bbox.y.round() as i32 + t)
                .of_size(w as u32, h as u32);
            draw_hollow_rect_mut(&mut canvas, rect, color);
        }
    }
    canvas
}

/// 每个周期把叠加后的画面写成 JPEG
pub struct OverlaySink {
    path: PathBuf,
    count_class: String,
    quality: u8,
}

impl OverlaySink {
    pub fn new(path: &Path, count_class: &str, quality: u8) -> Self {
        Self {
            path: path.to_path_buf(),
            count_class: count_class.to_string(),
            quality,
        }
    }
}

impl ResultSink for OverlaySink {
    fn on_cycle(&mut self, report: &CycleReport) -> Result<()> {
        let Some(frame) = &report.frame else {
            return Ok(());
        };
        let canvas = draw_detections(frame, &report.detections, &self.count_class);

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.quality)
            .encode_image(&canvas)
            .context("叠加画面编码失败")?;
        let tmp = self.path.with_extension("jpg.tmp");
        fs::write(&tmp, jpeg).with_context(|| format!("写入 {} 失败", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("替换 {} 失败", self.path.display()))?;
        Ok(())
    }

    fn on_status(&mut self, _status: &EngineStatus, _at_ms: u64) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::BBox;

    #[test]
    fn test_counted_class_drawn_thick_blue() {
        let image = DynamicImage::new_rgb8(100, 100);
        let dets = vec![
            Detection::new("car", Some(0.9), BBox::new(10.0, 10.0, 30.0, 30.0)),
            Detection::new("person", Some(0.9), BBox::new(60.0, 60.0, 20.0, 20.0)),
        ];
        let canvas = draw_detections(&image, &dets, "car");

        assert_eq!(*canvas.get_pixel(10, 20), COUNTED_COLOR);
        assert_eq!(*canvas.get_pixel(12, 20), COUNTED_COLOR);
        assert_eq!(*canvas.get_pixel(13, 20), Rgb([0, 0, 0]));

        assert_eq!(*canvas.get_pixel(60, 70), OTHER_COLOR);
        assert_eq!(*canvas.get_pixel(61, 70), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_degenerate_boxes_are_skipped() {
        let image = DynamicImage::new_rgb8(20, 20);
        let dets = vec![Detection::new("car", Some(0.9), BBox::new(5.0, 5.0, 0.0, 4.0))];
        let canvas = draw_detections(&image, &dets, "car");
        assert!(canvas.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }
}

/// 检测数据结构定义
/// Data structures exchanged with detection sources
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::tracking::BBox;

// ========== 公共常量 ==========

/// 计数目标类别
pub const CAR_CLASS: &str = "car";

// ========== 数据结构 ==========

/// 帧尺寸 (像素)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> f64 {
        f64::from(self.width) * f64::from(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// 原始检测 (检测源 → 引擎, 未校验)
///
/// JSON格式: `{"class": "car", "score": 0.91, "bbox": [x, y, w, h]}`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    #[serde(default)]
    pub class: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_score"
    )]
    pub score: Option<f32>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_bbox"
    )]
    pub bbox: Option<Vec<f32>>,
}

/// 非数字的置信度视为缺失
fn lenient_score<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f32>, D::Error> {
    Ok(Value::deserialize(d)?.as_f64().map(|v| v as f32))
}

/// bbox 不是数字数组时保留为空数组, 由 `normalize` 丢弃该条检测
fn lenient_bbox<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<f32>>, D::Error> {
    let value = Value::deserialize(d)?;
    let Some(items) = value.as_array() else {
        return Ok(if value.is_null() { None } else { Some(Vec::new()) });
    };
    let numbers: Option<Vec<f32>> = items.iter().map(|v| v.as_f64().map(|n| n as f32)).collect();
    Ok(Some(numbers.unwrap_or_default()))
}

impl RawDetection {
    pub fn new(class: &str, score: Option<f32>, bbox: BBox) -> Self {
        Self {
            class: class.to_string(),
            score,
            bbox: Some(vec![bbox.x, bbox.y, bbox.width, bbox.height]),
        }
    }
}

/// 校验后的检测 (一个周期内有效, 不跨周期保留)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class: String,
    pub score: Option<f32>,
    pub bbox: BBox,
}

impl Detection {
    pub fn new(class: &str, score: Option<f32>, bbox: BBox) -> Self {
        Self {
            class: class.to_string(),
            score,
            bbox,
        }
    }

    /// 缺失的置信度按 0 处理
    pub fn score_or_zero(&self) -> f32 {
        self.score.unwrap_or(0.0)
    }
}

/// 一帧的检测结果 + 坐标所在图像尺寸
///
/// 与远程检测服务的响应格式一致: `{"predictions": [...], "width": W, "height": H}`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionBatch {
    #[serde(default)]
    pub predictions: Vec<RawDetection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl DetectionBatch {
    pub fn new(predictions: Vec<RawDetection>, size: Option<FrameSize>) -> Self {
        Self {
            predictions,
            width: size.map(|s| s.width),
            height: size.map(|s| s.height),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// 检测框所在的图像尺寸 (宽高缺失或为 0 时返回 None)
    pub fn source_size(&self) -> Option<FrameSize> {
        match (self.width, self.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some(FrameSize::new(w, h)),
            _ => None,
        }
    }

    /// 校验并缩放到标准帧坐标
    ///
    /// 缺失或格式错误的bbox只丢弃该条检测, 返回 (有效检测, 丢弃数)
    pub fn normalize(&self, canonical: FrameSize) -> (Vec<Detection>, usize) {
        let (scale_x, scale_y) = match self.source_size() {
            Some(src) if src != canonical && !canonical.is_empty() => (
                canonical.width as f32 / src.width as f32,
                canonical.height as f32 / src.height as f32,
            ),
            _ => (1.0, 1.0),
        };

        let mut dropped = 0;
        let detections = self
            .predictions
            .iter()
            .filter_map(|raw| {
                let bbox = raw.bbox.as_deref().and_then(BBox::from_xywh);
                match bbox {
                    Some(bbox) => Some(Detection {
                        class: raw.class.clone(),
                        score: raw.score.filter(|s| s.is_finite()),
                        bbox: bbox.scaled(scale_x, scale_y),
                    }),
                    None => {
                        dropped += 1;
                        None
                    }
                }
            })
            .collect();

        (detections, dropped)
    }
}

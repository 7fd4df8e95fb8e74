//! 贪心 IOU 匹配 (Associator)
//!
//! 按检测顺序逐个匹配: 每个检测选取尚未匹配、IOU 严格大于阈值且最大的轨迹.
//! IOU 相同时取先遍历到的轨迹. 不做全局最优分配 (无匈牙利算法).

use super::geometry::{iou, BBox};
use super::track::Track;

/// 默认匹配阈值
pub const IOU_MATCH_THRESHOLD: f32 = 0.3;

/// 单个检测的匹配结果
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Assignment {
    /// 检测 → 已有轨迹 (存储下标)
    Update {
        detection: usize,
        track: usize,
        iou: f32,
    },
    /// 检测未匹配 → 新建轨迹
    Create { detection: usize },
}

/// 贪心匹配器
#[derive(Clone, Copy, Debug)]
pub struct Associator {
    iou_threshold: f32,
}

impl Associator {
    pub fn new(iou_threshold: f32) -> Self {
        Self { iou_threshold }
    }

    pub fn iou_threshold(&self) -> f32 {
        self.iou_threshold
    }

    /// 将本周期检测与周期开始时的轨迹列表匹配
    ///
    /// 返回值与 `detections` 一一对应, 保持检测顺序
    pub fn associate(&self, detections: &[BBox], tracks: &[Track]) -> Vec<Assignment> {
        let mut matched_track = vec![false; tracks.len()];

        detections
            .iter()
            .enumerate()
            .map(|(det_idx, det)| {
                let mut best: Option<(usize, f32)> = None;
                for (track_idx, track) in tracks.iter().enumerate() {
                    if matched_track[track_idx] {
                        continue;
                    }
                    let score = iou(&track.bbox, det);
                    let best_score = best.map_or(0.0, |(_, s)| s);
                    if score > self.iou_threshold && score > best_score {
                        best = Some((track_idx, score));
                    }
                }

                match best {
                    Some((track_idx, score)) => {
                        matched_track[track_idx] = true;
                        Assignment::Update {
                            detection: det_idx,
                            track: track_idx,
                            iou: score,
                        }
                    }
                    None => Assignment::Create { detection: det_idx },
                }
            })
            .collect()
    }
}

impl Default for Associator {
    fn default() -> Self {
        Self::new(IOU_MATCH_THRESHOLD)
    }
}

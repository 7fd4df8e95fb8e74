//! 跟踪计数引擎 (Tracking Engine)
//!
//! 显式的引擎状态对象, 由调度器独占持有. 单个周期:
//! 校验缩放 → 入口过滤 → 清理过期 → 贪心匹配 → 更新/新建 → 运动判定与计数 → 清理

use serde::Serialize;
use tracing::debug;

use super::associator::{Assignment, Associator};
use super::counter::{Counter, CycleCount, EligibilityFilter};
use super::motion::MotionClassifier;
use super::track::{Track, TrackStore};
use crate::config::EngineConfig;
use crate::detection::{Detection, DetectionBatch, FrameSize};

/// 单周期引擎输出
#[derive(Clone, Debug, Default, Serialize)]
pub struct CycleOutput {
    pub count: CycleCount,
    /// 累加后的总数
    pub total: u64,
    /// 本帧全部有效检测 (含非计数类别, 仅供显示)
    pub detections: Vec<Detection>,
    /// 进入跟踪的检测数
    pub eligible: usize,
    /// 格式错误被丢弃的检测数
    pub dropped: usize,
    /// 本周期新建的轨迹ID
    pub created: Vec<u64>,
    /// 本周期清理掉的轨迹ID
    pub pruned: Vec<u64>,
    /// 清理后的活跃轨迹数
    pub active_tracks: usize,
}

/// 跟踪计数引擎
#[derive(Debug)]
pub struct TrackingEngine {
    store: TrackStore,
    associator: Associator,
    motion: MotionClassifier,
    filter: EligibilityFilter,
    counter: Counter,
}

impl TrackingEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            store: TrackStore::new(config.prune_timeout_ms),
            associator: Associator::new(config.iou_match_threshold),
            motion: MotionClassifier::new(config.motion_threshold_px),
            filter: EligibilityFilter {
                class: config.count_class.clone(),
                min_score: config.count_min_score,
                min_area_ratio: config.count_min_area_ratio,
            },
            counter: Counter::default(),
        }
    }

    /// 运行一个周期
    ///
    /// 检测失败的周期传入空批次: 不产生计数, 但照常清理
    pub fn run_cycle(&mut self, batch: &DetectionBatch, frame: FrameSize, now_ms: u64) -> CycleOutput {
        let (detections, dropped) = batch.normalize(frame);
        if dropped > 0 {
            debug!("⚠️ 丢弃 {} 个格式错误的检测", dropped);
        }

        let eligible: Vec<_> = detections
            .iter()
            .filter(|d| self.filter.accepts(d, frame))
            .map(|d| d.bbox)
            .collect();

        // 先清理超时轨迹, 过期轨迹不参与匹配
        let mut pruned = self.store.prune(now_ms);

        // 只与周期开始时的轨迹匹配, 本周期新建的轨迹下个周期才可见
        let assignments = self.associator.associate(&eligible, self.store.tracks());

        let mut count = CycleCount::default();
        let mut created = Vec::new();
        for assignment in assignments {
            match assignment {
                Assignment::Update {
                    detection, track, ..
                } => {
                    self.store
                        .update(track, eligible[detection], now_ms, &self.motion);
                    if let Some(t) = self.store.get_mut(track) {
                        if t.is_moving() {
                            count.live_count += 1;
                            if t.mark_counted() {
                                count.total_delta += 1;
                                debug!("🚗 轨迹 #{} 计入总数", t.id);
                            }
                        }
                    }
                }
                Assignment::Create { detection } => {
                    let idx = self.store.create(eligible[detection], now_ms);
                    if let Some(t) = self.store.get(idx) {
                        created.push(t.id);
                    }
                }
            }
        }

        pruned.extend(self.store.prune(now_ms));
        let total = self.counter.accumulate(count);

        CycleOutput {
            count,
            total,
            eligible: eligible.len(),
            detections,
            dropped,
            created,
            pruned,
            active_tracks: self.store.len(),
        }
    }

    pub fn tracks(&self) -> &[Track] {
        self.store.tracks()
    }

    pub fn store(&self) -> &TrackStore {
        &self.store
    }

    pub fn total(&self) -> u64 {
        self.counter.total()
    }

    pub fn started_at_ms(&self) -> u64 {
        self.counter.started_at_ms()
    }

    /// 从持久化恢复累计总数
    pub fn restore_total(&mut self, total: u64, started_at_ms: u64) {
        self.counter = Counter::restore(total, started_at_ms);
    }

    /// 每日重置: 清零累计总数, 轨迹保留
    pub fn reset_total(&mut self, now_ms: u64) {
        self.counter.reset_total(now_ms);
    }
}

impl Default for TrackingEngine {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

//! 计数器 (Counter)
//!
//! - 入口过滤: 只有满足类别/置信度/面积条件的检测才参与跟踪
//! - 每周期统计: 运动中的目标数 (live) 与新增计数 (delta)
//! - 累计总数: 只增不减, 仅 `reset_total` 可以清零

use serde::{Deserialize, Serialize};

use crate::detection::{Detection, FrameSize, CAR_CLASS};

/// 默认最小置信度
pub const CAR_MIN_SCORE: f32 = 0.45;

/// 默认最小面积比例 (相对整帧)
pub const CAR_MIN_AREA_RATIO: f64 = 0.002;

/// 计数入口过滤条件
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EligibilityFilter {
    pub class: String,
    pub min_score: f32,
    pub min_area_ratio: f64,
}

impl EligibilityFilter {
    /// 检测能否进入跟踪 (缺失置信度按 0 处理)
    pub fn accepts(&self, detection: &Detection, frame: FrameSize) -> bool {
        if detection.class != self.class {
            return false;
        }
        if detection.score_or_zero() < self.min_score {
            return false;
        }
        // 双精度比较, 阈值边界上的框保留
        let area = f64::from(detection.bbox.width) * f64::from(detection.bbox.height);
        area >= frame.area() * self.min_area_ratio
    }
}

impl Default for EligibilityFilter {
    fn default() -> Self {
        Self {
            class: CAR_CLASS.to_string(),
            min_score: CAR_MIN_SCORE,
            min_area_ratio: CAR_MIN_AREA_RATIO,
        }
    }
}

/// 单周期计数结果
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleCount {
    /// 当前运动中的目标数
    pub live_count: u32,
    /// 本周期首次计入总数的目标数
    pub total_delta: u32,
}

/// 累计计数器
#[derive(Clone, Debug, Default)]
pub struct Counter {
    total: u64,
    started_at_ms: u64,
}

impl Counter {
    /// 从持久化恢复
    pub fn restore(total: u64, started_at_ms: u64) -> Self {
        Self {
            total,
            started_at_ms,
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// 当前统计周期的起始时间 (毫秒)
    pub fn started_at_ms(&self) -> u64 {
        self.started_at_ms
    }

    /// 累加本周期新增
    pub fn accumulate(&mut self, count: CycleCount) -> u64 {
        self.total += u64::from(count.total_delta);
        self.total
    }

    /// 清零 (每日重置)
    pub fn reset_total(&mut self, now_ms: u64) {
        self.total = 0;
        self.started_at_ms = now_ms;
    }
}

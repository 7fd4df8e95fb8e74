//! 运动判定 (Motion Classifier)

/// 默认运动阈值 (像素, 标准帧坐标)
pub const MOTION_THRESHOLD_PX: f32 = 4.0;

/// 按中心点位移判定目标是否在运动
#[derive(Clone, Copy, Debug)]
pub struct MotionClassifier {
    /// 位移严格大于该值视为运动
    threshold_px: f32,
}

impl MotionClassifier {
    pub fn new(threshold_px: f32) -> Self {
        Self { threshold_px }
    }

    pub fn threshold_px(&self) -> f32 {
        self.threshold_px
    }

    pub fn is_moving(&self, displacement: f32) -> bool {
        displacement > self.threshold_px
    }

    /// 运动则连续计数 +1, 否则归零
    pub fn next_streak(&self, streak: u32, displacement: f32) -> u32 {
        if self.is_moving(displacement) {
            streak.saturating_add(1)
        } else {
            0
        }
    }
}

impl Default for MotionClassifier {
    fn default() -> Self {
        Self::new(MOTION_THRESHOLD_PX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_strict() {
        let motion = MotionClassifier::default();
        assert!(!motion.is_moving(4.0));
        assert!(motion.is_moving(4.01));
    }

    #[test]
    fn test_streak_increments_and_resets() {
        let motion = MotionClassifier::default();
        let s = motion.next_streak(0, 6.0);
        assert_eq!(s, 1);
        let s = motion.next_streak(s, 6.0);
        assert_eq!(s, 2);
        assert_eq!(motion.next_streak(s, 1.0), 0);
    }
}

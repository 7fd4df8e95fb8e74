//! 轨迹存储 (Track Store)
//!
//! 持有当前所有活跃轨迹, 提供 创建 / 更新 / 清理 操作.
//! ID 单调递增, 清理后也不会复用.

use serde::Serialize;

use super::geometry::{center_displacement, BBox};
use super::motion::MotionClassifier;

/// 默认清理超时 (毫秒)
pub const PRUNE_TIMEOUT_MS: u64 = 5000;

/// 跟踪对象
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Track {
    /// 唯一跟踪ID
    pub id: u64,

    /// 最近一次匹配的位置
    pub bbox: BBox,

    /// 最近一次匹配的时间戳 (毫秒)
    pub last_seen_ms: u64,

    /// 是否已计入累计总数 (只会 false → true)
    counted: bool,

    /// 连续运动周期数
    moving_streak: u32,
}

impl Track {
    fn new(id: u64, bbox: BBox, now_ms: u64) -> Self {
        Self {
            id,
            bbox,
            last_seen_ms: now_ms,
            counted: false,
            moving_streak: 0,
        }
    }

    pub fn counted(&self) -> bool {
        self.counted
    }

    pub fn moving_streak(&self) -> u32 {
        self.moving_streak
    }

    pub fn is_moving(&self) -> bool {
        self.moving_streak >= 1
    }

    /// 标记为已计数, 首次标记返回 true
    pub(crate) fn mark_counted(&mut self) -> bool {
        if self.counted {
            return false;
        }
        self.counted = true;
        true
    }

    /// 距上次匹配的时长
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_seen_ms)
    }
}

/// 轨迹存储
#[derive(Debug)]
pub struct TrackStore {
    tracks: Vec<Track>,

    /// 下一个分配的ID
    next_id: u64,

    /// 清理超时 (毫秒)
    prune_timeout_ms: u64,
}

impl TrackStore {
    pub fn new(prune_timeout_ms: u64) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            prune_timeout_ms,
        }
    }

    /// 新建轨迹, 返回其在存储中的下标
    pub fn create(&mut self, bbox: BBox, now_ms: u64) -> usize {
        let track = Track::new(self.next_id, bbox, now_ms);
        self.next_id += 1;
        self.tracks.push(track);
        self.tracks.len() - 1
    }

    /// 用新检测更新轨迹: 运动判定 → 替换位置 → 刷新时间戳
    ///
    /// 返回位移 (像素)
    pub fn update(
        &mut self,
        index: usize,
        bbox: BBox,
        now_ms: u64,
        motion: &MotionClassifier,
    ) -> Option<f32> {
        let track = self.tracks.get_mut(index)?;
        let displacement = center_displacement(&track.bbox, &bbox);
        track.moving_streak = motion.next_streak(track.moving_streak, displacement);
        track.bbox = bbox;
        track.last_seen_ms = now_ms;
        Some(displacement)
    }

    /// 删除超时未匹配的轨迹, 返回被删除的ID
    pub fn prune(&mut self, now_ms: u64) -> Vec<u64> {
        let timeout = self.prune_timeout_ms;
        let mut removed = Vec::new();
        self.tracks.retain(|t| {
            let keep = t.age_ms(now_ms) < timeout;
            if !keep {
                removed.push(t.id);
            }
            keep
        });
        removed
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Track> {
        self.tracks.get_mut(index)
    }

    pub fn find(&self, id: u64) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// 下一个将分配的ID
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn prune_timeout_ms(&self) -> u64 {
        self.prune_timeout_ms
    }

    /// 清空所有轨迹 (ID计数器保持不变)
    pub fn clear(&mut self) {
        self.tracks.clear();
    }
}

impl Default for TrackStore {
    fn default() -> Self {
        Self::new(PRUNE_TIMEOUT_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn car() -> BBox {
        BBox::new(10.0, 10.0, 50.0, 30.0)
    }

    #[test]
    fn test_create_assigns_monotonic_ids() {
        let mut store = TrackStore::default();
        store.create(car(), 0);
        store.create(car().shifted(100.0, 0.0), 0);
        let ids: Vec<u64> = store.tracks().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(store.tracks().iter().all(|t| !t.counted() && t.moving_streak() == 0));
    }

    #[test]
    fn test_update_refreshes_position_and_timestamp() {
        let motion = MotionClassifier::default();
        let mut store = TrackStore::default();
        let idx = store.create(car(), 0);

        let displacement = store.update(idx, car().shifted(6.0, 0.0), 200, &motion);
        assert_eq!(displacement, Some(6.0));

        let track = store.get(idx).unwrap();
        assert_eq!(track.bbox, car().shifted(6.0, 0.0));
        assert_eq!(track.last_seen_ms, 200);
        assert_eq!(track.moving_streak(), 1);
    }

    #[test]
    fn test_update_unknown_index_is_noop() {
        let motion = MotionClassifier::default();
        let mut store = TrackStore::default();
        assert_eq!(store.update(3, car(), 0, &motion), None);
    }

    #[test]
    fn test_prune_boundary_is_inclusive() {
        let mut store = TrackStore::default();
        store.create(car(), 1000);

        assert!(store.prune(1000 + PRUNE_TIMEOUT_MS - 1).is_empty());
        assert_eq!(store.len(), 1);

        assert_eq!(store.prune(1000 + PRUNE_TIMEOUT_MS), vec![1]);
        assert!(store.is_empty());
    }

    #[test]
    fn test_ids_not_reused_after_prune() {
        let mut store = TrackStore::default();
        store.create(car(), 0);
        store.prune(PRUNE_TIMEOUT_MS);
        store.create(car(), PRUNE_TIMEOUT_MS);
        assert_eq!(store.tracks()[0].id, 2);

        store.clear();
        store.create(car(), PRUNE_TIMEOUT_MS);
        assert_eq!(store.tracks()[0].id, 3);
    }

    #[test]
    fn test_mark_counted_only_once() {
        let mut store = TrackStore::default();
        let idx = store.create(car(), 0);
        let track = store.get_mut(idx).unwrap();
        assert!(track.mark_counted());
        assert!(!track.mark_counted());
        assert!(track.counted());
    }
}

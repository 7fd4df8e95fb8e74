//! 跟踪与计数核心
//!
//! 几何 → 匹配 → 轨迹存储 → 运动判定 → 计数, 由 [`TrackingEngine`] 串联

pub mod associator;
pub mod counter;
pub mod engine;
pub mod geometry;
pub mod motion;
pub mod track;

pub use associator::{Assignment, Associator, IOU_MATCH_THRESHOLD};
pub use counter::{Counter, CycleCount, EligibilityFilter, CAR_MIN_AREA_RATIO, CAR_MIN_SCORE};
pub use engine::{CycleOutput, TrackingEngine};
pub use geometry::{center_displacement, distance, iou, BBox};
pub use motion::{MotionClassifier, MOTION_THRESHOLD_PX};
pub use track::{Track, TrackStore, PRUNE_TIMEOUT_MS};

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 引擎配置与命令行参数
pub mod detection; // 检测数据结构
pub mod input; // 帧输入系统
pub mod overlay; // 检测框叠加
pub mod persistence; // 累计总数持久化
pub mod scheduler; // 周期调度
pub mod sink; // 结果输出
pub mod source; // 检测来源
pub mod tracking; // 跟踪与计数

pub use crate::config::{Args, DetectionMode, EngineConfig};
pub use crate::detection::{Detection, DetectionBatch, FrameSize, RawDetection};
pub use crate::scheduler::{Scheduler, SchedulerStats};
pub use crate::sink::{CycleReport, EngineStatus, ResultSink};
pub use crate::source::{DetectError, DetectionSource};
pub use crate::tracking::{BBox, CycleCount, TrackingEngine};

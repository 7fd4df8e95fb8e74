/// 检测数据 (Detection Data)
///
/// 外部检测源产出的原始检测框, 以及引擎入口处的校验与坐标缩放
pub mod types;

pub use types::{Detection, DetectionBatch, FrameSize, RawDetection, CAR_CLASS};

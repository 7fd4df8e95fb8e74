/// 检测来源 (Detection Sources)
///
/// 给定一帧, 返回检测结果与其坐标所在的图像尺寸
/// - RemoteDetector: 远程检测服务 (HTTP POST JPEG)
/// - LocalDetector:  本地 YOLOv8 ONNX 推理
/// - ReplaySource:   JSONL 回放 (离线运行与测试)
pub mod local;
pub mod remote;
pub mod replay;

use anyhow::{Context, Result};
use thiserror::Error;

use crate::config::{Args, DetectionMode, EngineConfig};
use crate::detection::DetectionBatch;
use crate::input::Frame;

pub use local::LocalDetector;
pub use remote::RemoteDetector;
pub use replay::ReplaySource;

/// 检测失败 (周期以零检测继续运行, 状态置为 Error)
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DetectError {
    #[error("网络错误: {0}")]
    Network(String),

    #[error("检测请求超时")]
    Timeout,

    #[error("检测服务返回 HTTP {0}")]
    Status(u16),

    #[error("检测结果格式错误: {0}")]
    Malformed(String),

    #[error("模型推理失败: {0}")]
    Model(String),

    #[error("取帧失败: {0}")]
    Frame(String),
}

/// 检测来源
pub trait DetectionSource {
    fn detect(&mut self, frame: &Frame) -> Result<DetectionBatch, DetectError>;

    fn name(&self) -> &str;
}

/// 按命令行参数创建检测来源
pub fn open_detection_source(
    args: &Args,
    config: &EngineConfig,
) -> Result<Box<dyn DetectionSource + Send>> {
    match args.mode {
        DetectionMode::Remote => {
            let url = args
                .detect_url
                .as_deref()
                .context("远程模式需要 --detect-url 或 DETECT_URL")?;
            Ok(Box::new(RemoteDetector::new(
                url,
                args.detect_token.clone(),
                config,
            )))
        }
        DetectionMode::Local => Ok(Box::new(LocalDetector::new(&args.model, config)?)),
        DetectionMode::Replay => {
            let path = args.replay.as_deref().context("回放模式需要 --replay")?;
            Ok(Box::new(ReplaySource::open(path, true)?))
        }
    }
}

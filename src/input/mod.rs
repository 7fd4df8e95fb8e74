/// 帧输入系统 (Frame Input System)
///
/// 每个检测周期从帧来源取一帧
/// - SnapshotSource: HTTP 快照地址拉取
/// - FileSource: 单张图片或图片目录 (循环)
/// - BlankSource: 固定尺寸空白画布 (回放模式)
/// - capture: 上传前缩放与 JPEG 编码
pub mod blank;
pub mod capture;
pub mod files;
pub mod snapshot;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use image::DynamicImage;
use thiserror::Error;

use crate::config::EngineConfig;
use crate::detection::FrameSize;

pub use blank::BlankSource;
pub use capture::{encode_for_upload, EncodedFrame};
pub use files::FileSource;
pub use snapshot::SnapshotSource;

/// 一帧画面
#[derive(Clone, Debug)]
pub struct Frame {
    /// 帧序号
    pub id: u64,
    pub image: Arc<DynamicImage>,
}

impl Frame {
    pub fn new(id: u64, image: DynamicImage) -> Self {
        Self {
            id,
            image: Arc::new(image),
        }
    }

    /// 标准帧尺寸 (跟踪坐标系)
    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.image.width(), self.image.height())
    }
}

/// 取帧失败
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("读取图片失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("图片解码失败: {0}")]
    Decode(#[from] image::ImageError),

    #[error("快照请求失败: {0}")]
    Fetch(String),
}

/// 帧来源
pub trait FrameSource {
    /// 取下一帧, 来源尚未就绪时返回 `Ok(None)`
    fn next_frame(&mut self) -> Result<Option<Frame>, FrameError>;

    fn name(&self) -> &str;
}

/// 按参数打开帧来源
///
/// `http(s)://` → 快照, 其它视为本地路径, 缺省为空白画布
pub fn open_frame_source(
    source: Option<&str>,
    config: &EngineConfig,
) -> Result<Box<dyn FrameSource + Send>> {
    match source {
        Some(url) if url.starts_with("http://") || url.starts_with("https://") => Ok(Box::new(
            SnapshotSource::new(url, config.remote_timeout()),
        )),
        Some(path) => Ok(Box::new(FileSource::open(Path::new(path))?)),
        None => Ok(Box::new(BlankSource::new(config.canvas_size()))),
    }
}

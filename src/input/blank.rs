//! 空白画布 - 回放模式下提供固定尺寸的帧

use std::sync::Arc;

use image::DynamicImage;

use super::{Frame, FrameError, FrameSource};
use crate::detection::FrameSize;

pub struct BlankSource {
    image: Arc<DynamicImage>,
    next_id: u64,
}

impl BlankSource {
    pub fn new(size: FrameSize) -> Self {
        Self {
            image: Arc::new(DynamicImage::new_rgb8(size.width, size.height)),
            next_id: 0,
        }
    }
}

impl FrameSource for BlankSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        let frame = Frame {
            id: self.next_id,
            image: Arc::clone(&self.image),
        };
        self.next_id += 1;
        Ok(Some(frame))
    }

    fn name(&self) -> &str {
        "blank"
    }
}

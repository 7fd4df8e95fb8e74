//! HTTP 快照来源: 每个周期 GET 一张 JPEG/PNG

use std::io::Read;
use std::time::Duration;

use tracing::debug;

use super::{Frame, FrameError, FrameSource};

/// 快照最大字节数
const MAX_SNAPSHOT_BYTES: u64 = 16 * 1024 * 1024;

pub struct SnapshotSource {
    url: String,
    agent: ureq::Agent,
    next_id: u64,
}

impl SnapshotSource {
    pub fn new(url: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            url: url.to_string(),
            agent,
            next_id: 0,
        }
    }

    fn fetch(&self) -> Result<Option<Vec<u8>>, FrameError> {
        let response = match self.agent.get(&self.url).call() {
            Ok(response) => response,
            // 摄像头还没有产出画面
            Err(ureq::Error::Status(404 | 503, _)) => return Ok(None),
            Err(ureq::Error::Status(code, _)) => {
                return Err(FrameError::Fetch(format!("HTTP {}", code)))
            }
            Err(e) => return Err(FrameError::Fetch(e.to_string())),
        };

        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_SNAPSHOT_BYTES)
            .read_to_end(&mut bytes)?;
        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(bytes))
    }
}

impl FrameSource for SnapshotSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        let Some(bytes) = self.fetch()? else {
            debug!("⏳ 快照尚未就绪: {}", self.url);
            return Ok(None);
        };
        let image = image::load_from_memory(&bytes)?;
        let frame = Frame::new(self.next_id, image);
        self.next_id += 1;
        Ok(Some(frame))
    }

    fn name(&self) -> &str {
        &self.url
    }
}

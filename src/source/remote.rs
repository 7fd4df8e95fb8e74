//! 远程检测客户端
//!
//! 帧 → 限宽缩放 → JPEG → POST (content-type: image/jpeg, 可选 x-api-key)
//! → `{"predictions": [...], "width": W, "height": H}`

use std::io;

use tracing::debug;

use super::{DetectError, DetectionSource};
use crate::config::EngineConfig;
use crate::detection::{DetectionBatch, FrameSize};
use crate::input::{encode_for_upload, Frame};

pub struct RemoteDetector {
    url: String,
    api_key: Option<String>,
    agent: ureq::Agent,
    max_width: u32,
    quality: u8,
}

impl RemoteDetector {
    pub fn new(url: &str, api_key: Option<String>, config: &EngineConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(config.remote_timeout())
            .build();
        Self {
            url: url.to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            agent,
            max_width: config.capture_max_width,
            quality: config.jpeg_quality,
        }
    }

    fn post(&self, jpeg: &[u8]) -> Result<String, DetectError> {
        let mut request = self
            .agent
            .post(&self.url)
            .set("content-type", "image/jpeg");
        if let Some(key) = &self.api_key {
            request = request.set("x-api-key", key);
        }

        let response = request.send_bytes(jpeg).map_err(map_ureq_error)?;
        response.into_string().map_err(map_io_error)
    }
}

impl DetectionSource for RemoteDetector {
    fn detect(&mut self, frame: &Frame) -> Result<DetectionBatch, DetectError> {
        let encoded = encode_for_upload(frame, self.max_width, self.quality)
            .map_err(|e| DetectError::Frame(format!("{:#}", e)))?;
        debug!(
            "📤 上传帧 #{} ({}x{}, {} 字节)",
            frame.id,
            encoded.size.width,
            encoded.size.height,
            encoded.jpeg.len()
        );

        let body = self.post(&encoded.jpeg)?;
        parse_response(&body, encoded.size)
    }

    fn name(&self) -> &str {
        &self.url
    }
}

/// 解析检测服务响应
///
/// 响应未给出宽高时, 检测框按上传图像的坐标处理
pub fn parse_response(body: &str, uploaded: FrameSize) -> Result<DetectionBatch, DetectError> {
    let mut batch: DetectionBatch =
        serde_json::from_str(body).map_err(|e| DetectError::Malformed(e.to_string()))?;
    if batch.source_size().is_none() {
        batch.width = Some(uploaded.width);
        batch.height = Some(uploaded.height);
    }
    Ok(batch)
}

fn map_ureq_error(err: ureq::Error) -> DetectError {
    match err {
        ureq::Error::Status(code, _) => DetectError::Status(code),
        ureq::Error::Transport(transport) => {
            let io_kind = std::error::Error::source(&transport)
                .and_then(|e| e.downcast_ref::<io::Error>())
                .map(|e| e.kind());
            match io_kind {
                Some(io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => DetectError::Timeout,
                _ => DetectError::Network(transport.to_string()),
            }
        }
    }
}

fn map_io_error(err: io::Error) -> DetectError {
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => DetectError::Timeout,
        io::ErrorKind::InvalidData => DetectError::Malformed(err.to_string()),
        _ => DetectError::Network(err.to_string()),
    }
}

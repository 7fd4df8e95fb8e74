//! JSONL 回放: 每行一个检测服务响应
//!
//! 脚本化失败:
//! - `{"error": "timeout"}` → 超时
//! - `{"error": "..."}`     → 网络错误
//! - `{"status": 503}`      → HTTP 状态错误

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{info, warn};

use super::{DetectError, DetectionSource};
use crate::detection::DetectionBatch;
use crate::input::Frame;

#[derive(Clone, Debug)]
enum ReplayEntry {
    Batch(DetectionBatch),
    Fail(DetectError),
}

pub struct ReplaySource {
    name: String,
    entries: Vec<ReplayEntry>,
    cursor: usize,
    /// 播放完后从头开始
    looped: bool,
}

impl ReplaySource {
    pub fn open(path: &Path, looped: bool) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("读取回放文件失败: {}", path.display()))?;
        let source = Self::from_lines(&path.display().to_string(), &text, looped);
        info!("📼 回放文件: {} ({} 条)", path.display(), source.len());
        Ok(source)
    }

    /// 逐行解析, 空行与 `#` 注释行跳过
    pub fn from_lines(name: &str, text: &str, looped: bool) -> Self {
        let entries = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(parse_line)
            .collect();
        Self {
            name: name.to_string(),
            entries,
            cursor: 0,
            looped,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_line(line: &str) -> ReplayEntry {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => return ReplayEntry::Fail(DetectError::Malformed(e.to_string())),
    };

    if let Some(error) = value.get("error") {
        let message = error.as_str().unwrap_or("replay error").to_string();
        return ReplayEntry::Fail(if message.eq_ignore_ascii_case("timeout") {
            DetectError::Timeout
        } else {
            DetectError::Network(message)
        });
    }
    if let Some(code) = value.get("status").and_then(Value::as_u64) {
        return ReplayEntry::Fail(match u16::try_from(code) {
            Ok(code) => DetectError::Status(code),
            Err(_) => DetectError::Malformed(format!("状态码越界: {}", code)),
        });
    }

    match serde_json::from_value(value) {
        Ok(batch) => ReplayEntry::Batch(batch),
        Err(e) => ReplayEntry::Fail(DetectError::Malformed(e.to_string())),
    }
}

impl DetectionSource for ReplaySource {
    fn detect(&mut self, _frame: &Frame) -> Result<DetectionBatch, DetectError> {
        if self.cursor >= self.entries.len() {
            if !self.looped || self.entries.is_empty() {
                return Ok(DetectionBatch::empty());
            }
            warn!("🔁 回放结束, 从头开始");
            self.cursor = 0;
        }

        let entry = self.entries[self.cursor].clone();
        self.cursor += 1;
        match entry {
            ReplayEntry::Batch(batch) => Ok(batch),
            ReplayEntry::Fail(e) => Err(e),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

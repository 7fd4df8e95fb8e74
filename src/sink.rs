//! 结果输出 (Result Sinks)
//!
//! 每个完成的周期输出一次 `CycleReport`, 按周期顺序;
//! 状态只在变化时输出 (Connecting → Live / Error)

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::detection::{Detection, FrameSize};

/// 引擎状态
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum EngineStatus {
    /// 尚未完成过成功的周期
    Connecting,
    Live,
    /// 检测失败, 附原因
    Error(String),
}

impl EngineStatus {
    pub fn is_error(&self) -> bool {
        matches!(self, EngineStatus::Error(_))
    }
}

/// 单周期报告
#[derive(Clone, Debug, Serialize)]
pub struct CycleReport {
    /// 周期序号 (从 1 开始)
    pub cycle: u64,
    pub timestamp_ms: u64,
    pub frame_id: u64,
    pub frame_size: FrameSize,
    pub live_count: u32,
    pub total_delta: u32,
    /// 累计总数
    pub total: u64,
    pub status: EngineStatus,
    /// 本帧全部检测 (显示用)
    pub detections: Vec<Detection>,
    /// 格式错误被丢弃的检测数
    pub dropped: usize,
    pub track_count: usize,
    /// 叠加绘制用的原始帧
    #[serde(skip)]
    pub frame: Option<Arc<DynamicImage>>,
}

/// 输出事件 (通道/日志文件)
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    Cycle(CycleReport),
    Status { status: EngineStatus, at_ms: u64 },
    Reset { previous_total: u64, at_ms: u64 },
}

/// 结果接收方
pub trait ResultSink {
    fn on_cycle(&mut self, report: &CycleReport) -> Result<()>;

    fn on_status(&mut self, status: &EngineStatus, at_ms: u64) -> Result<()>;

    /// 每日重置
    fn on_reset(&mut self, _previous_total: u64, _at_ms: u64) -> Result<()> {
        Ok(())
    }
}

/// 转发到 crossbeam 通道 (供其它线程消费)
pub struct ChannelSink {
    tx: Sender<EngineEvent>,
}

impl ChannelSink {
    pub fn new(tx: Sender<EngineEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: EngineEvent) -> Result<()> {
        self.tx.send(event).context("结果通道已关闭")
    }
}

impl ResultSink for ChannelSink {
    fn on_cycle(&mut self, report: &CycleReport) -> Result<()> {
        self.send(EngineEvent::Cycle(report.clone()))
    }

    fn on_status(&mut self, status: &EngineStatus, at_ms: u64) -> Result<()> {
        self.send(EngineEvent::Status {
            status: status.clone(),
            at_ms,
        })
    }

    fn on_reset(&mut self, previous_total: u64, at_ms: u64) -> Result<()> {
        self.send(EngineEvent::Reset {
            previous_total,
            at_ms,
        })
    }
}

/// 输出到 tracing 日志
#[derive(Default)]
pub struct LogSink;

impl ResultSink for LogSink {
    fn on_cycle(&mut self, report: &CycleReport) -> Result<()> {
        if report.total_delta > 0 {
            info!(
                "🚗 +{} → 累计 {} (运动中 {}, 轨迹 {})",
                report.total_delta, report.total, report.live_count, report.track_count
            );
        } else {
            debug!(
                "周期 #{}: 检测 {} / 运动中 {} / 轨迹 {} / 累计 {}",
                report.cycle,
                report.detections.len(),
                report.live_count,
                report.track_count,
                report.total
            );
        }
        Ok(())
    }

    fn on_status(&mut self, status: &EngineStatus, _at_ms: u64) -> Result<()> {
        match status {
            EngineStatus::Connecting => info!("⏳ 连接中..."),
            EngineStatus::Live => info!("🟢 检测正常"),
            EngineStatus::Error(reason) => warn!("🔴 检测异常: {}", reason),
        }
        Ok(())
    }

    fn on_reset(&mut self, previous_total: u64, _at_ms: u64) -> Result<()> {
        info!("📅 日期变更, 累计总数清零 (前一日 {})", previous_total);
        Ok(())
    }
}

/// JSONL 事件日志
pub struct JsonlSink {
    writer: BufWriter<File>,
}

impl JsonlSink {
    /// 追加写入
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("打开事件日志失败: {}", path.display()))?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    fn write_event(&mut self, event: &EngineEvent) -> Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

impl ResultSink for JsonlSink {
    fn on_cycle(&mut self, report: &CycleReport) -> Result<()> {
        self.write_event(&EngineEvent::Cycle(report.clone()))
    }

    fn on_status(&mut self, status: &EngineStatus, at_ms: u64) -> Result<()> {
        self.write_event(&EngineEvent::Status {
            status: status.clone(),
            at_ms,
        })
    }

    fn on_reset(&mut self, previous_total: u64, at_ms: u64) -> Result<()> {
        self.write_event(&EngineEvent::Reset {
            previous_total,
            at_ms,
        })
    }
}

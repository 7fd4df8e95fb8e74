/// 周期调度 (Cycle Scheduler)
///
/// 单线程固定节拍: 取帧 → 检测 → 跟踪计数 → 输出 → 持久化
/// - 节拍由 crossbeam `tick` 产生, 运行中到达的节拍直接丢弃
/// - 检测失败按零检测继续跑完周期, 状态置为 Error
/// - 停止信号到达后, 正在进行的检测结果被丢弃, 不再输出
pub mod gate;

use std::time::{Duration, Instant};

use crossbeam_channel::{never, select, tick, Receiver};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::detection::{DetectionBatch, FrameSize};
use crate::input::FrameSource;
use crate::persistence::{date_key, now_ms, StoredTotals, TotalStore};
use crate::sink::{CycleReport, EngineStatus, ResultSink};
use crate::source::{DetectError, DetectionSource};
use crate::tracking::TrackingEngine;

pub use gate::{CycleGate, GateState};

/// 调度统计
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    /// 收到的节拍数
    pub ticks: u64,
    /// 完成并输出的周期数
    pub cycles: u64,
    /// 周期运行中到达而被丢弃的节拍
    pub dropped_ticks: u64,
    /// 帧来源未就绪而跳过的节拍
    pub skipped_frames: u64,
    /// 检测失败的周期
    pub failures: u64,
    /// 停止后被丢弃的检测结果
    pub discarded: u64,
    /// 每日重置次数
    pub resets: u64,
}

pub struct Scheduler {
    config: EngineConfig,
    interval: Duration,
    max_cycles: Option<u64>,
    engine: TrackingEngine,
    frames: Box<dyn FrameSource + Send>,
    detector: Box<dyn DetectionSource + Send>,
    store: Box<dyn TotalStore + Send>,
    sinks: Vec<Box<dyn ResultSink + Send>>,
    gate: CycleGate,
    status: EngineStatus,
    stats: SchedulerStats,
    /// 当前统计日 `YYYY-MM-DD`, `start` 之前为 None
    date: Option<String>,
    last_frame_size: Option<FrameSize>,
    shutdown: Receiver<()>,
    stopping: bool,
}

impl Scheduler {
    pub fn new(
        config: EngineConfig,
        frames: Box<dyn FrameSource + Send>,
        detector: Box<dyn DetectionSource + Send>,
        store: Box<dyn TotalStore + Send>,
    ) -> Self {
        Self {
            interval: Duration::from_millis(config.local_interval_ms),
            engine: TrackingEngine::new(&config),
            config,
            max_cycles: None,
            frames,
            detector,
            store,
            sinks: Vec::new(),
            gate: CycleGate::new(),
            status: EngineStatus::Connecting,
            stats: SchedulerStats::default(),
            date: None,
            last_frame_size: None,
            shutdown: never(),
            stopping: false,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// 完成指定周期数后停止
    pub fn with_max_cycles(mut self, max_cycles: Option<u64>) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    pub fn add_sink(&mut self, sink: Box<dyn ResultSink + Send>) {
        self.sinks.push(sink);
    }

    pub fn engine(&self) -> &TrackingEngine {
        &self.engine
    }

    pub fn status(&self) -> &EngineStatus {
        &self.status
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub fn gate_state(&self) -> GateState {
        self.gate.state()
    }

    /// 启动: 从持久化恢复累计总数, 跨日则清零
    ///
    /// `run` 会自动调用; 外部驱动 `run_cycle` 时首个周期前自动调用
    pub fn start(&mut self, now_ms: u64) {
        if self.date.is_some() {
            return;
        }
        let today = date_key(now_ms);

        match self.store.load() {
            Ok(Some(stored)) if stored.date == today => {
                info!("📊 恢复今日累计: {}", stored.total);
                self.engine.restore_total(stored.total, stored.started_at_ms);
                self.date = Some(today);
            }
            Ok(Some(stored)) => {
                info!("📅 存储日期 {} 不是今天, 累计清零", stored.date);
                self.engine.restore_total(stored.total, stored.started_at_ms);
                self.date = Some(today);
                self.reset_total(now_ms);
            }
            Ok(None) => {
                self.engine.restore_total(0, now_ms);
                self.date = Some(today);
                self.persist();
            }
            Err(e) => {
                warn!("⚠️ 读取累计总数失败: {:#}, 从 0 开始", e);
                self.engine.restore_total(0, now_ms);
                self.date = Some(today);
            }
        }

        let status = self.status.clone();
        self.emit_status(&status, now_ms);
    }

    /// 按节拍运行, 直到收到停止信号或达到周期上限
    pub fn run(&mut self, shutdown: Receiver<()>) -> SchedulerStats {
        self.shutdown = shutdown.clone();
        self.start(now_ms());
        info!(
            "🚀 调度启动: 周期 {:?}, 帧来源 {}, 检测来源 {}",
            self.interval,
            self.frames.name(),
            self.detector.name()
        );

        let ticker = tick(self.interval);
        let mut shutdown = shutdown;

        // 第一个周期立即执行
        self.on_tick(Instant::now());
        while !self.should_stop() {
            let mut sender_gone = false;
            select! {
                recv(shutdown) -> msg => match msg {
                    Ok(()) => {
                        info!("🛑 收到停止信号");
                        self.stopping = true;
                    }
                    // 发送端已释放且从未发出停止信号
                    Err(_) => sender_gone = true,
                },
                recv(ticker) -> at => match at {
                    Ok(at) => self.on_tick(at),
                    Err(_) => self.stopping = true,
                },
            }
            if sender_gone {
                shutdown = never();
            }
        }

        self.log_stats();
        info!("👋 调度结束");
        self.stats.clone()
    }

    /// 外部驱动单个节拍, 返回本周期报告 (跳过/丢弃时为 None)
    pub fn run_cycle(&mut self, now_ms: u64) -> Option<CycleReport> {
        self.start(now_ms);
        self.stats.ticks += 1;
        if !self.gate.try_begin(Instant::now()) {
            self.stats.dropped_ticks += 1;
            return None;
        }
        let report = self.execute(now_ms);
        self.gate.finish(Instant::now());
        report
    }

    fn on_tick(&mut self, at: Instant) {
        self.stats.ticks += 1;
        if !self.gate.try_begin(at) {
            self.stats.dropped_ticks += 1;
            debug!("⏭️ 上个周期仍在运行, 丢弃节拍");
            return;
        }
        self.execute(now_ms());
        self.gate.finish(Instant::now());
    }

    fn should_stop(&self) -> bool {
        self.stopping || matches!(self.max_cycles, Some(max) if self.stats.cycles >= max)
    }

    /// 检测进行期间是否收到了停止信号
    fn stop_requested(&mut self) -> bool {
        if self.shutdown.try_recv().is_ok() {
            self.stopping = true;
        }
        self.stopping
    }

    fn execute(&mut self, now_ms: u64) -> Option<CycleReport> {
        self.check_rollover(now_ms);

        // 1. 取帧
        let (frame, outcome) = match self.frames.next_frame() {
            Ok(Some(frame)) => {
                // 2. 检测
                let outcome = self.detector.detect(&frame);
                (Some(frame), outcome)
            }
            Ok(None) => {
                self.stats.skipped_frames += 1;
                debug!("⏳ 帧来源未就绪, 跳过本周期");
                return None;
            }
            Err(e) => (None, Err(DetectError::Frame(e.to_string()))),
        };

        if self.stop_requested() {
            self.stats.discarded += 1;
            debug!("🗑️ 已停止, 丢弃进行中的检测结果");
            return None;
        }

        let frame_size = frame
            .as_ref()
            .map(|f| f.size())
            .or(self.last_frame_size)
            .unwrap_or_else(|| self.config.canvas_size());
        self.last_frame_size = Some(frame_size);

        // 3. 跟踪计数 (失败按零检测处理)
        let (batch, status) = match outcome {
            Ok(batch) => (batch, EngineStatus::Live),
            Err(e) => {
                self.stats.failures += 1;
                (DetectionBatch::empty(), EngineStatus::Error(e.to_string()))
            }
        };
        let total_before = self.engine.total();
        let output = self.engine.run_cycle(&batch, frame_size, now_ms);

        // 4. 输出
        if status != self.status {
            self.status = status.clone();
            self.emit_status(&status, now_ms);
        }
        if output.total != total_before {
            self.persist();
        }

        self.stats.cycles += 1;
        let report = CycleReport {
            cycle: self.stats.cycles,
            timestamp_ms: now_ms,
            frame_id: frame.as_ref().map_or(0, |f| f.id),
            frame_size,
            live_count: output.count.live_count,
            total_delta: output.count.total_delta,
            total: output.total,
            status,
            detections: output.detections,
            dropped: output.dropped,
            track_count: output.active_tracks,
            frame: frame.map(|f| f.image),
        };
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.on_cycle(&report) {
                warn!("⚠️ 结果输出失败: {:#}", e);
            }
        }

        let every = self.config.stats_every_cycles;
        if every > 0 && self.stats.cycles % every == 0 {
            self.log_stats();
        }
        Some(report)
    }

    /// 跨日检查, 必须在周期开始前调用
    fn check_rollover(&mut self, now_ms: u64) {
        let today = date_key(now_ms);
        if self.date.as_deref() != Some(today.as_str()) {
            self.date = Some(today);
            self.reset_total(now_ms);
        }
    }

    fn reset_total(&mut self, now_ms: u64) {
        let previous = self.engine.total();
        self.engine.reset_total(now_ms);
        self.stats.resets += 1;
        self.persist();
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.on_reset(previous, now_ms) {
                warn!("⚠️ 重置通知失败: {:#}", e);
            }
        }
    }

    fn persist(&mut self) {
        let Some(date) = self.date.clone() else {
            return;
        };
        let totals = StoredTotals {
            total: self.engine.total(),
            date,
            started_at_ms: self.engine.started_at_ms(),
        };
        if let Err(e) = self.store.save(&totals) {
            warn!("⚠️ 保存累计总数失败: {:#}", e);
        }
    }

    fn emit_status(&mut self, status: &EngineStatus, at_ms: u64) {
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.on_status(status, at_ms) {
                warn!("⚠️ 状态输出失败: {:#}", e);
            }
        }
    }

    fn log_stats(&self) {
        let s = &self.stats;
        info!(
            "📈 节拍 {} | 周期 {} | 丢弃节拍 {} | 未就绪 {} | 失败 {} | 累计 {} | 轨迹 {}",
            s.ticks,
            s.cycles,
            s.dropped_ticks,
            s.skipped_frames,
            s.failures,
            self.engine.total(),
            self.engine.tracks().len()
        );
    }
}

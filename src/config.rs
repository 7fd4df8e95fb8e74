//! 引擎配置 - 通过JSON文件调整参数, 命令行选择运行模式

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::detection::{FrameSize, CAR_CLASS};
use crate::tracking::{
    CAR_MIN_AREA_RATIO, CAR_MIN_SCORE, IOU_MATCH_THRESHOLD, MOTION_THRESHOLD_PX, PRUNE_TIMEOUT_MS,
};

/// 检测模式
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    /// 本地 ONNX 推理
    Local,
    /// 远程检测服务
    Remote,
    /// 回放 JSONL 文件
    Replay,
}

/// 引擎参数配置
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // === 跟踪参数 ===
    pub iou_match_threshold: f32, // 匹配IOU阈值 (严格大于)
    pub motion_threshold_px: f32, // 运动判定位移(像素)
    pub prune_timeout_ms: u64,    // 轨迹清理超时

    // === 计数参数 ===
    pub count_class: String,       // 计数类别
    pub count_min_score: f32,      // 最小置信度
    pub count_min_area_ratio: f64, // 最小面积比例

    // === 调度参数 ===
    pub local_interval_ms: u64,     // 本地推理周期
    pub remote_interval_ms: u64,    // 远程检测周期
    pub remote_timeout_ms: u64,     // 远程请求超时
    pub stats_every_cycles: u64,    // 统计日志间隔(周期)

    // === 采集参数 ===
    pub capture_max_width: u32, // 上传最大宽度
    pub jpeg_quality: u8,       // JPEG质量
    pub canvas_width: u32,      // 空白画布宽 (回放模式)
    pub canvas_height: u32,     // 空白画布高

    // === 本地推理参数 ===
    pub local_max_boxes: usize, // 最大检测数
    pub local_min_score: f32,   // 最小置信度
    pub local_nms_iou: f32,     // NMS IOU阈值
    pub local_input_size: u32,  // 模型输入尺寸
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            // 跟踪
            iou_match_threshold: IOU_MATCH_THRESHOLD,
            motion_threshold_px: MOTION_THRESHOLD_PX,
            prune_timeout_ms: PRUNE_TIMEOUT_MS,

            // 计数
            count_class: CAR_CLASS.to_string(),
            count_min_score: CAR_MIN_SCORE,
            count_min_area_ratio: CAR_MIN_AREA_RATIO,

            // 调度
            local_interval_ms: 200,
            remote_interval_ms: 1000,
            remote_timeout_ms: 8000,
            stats_every_cycles: 100,

            // 采集
            capture_max_width: 1280,
            jpeg_quality: 80,
            canvas_width: 1280,
            canvas_height: 720,

            // 本地推理
            local_max_boxes: 50,
            local_min_score: 0.35,
            local_nms_iou: 0.45,
            local_input_size: 640,
        }
    }
}

impl EngineConfig {
    /// 从JSON文件加载配置
    ///
    /// 文件不存在时写出默认配置, 解析失败时使用默认值
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    info!("✅ 配置已从 {} 加载", path.display());
                    config
                }
                Err(e) => {
                    warn!("⚠️ 配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("📝 配置文件不存在, 创建默认配置...");
                let config = Self::default();
                config.save(path);
                config
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: &Path) {
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    warn!("❌ 保存配置失败: {}", e);
                } else {
                    info!("💾 配置已保存到 {}", path.display());
                }
            }
            Err(e) => warn!("❌ 序列化配置失败: {}", e),
        }
    }

    /// 检查参数取值
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.iou_match_threshold) {
            bail!("iou_match_threshold 必须在 [0, 1) 内: {}", self.iou_match_threshold);
        }
        if !self.motion_threshold_px.is_finite() || self.motion_threshold_px < 0.0 {
            bail!("motion_threshold_px 无效: {}", self.motion_threshold_px);
        }
        if self.prune_timeout_ms == 0 {
            bail!("prune_timeout_ms 不能为 0");
        }
        if self.count_class.is_empty() {
            bail!("count_class 不能为空");
        }
        if !(0.0..=1.0).contains(&self.count_min_score) {
            bail!("count_min_score 必须在 [0, 1] 内: {}", self.count_min_score);
        }
        if !(0.0..=1.0).contains(&self.count_min_area_ratio) {
            bail!("count_min_area_ratio 必须在 [0, 1] 内: {}", self.count_min_area_ratio);
        }
        if self.local_interval_ms == 0 || self.remote_interval_ms == 0 {
            bail!("检测周期不能为 0");
        }
        if self.remote_timeout_ms == 0 {
            bail!("remote_timeout_ms 不能为 0");
        }
        if self.capture_max_width == 0 || self.canvas_width == 0 || self.canvas_height == 0 {
            bail!("图像尺寸不能为 0");
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            bail!("jpeg_quality 必须在 1..=100 内: {}", self.jpeg_quality);
        }
        if self.local_input_size == 0 || self.local_max_boxes == 0 {
            bail!("本地推理参数无效");
        }
        Ok(())
    }

    /// 按检测模式选择周期
    pub fn interval_for(&self, mode: DetectionMode) -> Duration {
        match mode {
            DetectionMode::Remote => Duration::from_millis(self.remote_interval_ms),
            DetectionMode::Local | DetectionMode::Replay => {
                Duration::from_millis(self.local_interval_ms)
            }
        }
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    pub fn canvas_size(&self) -> FrameSize {
        FrameSize::new(self.canvas_width, self.canvas_height)
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!("🎛️ 当前引擎配置:");
        info!("  匹配IOU阈值: {:.2}", self.iou_match_threshold);
        info!("  运动阈值: {:.1}px", self.motion_threshold_px);
        info!("  清理超时: {}ms", self.prune_timeout_ms);
        info!(
            "  计数条件: {} / 置信度≥{:.2} / 面积≥{:.3}",
            self.count_class, self.count_min_score, self.count_min_area_ratio
        );
        info!(
            "  周期: 本地 {}ms / 远程 {}ms (超时 {}ms)",
            self.local_interval_ms, self.remote_interval_ms, self.remote_timeout_ms
        );
    }
}

/// 车流计数参数
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "车流计数 - 实时车辆跟踪与计数", long_about = None)]
pub struct Args {
    /// 检测模式
    #[arg(short, long, value_enum, default_value_t = DetectionMode::Remote)]
    pub mode: DetectionMode,

    /// 远程检测服务地址
    #[arg(long, env = "DETECT_URL")]
    pub detect_url: Option<String>,

    /// 远程检测服务密钥
    #[arg(long, env = "DETECT_TOKEN", hide_env_values = true)]
    pub detect_token: Option<String>,

    /// 本地检测模型
    #[arg(long, default_value = "models/yolov8n.onnx")]
    pub model: PathBuf,

    /// 帧来源: http(s) 快照地址 / 图片文件 / 图片目录 (缺省为空白画布)
    #[arg(short, long)]
    pub source: Option<String>,

    /// 回放文件 (JSONL, 每行一个检测结果)
    #[arg(long)]
    pub replay: Option<PathBuf>,

    /// 配置文件
    #[arg(short, long, default_value = "traffic_counter.json")]
    pub config: PathBuf,

    /// 计数持久化文件 (缺省为本地数据目录)
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// 覆盖检测周期 (毫秒)
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// 运行指定周期数后退出 (缺省一直运行)
    #[arg(long)]
    pub max_cycles: Option<u64>,

    /// 事件日志 (JSONL)
    #[arg(long)]
    pub event_log: Option<PathBuf>,

    /// 叠加检测框后的图片输出路径
    #[arg(long)]
    pub overlay: Option<PathBuf>,
}

impl Args {
    /// 实际使用的检测周期
    pub fn interval(&self, config: &EngineConfig) -> Duration {
        self.interval_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| config.interval_for(self.mode))
    }
}

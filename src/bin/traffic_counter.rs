/// 车流计数 (Traffic Counter)
///
/// 实时车辆跟踪与计数
///
/// 运行方式:
/// - 远程检测: traffic-counter --mode remote --detect-url http://host/detect --source http://cam/snapshot.jpg
/// - 本地推理: traffic-counter --mode local --model models/yolov8n.onnx --source frames/
/// - 离线回放: traffic-counter --mode replay --replay demos/cars.jsonl --max-cycles 20
use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use traffic_counter::input::open_frame_source;
use traffic_counter::overlay::OverlaySink;
use traffic_counter::persistence::JsonFileStore;
use traffic_counter::sink::{JsonlSink, LogSink};
use traffic_counter::source::open_detection_source;
use traffic_counter::{Args, EngineConfig, Scheduler};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("traffic_counter=info,ort=warn")),
        )
        .init();

    let args = Args::parse();
    info!("🚀 车流计数启动 (模式: {:?})", args.mode);

    let config = EngineConfig::load(&args.config);
    config.validate().context("配置无效")?;
    config.print_summary();

    // ========== 组装 ==========
    let frames = open_frame_source(args.source.as_deref(), &config)?;
    let detector = open_detection_source(&args, &config)?;
    let store_path = args.store.clone().unwrap_or_else(JsonFileStore::default_path);
    info!("💾 计数文件: {}", store_path.display());
    let store = JsonFileStore::new(store_path);

    let mut scheduler = Scheduler::new(config.clone(), frames, detector, Box::new(store))
        .with_interval(args.interval(&config))
        .with_max_cycles(args.max_cycles);
    scheduler.add_sink(Box::new(LogSink));
    if let Some(path) = &args.event_log {
        info!("📝 事件日志: {}", path.display());
        scheduler.add_sink(Box::new(JsonlSink::open(path)?));
    }
    if let Some(path) = &args.overlay {
        info!("🖼️ 叠加画面: {}", path.display());
        scheduler.add_sink(Box::new(OverlaySink::new(
            path,
            &config.count_class,
            config.jpeg_quality,
        )));
    }

    // ========== 运行 ==========
    // 发送端保留到退出, 调度只会因周期上限停止
    let (_shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
    let stats = scheduler.run(shutdown_rx);

    info!(
        "✅ 结束: {} 个周期, 累计 {} 辆 (失败 {}, 丢弃节拍 {})",
        stats.cycles,
        scheduler.engine().total(),
        stats.failures,
        stats.dropped_ticks
    );
    Ok(())
}

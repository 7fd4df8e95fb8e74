use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Sender};
use traffic_counter::detection::{DetectionBatch, FrameSize, RawDetection};
use traffic_counter::input::{BlankSource, Frame};
use traffic_counter::persistence::MemoryStore;
use traffic_counter::sink::{ChannelSink, EngineEvent};
use traffic_counter::source::{DetectError, DetectionSource, ReplaySource};
use traffic_counter::tracking::BBox;
use traffic_counter::{EngineConfig, Scheduler};

fn config() -> EngineConfig {
    EngineConfig {
        canvas_width: 640,
        canvas_height: 360,
        stats_every_cycles: 0,
        ..EngineConfig::default()
    }
}

/// 每次检测耗时 `delay`, 车每次右移 8 px
struct SlowDetector {
    delay: Duration,
    step: u32,
}

impl DetectionSource for SlowDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<DetectionBatch, DetectError> {
        thread::sleep(self.delay);
        let x = 10.0 + self.step as f32 * 8.0;
        self.step += 1;
        Ok(DetectionBatch::new(
            vec![RawDetection::new("car", Some(0.9), BBox::new(x, 10.0, 60.0, 40.0))],
            Some(FrameSize::new(640, 360)),
        ))
    }

    fn name(&self) -> &str {
        "slow"
    }
}

/// 检测进行中发出停止信号
struct StopDuringDetect {
    stop: Sender<()>,
}

impl DetectionSource for StopDuringDetect {
    fn detect(&mut self, _frame: &Frame) -> Result<DetectionBatch, DetectError> {
        let _ = self.stop.send(());
        Ok(DetectionBatch::new(
            vec![RawDetection::new("car", Some(0.9), BBox::new(10.0, 10.0, 60.0, 40.0))],
            Some(FrameSize::new(640, 360)),
        ))
    }

    fn name(&self) -> &str {
        "stop"
    }
}

fn scheduler_with(detector: Box<dyn DetectionSource + Send>, store: MemoryStore) -> Scheduler {
    let config = config();
    Scheduler::new(
        config.clone(),
        Box::new(BlankSource::new(config.canvas_size())),
        detector,
        Box::new(store),
    )
}

#[test]
fn test_slow_cycles_drop_ticks_without_overlap() {
    let (tx, rx) = unbounded();
    let detector = SlowDetector {
        delay: Duration::from_millis(60),
        step: 0,
    };
    let mut scheduler = scheduler_with(Box::new(detector), MemoryStore::default())
        .with_interval(Duration::from_millis(20))
        .with_max_cycles(Some(4));
    scheduler.add_sink(Box::new(ChannelSink::new(tx)));

    let (_stop_tx, stop_rx) = bounded::<()>(1);
    let stats = scheduler.run(stop_rx);

    assert_eq!(stats.cycles, 4);
    assert!(stats.dropped_ticks >= 1, "{:?}", stats);

    let cycles: Vec<u64> = rx
        .try_iter()
        .filter_map(|e| match e {
            EngineEvent::Cycle(r) => Some(r.cycle),
            _ => None,
        })
        .collect();
    assert_eq!(cycles, vec![1, 2, 3, 4]);
    assert_eq!(scheduler.engine().total(), 1);
}

#[test]
fn test_result_arriving_after_shutdown_is_discarded() {
    let (events_tx, events_rx) = unbounded();
    let (stop_tx, stop_rx) = bounded::<()>(1);
    let store = MemoryStore::default();

    let mut scheduler = scheduler_with(Box::new(StopDuringDetect { stop: stop_tx }), store.clone())
        .with_interval(Duration::from_millis(10));
    scheduler.add_sink(Box::new(ChannelSink::new(events_tx)));

    let stats = scheduler.run(stop_rx);
    assert_eq!(stats.cycles, 0);
    assert_eq!(stats.discarded, 1);
    assert!(scheduler.engine().tracks().is_empty());
    assert!(!events_rx
        .try_iter()
        .any(|e| matches!(e, EngineEvent::Cycle(_))));
}

#[test]
fn test_shutdown_signal_stops_idle_loop() {
    let (stop_tx, stop_rx) = bounded::<()>(1);
    let mut scheduler = scheduler_with(
        Box::new(SlowDetector {
            delay: Duration::ZERO,
            step: 0,
        }),
        MemoryStore::default(),
    )
    .with_interval(Duration::from_millis(500));

    let handle = thread::spawn(move || scheduler.run(stop_rx));
    thread::sleep(Duration::from_millis(100));
    stop_tx.send(()).unwrap();

    let stats = handle.join().unwrap();
    // 只有启动时立即执行的那一个周期
    assert_eq!(stats.cycles, 1);
}

#[test]
fn test_demo_replay_file_runs_to_completion() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/cars.jsonl");
    let replay = ReplaySource::open(std::path::Path::new(path), false).unwrap();
    let total_lines = replay.len() as u64;

    let config = EngineConfig {
        canvas_width: 1280,
        canvas_height: 720,
        stats_every_cycles: 0,
        ..EngineConfig::default()
    };
    let mut scheduler = Scheduler::new(
        config.clone(),
        Box::new(BlankSource::new(config.canvas_size())),
        Box::new(replay),
        Box::new(MemoryStore::default()),
    );

    let mut failures = 0;
    let mut dropped = 0;
    for i in 0..total_lines {
        let report = scheduler.run_cycle(1_792_324_800_000 + i * 200).unwrap();
        if report.status.is_error() {
            failures += 1;
        }
        dropped += report.dropped;
    }

    assert_eq!(failures, 1);
    assert_eq!(dropped, 1);
    // 行驶的车计 1 次, 停着的车不计
    assert_eq!(scheduler.engine().total(), 1);
}

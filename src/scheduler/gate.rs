//! 周期闸门: Idle / Running 两态
//!
//! 只有 Idle 时才能开始新周期; 周期结束前到达的节拍直接丢弃, 不排队

use std::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateState {
    Idle,
    Running,
}

#[derive(Debug)]
pub struct CycleGate {
    state: GateState,
    /// 上一个周期结束的时刻
    last_finished: Option<Instant>,
}

impl CycleGate {
    pub fn new() -> Self {
        Self {
            state: GateState::Idle,
            last_finished: None,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    /// 尝试开始周期
    ///
    /// `tick_at` 为节拍触发时刻; 正在运行, 或节拍早于上个周期结束时返回 false
    pub fn try_begin(&mut self, tick_at: Instant) -> bool {
        if self.state == GateState::Running {
            return false;
        }
        if matches!(self.last_finished, Some(done) if tick_at < done) {
            return false;
        }
        self.state = GateState::Running;
        true
    }

    /// 周期结束, 回到 Idle
    pub fn finish(&mut self, at: Instant) {
        self.state = GateState::Idle;
        self.last_finished = Some(at);
    }
}

impl Default for CycleGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_running_gate_rejects_ticks() {
        let mut gate = CycleGate::new();
        let t0 = Instant::now();
        assert!(gate.try_begin(t0));
        assert_eq!(gate.state(), GateState::Running);
        assert!(!gate.try_begin(t0 + Duration::from_millis(10)));
    }

    #[test]
    fn test_ticks_fired_during_cycle_are_dropped() {
        let mut gate = CycleGate::new();
        let t0 = Instant::now();
        assert!(gate.try_begin(t0));
        gate.finish(t0 + Duration::from_millis(300));
        assert_eq!(gate.state(), GateState::Idle);

        // 节拍在周期运行期间触发, 周期结束后才被读到
        assert!(!gate.try_begin(t0 + Duration::from_millis(200)));
        assert!(gate.try_begin(t0 + Duration::from_millis(400)));
    }
}

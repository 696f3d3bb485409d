//! # Server Tick Loop
//!
//! Phase tracking and timing for the fixed-rate broadcast.
//!
//! ```text
//!  Idle ──begin_tick──► Collecting ──begin_broadcast──► Broadcasting
//!   ▲                                                        │
//!   └──────────────────────── end_tick ──────────────────────┘
//! ```
//!
//! Collecting runs physics and drains the change logs; Broadcasting queues
//! the encoded frame for every recipient. The timer itself is a
//! `tokio::time::Interval` owned by the server's tick task.

use std::time::{Duration, Instant};

/// Where the current tick is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TickPhase {
    /// Between ticks.
    #[default]
    Idle,
    /// Advancing physics and draining change logs.
    Collecting,
    /// Queueing the frame to recipients.
    Broadcasting,
}

/// Timing of finished ticks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickStats {
    /// Ticks measured since the last reset.
    pub ticks: u64,
    /// Ticks that overran the budget.
    pub late: u64,
    /// Shortest tick.
    pub min: Duration,
    /// Longest tick.
    pub max: Duration,
    /// Exponential moving average, weight 1/16 per tick.
    pub mean: Duration,
    /// Collecting phase of the last tick.
    pub last_collect: Duration,
    /// Broadcasting phase of the last tick.
    pub last_broadcast: Duration,
}

impl TickStats {
    fn empty() -> Self {
        Self {
            ticks: 0,
            late: 0,
            min: Duration::MAX,
            max: Duration::ZERO,
            mean: Duration::ZERO,
            last_collect: Duration::ZERO,
            last_broadcast: Duration::ZERO,
        }
    }

    fn record(&mut self, collect: Duration, broadcast: Duration, budget: Duration) {
        let total = collect + broadcast;
        self.mean = if self.ticks == 0 {
            total
        } else {
            (self.mean * 15 + total) / 16
        };
        self.ticks += 1;
        self.min = self.min.min(total);
        self.max = self.max.max(total);
        self.last_collect = collect;
        self.last_broadcast = broadcast;
        if total > budget {
            self.late += 1;
        }
    }

    /// Share of ticks that overran, in percent.
    #[must_use]
    pub fn late_percent(&self) -> f64 {
        if self.ticks == 0 {
            return 0.0;
        }
        self.late as f64 * 100.0 / self.ticks as f64
    }
}

impl Default for TickStats {
    fn default() -> Self {
        Self::empty()
    }
}

/// Phase tracker for the broadcast tick.
#[derive(Debug)]
pub struct TickLoop {
    budget: Duration,
    count: u64,
    phase: TickPhase,
    collect_started: Option<Instant>,
    broadcast_started: Option<Instant>,
    stats: TickStats,
}

impl TickLoop {
    /// Tick loop for `tick_rate` Hz. A zero rate is treated as 1 Hz.
    #[must_use]
    pub fn new(tick_rate: u32) -> Self {
        Self {
            budget: Duration::from_secs(1) / tick_rate.max(1),
            count: 0,
            phase: TickPhase::Idle,
            collect_started: None,
            broadcast_started: None,
            stats: TickStats::empty(),
        }
    }

    /// Enters [`TickPhase::Collecting`].
    pub fn begin_tick(&mut self) {
        self.count += 1;
        self.phase = TickPhase::Collecting;
        self.collect_started = Some(Instant::now());
        self.broadcast_started = None;
    }

    /// Enters [`TickPhase::Broadcasting`].
    pub fn begin_broadcast(&mut self) {
        self.phase = TickPhase::Broadcasting;
        self.broadcast_started = Some(Instant::now());
    }

    /// Returns to [`TickPhase::Idle`] and records the tick.
    ///
    /// Returns the tick's total duration, or zero if no tick was open.
    pub fn end_tick(&mut self) -> Duration {
        self.phase = TickPhase::Idle;
        let Some(collect_start) = self.collect_started.take() else {
            return Duration::ZERO;
        };
        let now = Instant::now();
        let (collect, broadcast) = match self.broadcast_started.take() {
            Some(split) => (split - collect_start, now - split),
            None => (now - collect_start, Duration::ZERO),
        };
        self.stats.record(collect, broadcast, self.budget);
        collect + broadcast
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> TickPhase {
        self.phase
    }

    /// Ticks started so far.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.count
    }

    /// Timing of finished ticks.
    #[must_use]
    pub const fn stats(&self) -> &TickStats {
        &self.stats
    }

    /// Target period.
    #[must_use]
    pub const fn tick_duration(&self) -> Duration {
        self.budget
    }

    /// Simulation step in seconds.
    #[must_use]
    pub fn dt(&self) -> f32 {
        self.budget.as_secs_f32()
    }

    /// Clears the statistics; the tick count is kept.
    pub fn reset_stats(&mut self) {
        self.stats = TickStats::empty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_tick_loop() {
        let ticks = TickLoop::new(30);
        assert_eq!(ticks.tick_count(), 0);
        assert_eq!(ticks.phase(), TickPhase::Idle);
        assert_eq!(ticks.tick_duration(), Duration::from_secs(1) / 30);
        assert_eq!(TickLoop::new(0).tick_duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_phase_cycle() {
        let mut ticks = TickLoop::new(30);
        ticks.begin_tick();
        assert_eq!(ticks.phase(), TickPhase::Collecting);
        ticks.begin_broadcast();
        assert_eq!(ticks.phase(), TickPhase::Broadcasting);
        ticks.end_tick();
        assert_eq!(ticks.phase(), TickPhase::Idle);
        assert_eq!(ticks.tick_count(), 1);
        assert_eq!(ticks.stats().ticks, 1);
    }

    #[test]
    fn test_end_without_begin_is_ignored() {
        let mut ticks = TickLoop::new(30);
        assert_eq!(ticks.end_tick(), Duration::ZERO);
        assert_eq!(ticks.stats().ticks, 0);
    }

    #[test]
    fn test_late_ticks_counted() {
        // 1 kHz budget is 1 ms
        let mut ticks = TickLoop::new(1000);
        for _ in 0..3 {
            ticks.begin_tick();
            std::thread::sleep(Duration::from_millis(3));
            ticks.begin_broadcast();
            ticks.end_tick();
        }

        let stats = *ticks.stats();
        assert_eq!(stats.ticks, 3);
        assert_eq!(stats.late, 3);
        assert!((stats.late_percent() - 100.0).abs() < f64::EPSILON);
        assert!(stats.min >= Duration::from_millis(3));
        assert!(stats.min <= stats.mean && stats.mean <= stats.max);
        assert!(stats.last_collect >= Duration::from_millis(3));

        ticks.reset_stats();
        assert_eq!(ticks.stats().ticks, 0);
        assert_eq!(ticks.tick_count(), 3);
    }
}

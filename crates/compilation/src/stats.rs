//! Compilation statistics.
//!
//! Four monotonic counters and two cumulative timers, updated through the
//! [`StatisticsSink`] port. [`GlobalStatistics`] is the process-wide atomic
//! implementation; tests substitute sinks that capture calls instead.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::{CompilationResult, InstalledArtifact, StatisticsSink};

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Process-wide counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Counter {
    /// Bailouts observed, one per bailing attempt.
    Bailouts,
    /// Bytecodes compiled, whether or not the code was installed.
    CompiledBytecodes,
    /// Bytecodes compiled for which code was installed.
    CompiledAndInstalledBytecodes,
    /// Bytes of installed machine code.
    InstalledCodeSize,
}

impl Counter {
    pub const ALL: [Counter; 4] = [
        Counter::Bailouts,
        Counter::CompiledBytecodes,
        Counter::CompiledAndInstalledBytecodes,
        Counter::InstalledCodeSize,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Counter::Bailouts => "Bailouts",
            Counter::CompiledBytecodes => "CompiledBytecodes",
            Counter::CompiledAndInstalledBytecodes => "CompiledAndInstalledBytecodes",
            Counter::InstalledCodeSize => "InstalledCodeSize",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Process-wide timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timer {
    /// Time spent in compilation and code installation.
    CompilationTime,
    /// Time spent in code installation.
    CodeInstallation,
}

impl Timer {
    pub fn name(self) -> &'static str {
        match self {
            Timer::CompilationTime => "CompilationTime",
            Timer::CodeInstallation => "CodeInstallation",
        }
    }

    /// Starts timing; the elapsed time is recorded when the guard drops.
    pub fn start(self, sink: &dyn StatisticsSink) -> TimerGuard<'_> {
        TimerGuard {
            timer: self,
            sink,
            started: Instant::now(),
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// RAII guard returned by [`Timer::start`].
pub struct TimerGuard<'a> {
    timer: Timer,
    sink: &'a dyn StatisticsSink,
    started: Instant,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.sink.record_time(self.timer, self.started.elapsed());
    }
}

// ---------------------------------------------------------------------------
// Process-wide implementation
// ---------------------------------------------------------------------------

/// Atomic counters and timers shared by every task in the process.
#[derive(Debug, Default)]
pub struct GlobalStatistics {
    counters: [AtomicU64; 4],
    timer_nanos: [AtomicU64; 2],
    timer_samples: [AtomicU64; 2],
}

static GLOBAL: OnceLock<Arc<GlobalStatistics>> = OnceLock::new();

impl GlobalStatistics {
    /// Creates an independent, zeroed instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide instance, initialised on first use.
    pub fn global() -> Arc<GlobalStatistics> {
        GLOBAL.get_or_init(|| Arc::new(GlobalStatistics::new())).clone()
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counters[counter.index()].load(Ordering::Relaxed)
    }

    pub fn total_time(&self, timer: Timer) -> Duration {
        Duration::from_nanos(self.timer_nanos[timer.index()].load(Ordering::Relaxed))
    }

    pub fn samples(&self, timer: Timer) -> u64 {
        self.timer_samples[timer.index()].load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            bailouts: self.get(Counter::Bailouts),
            compiled_bytecodes: self.get(Counter::CompiledBytecodes),
            compiled_and_installed_bytecodes: self.get(Counter::CompiledAndInstalledBytecodes),
            installed_code_size: self.get(Counter::InstalledCodeSize),
            compilation_time_ms: self.total_time(Timer::CompilationTime).as_millis() as u64,
            code_installation_time_ms: self.total_time(Timer::CodeInstallation).as_millis()
                as u64,
        }
    }
}

impl StatisticsSink for GlobalStatistics {
    fn add(&self, counter: Counter, delta: u64) {
        self.counters[counter.index()].fetch_add(delta, Ordering::Relaxed);
    }

    fn record_time(&self, timer: Timer, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.timer_nanos[timer.index()].fetch_add(nanos, Ordering::Relaxed);
        self.timer_samples[timer.index()].fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time copy of [`GlobalStatistics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub bailouts: u64,
    pub compiled_bytecodes: u64,
    pub compiled_and_installed_bytecodes: u64,
    pub installed_code_size: u64,
    pub compilation_time_ms: u64,
    pub code_installation_time_ms: u64,
}

// ---------------------------------------------------------------------------
// Per-task accumulation
// ---------------------------------------------------------------------------

/// What one task contributed, derived purely from its final state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskStatistics {
    pub bailouts: u32,
    pub compiled_bytecodes: u32,
    /// Zero unless code was installed.
    pub installed_bytecodes: u32,
    /// Zero unless code was installed.
    pub installed_code_size: u32,
}

impl TaskStatistics {
    pub fn from_parts(
        bailouts: u32,
        result: Option<&CompilationResult>,
        installed: Option<&InstalledArtifact>,
    ) -> Self {
        let compiled_bytecodes = result.map_or(0, CompilationResult::bytecode_size);
        let (installed_bytecodes, installed_code_size) = match (result, installed) {
            (Some(_), Some(artifact)) => (compiled_bytecodes, artifact.size()),
            _ => (0, 0),
        };
        Self {
            bailouts,
            compiled_bytecodes,
            installed_bytecodes,
            installed_code_size,
        }
    }

    /// Adds this task's contribution to `sink`. Zero deltas are skipped.
    pub fn record(&self, sink: &dyn StatisticsSink) {
        let deltas = [
            (Counter::Bailouts, self.bailouts),
            (Counter::CompiledBytecodes, self.compiled_bytecodes),
            (Counter::CompiledAndInstalledBytecodes, self.installed_bytecodes),
            (Counter::InstalledCodeSize, self.installed_code_size),
        ];
        for (counter, delta) in deltas {
            if delta > 0 {
                sink.add(counter, u64::from(delta));
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Mutex;

    use super::*;

    /// Captures every call instead of mutating process-wide state.
    #[derive(Debug, Default)]
    pub struct RecordingStatistics {
        pub adds: Mutex<Vec<(Counter, u64)>>,
        pub times: Mutex<Vec<Timer>>,
    }

    impl RecordingStatistics {
        pub fn total(&self, counter: Counter) -> u64 {
            self.adds
                .lock()
                .unwrap()
                .iter()
                .filter(|(c, _)| *c == counter)
                .map(|(_, d)| d)
                .sum()
        }

        pub fn timed(&self, timer: Timer) -> usize {
            self.times.lock().unwrap().iter().filter(|t| **t == timer).count()
        }
    }

    impl StatisticsSink for RecordingStatistics {
        fn add(&self, counter: Counter, delta: u64) {
            self.adds.lock().unwrap().push((counter, delta));
        }

        fn record_time(&self, timer: Timer, _elapsed: Duration) {
            self.times.lock().unwrap().push(timer);
        }
    }
}

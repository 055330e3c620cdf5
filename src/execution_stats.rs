// Loss of precision is allowable in this module's use cases.
#![allow(clippy::cast_precision_loss)]

use std::time::{Duration, Instant};

use humantime::format_duration;
use log::info;
use serde::Serialize;

/// Time spent in each phase of a run. Cycle phases accumulate over every
/// cycle; `wall_time` runs from setup to the last cycle and includes the
/// delay between cycles.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct ExecutionStatistics {
    pub setup_time: Duration,
    pub movement_time: Duration,
    pub infection_time: Duration,
    pub aggregation_time: Duration,
    pub wall_time: Duration,

    pub cycles: u32,
    pub population: usize,
    pub compute_time_per_cycle: Duration,
}

impl ExecutionStatistics {
    /// Time spent computing cycles, excluding setup and delays.
    #[must_use]
    pub fn compute_time(&self) -> Duration {
        self.movement_time + self.infection_time + self.aggregation_time
    }
}

/// The phases of a cycle, in execution order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Setup,
    Movement,
    Infection,
    Aggregation,
}

pub(crate) struct ExecutionProfilingCollector {
    start_time: Instant,
    statistics: ExecutionStatistics,
}

impl ExecutionProfilingCollector {
    pub fn new() -> ExecutionProfilingCollector {
        ExecutionProfilingCollector {
            start_time: Instant::now(),
            statistics: ExecutionStatistics::default(),
        }
    }

    /// Runs `f` and adds its elapsed time to `phase`.
    pub fn time<T>(&mut self, phase: Phase, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = f();
        self.add(phase, start.elapsed());
        result
    }

    pub fn add(&mut self, phase: Phase, elapsed: Duration) {
        let total = match phase {
            Phase::Setup => &mut self.statistics.setup_time,
            Phase::Movement => &mut self.statistics.movement_time,
            Phase::Infection => &mut self.statistics.infection_time,
            Phase::Aggregation => &mut self.statistics.aggregation_time,
        };
        *total += elapsed;
    }

    pub fn compute_final_statistics(&self, cycles: u32, population: usize) -> ExecutionStatistics {
        let mut statistics = self.statistics;
        statistics.wall_time = self.start_time.elapsed();
        statistics.cycles = cycles;
        statistics.population = population;
        statistics.compute_time_per_cycle = if cycles > 0 {
            statistics.compute_time() / cycles
        } else {
            Duration::ZERO
        };
        statistics
    }
}

impl Default for ExecutionProfilingCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Prints execution statistics to stderr.
pub fn print_execution_statistics(statistics: &ExecutionStatistics) {
    eprintln!("━━━━ Execution Summary ━━━━");
    eprintln!("{:<25}{}", "Setup time:", format_duration(statistics.setup_time));
    eprintln!("{:<25}{}", "Movement time:", format_duration(statistics.movement_time));
    eprintln!("{:<25}{}", "Infection time:", format_duration(statistics.infection_time));
    eprintln!(
        "{:<25}{}",
        "Aggregation time:",
        format_duration(statistics.aggregation_time)
    );
    eprintln!("{:<25}{}", "Wall time:", format_duration(statistics.wall_time));
    eprintln!("{:<25}{}", "Cycles:", statistics.cycles);
    eprintln!("{:<25}{}", "Population:", statistics.population);
    if statistics.cycles > 0 {
        eprintln!(
            "{:<25}{}",
            "Compute time per cycle:",
            format_duration(statistics.compute_time_per_cycle)
        );
    }
}

/// Logs execution statistics at `info` level.
pub fn log_execution_statistics(statistics: &ExecutionStatistics) {
    info!("Execution complete.");
    info!("Setup time: {}", format_duration(statistics.setup_time));
    info!(
        "Cycle compute time: {} (movement {}, infection {}, aggregation {})",
        format_duration(statistics.compute_time()),
        format_duration(statistics.movement_time),
        format_duration(statistics.infection_time),
        format_duration(statistics.aggregation_time)
    );
    info!("Wall time: {}", format_duration(statistics.wall_time));
    if statistics.cycles > 0 {
        info!(
            "{} cycles, {} per cycle",
            statistics.cycles,
            format_duration(statistics.compute_time_per_cycle)
        );
    }
}

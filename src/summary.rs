//! End-of-run statistics computed from the cycle history.
use serde::Serialize;

use crate::cycle_report::{round_to, CycleRecord, StatusCounts, ECONOMIC_PRECISION};
use crate::people::{Person, Severity};

/// A value and the cycle at which it occurred.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct CycleValue<T> {
    pub cycle: u32,
    pub value: T,
}

/// How many agents a severity level was the highest reached for, and their
/// share of the resolved cases.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct SeverityShare {
    pub count: usize,
    pub resolved_pct: f64,
}

/// Cases by the highest severity they reached.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct SeverityBreakdown {
    pub none: SeverityShare,
    pub low: SeverityShare,
    pub high: SeverityShare,
}

impl SeverityBreakdown {
    /// Tallies the peak severity of every agent infected during the run.
    /// Agents still infected count too, so the shares can exceed 100 before
    /// the outbreak is over.
    #[must_use]
    pub fn tally<'a>(people: impl IntoIterator<Item = &'a Person>, resolved: usize) -> Self {
        let (mut none, mut low, mut high) = (0, 0, 0);
        for person in people {
            match person.peak_severity() {
                Some(Severity::None) => none += 1,
                Some(Severity::Low) => low += 1,
                Some(Severity::High) => high += 1,
                None => {}
            }
        }
        let share = |count| SeverityShare {
            count,
            resolved_pct: percentage(count, resolved),
        };
        SeverityBreakdown {
            none: share(none),
            low: share(low),
            high: share(high),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct RunSummary {
    /// The last cycle that ran.
    pub cycles: u32,
    pub final_counts: StatusCounts,
    /// Most infected at once, any severity. Ties report the latest cycle.
    pub peak_infected: CycleValue<usize>,
    /// Most low or high severity cases at once. Ties report the latest cycle.
    pub peak_symptomatic: CycleValue<usize>,
    /// Lowest economic activity. Ties report the earliest cycle.
    pub min_economic_activity: CycleValue<f64>,
    pub mean_economic_activity: f64,
    /// Percentages of the final population, each 0 when its base is 0.
    pub never_infected_pct: f64,
    pub dead_pct: f64,
    /// Percentages of the resolved cases (recovered plus dead).
    pub recovered_of_resolved_pct: f64,
    pub dead_of_resolved_pct: f64,
    pub severity: SeverityBreakdown,
}

#[allow(clippy::cast_precision_loss)]
fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round_to(part as f64 / whole as f64 * 100.0, ECONOMIC_PRECISION)
    }
}

/// Latest entry with the maximum key.
fn latest_peak(history: &[CycleRecord], key: impl Fn(&CycleRecord) -> usize) -> CycleValue<usize> {
    history.iter().fold(
        CycleValue {
            cycle: history[0].cycle,
            value: key(&history[0]),
        },
        |peak, record| {
            let value = key(record);
            if value >= peak.value {
                CycleValue {
                    cycle: record.cycle,
                    value,
                }
            } else {
                peak
            }
        },
    )
}

impl RunSummary {
    /// Summarizes `history` and the peak severities of `people`. Returns
    /// `None` for an empty history.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_history(history: &[CycleRecord], people: &[Person]) -> Option<RunSummary> {
        let last = history.last()?;
        let first = history.first()?;

        let min_economic_activity = history.iter().fold(
            CycleValue {
                cycle: first.cycle,
                value: first.economic_activity_pct,
            },
            |min, record| {
                if record.economic_activity_pct < min.value {
                    CycleValue {
                        cycle: record.cycle,
                        value: record.economic_activity_pct,
                    }
                } else {
                    min
                }
            },
        );
        let mean_economic_activity = round_to(
            history
                .iter()
                .map(|record| record.economic_activity_pct)
                .sum::<f64>()
                / history.len() as f64,
            ECONOMIC_PRECISION,
        );

        let final_counts = last.counts();
        let population = final_counts.total();
        let resolved = final_counts.recovered + final_counts.dead;

        Some(RunSummary {
            cycles: last.cycle,
            final_counts,
            peak_infected: latest_peak(history, CycleRecord::infected_count),
            peak_symptomatic: latest_peak(history, CycleRecord::symptomatic_count),
            min_economic_activity,
            mean_economic_activity,
            never_infected_pct: percentage(final_counts.susceptible, population),
            dead_pct: percentage(final_counts.dead, population),
            recovered_of_resolved_pct: percentage(final_counts.recovered, resolved),
            dead_of_resolved_pct: percentage(final_counts.dead, resolved),
            severity: SeverityBreakdown::tally(people, resolved),
        })
    }
}

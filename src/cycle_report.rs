//! Per-cycle aggregation.
//!
//! After movement and infection, the population is counted into a
//! `CycleRecord` together with two derived metrics:
//!
//! - the *reproduction estimate* compares the number infected now with the
//!   number infected one cycle earlier, `log_prev(now)`. It is a growth ratio
//!   proxy, not an epidemiological reproduction number;
//! - the *economic activity* index is the distance moved this cycle as a
//!   percentage of what the population would have moved unrestricted.
//!
//! Records are appended to the history, which never changes an existing
//! entry, and broadcast to observers with a `CycleCompletedEvent`.
use log::debug;
use serde::{Deserialize, Serialize};

use crate::context::{Context, Event};
use crate::define_data_plugin;
use crate::people::{HealthStatus, Person, Severity};

/// Precision of the reproduction estimate, in decimal places.
pub const REPRODUCTION_PRECISION: i32 = 4;
/// Precision of the economic activity index, in decimal places.
pub const ECONOMIC_PRECISION: i32 = 2;

/// Population counts by health bucket.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub susceptible: usize,
    pub infected_none: usize,
    pub infected_low: usize,
    pub infected_high: usize,
    pub recovered: usize,
    pub dead: usize,
}

impl StatusCounts {
    #[must_use]
    pub fn count<'a>(people: impl IntoIterator<Item = &'a Person>) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for person in people {
            match person.status() {
                HealthStatus::Susceptible => counts.susceptible += 1,
                HealthStatus::Infected(Severity::None) => counts.infected_none += 1,
                HealthStatus::Infected(Severity::Low) => counts.infected_low += 1,
                HealthStatus::Infected(Severity::High) => counts.infected_high += 1,
                HealthStatus::Recovered => counts.recovered += 1,
                HealthStatus::Dead => counts.dead += 1,
            }
        }
        counts
    }

    #[must_use]
    pub fn infected(&self) -> usize {
        self.infected_none + self.infected_low + self.infected_high
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.susceptible + self.infected() + self.recovered + self.dead
    }
}

/// One row of the history. Field order is the CSV column order.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub cycle: u32,
    pub susceptible_count: usize,
    pub infected_none_count: usize,
    pub infected_low_count: usize,
    pub infected_high_count: usize,
    pub recovered_count: usize,
    pub dead_count: usize,
    pub reproduction_estimate: f64,
    pub economic_activity_pct: f64,
}

impl CycleRecord {
    #[must_use]
    pub fn counts(&self) -> StatusCounts {
        StatusCounts {
            susceptible: self.susceptible_count,
            infected_none: self.infected_none_count,
            infected_low: self.infected_low_count,
            infected_high: self.infected_high_count,
            recovered: self.recovered_count,
            dead: self.dead_count,
        }
    }

    /// Infected agents of any severity.
    #[must_use]
    pub fn infected_count(&self) -> usize {
        self.counts().infected()
    }

    /// Infected agents with symptoms, low or high.
    #[must_use]
    pub fn symptomatic_count(&self) -> usize {
        self.infected_low_count + self.infected_high_count
    }
}

/// Rounds half away from zero to `places` decimal places.
#[must_use]
pub fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10_f64.powi(places);
    (value * scale).round() / scale
}

/// `log_previous(current)` rounded to four places, or 0 when the logarithm is
/// undefined or degenerate (`previous <= 1` or `current == 0`).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn reproduction_estimate(previous_infected: usize, current_infected: usize) -> f64 {
    if previous_infected > 1 && current_infected > 0 {
        round_to(
            (current_infected as f64).ln() / (previous_infected as f64).ln(),
            REPRODUCTION_PRECISION,
        )
    } else {
        0.0
    }
}

/// Distance moved as a percentage of `population × mean_move_distance`,
/// rounded to two places. 0 when that denominator is 0.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn economic_activity(total_distance: f64, population: usize, mean_move_distance: f64) -> f64 {
    let expected = population as f64 * mean_move_distance;
    if expected > 0.0 {
        round_to(total_distance / expected * 100.0, ECONOMIC_PRECISION)
    } else {
        0.0
    }
}

/// Counts `people` into the record for `cycle`. `previous` is the record of
/// the preceding cycle, absent for the first one.
#[must_use]
pub fn summarize(
    cycle: u32,
    people: &[Person],
    previous: Option<&CycleRecord>,
    mean_move_distance: f64,
) -> CycleRecord {
    let counts = StatusCounts::count(people);
    let total_distance: f64 = people
        .iter()
        .map(|person| person.last_displacement().distance)
        .sum();
    let reproduction_estimate = previous.map_or(0.0, |previous| {
        reproduction_estimate(previous.infected_count(), counts.infected())
    });
    CycleRecord {
        cycle,
        susceptible_count: counts.susceptible,
        infected_none_count: counts.infected_none,
        infected_low_count: counts.infected_low,
        infected_high_count: counts.infected_high,
        recovered_count: counts.recovered,
        dead_count: counts.dead,
        reproduction_estimate,
        economic_activity_pct: economic_activity(
            total_distance,
            people.len(),
            mean_move_distance,
        ),
    }
}

/// Emitted after each cycle's record has been appended to the history.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CycleCompletedEvent {
    pub record: CycleRecord,
}
impl Event for CycleCompletedEvent {}

define_data_plugin!(HistoryPlugin, Vec<CycleRecord>, Vec::new());

pub trait ContextHistoryExt {
    /// All records so far, ordered by cycle.
    fn get_history(&self) -> &[CycleRecord];

    fn get_last_record(&self) -> Option<&CycleRecord>;

    /// Appends `record` and notifies subscribers of `CycleCompletedEvent`.
    ///
    /// # Panics
    ///
    /// Panics if `record` does not directly follow the last record.
    fn append_record(&mut self, record: CycleRecord);

    /// Calls `handler` with every record as it is appended.
    fn subscribe_to_cycle_records(&mut self, handler: impl Fn(&mut Context, CycleRecord) + 'static);
}

impl ContextHistoryExt for Context {
    fn get_history(&self) -> &[CycleRecord] {
        self.get_data(HistoryPlugin)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn get_last_record(&self) -> Option<&CycleRecord> {
        self.get_history().last()
    }

    fn append_record(&mut self, record: CycleRecord) {
        let expected = self.get_last_record().map_or(1, |last| last.cycle + 1);
        assert_eq!(
            record.cycle, expected,
            "cycle {} recorded out of order",
            record.cycle
        );
        debug!("{record:?}");
        self.get_data_mut(HistoryPlugin).push(record);
        self.emit_event(CycleCompletedEvent { record });
    }

    fn subscribe_to_cycle_records(&mut self, handler: impl Fn(&mut Context, CycleRecord) + 'static) {
        self.subscribe_to_event(move |context, event: CycleCompletedEvent| {
            handler(context, event.record);
        });
    }
}

/// Drops the history of a previous run.
pub(crate) fn clear_history(context: &mut Context) {
    context.get_data_mut(HistoryPlugin).clear();
}

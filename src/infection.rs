//! Transmission, recovery, death and severity progression.
//!
//! Every agent is evaluated once per cycle in population order, after all
//! agents have moved. A susceptible agent looks for infected agents within
//! `infection_radius`; each such contact gets a single chance to infect, and
//! the scan stops at the first success. Because evaluation happens in place,
//! an agent infected earlier in the same pass is already contagious to those
//! evaluated after it.
//!
//! An infected agent recovers once more than `immunity_acquisition_cycles`
//! cycles have passed since its infection. Otherwise it may die, with a
//! severity-specific death rate, and if it survives it may progress to the
//! next severity level.
use log::{debug, trace};

use crate::context::Context;
use crate::define_rng;
use crate::parameters::{ContextParametersExt, Parameters};
use crate::people::{ContextPeopleExt, HealthStatus, PersonId, Severity};
use crate::random::ContextRandomExt;

define_rng!(InfectionRng);

/// What happened to one agent during an evaluation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    Infected { by: PersonId },
    Progressed(Severity),
    Recovered,
    Died,
}

/// Counts of the transitions made in one pass over the population.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TransitionCounts {
    pub infected: usize,
    pub progressed: usize,
    pub recovered: usize,
    pub died: usize,
}

impl TransitionCounts {
    fn record(&mut self, transition: Transition) {
        match transition {
            Transition::Infected { .. } => self.infected += 1,
            Transition::Progressed(_) => self.progressed += 1,
            Transition::Recovered => self.recovered += 1,
            Transition::Died => self.died += 1,
        }
    }
}

fn death_rate(parameters: &Parameters, severity: Severity) -> f64 {
    match severity {
        Severity::None => parameters.none_death_rate,
        Severity::Low => parameters.low_death_rate,
        Severity::High => parameters.high_death_rate,
    }
}

fn progression_rate(parameters: &Parameters, severity: Severity) -> Option<f64> {
    match severity {
        Severity::None => Some(parameters.none_to_low_rate),
        Severity::Low => Some(parameters.low_to_high_rate),
        Severity::High => None,
    }
}

pub trait ContextInfectionExt {
    /// Evaluates one agent for `cycle` and applies the resulting transition.
    fn evaluate_person(
        &mut self,
        person_id: PersonId,
        cycle: u32,
        parameters: &Parameters,
    ) -> Option<Transition>;

    /// Evaluates every agent in population order with the current parameter
    /// snapshot.
    fn evaluate_population(&mut self, cycle: u32) -> TransitionCounts;
}

trait ContextInfectionExtInternal {
    fn find_infection(&self, person_id: PersonId, parameters: &Parameters) -> Option<PersonId>;
}

impl ContextInfectionExtInternal for Context {
    /// Returns the contact that infects `person_id`, if any. Each infected
    /// agent in range gets one Bernoulli trial.
    fn find_infection(&self, person_id: PersonId, parameters: &Parameters) -> Option<PersonId> {
        let people = self.get_people();
        let position = people[person_id.index()].position();
        let radius_squared = parameters.infection_radius * parameters.infection_radius;
        people
            .iter()
            .filter(|other| other.id() != person_id && other.status().is_infected())
            .filter(|other| position.distance_squared(&other.position()) < radius_squared)
            .find(|_| self.sample_bool(InfectionRng, parameters.infection_rate))
            .map(|other| other.id())
    }
}

impl ContextInfectionExt for Context {
    fn evaluate_person(
        &mut self,
        person_id: PersonId,
        cycle: u32,
        parameters: &Parameters,
    ) -> Option<Transition> {
        let person = self.get_person(person_id);
        let transition = match person.status() {
            HealthStatus::Susceptible => {
                let source = self.find_infection(person_id, parameters)?;
                self.get_person_mut(person_id).infect(cycle);
                Transition::Infected { by: source }
            }
            HealthStatus::Infected(severity) => {
                let infected_cycle = person.infected_at().map_or(0, |snapshot| snapshot.cycle);
                if cycle.saturating_sub(infected_cycle) > parameters.immunity_acquisition_cycles {
                    self.get_person_mut(person_id).recover(cycle);
                    Transition::Recovered
                } else if self.sample_bool(InfectionRng, death_rate(parameters, severity)) {
                    self.get_person_mut(person_id).die(cycle);
                    Transition::Died
                } else {
                    let rate = progression_rate(parameters, severity)?;
                    if !self.sample_bool(InfectionRng, rate) {
                        return None;
                    }
                    let severity = self.get_person_mut(person_id).progress()?;
                    Transition::Progressed(severity)
                }
            }
            HealthStatus::Recovered | HealthStatus::Dead => return None,
        };
        trace!("cycle {cycle}: {person_id} {transition:?}");
        Some(transition)
    }

    fn evaluate_population(&mut self, cycle: u32) -> TransitionCounts {
        let parameters = *self.get_parameters();
        let mut counts = TransitionCounts::default();
        for index in 0..self.get_population() {
            if let Some(transition) = self.evaluate_person(PersonId(index), cycle, &parameters) {
                counts.record(transition);
            }
        }
        debug!("cycle {cycle}: {counts:?}");
        counts
    }
}

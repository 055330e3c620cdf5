//! Agents and the population that holds them.
//!
//! A `Person` carries its health status, its place on the field and what it
//! has travelled. Health only moves forward:
//!
//! ```text
//! Susceptible -> Infected(None) -> Infected(Low) -> Infected(High)
//!                      \________________\________________\__> Recovered | Dead
//! ```
//!
//! Severity lives inside the `Infected` variant, so an agent has a severity
//! exactly when it is infected. The highest severity an agent reached is kept
//! separately and survives recovery or death. The transition methods on
//! `Person` assert the graph; reaching an illegal transition is a bug in the
//! caller.
//!
//! The population is created once, at setup, and agents are never removed.
//! `PersonId` is the agent's index in creation order, which is also the
//! order in which movement and infection visit agents.
use std::fmt;

use log::info;
use rand::Rng;

use crate::context::Context;
use crate::define_data_plugin;
use crate::define_rng;
use crate::parameters::Parameters;
use crate::random::ContextRandomExt;

define_rng!(PlacementRng);

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PersonId(pub(crate) usize);

impl PersonId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Person {}", self.0)
    }
}

/// How strongly an infection presents. Only increases.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    None,
    Low,
    High,
}

impl Severity {
    /// The next severity level, if any.
    #[must_use]
    pub fn next(self) -> Option<Severity> {
        match self {
            Severity::None => Some(Severity::Low),
            Severity::Low => Some(Severity::High),
            Severity::High => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum HealthStatus {
    Susceptible,
    Infected(Severity),
    Recovered,
    Dead,
}

impl HealthStatus {
    #[must_use]
    pub fn is_infected(self) -> bool {
        matches!(self, HealthStatus::Infected(_))
    }

    #[must_use]
    pub fn severity(self) -> Option<Severity> {
        match self {
            HealthStatus::Infected(severity) => Some(severity),
            _ => None,
        }
    }

    /// The row of the mobility rate tables that applies. The dead have none.
    #[must_use]
    pub fn mobility_class(self) -> Option<MobilityClass> {
        match self {
            HealthStatus::Susceptible => Some(MobilityClass::Susceptible),
            HealthStatus::Infected(Severity::None) => Some(MobilityClass::InfectedNone),
            HealthStatus::Infected(Severity::Low) => Some(MobilityClass::InfectedLow),
            HealthStatus::Infected(Severity::High) => Some(MobilityClass::InfectedHigh),
            HealthStatus::Recovered => Some(MobilityClass::Recovered),
            HealthStatus::Dead => None,
        }
    }
}

/// Status and severity combinations with their own movement restrictions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MobilityClass {
    Susceptible,
    InfectedNone,
    InfectedLow,
    InfectedHigh,
    Recovered,
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    #[must_use]
    pub fn distance_squared(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

/// The most recent move. Zero when the agent stayed put.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Displacement {
    pub dx: f64,
    pub dy: f64,
    pub distance: f64,
}

/// When something happened to an agent, and how far it had travelled by then.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub cycle: u32,
    pub odometer: f64,
}

#[derive(Clone, Debug)]
pub struct Person {
    id: PersonId,
    status: HealthStatus,
    pub(crate) position: Position,
    /// Degrees; kept in `[0, 360)` from the first move on.
    pub(crate) heading: f64,
    pub(crate) last_displacement: Displacement,
    pub(crate) odometer: f64,
    infected_at: Option<Snapshot>,
    resolved_at: Option<Snapshot>,
    peak_severity: Option<Severity>,
}

impl Person {
    fn new(id: PersonId, status: HealthStatus, position: Position, heading: f64) -> Person {
        let infected_at = status.is_infected().then_some(Snapshot {
            cycle: 0,
            odometer: 0.0,
        });
        Person {
            id,
            status,
            position,
            heading,
            last_displacement: Displacement::default(),
            odometer: 0.0,
            infected_at,
            resolved_at: None,
            peak_severity: status.severity(),
        }
    }

    #[must_use]
    pub fn id(&self) -> PersonId {
        self.id
    }

    #[must_use]
    pub fn status(&self) -> HealthStatus {
        self.status
    }

    #[must_use]
    pub fn position(&self) -> Position {
        self.position
    }

    #[must_use]
    pub fn heading(&self) -> f64 {
        self.heading
    }

    #[must_use]
    pub fn last_displacement(&self) -> Displacement {
        self.last_displacement
    }

    #[must_use]
    pub fn odometer(&self) -> f64 {
        self.odometer
    }

    #[must_use]
    pub fn infected_at(&self) -> Option<Snapshot> {
        self.infected_at
    }

    /// When the agent recovered or died.
    #[must_use]
    pub fn resolved_at(&self) -> Option<Snapshot> {
        self.resolved_at
    }

    /// The highest severity reached while infected. `None` for agents that
    /// were never infected during the run, including those seeded as
    /// recovered or dead.
    #[must_use]
    pub fn peak_severity(&self) -> Option<Severity> {
        self.peak_severity
    }

    fn snapshot(&self, cycle: u32) -> Snapshot {
        Snapshot {
            cycle,
            odometer: self.odometer,
        }
    }

    /// # Panics
    ///
    /// Panics unless the person is susceptible.
    pub fn infect(&mut self, cycle: u32) {
        assert_eq!(
            self.status,
            HealthStatus::Susceptible,
            "{} cannot be infected from {:?}",
            self.id,
            self.status
        );
        self.status = HealthStatus::Infected(Severity::None);
        self.infected_at = Some(self.snapshot(cycle));
        self.peak_severity = Some(Severity::None);
    }

    /// Moves an infected person to the next severity level. Returns the new
    /// severity, or `None` if already at the highest level.
    ///
    /// # Panics
    ///
    /// Panics unless the person is infected.
    pub fn progress(&mut self) -> Option<Severity> {
        let Some(severity) = self.status.severity() else {
            panic!("{} cannot progress from {:?}", self.id, self.status);
        };
        let next = severity.next()?;
        self.status = HealthStatus::Infected(next);
        self.peak_severity = Some(next);
        Some(next)
    }

    /// # Panics
    ///
    /// Panics unless the person is infected.
    pub fn recover(&mut self, cycle: u32) {
        self.resolve(HealthStatus::Recovered, cycle);
    }

    /// # Panics
    ///
    /// Panics unless the person is infected.
    pub fn die(&mut self, cycle: u32) {
        self.resolve(HealthStatus::Dead, cycle);
    }

    fn resolve(&mut self, outcome: HealthStatus, cycle: u32) {
        assert!(
            self.status.is_infected(),
            "{} cannot become {:?} from {:?}",
            self.id,
            outcome,
            self.status
        );
        self.status = outcome;
        self.resolved_at = Some(self.snapshot(cycle));
    }
}

#[derive(Default)]
pub struct PopulationData {
    people: Vec<Person>,
}

define_data_plugin!(PopulationPlugin, PopulationData, PopulationData::default());

pub trait ContextPeopleExt {
    /// Adds one person at `position` with a random heading and returns its id.
    fn add_person(&mut self, status: HealthStatus, position: Position) -> PersonId;

    /// Replaces the population with the seeded agents of `parameters`:
    /// susceptible, then infected (severity `None`), then recovered, then
    /// dead, each placed uniformly over the field.
    fn populate(&mut self, parameters: &Parameters);

    fn get_population(&self) -> usize;

    /// # Panics
    ///
    /// Panics if `person_id` is not in the population.
    fn get_person(&self, person_id: PersonId) -> &Person;

    /// # Panics
    ///
    /// Panics if `person_id` is not in the population.
    fn get_person_mut(&mut self, person_id: PersonId) -> &mut Person;

    /// Every person, in creation order.
    fn get_people(&self) -> &[Person];
}

impl ContextPeopleExt for Context {
    fn add_person(&mut self, status: HealthStatus, position: Position) -> PersonId {
        let heading = f64::from(self.sample(PlacementRng, |rng| rng.random_range(0..=360_u16)));
        let people = &mut self.get_data_mut(PopulationPlugin).people;
        let person_id = PersonId(people.len());
        people.push(Person::new(person_id, status, position, heading));
        person_id
    }

    fn populate(&mut self, parameters: &Parameters) {
        self.get_data_mut(PopulationPlugin).people.clear();
        let field_size = f64::from(parameters.field_size);
        let cohorts = [
            (HealthStatus::Susceptible, parameters.susceptible_count),
            (
                HealthStatus::Infected(Severity::None),
                parameters.infected_count,
            ),
            (HealthStatus::Recovered, parameters.recovered_count),
            (HealthStatus::Dead, parameters.dead_count),
        ];
        for (status, count) in cohorts {
            for _ in 0..count {
                let position = Position {
                    x: self.sample_uniform(PlacementRng, 0.0, field_size),
                    y: self.sample_uniform(PlacementRng, 0.0, field_size),
                };
                self.add_person(status, position);
            }
        }
        info!(
            "Populated {} people on a {}x{} field",
            self.get_population(),
            parameters.field_size,
            parameters.field_size
        );
    }

    fn get_population(&self) -> usize {
        self.get_data(PopulationPlugin)
            .map_or(0, |data| data.people.len())
    }

    fn get_person(&self, person_id: PersonId) -> &Person {
        self.get_data(PopulationPlugin)
            .and_then(|data| data.people.get(person_id.0))
            .unwrap_or_else(|| panic!("{person_id} does not exist"))
    }

    fn get_person_mut(&mut self, person_id: PersonId) -> &mut Person {
        self.get_data_mut(PopulationPlugin)
            .people
            .get_mut(person_id.0)
            .unwrap_or_else(|| panic!("{person_id} does not exist"))
    }

    fn get_people(&self) -> &[Person] {
        self.get_data(PopulationPlugin)
            .map(|data| data.people.as_slice())
            .unwrap_or_default()
    }
}

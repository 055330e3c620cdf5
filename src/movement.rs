//! Random movement on a toroidal field.
//!
//! Each cycle every living agent may move once. Whether it stays put, and how
//! far its moves are shortened, depends on its mobility class. A move draws a
//! distance around `mean_move_distance` and turns the heading by a random
//! angle around zero, so agents wander rather than jump. Leaving the field on
//! one side re-enters it on the other.
use log::trace;
use rand_distr::StandardNormal;

use crate::context::Context;
use crate::define_rng;
use crate::parameters::{ContextParametersExt, Parameters};
use crate::people::{ContextPeopleExt, Displacement, PersonId, Position};
use crate::random::ContextRandomExt;

define_rng!(MovementRng);

/// Standard deviation of the per-move distance.
pub const DISTANCE_STD_DEV: f64 = 4.0;
/// Standard deviation of the per-move heading change, in degrees.
pub const HEADING_STD_DEV: f64 = 50.0;

/// Wraps `value` onto `[0, field_size)`. Any magnitude is accepted, so a
/// move longer than the field still lands inside it. An empty field maps
/// everything to 0.
#[must_use]
pub fn wrap_coordinate(value: f64, field_size: f64) -> f64 {
    if field_size <= 0.0 {
        return 0.0;
    }
    let wrapped = value.rem_euclid(field_size);
    // Tiny negative values round up to exactly `field_size`.
    if wrapped >= field_size {
        0.0
    } else {
        wrapped
    }
}

/// Applies one drawn move to a position and heading. `distance` may be
/// negative, which moves the agent against its heading.
fn displace(
    position: Position,
    heading: f64,
    distance: f64,
    field_size: f64,
) -> (Position, Displacement) {
    let radians = heading.to_radians();
    let dx = distance * radians.cos();
    let dy = distance * radians.sin();
    let position = Position {
        x: wrap_coordinate(position.x + dx, field_size),
        y: wrap_coordinate(position.y + dy, field_size),
    };
    (
        position,
        Displacement {
            dx,
            dy,
            distance: distance.abs(),
        },
    )
}

pub trait ContextMovementExt {
    /// Moves one person and returns the displacement it made, which is zero
    /// when the person is dead or skipped this cycle.
    fn move_person(&mut self, person_id: PersonId, parameters: &Parameters) -> Displacement;

    /// Moves every person in population order with the current parameter
    /// snapshot and returns the total distance travelled.
    fn move_population(&mut self) -> f64;
}

impl ContextMovementExt for Context {
    fn move_person(&mut self, person_id: PersonId, parameters: &Parameters) -> Displacement {
        let person = self.get_person_mut(person_id);
        person.last_displacement = Displacement::default();
        let Some(class) = person.status().mobility_class() else {
            return Displacement::default();
        };
        let (position, heading) = (person.position(), person.heading());

        if self.sample_bool(MovementRng, parameters.mobility.disable_rate(class)) {
            trace!("{person_id} skips moving this cycle");
            return Displacement::default();
        }

        let distance_z: f64 = self.sample_distr(MovementRng, StandardNormal);
        let heading_z: f64 = self.sample_distr(MovementRng, StandardNormal);
        let heading = (heading + HEADING_STD_DEV * heading_z).rem_euclid(360.0);
        let distance = (parameters.mean_move_distance + DISTANCE_STD_DEV * distance_z)
            * (1.0 - parameters.mobility.limit_rate(class));

        let (position, displacement) = displace(
            position,
            heading,
            distance,
            f64::from(parameters.field_size),
        );
        let person = self.get_person_mut(person_id);
        person.position = position;
        person.heading = heading;
        person.odometer += displacement.distance;
        person.last_displacement = displacement;
        displacement
    }

    fn move_population(&mut self) -> f64 {
        let parameters = *self.get_parameters();
        let mut total_distance = 0.0;
        for index in 0..self.get_population() {
            total_distance += self.move_person(PersonId(index), &parameters).distance;
        }
        total_distance
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::parameters::MobilityRates;
    use crate::people::{HealthStatus, Severity};

    fn setup(parameters: Parameters) -> Context {
        let mut context = Context::new();
        context.init_random(42);
        context.set_parameters(parameters).unwrap();
        context
    }

    #[test]
    fn wrap_in_range_is_identity() {
        assert_eq!(wrap_coordinate(12.5, 100.0), 12.5);
        assert_eq!(wrap_coordinate(0.0, 100.0), 0.0);
    }

    #[test]
    fn wrap_across_edges() {
        assert_relative_eq!(wrap_coordinate(-5.0, 100.0), 95.0);
        assert_relative_eq!(wrap_coordinate(105.0, 100.0), 5.0);
        assert_eq!(wrap_coordinate(100.0, 100.0), 0.0);
    }

    #[test]
    fn wrap_large_magnitudes() {
        assert_relative_eq!(wrap_coordinate(-1234.5, 100.0), 65.5, epsilon = 1e-9);
        assert_relative_eq!(wrap_coordinate(1234.5, 100.0), 34.5, epsilon = 1e-9);
        let wrapped = wrap_coordinate(-1e-18, 100.0);
        assert!((0.0..100.0).contains(&wrapped));
    }

    #[test]
    fn wrap_on_empty_field() {
        assert_eq!(wrap_coordinate(42.0, 0.0), 0.0);
    }

    #[test]
    fn negative_distance_reverses_direction() {
        let (position, displacement) = displace(Position { x: 50.0, y: 50.0 }, 0.0, -10.0, 100.0);
        assert_relative_eq!(position.x, 40.0);
        assert_relative_eq!(position.y, 50.0);
        assert_relative_eq!(displacement.dx, -10.0);
        assert_eq!(displacement.distance, 10.0);
    }

    #[test]
    fn dead_never_move() {
        let mut context = setup(Parameters {
            mobility: MobilityRates::UNRESTRICTED,
            ..Parameters::default()
        });
        let start = Position { x: 10.0, y: 10.0 };
        let person_id = context.add_person(HealthStatus::Dead, start);
        for _ in 0..10 {
            assert_eq!(context.move_population(), 0.0);
        }
        let person = context.get_person(person_id);
        assert_eq!(person.position(), start);
        assert_eq!(person.odometer(), 0.0);
    }

    #[test]
    fn disabled_class_stays_put() {
        let mut context = setup(Parameters::default());
        // The default parameters disable movement of severe cases entirely.
        let start = Position { x: 10.0, y: 10.0 };
        let person_id = context.add_person(HealthStatus::Infected(Severity::High), start);
        context.move_population();
        let person = context.get_person(person_id);
        assert_eq!(person.position(), start);
        assert_eq!(person.last_displacement(), Displacement::default());
    }

    #[test]
    fn full_limit_moves_nowhere() {
        let mut rates = MobilityRates::UNRESTRICTED;
        rates.susceptible_limit_rate = 1.0;
        let mut context = setup(Parameters {
            mobility: rates,
            ..Parameters::default()
        });
        let start = Position { x: 10.0, y: 10.0 };
        let person_id = context.add_person(HealthStatus::Susceptible, start);
        context.move_population();
        let person = context.get_person(person_id);
        assert_eq!(person.last_displacement().distance, 0.0);
        assert_relative_eq!(person.position().x, start.x);
        assert_relative_eq!(person.position().y, start.y);
    }

    #[test]
    fn moves_stay_on_field_and_accumulate() {
        let mut context = setup(Parameters {
            field_size: 20,
            mean_move_distance: 35.0,
            mobility: MobilityRates::UNRESTRICTED,
            ..Parameters::default()
        });
        for _ in 0..20 {
            context.add_person(HealthStatus::Susceptible, Position { x: 19.9, y: 0.1 });
        }

        let mut previous: Vec<f64> = vec![0.0; 20];
        for _ in 0..50 {
            let total = context.move_population();
            let mut sum = 0.0;
            for (person, last_odometer) in context.get_people().iter().zip(previous.iter_mut()) {
                let position = person.position();
                assert!((0.0..20.0).contains(&position.x));
                assert!((0.0..20.0).contains(&position.y));
                assert!((0.0..360.0).contains(&person.heading()));
                let displacement = person.last_displacement();
                assert!(displacement.distance >= 0.0);
                assert_relative_eq!(
                    person.odometer(),
                    *last_odometer + displacement.distance,
                    epsilon = 1e-9
                );
                *last_odometer = person.odometer();
                sum += displacement.distance;
            }
            assert_relative_eq!(total, sum, epsilon = 1e-9);
        }
    }

    #[test]
    fn mean_distance_matches_parameter() {
        let mut context = setup(Parameters {
            mean_move_distance: 15.0,
            mobility: MobilityRates::UNRESTRICTED,
            ..Parameters::default()
        });
        for _ in 0..1_000 {
            context.add_person(HealthStatus::Recovered, Position::default());
        }
        let mean = context.move_population() / 1_000.0;
        assert!((mean - 15.0).abs() < 0.5, "mean distance {mean}");
    }
}

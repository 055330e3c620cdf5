use std::cell::RefCell;
use std::rc::Rc;

use cv19sim::prelude::*;

fn context(parameters: Parameters) -> Context {
    let mut context = Context::new();
    context.init_random(1234);
    context.setup_simulation(parameters).unwrap();
    context
}

fn no_deaths() -> Parameters {
    Parameters {
        none_death_rate: 0.0,
        low_death_rate: 0.0,
        high_death_rate: 0.0,
        ..Parameters::default()
    }
}

fn rank(status: HealthStatus) -> u8 {
    match status {
        HealthStatus::Susceptible => 0,
        HealthStatus::Infected(Severity::None) => 1,
        HealthStatus::Infected(Severity::Low) => 2,
        HealthStatus::Infected(Severity::High) => 3,
        HealthStatus::Recovered | HealthStatus::Dead => 4,
    }
}

fn is_legal(previous: HealthStatus, current: HealthStatus) -> bool {
    match (previous, current) {
        (before, after) if before == after => true,
        (HealthStatus::Susceptible, HealthStatus::Infected(Severity::None)) => true,
        (HealthStatus::Infected(before), HealthStatus::Infected(after)) => {
            before.next() == Some(after)
        }
        (HealthStatus::Infected(_), HealthStatus::Recovered | HealthStatus::Dead) => true,
        _ => false,
    }
}

#[test]
fn health_only_moves_forward() {
    let mut context = context(Parameters {
        susceptible_count: 150,
        infected_count: 5,
        field_size: 150,
        cycle_max: 80,
        infection_radius: 12.0,
        none_to_low_rate: 0.2,
        low_to_high_rate: 0.2,
        none_death_rate: 0.01,
        low_death_rate: 0.02,
        high_death_rate: 0.05,
        immunity_acquisition_cycles: 10,
        ..Parameters::default()
    });

    let statuses: Rc<RefCell<Vec<HealthStatus>>> = Rc::new(RefCell::new(
        context.get_people().iter().map(Person::status).collect(),
    ));
    let transitions = Rc::new(RefCell::new(0_usize));
    let statuses_clone = Rc::clone(&statuses);
    let transitions_clone = Rc::clone(&transitions);
    context.subscribe_to_cycle_records(move |context, _| {
        let mut previous = statuses_clone.borrow_mut();
        for (person, before) in context.get_people().iter().zip(previous.iter_mut()) {
            let after = person.status();
            assert!(
                is_legal(*before, after),
                "{} went from {before:?} to {after:?}",
                person.id()
            );
            assert!(rank(after) >= rank(*before));
            if after != *before {
                *transitions_clone.borrow_mut() += 1;
            }
            *before = after;
        }
    });

    context.run_simulation().unwrap();
    assert!(*transitions.borrow() > 0);
}

#[test]
fn positions_stay_on_the_field() {
    let mut context = context(Parameters {
        susceptible_count: 100,
        infected_count: 1,
        field_size: 40,
        mean_move_distance: 55.0,
        cycle_max: 30,
        infection_rate: 0.0,
        mobility: MobilityRates::UNRESTRICTED,
        ..no_deaths()
    });
    context.subscribe_to_cycle_records(|context, _| {
        for person in context.get_people() {
            let position = person.position();
            assert!((0.0..40.0).contains(&position.x), "{position:?}");
            assert!((0.0..40.0).contains(&position.y), "{position:?}");
        }
    });
    context.run_simulation().unwrap();
}

#[test]
fn every_record_accounts_for_everyone() {
    let parameters = Parameters {
        susceptible_count: 120,
        infected_count: 4,
        recovered_count: 6,
        dead_count: 3,
        field_size: 120,
        cycle_max: 60,
        ..Parameters::default()
    };
    let mut context = context(parameters);
    context.run_simulation().unwrap();

    let total = derive_totals(&parameters).total;
    assert_eq!(total, 133);
    for record in context.get_history() {
        assert_eq!(record.counts().total(), total, "cycle {}", record.cycle);
    }
    let history = context.get_history();
    for pair in history.windows(2) {
        assert_eq!(pair[1].cycle, pair[0].cycle + 1);
        assert!(pair[1].dead_count >= pair[0].dead_count);
        assert!(pair[1].recovered_count >= pair[0].recovered_count);
        assert!(pair[1].susceptible_count <= pair[0].susceptible_count);
    }
}

#[test]
fn no_transmission_ends_the_outbreak() {
    let mut context = context(Parameters {
        susceptible_count: 80,
        infected_count: 3,
        field_size: 30,
        cycle_max: 500,
        infection_rate: 0.0,
        immunity_acquisition_cycles: 5,
        ..no_deaths()
    });
    assert_eq!(
        context.run_simulation().unwrap(),
        SchedulerState::Terminated
    );

    let history = context.get_history();
    // Seeded cases are infected at cycle 0 and recover once the window is
    // exceeded, at cycle 6.
    assert_eq!(history.len(), 6);
    assert!(history.iter().all(|record| record.susceptible_count == 80));
    let last = context.get_last_record().unwrap();
    assert_eq!(last.recovered_count, 3);
    assert_eq!(last.infected_count(), 0);
}

#[test]
fn full_mobility_means_full_activity() {
    let mut context = context(Parameters {
        susceptible_count: 400,
        infected_count: 1,
        field_size: 500,
        cycle_max: 20,
        infection_rate: 0.0,
        mobility: MobilityRates::UNRESTRICTED,
        ..no_deaths()
    });
    context.run_simulation().unwrap();

    let summary = context.get_run_summary().unwrap();
    assert!(
        (summary.mean_economic_activity - 100.0).abs() < 3.0,
        "{summary:?}"
    );
    for record in context.get_history() {
        assert!((90.0..110.0).contains(&record.economic_activity_pct));
    }
}

#[test]
fn everyone_infected_then_recovered() {
    let mut context = context(Parameters {
        susceptible_count: 4,
        infected_count: 1,
        recovered_count: 0,
        dead_count: 0,
        field_size: 10,
        infection_radius: 1000.0,
        infection_rate: 1.0,
        immunity_acquisition_cycles: 0,
        ..no_deaths()
    });
    context.run_simulation().unwrap();

    let history = context.get_history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].susceptible_count, 0);
    assert_eq!(history[0].infected_count() + history[0].recovered_count, 5);
    assert_eq!(history[1].recovered_count, 5);
    assert_eq!(history[1].dead_count, 0);
    assert_eq!(context.get_run_summary().unwrap().cycles, 2);
}

#[test]
fn certain_death_takes_every_case() {
    let mut context = context(Parameters {
        susceptible_count: 6,
        infected_count: 3,
        field_size: 10,
        infection_radius: 1000.0,
        infection_rate: 1.0,
        immunity_acquisition_cycles: 5,
        none_death_rate: 1.0,
        low_death_rate: 1.0,
        high_death_rate: 1.0,
        ..Parameters::default()
    });
    context.run_simulation().unwrap();

    let history = context.get_history();
    // Susceptible agents come first in evaluation order, so they catch the
    // infection before the seeded cases die.
    assert_eq!(history[0].infected_count(), 6);
    assert_eq!(history[0].dead_count, 3);
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].dead_count, 9);

    let dead_at: Vec<_> = context
        .get_people()
        .iter()
        .map(|person| person.resolved_at().map(|snapshot| snapshot.cycle))
        .collect();
    assert_eq!(dead_at[..6], [Some(2); 6]);
    assert_eq!(dead_at[6..], [Some(1); 3]);

    // Death is tried before progression, so nobody gets past severity none.
    let severity = context.get_run_summary().unwrap().severity;
    assert_eq!(severity.none.count, 9);
    assert_eq!(severity.none.resolved_pct, 100.0);
    assert_eq!(severity.low.count + severity.high.count, 0);
}

#[test]
fn mobility_change_while_paused() {
    let mut context = context(Parameters {
        susceptible_count: 50,
        infected_count: 5,
        field_size: 100,
        cycle_max: 6,
        infection_rate: 0.0,
        immunity_acquisition_cycles: 100,
        mobility: MobilityRates::UNRESTRICTED,
        ..no_deaths()
    });
    context.subscribe_to_cycle_records(|context, record| {
        if record.cycle == 2 {
            context.request_pause().unwrap();
        }
    });
    assert_eq!(context.run_simulation().unwrap(), SchedulerState::Paused);

    let halt_everyone = MobilityRates {
        susceptible_disable_rate: 1.0,
        infected_none_disable_rate: 1.0,
        infected_low_disable_rate: 1.0,
        infected_high_disable_rate: 1.0,
        recovered_disable_rate: 1.0,
        ..MobilityRates::UNRESTRICTED
    };
    context.update_mobility_rates(halt_everyone).unwrap();
    context.resume_simulation().unwrap();
    context.execute();

    let history = context.get_history();
    assert_eq!(history.len(), 7);
    assert!(history[..2]
        .iter()
        .all(|record| record.economic_activity_pct > 50.0));
    assert!(history[2..]
        .iter()
        .all(|record| record.economic_activity_pct == 0.0));

    let summary = context.get_run_summary().unwrap();
    assert_eq!(summary.min_economic_activity.cycle, 3);
}

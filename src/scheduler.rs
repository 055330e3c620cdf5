//! Drives a run cycle by cycle.
//!
//! ```text
//!  Ready --start--> Running --cycle limit or no infected--> Terminated
//!                    |   ^
//!              pause |   | resume
//!                    v   |
//!                   Paused
//! ```
//!
//! Each cycle is one plan on the context's plan queue. After the cycle
//! completes, the scheduler either terminates the run or plans the next
//! cycle `cycle_delay_ms` later on the context clock. A cycle always runs to
//! completion, so pause requests take effect at the next cycle boundary.
//! A pause cancels the pending plan and `Context::execute` returns once the
//! queue is drained; after `resume_simulation` the caller executes the
//! context again.
//!
//! Pauses can be requested through the context, or from any thread through
//! a `ControlHandle`, which only sets a flag checked at cycle boundaries.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::{info, warn};
use serde::Serialize;

use crate::context::{Context, Event};
use crate::cycle_report::{clear_history, summarize, ContextHistoryExt};
use crate::define_data_plugin;
use crate::error::SimError;
use crate::execution_stats::{ExecutionProfilingCollector, ExecutionStatistics, Phase};
use crate::infection::ContextInfectionExt;
use crate::movement::ContextMovementExt;
use crate::parameters::{ContextParametersExt, Parameters};
use crate::people::ContextPeopleExt;
use crate::plan::PlanId;
use crate::summary::RunSummary;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum SchedulerState {
    #[default]
    Ready,
    Running,
    Paused,
    Terminated,
}

/// A cloneable, thread-safe way to ask a running simulation to pause.
#[derive(Clone, Debug, Default)]
pub struct ControlHandle {
    pause_requested: Arc<AtomicBool>,
}

impl ControlHandle {
    /// Asks the simulation to pause at the next cycle boundary.
    pub fn request_pause(&self) {
        self.pause_requested.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_pause_requested(&self) -> bool {
        self.pause_requested.load(Ordering::SeqCst)
    }

    fn take_pause_request(&self) -> bool {
        self.pause_requested.swap(false, Ordering::SeqCst)
    }

    fn clear(&self) {
        self.pause_requested.store(false, Ordering::SeqCst);
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum TerminationReason {
    /// The last cycle exceeded `cycle_max`.
    CycleLimit,
    /// Nobody is infected any more.
    NoInfected,
}

/// Emitted once when a run terminates.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SimulationTerminatedEvent {
    pub cycle: u32,
    pub reason: TerminationReason,
}
impl Event for SimulationTerminatedEvent {}

struct SchedulerData {
    state: SchedulerState,
    set_up: bool,
    /// The last completed cycle; 0 before the first one.
    cycle: u32,
    next_cycle: Option<PlanId>,
    control: ControlHandle,
    profiling: ExecutionProfilingCollector,
    statistics: Option<ExecutionStatistics>,
}

impl Default for SchedulerData {
    fn default() -> Self {
        SchedulerData {
            state: SchedulerState::Ready,
            set_up: false,
            cycle: 0,
            next_cycle: None,
            control: ControlHandle::default(),
            profiling: ExecutionProfilingCollector::new(),
            statistics: None,
        }
    }
}

define_data_plugin!(SchedulerPlugin, SchedulerData, SchedulerData::default());

pub trait ContextSchedulerExt {
    fn get_scheduler_state(&self) -> SchedulerState;

    /// The last completed cycle, 0 before the first.
    fn get_current_cycle(&self) -> u32;

    /// Stores `parameters`, seeds the population and clears the history of
    /// any previous run, leaving the scheduler `Ready`.
    ///
    /// # Errors
    ///
    /// Returns a `SchedulerError` while a run is running or paused, and a
    /// `ParameterError` if `parameters` fail validation.
    fn setup_simulation(&mut self, parameters: Parameters) -> Result<(), SimError>;

    /// Plans the first cycle at the current time. Call `Context::execute`
    /// to run it.
    ///
    /// # Errors
    ///
    /// Returns a `SchedulerError` unless the scheduler is `Ready` after
    /// `setup_simulation`.
    fn start_simulation(&mut self) -> Result<(), SimError>;

    /// Starts the run and executes the context until it terminates or
    /// pauses. Returns the resulting state.
    ///
    /// # Errors
    ///
    /// Same as `start_simulation`.
    fn run_simulation(&mut self) -> Result<SchedulerState, SimError>;

    /// Pauses a running simulation before its next cycle.
    ///
    /// # Errors
    ///
    /// Returns a `SchedulerError` unless the scheduler is `Running`.
    fn request_pause(&mut self) -> Result<(), SimError>;

    /// Plans the next cycle of a paused run at the current time. Call
    /// `Context::execute` to continue.
    ///
    /// # Errors
    ///
    /// Returns a `SchedulerError` unless the scheduler is `Paused`.
    fn resume_simulation(&mut self) -> Result<(), SimError>;

    /// A handle for requesting a pause from another thread.
    fn control_handle(&mut self) -> ControlHandle;

    /// Summary of the history so far, `None` before the first cycle.
    fn get_run_summary(&self) -> Option<RunSummary>;

    /// Phase timings of the last terminated run.
    fn get_execution_statistics(&self) -> Option<ExecutionStatistics>;
}

trait ContextSchedulerExtInternal {
    fn schedule_next_cycle(&mut self, time: f64);
    fn terminate(&mut self, reason: TerminationReason);
}

impl ContextSchedulerExtInternal for Context {
    fn schedule_next_cycle(&mut self, time: f64) {
        let plan_id = self.add_plan(time, run_cycle);
        self.get_data_mut(SchedulerPlugin).next_cycle = Some(plan_id);
    }

    fn terminate(&mut self, reason: TerminationReason) {
        let population = self.get_population();
        let data = self.get_data_mut(SchedulerPlugin);
        data.state = SchedulerState::Terminated;
        data.statistics = Some(data.profiling.compute_final_statistics(data.cycle, population));
        let cycle = data.cycle;
        info!("Simulation terminated after cycle {cycle}: {reason:?}");
        self.emit_event(SimulationTerminatedEvent { cycle, reason });
    }
}

/// One cycle: move everyone, evaluate everyone, record the counts, then
/// decide what happens next.
fn run_cycle(context: &mut Context) {
    let data = context.get_data_mut(SchedulerPlugin);
    data.next_cycle = None;
    if data.control.take_pause_request() {
        data.state = SchedulerState::Paused;
        info!("Simulation paused before cycle {}", data.cycle + 1);
        return;
    }
    data.cycle += 1;
    let cycle = data.cycle;

    let start = Instant::now();
    context.move_population();
    let movement_time = start.elapsed();

    let start = Instant::now();
    context.evaluate_population(cycle);
    let infection_time = start.elapsed();

    let start = Instant::now();
    let parameters = *context.get_parameters();
    let record = summarize(
        cycle,
        context.get_people(),
        context.get_last_record(),
        parameters.mean_move_distance,
    );
    context.append_record(record);
    let aggregation_time = start.elapsed();

    let data = context.get_data_mut(SchedulerPlugin);
    data.profiling.add(Phase::Movement, movement_time);
    data.profiling.add(Phase::Infection, infection_time);
    data.profiling.add(Phase::Aggregation, aggregation_time);

    if cycle > parameters.cycle_max {
        context.terminate(TerminationReason::CycleLimit);
    } else if record.infected_count() == 0 {
        context.terminate(TerminationReason::NoInfected);
    } else if data.control.take_pause_request() {
        data.state = SchedulerState::Paused;
        info!("Simulation paused after cycle {cycle}");
    } else {
        #[allow(clippy::cast_precision_loss)]
        let next = context.get_current_time() + parameters.cycle_delay_ms as f64;
        context.schedule_next_cycle(next);
    }
}

fn state_error(command: &str, state: SchedulerState) -> SimError {
    SimError::SchedulerError(format!("cannot {command} while the scheduler is {state:?}"))
}

impl ContextSchedulerExt for Context {
    fn get_scheduler_state(&self) -> SchedulerState {
        self.get_data(SchedulerPlugin)
            .map_or(SchedulerState::Ready, |data| data.state)
    }

    fn get_current_cycle(&self) -> u32 {
        self.get_data(SchedulerPlugin).map_or(0, |data| data.cycle)
    }

    fn setup_simulation(&mut self, parameters: Parameters) -> Result<(), SimError> {
        let state = self.get_scheduler_state();
        if matches!(state, SchedulerState::Running | SchedulerState::Paused) {
            return Err(state_error("set up a simulation", state));
        }
        let mut profiling = ExecutionProfilingCollector::new();
        profiling.time(Phase::Setup, || -> Result<(), SimError> {
            self.set_parameters(parameters)?;
            clear_history(self);
            self.populate(&parameters);
            Ok(())
        })?;

        let data = self.get_data_mut(SchedulerPlugin);
        data.control.clear();
        *data = SchedulerData {
            set_up: true,
            control: data.control.clone(),
            profiling,
            ..SchedulerData::default()
        };
        Ok(())
    }

    fn start_simulation(&mut self) -> Result<(), SimError> {
        let data = self.get_data_mut(SchedulerPlugin);
        if data.state != SchedulerState::Ready {
            return Err(state_error("start", data.state));
        }
        if !data.set_up {
            return Err(SimError::SchedulerError(
                "setup_simulation must be called before start".to_string(),
            ));
        }
        data.state = SchedulerState::Running;
        info!("Starting simulation with {} people", self.get_population());
        let now = self.get_current_time();
        self.schedule_next_cycle(now);
        Ok(())
    }

    fn run_simulation(&mut self) -> Result<SchedulerState, SimError> {
        self.start_simulation()?;
        self.execute();
        Ok(self.get_scheduler_state())
    }

    fn request_pause(&mut self) -> Result<(), SimError> {
        let data = self.get_data_mut(SchedulerPlugin);
        if data.state != SchedulerState::Running {
            return Err(state_error("pause", data.state));
        }
        data.state = SchedulerState::Paused;
        let cycle = data.cycle;
        if let Some(plan_id) = data.next_cycle.take() {
            if self.is_plan_pending(&plan_id) {
                self.cancel_plan(&plan_id);
            }
        } else {
            warn!("Pause requested with no cycle pending");
        }
        info!("Simulation paused after cycle {cycle}");
        Ok(())
    }

    fn resume_simulation(&mut self) -> Result<(), SimError> {
        let data = self.get_data_mut(SchedulerPlugin);
        if data.state != SchedulerState::Paused {
            return Err(state_error("resume", data.state));
        }
        data.state = SchedulerState::Running;
        data.control.clear();
        info!("Resuming simulation at cycle {}", data.cycle + 1);
        let now = self.get_current_time();
        self.schedule_next_cycle(now);
        Ok(())
    }

    fn control_handle(&mut self) -> ControlHandle {
        self.get_data_mut(SchedulerPlugin).control.clone()
    }

    fn get_run_summary(&self) -> Option<RunSummary> {
        RunSummary::from_history(self.get_history(), self.get_people())
    }

    fn get_execution_statistics(&self) -> Option<ExecutionStatistics> {
        self.get_data(SchedulerPlugin)
            .and_then(|data| data.statistics)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::parameters::MobilityRates;
    use crate::random::ContextRandomExt;

    fn parameters() -> Parameters {
        Parameters {
            susceptible_count: 20,
            infected_count: 2,
            field_size: 50,
            cycle_max: 10,
            cycle_delay_ms: 100,
            immunity_acquisition_cycles: 1_000,
            none_death_rate: 0.0,
            low_death_rate: 0.0,
            high_death_rate: 0.0,
            ..Parameters::default()
        }
    }

    fn context() -> Context {
        let mut context = Context::new();
        context.init_random(42);
        context
    }

    #[test]
    fn runs_to_cycle_limit() {
        let mut context = context();
        context.setup_simulation(parameters()).unwrap();
        assert_eq!(context.get_scheduler_state(), SchedulerState::Ready);

        let state = context.run_simulation().unwrap();
        assert_eq!(state, SchedulerState::Terminated);
        // Cycle 11 is the first one past the limit.
        assert_eq!(context.get_current_cycle(), 11);
        assert_eq!(context.get_history().len(), 11);
        // Cycles run 100ms apart, the first at time 0.
        assert_eq!(context.get_current_time(), 1000.0);
        let statistics = context.get_execution_statistics().unwrap();
        assert_eq!(statistics.cycles, 11);
        assert_eq!(statistics.population, 22);
    }

    #[test]
    fn terminates_without_infected() {
        let mut context = context();
        context
            .setup_simulation(Parameters {
                infected_count: 0,
                ..parameters()
            })
            .unwrap();
        context.run_simulation().unwrap();
        assert_eq!(context.get_current_cycle(), 1);
        assert_eq!(context.get_history()[0].infected_count(), 0);
    }

    #[test]
    fn termination_event() {
        let mut context = context();
        let reasons = Rc::new(RefCell::new(Vec::new()));
        let reasons_clone = Rc::clone(&reasons);
        context.subscribe_to_event(move |_, event: SimulationTerminatedEvent| {
            reasons_clone.borrow_mut().push((event.cycle, event.reason));
        });
        context
            .setup_simulation(Parameters {
                cycle_max: 0,
                ..parameters()
            })
            .unwrap();
        context.run_simulation().unwrap();
        assert_eq!(*reasons.borrow(), vec![(1, TerminationReason::CycleLimit)]);
    }

    #[test]
    fn start_requires_setup() {
        let mut context = context();
        assert!(matches!(
            context.start_simulation(),
            Err(SimError::SchedulerError(_))
        ));
    }

    #[test]
    fn illegal_commands() {
        let mut context = context();
        context.setup_simulation(parameters()).unwrap();
        assert!(context.resume_simulation().is_err());
        assert!(context.request_pause().is_err());

        context.run_simulation().unwrap();
        assert!(context.start_simulation().is_err());
        assert!(context.resume_simulation().is_err());

        // A terminated run can be set up again.
        context.setup_simulation(parameters()).unwrap();
        assert!(context.get_history().is_empty());
        assert_eq!(context.get_current_cycle(), 0);
        context.run_simulation().unwrap();
        assert_eq!(context.get_history().len(), 11);
    }

    #[test]
    fn pause_and_resume() {
        let mut context = context();
        context.setup_simulation(parameters()).unwrap();
        context.subscribe_to_cycle_records(|context, record| {
            if record.cycle == 3 {
                context.request_pause().unwrap();
            }
        });

        assert_eq!(context.run_simulation().unwrap(), SchedulerState::Paused);
        assert_eq!(context.get_current_cycle(), 3);
        assert_eq!(context.get_history().len(), 3);

        // Only mobility rates may change while paused.
        assert!(matches!(
            context.set_parameters(parameters()),
            Err(SimError::ParameterError(_))
        ));
        assert!(context.setup_simulation(parameters()).is_err());
        context
            .update_mobility_rates(MobilityRates::UNRESTRICTED)
            .unwrap();
        assert!(context.start_simulation().is_err());

        context.resume_simulation().unwrap();
        assert_eq!(context.get_scheduler_state(), SchedulerState::Running);
        assert!(context.update_mobility_rates(MobilityRates::default()).is_err());
        context.execute();
        assert_eq!(context.get_scheduler_state(), SchedulerState::Terminated);
        assert_eq!(context.get_history().len(), 11);
        for (index, record) in context.get_history().iter().enumerate() {
            assert_eq!(record.cycle as usize, index + 1);
        }
        assert_eq!(context.get_parameters().mobility, MobilityRates::UNRESTRICTED);
    }

    #[test]
    fn pause_from_another_thread() {
        let mut context = context();
        context.setup_simulation(parameters()).unwrap();
        let handle = context.control_handle();
        std::thread::spawn(move || handle.request_pause())
            .join()
            .unwrap();

        assert_eq!(context.run_simulation().unwrap(), SchedulerState::Paused);
        assert_eq!(context.get_current_cycle(), 0);
        assert!(!context.control_handle().is_pause_requested());

        context.resume_simulation().unwrap();
        context.execute();
        assert_eq!(context.get_current_cycle(), 11);
    }

    #[test]
    fn summary_follows_history() {
        let mut context = context();
        assert!(context.get_run_summary().is_none());
        context.setup_simulation(parameters()).unwrap();
        context.run_simulation().unwrap();
        let summary = context.get_run_summary().unwrap();
        assert_eq!(summary.cycles, 11);
        assert_eq!(summary.final_counts.total(), 22);
    }
}

//! An agent-based simulation of epidemic spread
//!
//! A population of agents wanders a square, toroidal field. Agents are
//! susceptible, infected (with a severity of none, low or high), recovered
//! or dead. Each cycle every agent moves, then every agent is evaluated for
//! transmission, recovery, death and severity progression, and the
//! population is counted into a `CycleRecord`. The run ends once nobody is
//! infected or the cycle limit is passed.
//!
//! All run state lives in a `Context`, which every component receives by
//! `&mut` reference:
//! * `parameters` holds the read-only parameter snapshot of the run.
//! * `people` holds the agents.
//! * `movement` and `infection` implement the two per-agent models.
//! * `cycle_report` counts the population and keeps the history.
//! * `scheduler` plans cycles on the context's plan queue and handles
//!   pause, resume and termination.
//! * `summary` and `report` turn the history into end-of-run statistics and
//!   CSV files.
//!
//! ```
//! use cv19sim::prelude::*;
//!
//! let mut context = Context::new();
//! context.init_random(42);
//! context
//!     .setup_simulation(Parameters {
//!         susceptible_count: 50,
//!         infected_count: 2,
//!         field_size: 100,
//!         cycle_max: 20,
//!         ..Parameters::default()
//!     })
//!     .unwrap();
//! context.run_simulation().unwrap();
//!
//! let summary = context.get_run_summary().unwrap();
//! assert_eq!(summary.final_counts.total(), 52);
//! ```
pub mod context;
pub mod cycle_report;
pub mod error;
pub mod execution_stats;
pub mod infection;
pub mod log;
pub mod movement;
pub mod parameters;
pub mod people;
pub mod plan;
pub mod prelude;
pub mod random;
pub mod report;
pub mod runner;
pub mod scheduler;
pub mod summary;

pub use crate::context::Context;
pub use crate::error::SimError;

// Used by the exported macros.
pub use csv;
pub use paste;
pub use rand;

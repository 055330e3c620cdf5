pub use crate::context::Context;
pub use crate::cycle_report::{ContextHistoryExt, CycleCompletedEvent, CycleRecord, StatusCounts};
pub use crate::error::SimError;
pub use crate::infection::ContextInfectionExt;
pub use crate::log::{debug, error, info, trace, warn};
pub use crate::movement::ContextMovementExt;
pub use crate::parameters::{derive_totals, ContextParametersExt, MobilityRates, Parameters};
pub use crate::people::{
    ContextPeopleExt, HealthStatus, MobilityClass, Person, PersonId, Position, Severity,
};
pub use crate::random::ContextRandomExt;
pub use crate::report::ContextReportExt;
pub use crate::scheduler::{
    ContextSchedulerExt, ControlHandle, SchedulerState, SimulationTerminatedEvent,
    TerminationReason,
};
pub use crate::summary::{RunSummary, SeverityBreakdown, SeverityShare};
pub use crate::{define_data_plugin, define_report, define_rng};

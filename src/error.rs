use std::fmt::{self, Debug, Display};
use std::io;

/// Provides `SimError` and maps other errors to
/// convert to a `SimError`
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum SimError {
    IoError(io::Error),
    JsonError(serde_json::Error),
    CsvError(csv::Error),
    /// A parameter value is out of range, or a parameter was changed while
    /// the scheduler forbids it.
    ParameterError(String),
    /// A scheduler command was issued in a state that does not accept it.
    SchedulerError(String),
    ReportError(String),
    SimError(String),
}

impl From<io::Error> for SimError {
    fn from(error: io::Error) -> Self {
        SimError::IoError(error)
    }
}

impl From<serde_json::Error> for SimError {
    fn from(error: serde_json::Error) -> Self {
        SimError::JsonError(error)
    }
}

impl From<csv::Error> for SimError {
    fn from(error: csv::Error) -> Self {
        SimError::CsvError(error)
    }
}

impl std::error::Error for SimError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimError::IoError(error) => Some(error),
            SimError::JsonError(error) => Some(error),
            SimError::CsvError(error) => Some(error),
            _ => None,
        }
    }
}

impl Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SimError::IoError(error) => write!(f, "I/O error: {error}"),
            SimError::JsonError(error) => write!(f, "JSON error: {error}"),
            SimError::CsvError(error) => write!(f, "CSV error: {error}"),
            SimError::ParameterError(message) => write!(f, "Parameter error: {message}"),
            SimError::SchedulerError(message) => write!(f, "Scheduler error: {message}"),
            SimError::ReportError(message) => write!(f, "Report error: {message}"),
            SimError::SimError(message) => write!(f, "Error: {message}"),
        }
    }
}

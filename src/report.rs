//! CSV output of model data.
//!
//! A report type is any `Serialize` struct registered with `define_report!`.
//! Each type is bound to one file by `add_report`, after which every
//! `send_report` call appends one row. `CycleRecord` is the report the
//! simulator itself produces; `stream_history` wires it to the cycle
//! events, and `export_history` writes a finished history in one go.
use std::any::TypeId;
use std::cell::RefCell;
use std::ffi::OsStr;
use std::fs::{create_dir_all, File};
use std::path::Path;

use csv::Writer;
use log::{error, info};
use rustc_hash::FxHashMap;

use crate::context::Context;
use crate::cycle_report::{ContextHistoryExt, CycleRecord};
use crate::define_data_plugin;
use crate::error::SimError;

pub trait Report: 'static {
    /// Returns report type
    fn type_id(&self) -> TypeId;

    /// Serializes the data with the correct writer
    ///
    /// # Errors
    ///
    /// Returns a `CsvError` if the row cannot be written.
    fn serialize(&self, writer: &mut Writer<File>) -> Result<(), SimError>;
}

/// Use this macro to define a unique report type
#[macro_export]
macro_rules! define_report {
    ($name:ident) => {
        impl $crate::report::Report for $name {
            fn type_id(&self) -> std::any::TypeId {
                std::any::TypeId::of::<$name>()
            }

            fn serialize(
                &self,
                writer: &mut $crate::csv::Writer<std::fs::File>,
            ) -> Result<(), $crate::error::SimError> {
                writer.serialize(self)?;
                Ok(())
            }
        }
    };
}
pub use define_report;

define_report!(CycleRecord);

struct ReportData {
    file_writers: RefCell<FxHashMap<TypeId, Writer<File>>>,
    /// First failure of a streamed report, kept until `check_reports`.
    stream_error: Option<SimError>,
}

define_data_plugin!(
    ReportPlugin,
    ReportData,
    ReportData {
        file_writers: RefCell::new(FxHashMap::default()),
        stream_error: None,
    }
);

// Creates the file and all parent directories if they do not exist.
fn generate_validate_filepath(path: &Path) -> Result<File, SimError> {
    match path.extension().and_then(OsStr::to_str) {
        Some("csv") => {
            if let Some(parent) = path.parent() {
                create_dir_all(parent)?;
            }
            Ok(File::create(path)?)
        }
        _ => Err(SimError::ReportError(
            "Report output files must be CSVs".to_string(),
        )),
    }
}

/// Writes `records` to `path` with a header row.
///
/// # Errors
///
/// Returns an error if the path is not a `.csv` file or cannot be written.
pub fn export_history(path: &Path, records: &[CycleRecord]) -> Result<(), SimError> {
    let mut writer = Writer::from_writer(generate_validate_filepath(path)?);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    info!("Exported {} cycles to {}", records.len(), path.display());
    Ok(())
}

pub trait ContextReportExt {
    /// Binds report type `T` to the CSV file at `path`, replacing any
    /// previous file for `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not a `.csv` file or the file cannot
    /// be created.
    fn add_report<T: Report>(&mut self, path: &Path) -> Result<(), SimError>;

    /// Appends one row to the file bound to the report's type.
    ///
    /// # Errors
    ///
    /// Returns a `ReportError` if no file is bound to the type, or an error
    /// from writing the row.
    fn send_report<T: Report>(&self, report: T) -> Result<(), SimError>;

    /// Writes every completed cycle record to `path` as it is produced.
    ///
    /// # Errors
    ///
    /// Same as `add_report`.
    fn stream_history(&mut self, path: &Path) -> Result<(), SimError>;

    /// Writes the history recorded so far to `path`.
    ///
    /// # Errors
    ///
    /// Same as `export_history`.
    fn export_history(&self, path: &Path) -> Result<(), SimError>;

    /// Reports whether streaming has run into an error so far.
    ///
    /// # Errors
    ///
    /// Returns the first error hit while streaming records, and clears it.
    fn check_reports(&mut self) -> Result<(), SimError>;
}

impl ContextReportExt for Context {
    fn add_report<T: Report>(&mut self, path: &Path) -> Result<(), SimError> {
        let file = generate_validate_filepath(path)?;
        let data_container = self.get_data_mut(ReportPlugin);
        data_container
            .file_writers
            .borrow_mut()
            .insert(TypeId::of::<T>(), Writer::from_writer(file));
        Ok(())
    }

    fn send_report<T: Report>(&self, report: T) -> Result<(), SimError> {
        let missing = || SimError::ReportError("No writer found for the report type".to_string());
        let data_container = self.get_data(ReportPlugin).ok_or_else(missing)?;
        let mut writers = data_container.file_writers.borrow_mut();
        let writer = writers.get_mut(&report.type_id()).ok_or_else(missing)?;
        report.serialize(writer)?;
        writer.flush()?;
        Ok(())
    }

    fn stream_history(&mut self, path: &Path) -> Result<(), SimError> {
        self.add_report::<CycleRecord>(path)?;
        info!("Streaming cycle records to {}", path.display());
        self.subscribe_to_cycle_records(|context, record| {
            if let Err(e) = context.send_report(record) {
                let data_container = context.get_data_mut(ReportPlugin);
                if data_container.stream_error.is_none() {
                    error!("failed to write cycle {}: {e}", record.cycle);
                    data_container.stream_error = Some(e);
                }
            }
        });
        Ok(())
    }

    fn export_history(&self, path: &Path) -> Result<(), SimError> {
        export_history(path, self.get_history())
    }

    fn check_reports(&mut self) -> Result<(), SimError> {
        match self.get_data_mut(ReportPlugin).stream_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

//! Diagnostic logging for the simulator. Not to be confused with the cycle
//! history, which is model output and goes through `report`.
//!
//! Components emit messages with the `log` macros (`error!`, `warn!`,
//! `info!`, `debug!`, `trace!`), re-exported here. Logging is _disabled_ by
//! default. The runner enables it with `--log-level`, and code can control it
//! with:
//!
//!  - `enable_logging()`: turns on all log messages
//!  - `disable_logging()`: turns off all log messages
//!  - `set_log_level(level)`: enables only messages with priority at least `level`
//!
//! Per-module filters are installed with `set_module_filter()` /
//! `set_module_filters()` and removed with `remove_module_filter()`:
//!
//! ```rust
//! use cv19sim::log::{set_log_level, set_module_filter, LevelFilter};
//!
//! set_log_level(LevelFilter::Info);
//! // Per-agent movement tracing is very chatty.
//! set_module_filter("cv19sim::movement", LevelFilter::Warn);
//! ```
#[cfg(feature = "logging")]
mod standard_logger;

#[cfg(not(feature = "logging"))]
mod null_logger;

use std::collections::hash_map::Entry;
use std::str::FromStr;
use std::sync::{LazyLock, Mutex, MutexGuard};

pub use log::{debug, error, info, trace, warn, LevelFilter};
#[cfg(feature = "logging")]
use log4rs::Handle;
use rustc_hash::FxHashMap;

use crate::error::SimError;

const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::Off;

static LOG_CONFIGURATION: LazyLock<Mutex<LogConfiguration>> = LazyLock::new(Mutex::default);

/// A level filter applied to every message whose target starts with
/// `module` (e.g. `"cv19sim::infection"`).
#[derive(Debug, PartialEq)]
struct ModuleLogConfiguration {
    module: String,
    level: LevelFilter,
}

impl From<(&str, LevelFilter)> for ModuleLogConfiguration {
    fn from((module, level): (&str, LevelFilter)) -> Self {
        Self {
            module: module.to_string(),
            level,
        }
    }
}

/// The global level, the module filters and the handle to the installed
/// logger. Loggers are process-wide, so there is a single instance behind
/// `LOG_CONFIGURATION`; the public API is the free functions below.
#[derive(Debug)]
pub(in crate::log) struct LogConfiguration {
    /// Level for targets without their own filter. `LevelFilter::Off`
    /// disables logging.
    pub(in crate::log) global_log_level: LevelFilter,
    pub(in crate::log) module_configurations: FxHashMap<String, ModuleLogConfiguration>,

    #[cfg(feature = "logging")]
    root_handle: Option<Handle>,
}

impl Default for LogConfiguration {
    fn default() -> Self {
        Self {
            global_log_level: DEFAULT_LOG_LEVEL,
            module_configurations: FxHashMap::default(),
            #[cfg(feature = "logging")]
            root_handle: None,
        }
    }
}

impl LogConfiguration {
    pub(in crate::log) fn set_log_level(&mut self, level: LevelFilter) {
        self.global_log_level = level;
        self.set_config();
    }

    /// Returns true if the configuration changed.
    fn insert_module_filter(&mut self, module: &str, level: LevelFilter) -> bool {
        match self.module_configurations.entry(module.to_string()) {
            Entry::Occupied(mut entry) => {
                let module_config = entry.get_mut();
                if module_config.level == level {
                    return false;
                }
                module_config.level = level;
            }
            Entry::Vacant(entry) => {
                entry.insert((module, level).into());
            }
        }
        true
    }

    pub(in crate::log) fn set_module_filter(&mut self, module: &str, level: LevelFilter) {
        if self.insert_module_filter(module, level) {
            self.set_config();
        }
    }

    pub(in crate::log) fn set_module_filters(&mut self, module_filters: &[(&str, LevelFilter)]) {
        let mut mutated = false;
        for (module, level) in module_filters {
            mutated |= self.insert_module_filter(module, *level);
        }
        if mutated {
            self.set_config();
        }
    }

    pub(in crate::log) fn remove_module_filter(&mut self, module: &str) {
        if self.module_configurations.remove(module).is_some() {
            self.set_config();
        }
    }
}

/// Turns on all log messages. Equivalent to `set_log_level(LevelFilter::Trace)`.
pub fn enable_logging() {
    set_log_level(LevelFilter::Trace);
}

/// Turns off all log messages. Equivalent to `set_log_level(LevelFilter::Off)`.
pub fn disable_logging() {
    set_log_level(LevelFilter::Off);
}

pub fn set_log_level(level: LevelFilter) {
    get_log_configuration().set_log_level(level);
}

pub fn set_module_filter(module_path: &str, level_filter: LevelFilter) {
    get_log_configuration().set_module_filter(module_path, level_filter);
}

/// The global level applies to the module again after its filter is removed.
pub fn remove_module_filter(module_path: &str) {
    get_log_configuration().remove_module_filter(module_path);
}

/// Installs several module filters while rebuilding the logger only once.
pub fn set_module_filters(module_filters: &[(&str, LevelFilter)]) {
    get_log_configuration().set_module_filters(module_filters);
}

/// A parsed `--log-level` value.
#[derive(Clone, Debug, PartialEq)]
pub struct LogSpec {
    pub global_level: LevelFilter,
    pub module_filters: Vec<(String, LevelFilter)>,
}

impl FromStr for LogSpec {
    type Err = SimError;

    /// Accepts a bare level (`info`) or a comma-separated list of
    /// `module=level` pairs, optionally mixed with one bare level
    /// (`warn,cv19sim::scheduler=debug`). With only module pairs the global
    /// level stays off.
    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let parse_level = |level: &str| {
            LevelFilter::from_str(level.trim())
                .map_err(|_| SimError::SimError(format!("unknown log level '{}'", level.trim())))
        };

        let mut global_level = LevelFilter::Off;
        let mut module_filters = Vec::new();
        for part in spec.split(',').map(str::trim).filter(|part| !part.is_empty()) {
            match part.split_once('=') {
                Some((module, level)) => {
                    module_filters.push((module.trim().to_string(), parse_level(level)?));
                }
                None => global_level = parse_level(part)?,
            }
        }
        Ok(LogSpec {
            global_level,
            module_filters,
        })
    }
}

/// Applies a parsed `--log-level` value to the global logger.
pub fn apply_log_spec(spec: &LogSpec) {
    let mut log_configuration = get_log_configuration();
    for (module, level) in &spec.module_filters {
        log_configuration.insert_module_filter(module, *level);
    }
    log_configuration.set_log_level(spec.global_level);
}

fn get_log_configuration() -> MutexGuard<'static, LogConfiguration> {
    LOG_CONFIGURATION.lock().expect("Mutex poisoned")
}

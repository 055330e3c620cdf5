//! The parameter set of a run.
//!
//! Parameters are a flat mapping of names to numbers, stored in the context
//! as a read-only snapshot while the scheduler runs. Only the mobility rates
//! may change while a run is paused; everything else may change only before
//! the run starts or after it ends. Values derived from the seed counts
//! (population total, density) are never stored, see [`derive_totals`].
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::define_data_plugin;
use crate::error::SimError;
use crate::people::MobilityClass;
use crate::scheduler::{ContextSchedulerExt, SchedulerState};

/// Density is reported per square cell of this side length.
pub const DENSITY_CELL: f64 = 100.0;

/// Per-class movement restrictions. A limit rate shortens every move by that
/// fraction; a disable rate is the chance that the agent skips moving for a
/// cycle.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MobilityRates {
    #[serde(alias = "s_move_limit_rate")]
    pub susceptible_limit_rate: f64,
    #[serde(alias = "i_n_move_limit_rate")]
    pub infected_none_limit_rate: f64,
    #[serde(alias = "i_l_move_limit_rate")]
    pub infected_low_limit_rate: f64,
    #[serde(alias = "i_h_move_limit_rate")]
    pub infected_high_limit_rate: f64,
    #[serde(alias = "r_move_limit_rate")]
    pub recovered_limit_rate: f64,

    #[serde(alias = "s_move_disable_rate")]
    pub susceptible_disable_rate: f64,
    #[serde(alias = "i_n_move_disable_rate")]
    pub infected_none_disable_rate: f64,
    #[serde(alias = "i_l_move_disable_rate")]
    pub infected_low_disable_rate: f64,
    #[serde(alias = "i_h_move_disable_rate")]
    pub infected_high_disable_rate: f64,
    #[serde(alias = "r_move_disable_rate")]
    pub recovered_disable_rate: f64,
}

impl MobilityRates {
    /// No restriction for anyone.
    pub const UNRESTRICTED: MobilityRates = MobilityRates {
        susceptible_limit_rate: 0.0,
        infected_none_limit_rate: 0.0,
        infected_low_limit_rate: 0.0,
        infected_high_limit_rate: 0.0,
        recovered_limit_rate: 0.0,
        susceptible_disable_rate: 0.0,
        infected_none_disable_rate: 0.0,
        infected_low_disable_rate: 0.0,
        infected_high_disable_rate: 0.0,
        recovered_disable_rate: 0.0,
    };

    #[must_use]
    pub fn limit_rate(&self, class: MobilityClass) -> f64 {
        match class {
            MobilityClass::Susceptible => self.susceptible_limit_rate,
            MobilityClass::InfectedNone => self.infected_none_limit_rate,
            MobilityClass::InfectedLow => self.infected_low_limit_rate,
            MobilityClass::InfectedHigh => self.infected_high_limit_rate,
            MobilityClass::Recovered => self.recovered_limit_rate,
        }
    }

    #[must_use]
    pub fn disable_rate(&self, class: MobilityClass) -> f64 {
        match class {
            MobilityClass::Susceptible => self.susceptible_disable_rate,
            MobilityClass::InfectedNone => self.infected_none_disable_rate,
            MobilityClass::InfectedLow => self.infected_low_disable_rate,
            MobilityClass::InfectedHigh => self.infected_high_disable_rate,
            MobilityClass::Recovered => self.recovered_disable_rate,
        }
    }

    fn rates(&self) -> [(&'static str, f64); 10] {
        [
            ("susceptible_limit_rate", self.susceptible_limit_rate),
            ("infected_none_limit_rate", self.infected_none_limit_rate),
            ("infected_low_limit_rate", self.infected_low_limit_rate),
            ("infected_high_limit_rate", self.infected_high_limit_rate),
            ("recovered_limit_rate", self.recovered_limit_rate),
            ("susceptible_disable_rate", self.susceptible_disable_rate),
            ("infected_none_disable_rate", self.infected_none_disable_rate),
            ("infected_low_disable_rate", self.infected_low_disable_rate),
            ("infected_high_disable_rate", self.infected_high_disable_rate),
            ("recovered_disable_rate", self.recovered_disable_rate),
        ]
    }

    /// # Errors
    ///
    /// Returns a `ParameterError` naming the first rate outside `[0, 1]`.
    pub fn validate(&self) -> Result<(), SimError> {
        self.rates()
            .into_iter()
            .try_for_each(|(name, value)| check_rate(name, value))
    }
}

impl Default for MobilityRates {
    fn default() -> Self {
        MobilityRates {
            susceptible_limit_rate: 0.0,
            infected_none_limit_rate: 0.0,
            infected_low_limit_rate: 0.7,
            infected_high_limit_rate: 1.0,
            recovered_limit_rate: 0.0,
            susceptible_disable_rate: 0.0,
            infected_none_disable_rate: 0.0,
            infected_low_disable_rate: 0.8,
            infected_high_disable_rate: 1.0,
            recovered_disable_rate: 0.0,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    #[serde(alias = "s_persons_count")]
    pub susceptible_count: u32,
    #[serde(alias = "i_persons_count")]
    pub infected_count: u32,
    #[serde(alias = "r_persons_count")]
    pub recovered_count: u32,
    #[serde(alias = "d_persons_count")]
    pub dead_count: u32,

    /// Side length of the square, toroidal field.
    pub field_size: u32,
    /// The run stops once this cycle number is exceeded.
    pub cycle_max: u32,
    /// Delay between cycles, in milliseconds.
    #[serde(alias = "cycle_speed")]
    pub cycle_delay_ms: u64,

    #[serde(alias = "move_r")]
    pub mean_move_distance: f64,
    #[serde(alias = "infection_r")]
    pub infection_radius: f64,
    pub infection_rate: f64,
    /// Cycles after infection before the agent recovers.
    #[serde(alias = "get_immunity_cycle")]
    pub immunity_acquisition_cycles: u32,

    #[serde(alias = "i_n2l_tran_rate")]
    pub none_to_low_rate: f64,
    #[serde(alias = "i_l2h_tran_rate")]
    pub low_to_high_rate: f64,

    #[serde(alias = "n_dead_rate")]
    pub none_death_rate: f64,
    #[serde(alias = "l_dead_rate")]
    pub low_death_rate: f64,
    #[serde(alias = "h_dead_rate")]
    pub high_death_rate: f64,

    #[serde(flatten)]
    pub mobility: MobilityRates,
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters {
            susceptible_count: 199,
            infected_count: 1,
            recovered_count: 0,
            dead_count: 0,
            field_size: 500,
            cycle_max: 500,
            cycle_delay_ms: 100,
            mean_move_distance: 15.0,
            infection_radius: 10.0,
            infection_rate: 0.6,
            immunity_acquisition_cycles: 28,
            none_to_low_rate: 0.03,
            low_to_high_rate: 0.02,
            none_death_rate: 0.001,
            low_death_rate: 0.002,
            high_death_rate: 0.005,
            mobility: MobilityRates::default(),
        }
    }
}

fn check_rate(name: &str, value: f64) -> Result<(), SimError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(SimError::ParameterError(format!(
            "{name} must be in [0, 1], got {value}"
        )))
    }
}

fn check_non_negative(name: &str, value: f64) -> Result<(), SimError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SimError::ParameterError(format!(
            "{name} must be a non-negative number, got {value}"
        )))
    }
}

impl Parameters {
    /// # Errors
    ///
    /// Returns a `ParameterError` for the first value out of its domain.
    pub fn validate(&self) -> Result<(), SimError> {
        check_non_negative("mean_move_distance", self.mean_move_distance)?;
        check_non_negative("infection_radius", self.infection_radius)?;
        check_rate("infection_rate", self.infection_rate)?;
        check_rate("none_to_low_rate", self.none_to_low_rate)?;
        check_rate("low_to_high_rate", self.low_to_high_rate)?;
        check_rate("none_death_rate", self.none_death_rate)?;
        check_rate("low_death_rate", self.low_death_rate)?;
        check_rate("high_death_rate", self.high_death_rate)?;
        self.mobility.validate()
    }

    #[must_use]
    pub fn total_population(&self) -> usize {
        [
            self.susceptible_count,
            self.infected_count,
            self.recovered_count,
            self.dead_count,
        ]
        .into_iter()
        .map(|count| count as usize)
        .sum()
    }

    /// Reads a parameter file. Keys missing from the file keep their default
    /// value; derived keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if a value
    /// fails validation.
    pub fn load(path: &Path) -> Result<Parameters, SimError> {
        info!("Loading parameters from {}", path.display());
        let reader = BufReader::new(File::open(path)?);
        let parameters: Parameters = serde_json::from_reader(reader)?;
        parameters.validate()?;
        debug!("Loaded parameters: {parameters:?}");
        Ok(parameters)
    }

    /// Writes the parameter set, together with its derived totals, as
    /// pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub fn save(&self, path: &Path) -> Result<(), SimError> {
        #[derive(Serialize)]
        struct ParameterFile<'a> {
            #[serde(flatten)]
            parameters: &'a Parameters,
            #[serde(flatten)]
            totals: Totals,
        }

        info!("Saving parameters to {}", path.display());
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(
            writer,
            &ParameterFile {
                parameters: self,
                totals: derive_totals(self),
            },
        )?;
        Ok(())
    }
}

/// Values computed from the seed counts and the field size.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Totals {
    #[serde(rename = "total_persons_count")]
    pub total: usize,
    /// People per `DENSITY_CELL` × `DENSITY_CELL` square; 0 when the field is empty.
    pub density: f64,
}

#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn derive_totals(parameters: &Parameters) -> Totals {
    let total = parameters.total_population();
    let density = if parameters.field_size == 0 {
        0.0
    } else {
        let side = f64::from(parameters.field_size);
        total as f64 / (side * side) * DENSITY_CELL * DENSITY_CELL
    };
    Totals { total, density }
}

define_data_plugin!(ParametersPlugin, Option<Parameters>, None);

pub trait ContextParametersExt {
    /// Stores a validated parameter snapshot.
    ///
    /// # Errors
    ///
    /// Returns a `ParameterError` if validation fails or if a run is
    /// running or paused.
    fn set_parameters(&mut self, parameters: Parameters) -> Result<(), SimError>;

    /// # Panics
    ///
    /// Panics if no parameters have been set.
    fn get_parameters(&self) -> &Parameters;

    /// Replaces the mobility rates. Allowed whenever the run is not
    /// actively running.
    ///
    /// # Errors
    ///
    /// Returns a `ParameterError` if validation fails, no parameters have
    /// been set, or the scheduler is running.
    fn update_mobility_rates(&mut self, rates: MobilityRates) -> Result<(), SimError>;
}

impl ContextParametersExt for Context {
    fn set_parameters(&mut self, parameters: Parameters) -> Result<(), SimError> {
        let state = self.get_scheduler_state();
        if matches!(state, SchedulerState::Running | SchedulerState::Paused) {
            return Err(SimError::ParameterError(format!(
                "parameters cannot be replaced while the scheduler is {state:?}"
            )));
        }
        parameters.validate()?;
        *self.get_data_mut(ParametersPlugin) = Some(parameters);
        Ok(())
    }

    fn get_parameters(&self) -> &Parameters {
        self.get_data(ParametersPlugin)
            .and_then(Option::as_ref)
            .expect("Parameters have not been set")
    }

    fn update_mobility_rates(&mut self, rates: MobilityRates) -> Result<(), SimError> {
        let state = self.get_scheduler_state();
        if state == SchedulerState::Running {
            return Err(SimError::ParameterError(
                "mobility rates can only change while the scheduler is paused".to_string(),
            ));
        }
        rates.validate()?;
        let Some(parameters) = self.get_data_mut(ParametersPlugin).as_mut() else {
            return Err(SimError::ParameterError(
                "parameters have not been set".to_string(),
            ));
        };
        info!("Updating mobility rates: {rates:?}");
        parameters.mobility = rates;
        Ok(())
    }
}

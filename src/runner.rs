use std::path::PathBuf;

use clap::{Args, Command, FromArgMatches as _};
use log::info;

use crate::context::Context;
use crate::error::SimError;
use crate::execution_stats::{log_execution_statistics, print_execution_statistics};
use crate::log::{apply_log_spec, LogSpec};
use crate::parameters::Parameters;
use crate::random::ContextRandomExt;
use crate::report::ContextReportExt;
use crate::scheduler::ContextSchedulerExt;

/// File name of the streamed history inside `--output-dir`.
pub const HISTORY_FILE: &str = "history.csv";

/// Command line arguments of the simulator
#[derive(Args, Debug, Default)]
pub struct BaseArgs {
    /// Random seed. Drawn from OS entropy when omitted
    #[arg(short, long)]
    pub random_seed: Option<u64>,

    /// Path of a JSON parameter file. Missing keys keep their defaults
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory to stream the cycle history into, as history.csv
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Log level: `info`, `debug`, ... or `module=level` pairs, comma separated
    #[arg(short, long)]
    pub log_level: Option<LogSpec>,

    /// Run cycles back to back instead of waiting cycle_delay_ms between them
    #[arg(long)]
    pub no_delay: bool,

    /// Write the effective parameters, with derived totals, to this path
    #[arg(long)]
    pub save_config: Option<PathBuf>,

    /// Print phase timings to stderr when the run ends
    #[arg(long)]
    pub timings: bool,
}

fn create_cli() -> Command {
    let cli = Command::new("cv19sim")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Agent-based simulation of epidemic spread on a toroidal field");
    BaseArgs::augment_args(cli)
}

/// Parses the process arguments and runs a simulation to completion.
///
/// # Errors
///
/// Returns an error if argument parsing or the run fails.
pub fn run_with_args() -> Result<Context, Box<dyn std::error::Error>> {
    let matches = create_cli().get_matches();
    let args = BaseArgs::from_arg_matches(&matches)?;
    Ok(run(&args)?)
}

/// Runs a simulation configured by `args` until it terminates and returns
/// the context holding its history.
///
/// # Errors
///
/// Returns an error if the parameters cannot be loaded, saved or
/// validated, or if the history file cannot be created.
pub fn run(args: &BaseArgs) -> Result<Context, SimError> {
    if let Some(log_spec) = &args.log_level {
        apply_log_spec(log_spec);
    }

    let parameters = match &args.config {
        Some(path) => Parameters::load(path)?,
        None => Parameters::default(),
    };
    if let Some(path) = &args.save_config {
        parameters.save(path)?;
    }

    let mut context = Context::new();
    match args.random_seed {
        Some(seed) => context.init_random(seed),
        None => {
            let seed = context.init_random_from_entropy();
            info!("Random seed: {seed}");
        }
    }
    context.set_wall_clock_pacing(!args.no_delay);
    context.setup_simulation(parameters)?;

    if let Some(output_dir) = &args.output_dir {
        context.stream_history(&output_dir.join(HISTORY_FILE))?;
    }

    context.run_simulation()?;
    context.check_reports()?;

    if let Some(statistics) = context.get_execution_statistics() {
        log_execution_statistics(&statistics);
        if args.timings {
            print_execution_statistics(&statistics);
        }
    }
    Ok(context)
}

use std::process::ExitCode;

use cv19sim::runner::run_with_args;
use cv19sim::scheduler::ContextSchedulerExt;

fn main() -> ExitCode {
    let context = match run_with_args() {
        Ok(context) => context,
        Err(e) => {
            eprintln!("cv19sim: {e}");
            return ExitCode::FAILURE;
        }
    };

    match serde_json::to_string_pretty(&context.get_run_summary()) {
        Ok(summary) => {
            println!("{summary}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("cv19sim: {e}");
            ExitCode::FAILURE
        }
    }
}

use std::process::ExitCode;

use clap::Parser;
use glassbox::{FAILURE_EXIT_CODE, Sandbox};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Run a program under memory, CPU-rate and wall-clock quotas.
///
/// Arguments are joined with single spaces and re-split on whitespace with
/// no quoting; an argument containing a space splits into two.
#[derive(Parser)]
#[command(name = "glassbox", version)]
struct Cli {
    /// Memory ceiling in megabytes (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    memory_mb: u64,
    /// Hard CPU cap in percent (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    cpu_percent: u32,
    /// Wall-clock deadline in milliseconds (0 = wait forever)
    #[arg(long, default_value_t = 0)]
    timeout_ms: u64,
    /// Print the collected statistics as JSON on stdout
    #[arg(long)]
    json: bool,
    /// Program to run
    program: String,
    /// Arguments passed to the program
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let program = match which::which(&cli.program) {
        Ok(path) => path.display().to_string(),
        Err(e) => {
            error!(program = %cli.program, error = %e, "program not found");
            return ExitCode::FAILURE;
        }
    };

    let mut sandbox = Sandbox::new();
    sandbox.set_memory_limit_mb(cli.memory_mb);
    sandbox.set_cpu_percent(cli.cpu_percent);
    sandbox.set_timeout_ms(cli.timeout_ms);

    let args: Vec<&str> = cli.args.iter().map(String::as_str).collect();
    let code = sandbox.run(&program, &args);

    if let Some(stats) = sandbox.last_stats() {
        if cli.json {
            match serde_json::to_string(stats) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "failed to serialize stats"),
            }
        } else {
            info!(
                exit_code = stats.exit_code,
                timed_out = stats.timed_out,
                peak_memory_bytes = stats.peak_memory_bytes,
                "run finished"
            );
        }
    }

    if code == FAILURE_EXIT_CODE {
        return ExitCode::FAILURE;
    }
    u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from)
}

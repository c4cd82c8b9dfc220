#![warn(clippy::all, clippy::pedantic)]

use clap::Parser;
use error_stack::Result;

use tracing::debug;
use tracing::dispatcher::{self, Dispatch};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

use check_pop::check::{self, CheckResult};
use check_pop::configuration::{CheckConfig, Cli};
use check_pop::errors::CheckError;
use check_pop::pop3::Pop3Session;
use check_pop::thresholds::Status;

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(parse_error) => {
            // clap's own exit code for bad arguments is 2, which a
            // supervisor would read as CRITICAL; a configuration error
            // must come out as UNKNOWN.
            let _ = parse_error.print();
            std::process::exit(parse_error_exit_code(&parse_error));
        }
    };
    init_tracing(cli.verbose);

    let exit_code = match run(cli) {
        Ok(result) => {
            println!("{}", result.message);
            result.status.exit_code()
        }
        Err(report) => {
            // One line on stdout, same as the success path; the supervisor
            // only looks there.  The full report goes to the debug log.
            println!("{}", report.current_context());
            debug!("failure detail: {report:?}");
            Status::Unknown.exit_code()
        }
    };

    std::process::exit(exit_code);
}

/// Help, usage, and version requests are normal informational exits; every
/// real parse failure maps to UNKNOWN.
fn parse_error_exit_code(parse_error: &clap::Error) -> i32 {
    match parse_error.kind() {
        clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => 0,
        _ => Status::Unknown.exit_code(),
    }
}

/// Fail fast: the configuration (including both threshold specs) must be
/// valid before the session is opened.
fn run(cli: Cli) -> Result<CheckResult, CheckError> {
    let config = CheckConfig::from_cli(cli)?;
    debug!("Config: {config:?}");

    let mut session = Pop3Session::connect(&config)?;
    check::run_check(&config, &mut session)
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // Diagnostics go to stderr; stdout carries nothing but the summary line.
    let subscriber = Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .with(filter);

    dispatcher::set_global_default(Dispatch::new(subscriber))
        .expect("Global logger has already been set!");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_failure(args: &[&str]) -> clap::Error {
        Cli::try_parse_from(std::iter::once("check_pop").chain(args.iter().copied())).unwrap_err()
    }

    #[test]
    fn bad_arguments_exit_unknown() {
        assert_eq!(
            parse_error_exit_code(&parse_failure(&["-w", "10", "-t", "abc"])),
            3
        );
        assert_eq!(
            parse_error_exit_code(&parse_failure(&["--bogus", "-w", "10"])),
            3
        );
    }

    #[test]
    fn informational_flags_exit_zero() {
        assert_eq!(parse_error_exit_code(&parse_failure(&["--help"])), 0);
        assert_eq!(parse_error_exit_code(&parse_failure(&["--usage"])), 0);
        assert_eq!(parse_error_exit_code(&parse_failure(&["--version"])), 0);
    }
}

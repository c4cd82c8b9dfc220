use std::time::Duration;

use clap::Parser;
use error_stack::{Report, Result};
use secrecy::Secret;

use crate::errors::CheckError;
use crate::thresholds::ThresholdRange;

/// Command-line surface of the plugin.
///
/// `-h` is taken by `--host` (monitoring-plugin convention), so clap's
/// automatic short help is disabled and `--help`/`--usage` are declared
/// explicitly below.
#[derive(Debug, Parser)]
#[command(
    name = "check_pop",
    version,
    about = "Checks the number of messages in a POP3 mailbox against warning/critical thresholds",
    disable_help_flag = true
)]
pub struct Cli {
    /// Mail server host
    #[arg(
        short = 'h',
        long,
        value_name = "HOST",
        default_value = "localhost.localdomain"
    )]
    pub host: String,

    /// Login name
    #[arg(short = 'u', long, value_name = "USER", default_value = "")]
    pub username: String,

    /// Login password
    #[arg(short = 'p', long, value_name = "PASS", default_value = "")]
    pub password: String,

    /// Warning threshold range, e.g. 10, 5:10, 5:, :10, @5:10
    #[arg(short = 'w', long, value_name = "RANGE")]
    pub warning: Option<String>,

    /// Critical threshold range, same grammar as --warning
    #[arg(short = 'c', long, value_name = "RANGE")]
    pub critical: Option<String>,

    /// Only count the messages (the default action)
    #[arg(long, conflicts_with = "delete")]
    pub count: bool,

    /// Delete every message after counting
    #[arg(long)]
    pub delete: bool,

    /// Overall timeout for the whole invocation, in seconds
    #[arg(short = 't', long, value_name = "SECONDS", default_value_t = 15)]
    pub timeout: u64,

    /// Increase diagnostic verbosity (repeatable)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Print help
    #[arg(long, action = clap::ArgAction::HelpLong)]
    help: Option<bool>,

    /// Print a short usage summary
    #[arg(long, action = clap::ArgAction::HelpShort)]
    usage: Option<bool>,
}

/// What to do with the mailbox once the count is known.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Count,
    Delete,
}

/// Everything one check invocation needs, validated and immutable.  Built
/// once from the parsed command line; both threshold specs are parsed and
/// the at-least-one-threshold rule is enforced here, before any network
/// I/O happens.
#[derive(Debug)]
pub struct CheckConfig {
    pub host: String,
    pub username: String,
    pub password: Secret<String>,
    pub action: Action,
    pub warning: Option<ThresholdRange>,
    pub critical: Option<ThresholdRange>,
    pub timeout: Duration,
}

impl CheckConfig {
    pub fn from_cli(cli: Cli) -> Result<Self, CheckError> {
        if cli.warning.is_none() && cli.critical.is_none() {
            return Err(Report::new(CheckError::MissingThreshold));
        }

        let warning = cli
            .warning
            .as_deref()
            .map(ThresholdRange::parse)
            .transpose()?;
        let critical = cli
            .critical
            .as_deref()
            .map(ThresholdRange::parse)
            .transpose()?;

        let action = if cli.delete {
            Action::Delete
        } else {
            Action::Count
        };

        Ok(CheckConfig {
            host: cli.host,
            username: cli.username,
            password: Secret::new(cli.password),
            action,
            warning,
            critical,
            timeout: Duration::from_secs(cli.timeout),
        })
    }
}

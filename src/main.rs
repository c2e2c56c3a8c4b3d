//! homee-sday - a command-line companion for a homee hub.
//!
//! Lists the homeegrams that are currently running and moves the start of an
//! s.-day phase homeegram according to last night's sleep times.

mod clock;
mod commands;
mod config;
mod error;
mod hub;
mod input;
mod protocol;
mod trigger;
mod watchdog;

use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use config::{CliOverrides, Config, PhaseSettings, Preferences};
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use error::AppError;
use input::{ClipboardSource, PromptSource, SleepTextSource};
use std::io::Write;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use watchdog::Watchdog;

#[derive(Parser)]
#[command(name = "homee-sday")]
#[command(author, version, about = "Command-line companion for a homee hub")]
struct Cli {
    /// Homee username
    // `-u` and `-p` have no long forms, so credentials are less obvious in shell history.
    #[arg(short = 'u', value_name = "USERNAME")]
    username: Option<String>,

    /// Homee password
    #[arg(short = 'p', value_name = "PASSWORD")]
    password: Option<String>,

    /// Seconds until an interaction with Homee is aborted when not getting the expected response [default: 10]
    #[arg(
        short = 't',
        long = "timeout",
        value_name = "SECONDS",
        value_parser = clap::value_parser!(u64).range(..=config::MAX_TIMEOUT_SECS)
    )]
    timeout: Option<u64>,

    /// Wait until key press after finishing
    #[arg(short = 'w', long)]
    wait: bool,

    /// Wait until key press in case of a non-command-line-related error
    #[arg(short = 'W', long)]
    wait_on_error: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump JSON about homeegrams currently running
    #[command(
        name = "dump-running-homeegrams",
        long_about = "Prints a JSON array to stdout containing the IDs of homeegrams that are \
                      currently running, along with their start timestamps. This, e.g., allows \
                      other software to check what s.-day phase currently applies.\n\n\
                      Example output: [ { \"id\": 0, \"start_epoch_secs\": 1704067200 } ]"
    )]
    DumpRunningHomeegrams,

    /// Define start time of time-triggered homeegram based on sleep times
    #[command(
        name = "update-s-day-phase-start",
        long_about = "Prompts for text or reads the clipboard. The text is searched for two clock \
                      times in the format `hour:minute` with an optional `am` or `pm` suffix, \
                      read as the start and end of the last sleep. From these the start of the \
                      s.-day phase is calculated and the existing time trigger of the s.-day \
                      phase homeegram is redefined to match it. Run it every s. morning."
    )]
    UpdateSDayPhaseStart {
        /// Read text from clipboard instead of waiting for input
        #[arg(short = 'c', long)]
        clipboard: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("homee_sday=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = match parse_cli() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version are not errors.
            let _ = e.print();
            std::process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };

    let wait = cli.wait;
    let wait_on_error = cli.wait_on_error;
    let result = run(cli).await;
    shutdown(result, wait, wait_on_error).await
}

fn parse_cli() -> Result<Cli, clap::Error> {
    let config_path = Config::config_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "config.toml".to_string());
    let matches = Cli::command()
        .after_help(format!(
            "Adjust other settings in \"{}\". Run any command to first create the config file.",
            config_path
        ))
        .try_get_matches()?;
    Cli::from_arg_matches(&matches)
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let config = Config::load_or_init().map_err(|e| AppError::Config(format!("{:#}", e)))?;
    let prefs = Preferences::merge(
        CliOverrides {
            username: cli.username,
            password: cli.password,
            timeout_secs: cli.timeout,
        },
        config,
    )?;
    info!("Using hub {} (timeout {:?})", prefs.hub_host, prefs.timeout);

    let mut watchdog = Watchdog::new(prefs.timeout);
    let mut stdout = std::io::stdout();

    let result = match cli.command {
        Commands::DumpRunningHomeegrams => {
            watchdog.arm();
            let mut session = commands::connect(&prefs, &watchdog).await?;
            let result =
                commands::dump_running_homeegrams(&mut session, &watchdog, &mut stdout).await;
            session.close().await;
            result
        }
        Commands::UpdateSDayPhaseStart { clipboard } => {
            let settings = PhaseSettings::from_config(&prefs.config)?;
            let mut source: Box<dyn SleepTextSource> = if clipboard {
                Box::new(ClipboardSource)
            } else {
                Box::new(PromptSource)
            };

            watchdog.arm();
            let mut session = commands::connect(&prefs, &watchdog).await?;
            println!("Connected to Homee.");
            let result = commands::update_s_day_phase_start(
                &mut session,
                &mut watchdog,
                &settings,
                source.as_mut(),
                &mut stdout,
            )
            .await;
            session.close().await;
            result
        }
    };

    watchdog.disarm();
    result
}

/// Report the outcome, optionally wait for a key press, and exit.
async fn shutdown(result: Result<(), AppError>, wait: bool, wait_on_error: bool) -> ! {
    let failed = result.is_err();
    let mut pause = wait;

    if let Err(e) = &result {
        eprintln!("{}", e);
        // Argument mistakes are reported right away.
        pause |= wait_on_error && !matches!(e, AppError::Usage(_));
    }
    let _ = std::io::stdout().flush();

    if pause {
        if let Err(e) = tokio::task::spawn_blocking(wait_for_key_press).await {
            debug!("Key press wait failed: {}", e);
        }
    }

    std::process::exit(if failed { 1 } else { 0 });
}

fn wait_for_key_press() {
    eprint!("Press any key...");
    let _ = std::io::stderr().flush();

    if enable_raw_mode().is_err() {
        // Not a terminal; fall back to waiting for a line.
        let _ = std::io::stdin().read_line(&mut String::new());
        return;
    }
    loop {
        match event::read() {
            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("Reading key press failed: {}", e);
                break;
            }
        }
    }
    let _ = disable_raw_mode();
    eprintln!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_flag_parses() {
        let cli = Cli::try_parse_from([
            "homee-sday",
            "-u",
            "a",
            "-p",
            "b",
            "-t",
            "30",
            "dump-running-homeegrams",
        ])
        .unwrap();
        assert_eq!(cli.timeout, Some(30));
        assert!(matches!(cli.command, Commands::DumpRunningHomeegrams));
    }

    #[test]
    fn test_oversized_timeout_flag_rejected() {
        let result = Cli::try_parse_from([
            "homee-sday",
            "-t",
            "18446744073709551615",
            "dump-running-homeegrams",
        ]);
        let err = result.err().expect("timeout beyond the cap must be rejected");
        assert!(err.use_stderr());
    }

    #[test]
    fn test_update_command_clipboard_flag() {
        let cli = Cli::try_parse_from(["homee-sday", "update-s-day-phase-start", "-c"]).unwrap();
        assert!(matches!(cli.command, Commands::UpdateSDayPhaseStart { clipboard: true }));
    }
}

use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use log::{error, info};
use simple_logger::SimpleLogger;

use orincheck::core::config::CoordinatorConfig;
use orincheck::core::coordinator::{CombinedRunOutcome, Coordinator};
use orincheck::core::error::CoordinatorError;
use orincheck::core::verdict::VerdictTier;
use orincheck::remote::ssh::SshExecutor;
use orincheck::runners::process::ProcessRunner;

/// Exit code for configuration or connectivity failures before any runner
/// has been launched.
const EXIT_PRE_LAUNCH: i32 = 2;

#[derive(Parser)]
#[command(
    name = "combined-parallel-test",
    version,
    about = "Run CPU, GPU, RAM, and storage validation tests in parallel against a remote Jetson Orin"
)]
struct Cli {
    /// Target host address
    host: Option<String>,

    /// SSH username on the target
    user: Option<String>,

    /// SSH password (prompted interactively when omitted)
    password: Option<String>,

    /// Test duration in decimal hours, e.g. 0.5
    duration_hours: Option<String>,

    /// Directory under which the timestamped output root is created
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Minimum delay between successive runner launches
    #[arg(long, value_parser = humantime::parse_duration, default_value = "2s")]
    stagger: Duration,

    /// Telemetry sampling interval
    #[arg(long, value_parser = humantime::parse_duration, default_value = "30s")]
    sample_interval: Duration,

    /// Status line interval
    #[arg(long, value_parser = humantime::parse_duration, default_value = "60s")]
    status_interval: Duration,

    /// Timeout for the pre-flight connectivity probe
    #[arg(long, value_parser = humantime::parse_duration, default_value = "10s")]
    connect_timeout: Duration,

    /// Load defaults from a TOML or JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the component runner executables
    #[arg(long)]
    runner_dir: Option<PathBuf>,

    /// External report-to-PDF converter, invoked best-effort after the run
    #[arg(long)]
    pdf_command: Option<String>,

    /// Skip the interactive confirmation
    #[arg(short = 'y', long)]
    yes: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    SimpleLogger::new()
        .with_level(log_level)
        .init()
        .context("Failed to initialize logger")?;

    info!("orincheck v{}", env!("CARGO_PKG_VERSION"));

    let config = match build_config(&cli) {
        Ok(Some(config)) => config,
        Ok(None) => {
            println!("Cancelled; no tests were started.");
            return Ok(());
        }
        Err(e) => {
            error!("{}", e);
            process::exit(EXIT_PRE_LAUNCH);
        }
    };

    // Interrupt policy: launched remote runners are left running on the
    // target; no remote cleanup is attempted (see DESIGN.md).
    ctrlc::set_handler(|| {
        eprintln!();
        eprintln!("Interrupted. Already-launched runners keep running on the target;");
        eprintln!("no remote cleanup is attempted.");
        process::exit(130);
    })
    .context("Failed to set Ctrl-C handler")?;

    let executor = Arc::new(SshExecutor::new(&config.host, &config.username, &config.password));
    let coordinator = match Coordinator::new(config, executor, Arc::new(ProcessRunner)) {
        Ok(c) => c,
        Err(e) => {
            error!("{}", e);
            process::exit(EXIT_PRE_LAUNCH);
        }
    };

    match coordinator.run() {
        Ok(outcome) => {
            print_verdict(&outcome);
            process::exit(outcome.verdict.exit_code());
        }
        Err(e) => {
            error!("Combined test failed: {}", e);
            let code = if e.is_fatal_pre_launch() { EXIT_PRE_LAUNCH } else { 1 };
            process::exit(code);
        }
    }
}

/// Assemble the run configuration from the config file, positional
/// arguments, and (when any positional is missing) interactive prompts.
/// Returns `Ok(None)` when the operator declines the confirmation.
fn build_config(cli: &Cli) -> std::result::Result<Option<CoordinatorConfig>, CoordinatorError> {
    let mut config = match &cli.config {
        Some(path) => CoordinatorConfig::from_file(path)?,
        None => CoordinatorConfig::default(),
    };

    config.stagger = cli.stagger;
    config.sample_interval = cli.sample_interval;
    config.status_interval = cli.status_interval;
    config.connect_timeout = cli.connect_timeout;
    config.output_base = cli.output_dir.clone();
    if cli.runner_dir.is_some() {
        config.runner_dir = cli.runner_dir.clone();
    }
    if cli.pdf_command.is_some() {
        config.pdf_command = cli.pdf_command.clone();
    }

    let fully_specified = cli.host.is_some()
        && cli.user.is_some()
        && cli.password.is_some()
        && cli.duration_hours.is_some();

    if fully_specified {
        config.host = cli.host.clone().unwrap();
        config.username = cli.user.clone().unwrap();
        config.password = cli.password.clone().unwrap();
        config.duration_hours =
            CoordinatorConfig::parse_duration_hours(cli.duration_hours.as_deref().unwrap())?;
        config.validate()?;
        return Ok(Some(config));
    }

    // Any missing positional switches the tool to interactive setup for
    // all configuration fields.
    interactive_setup(&mut config, cli.yes)
}

fn interactive_setup(
    config: &mut CoordinatorConfig,
    skip_confirm: bool,
) -> std::result::Result<Option<CoordinatorConfig>, CoordinatorError> {
    println!("Combined parallel test setup");
    println!("============================");

    config.host = prompt("Target host address: ")?;
    config.username = prompt("Username: ")?;
    config.password = rpassword::prompt_password("Password: ")
        .map_err(|e| CoordinatorError::Config(format!("Failed to read password: {}", e)))?;
    let duration_input = prompt("Test duration (hours, e.g. 0.5): ")?;
    config.duration_hours = CoordinatorConfig::parse_duration_hours(&duration_input)?;
    config.validate()?;

    println!();
    println!("Configuration:");
    println!("  Host:     {}", config.host);
    println!("  User:     {}", config.username);
    println!("  Password: {}", "*".repeat(config.password.chars().count().max(1)));
    println!("  Duration: {} h ({} s)", config.duration_hours, config.duration_seconds());
    println!();

    if !skip_confirm {
        let answer = prompt("Proceed with the combined test? (yes/no): ")?;
        if !matches!(answer.trim().chars().next(), Some('y') | Some('Y')) {
            return Ok(None);
        }
    }

    Ok(Some(config.clone()))
}

fn prompt(label: &str) -> std::result::Result<String, CoordinatorError> {
    print!("{}", label);
    io::stdout()
        .flush()
        .map_err(|e| CoordinatorError::Config(format!("Failed to flush prompt: {}", e)))?;

    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .map_err(|e| CoordinatorError::Config(format!("Failed to read input: {}", e)))?;

    let value = input.trim().to_string();
    if value.is_empty() {
        return Err(CoordinatorError::Config(format!(
            "Missing required value for {}",
            label.trim_end_matches(": ")
        )));
    }
    Ok(value)
}

fn print_verdict(outcome: &CombinedRunOutcome) {
    let tier_str = match outcome.verdict.tier {
        VerdictTier::Excellent => outcome.verdict.tier.label().green().bold(),
        VerdictTier::AcceptableWithConcerns => outcome.verdict.tier.label().yellow().bold(),
        VerdictTier::SystemIssuesDetected => outcome.verdict.tier.label().red().bold(),
    };

    println!();
    println!("{}", "COMBINED TEST VERDICT".bold());
    println!("=====================");
    for result in &outcome.results {
        let status = if result.passed() {
            result.status_label().green()
        } else {
            result.status_label().red()
        };
        println!("  {:<8} {} (exit code {})", result.kind.to_string(), status, result.exit_code);
    }
    println!();
    println!(
        "  {} of {} passed ({}%) -> {}",
        outcome.verdict.passed, outcome.verdict.total, outcome.verdict.rate, tier_str
    );
    if outcome.report_written {
        println!("  Report: {}", outcome.layout.combined_report().display());
    } else {
        println!("  {}", "Report generation failed; see log output above.".red());
    }
}

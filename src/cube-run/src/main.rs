// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

mod config;

use std::future;
use std::path::PathBuf;
use std::process::ExitCode;
use std::ptr::NonNull;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};

use cube_app::{init_logging, load_backend_plugins, ConfigFile};
use cube_backend::{register_builtin_backends_on, BackendAccess, RegistrationContext};
use cube_core::motion::session::{run_sequence_until, HomeCall, MotionPlan, RunReport};
use cube_core::{DeviceSession, DynResult, MotionController, SessionError};

use config::RunConfig;

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - servo cube motion runner");

const EXIT_OK: u8 = 0;
const EXIT_USAGE: u8 = 1;
const EXIT_DEVICE: u8 = 2;
const EXIT_ABORTED: u8 = 3;
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Debug, Parser)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// Serial number of the cube to drive
    #[arg(short = 's', long = "serial")]
    serial: Option<String>,
    /// Vendor library installation directory
    #[arg(long = "library-path", value_name = "DIR")]
    library_path: Option<PathBuf>,
    /// Controller backend to use (e.g. sim)
    #[arg(short = 'b', long = "backend")]
    backend: Option<String>,
    /// Stop the sequence at the first failed motion command
    #[arg(long = "abort-on-error")]
    abort_on_error: bool,
    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log-level")]
    log_level: Option<String>,
    /// Print the run report as JSON on stdout
    #[arg(long = "json")]
    json: bool,
}

/// Fold CLI overrides into the loaded configuration.
fn apply_cli(cli: &Cli, mut cfg: RunConfig) -> RunConfig {
    if let Some(serial) = &cli.serial {
        cfg.device.serial = serial.trim().to_string();
    }
    if let Some(backend) = &cli.backend {
        cfg.device.backend = backend.clone();
    }
    if let Some(path) = &cli.library_path {
        cfg.device.library_path = path.clone();
    }
    if cli.abort_on_error {
        cfg.motion.abort_on_error = true;
    }
    if cli.log_level.is_some() {
        cfg.general.log_level = cli.log_level.clone();
    }
    cfg
}

fn load_config(cli: &Cli) -> DynResult<(RunConfig, Option<PathBuf>)> {
    let (cfg, path) = match &cli.config {
        Some(path) => (RunConfig::load_from_file(path)?, Some(path.clone())),
        None => RunConfig::load_from_default_paths()?,
    };
    let cfg = apply_cli(cli, cfg);
    cfg.validate()
        .map_err(|e| format!("Invalid cube-run configuration: {}", e))?;
    Ok((cfg, path))
}

fn build_controller(
    registry: &RegistrationContext,
    cfg: &RunConfig,
) -> Result<Arc<dyn MotionController>, (u8, String)> {
    if !registry.is_backend_registered(&cfg.device.backend) {
        return Err((
            EXIT_USAGE,
            format!(
                "Unknown controller backend: {} (available: {})",
                cfg.device.backend,
                registry.registered_backends().join(", ")
            ),
        ));
    }
    let access = BackendAccess {
        serial: cfg.device.serial.clone(),
        library_path: cfg.device.library_path.clone(),
    };
    registry
        .build_controller(&cfg.device.backend, access)
        .map_err(|e| (EXIT_DEVICE, format!("Backend {} failed: {}", cfg.device.backend, e)))
}

fn summarize(report: &RunReport) {
    match (&report.config.strategy_used, report.config.warning()) {
        (Some(strategy), _) => info!("Configuration loaded with '{}' settings", strategy),
        (None, Some(warning)) => warn!("Configuration: {}", warning),
        (None, None) => {}
    }

    match &report.home.call {
        HomeCall::Returned => info!("Home call returned"),
        HomeCall::Failed(cause) => warn!("Home call raised: {}", cause),
        HomeCall::StillRunning => warn!("Home call still running after join wait"),
    }
    match &report.home.indicator {
        Some(name) => info!("Homed (confirmed by {})", name),
        None => warn!("Homing not confirmed"),
    }

    for outcome in &report.outcomes {
        match &outcome.error {
            None => info!("{}: ok", outcome.command),
            Some(cause) => error!("{}: {}", outcome.command, cause),
        }
    }
    if report.aborted {
        error!("Sequence aborted after a motion error");
    }
}

fn exit_code(result: &Result<RunReport, SessionError>) -> u8 {
    match result {
        Ok(report) if report.aborted => EXIT_ABORTED,
        Ok(_) => EXIT_OK,
        Err(SessionError::Interrupted) => EXIT_INTERRUPTED,
        Err(_) => EXIT_DEVICE,
    }
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn wait_for_ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Ctrl+C received, stopping the run"),
        Err(e) => {
            warn!("Cannot listen for Ctrl+C: {}", e);
            future::pending::<()>().await;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", RunConfig::example_toml());
        return ExitCode::SUCCESS;
    }

    let (cfg, config_path) = match load_config(&cli) {
        Ok(loaded) => loaded,
        Err(e) => {
            init_logging(cli.log_level.as_deref());
            error!("{}", e);
            return ExitCode::from(EXIT_USAGE);
        }
    };

    init_logging(cfg.general.log_level.as_deref());

    if let Some(path) = &config_path {
        info!("Loaded configuration from {}", path.display());
    }

    let library_path = &cfg.device.library_path;
    let mut extra_plugin_dirs = Vec::new();
    if library_path.is_dir() {
        extra_plugin_dirs.push(library_path.clone());
    } else {
        warn!(
            "Vendor library path {} does not exist; only the built-in backends and plugin directories are available",
            library_path.display()
        );
    }

    let mut registry = RegistrationContext::new();
    register_builtin_backends_on(&mut registry);
    let registry_ptr = NonNull::from(&mut registry).cast();
    let plugin_libs = load_backend_plugins(registry_ptr, &extra_plugin_dirs);
    // An abandoned home call keeps plugin code alive in a detached task until
    // the runtime shuts down, after main returns. Never unload the libraries.
    std::mem::forget(plugin_libs);

    let controller = match build_controller(&registry, &cfg) {
        Ok(controller) => controller,
        Err((code, message)) => {
            error!("{}", message);
            return ExitCode::from(code);
        }
    };

    info!(
        "Starting cube-run (serial: {}, backend: {})",
        cfg.device.serial, cfg.device.backend
    );

    let mut session =
        DeviceSession::new(controller, cfg.timing.to_timings()).with_probe(cfg.motion.probe());
    let plan = MotionPlan::new(cfg.device.serial.clone(), cfg.motion.commands())
        .with_strategies(cfg.motion.strategies())
        .with_error_policy(cfg.motion.error_policy());

    let result = run_sequence_until(&mut session, &plan, wait_for_ctrl_c()).await;
    match &result {
        Ok(report) => {
            summarize(report);
            if cli.json {
                match serde_json::to_string_pretty(report) {
                    Ok(json) => println!("{}", json),
                    Err(e) => error!("Failed to encode report: {}", e),
                }
            }
        }
        Err(e) => error!("Run failed: {}", e),
    }

    ExitCode::from(exit_code(&result))
}

#[cfg(test)]
mod tests {
    use cube_core::motion::session::{CommandOutcome, HomeResult, LoadResult};
    use cube_core::{MotionCommand, Position};

    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("cube-run").chain(args.iter().copied()))
    }

    fn report(aborted: bool) -> RunReport {
        RunReport {
            serial: "27501283".to_string(),
            config: LoadResult {
                succeeded: true,
                strategy_used: Some("file".to_string()),
                failures: Vec::new(),
            },
            home: HomeResult {
                homed: true,
                indicator: Some("IsHomed".to_string()),
                call: HomeCall::Returned,
            },
            outcomes: vec![CommandOutcome {
                command: MotionCommand::MoveAbsolute(Position::from_mm(2)),
                error: aborted.then(|| "move_to failed".to_string()),
            }],
            aborted,
        }
    }

    #[test]
    fn test_cli_overrides_config() {
        let cli = cli(&[
            "-s",
            " 27000423 ",
            "-b",
            "kinesis",
            "--library-path",
            "/srv/kinesis",
            "--abort-on-error",
            "--log-level",
            "debug",
        ]);
        let cfg = apply_cli(&cli, RunConfig::default());
        assert_eq!(cfg.device.serial, "27000423");
        assert_eq!(cfg.device.backend, "kinesis");
        assert_eq!(cfg.device.library_path, PathBuf::from("/srv/kinesis"));
        assert!(cfg.motion.abort_on_error);
        assert_eq!(cfg.general.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_no_flags_keep_config() {
        let mut base = RunConfig::default();
        base.motion.abort_on_error = true;
        let cfg = apply_cli(&cli(&[]), base);
        assert_eq!(cfg.device.serial, config::DEFAULT_SERIAL);
        assert_eq!(cfg.device.backend, config::DEFAULT_BACKEND);
        assert!(cfg.motion.abort_on_error);
    }

    #[test]
    fn test_unknown_backend_is_usage_error() {
        let mut registry = RegistrationContext::new();
        register_builtin_backends_on(&mut registry);
        let cfg = apply_cli(&cli(&["-b", "kinesis"]), RunConfig::default());
        let (code, message) = build_controller(&registry, &cfg).err().unwrap();
        assert_eq!(code, EXIT_USAGE);
        assert!(message.contains("available: sim"));

        assert!(build_controller(&registry, &RunConfig::default()).is_ok());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&Ok(report(false))), EXIT_OK);
        assert_eq!(exit_code(&Ok(report(true))), EXIT_ABORTED);
        let err = SessionError::Discovery("no bus".to_string());
        assert_eq!(exit_code(&Err(err)), EXIT_DEVICE);
        assert_eq!(exit_code(&Err(SessionError::Interrupted)), EXIT_INTERRUPTED);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_plan_runs_on_sim() {
        let mut registry = RegistrationContext::new();
        register_builtin_backends_on(&mut registry);
        let cfg = RunConfig::default();
        let controller = build_controller(&registry, &cfg).unwrap();
        let mut session = DeviceSession::new(controller, cfg.timing.to_timings())
            .with_probe(cfg.motion.probe());
        let plan = MotionPlan::new(cfg.device.serial.clone(), cfg.motion.commands())
            .with_strategies(cfg.motion.strategies());

        let result = run_sequence_until(&mut session, &plan, std::future::pending()).await;

        let report = result.as_ref().unwrap();
        assert!(report.home.homed);
        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.failed_commands(), 0);
        assert_eq!(exit_code(&result), EXIT_OK);
    }
}

//! CLI smoke entry point.
//!
//! # Responsibility
//! - Run the unload verifier against an in-process demo host and print
//!   service messages on stdout.
//! - Exit `0` for passed or skipped runs, `1` for failed runs and `2` for
//!   harness errors.

mod demo;

use log::error;
use std::process::ExitCode;
use std::sync::Arc;
use unload_verifier_core::{
    default_log_level, init_logging, shutdown_within, DedicatedThreadContext,
    DirectoryArtifactStore, HarnessConfig, HarnessError, HarnessResult, HarnessSettings,
    RunOutcome, ServiceMessageSink, SettleCollector, UnloadHarness,
};

fn main() -> ExitCode {
    let config = match HarnessConfig::load_from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("unload-verifier: {err}");
            return ExitCode::from(2);
        }
    };

    let log_dir = config.artifact_dir().join("logs");
    let level = config.log_level().unwrap_or(default_log_level());
    if let Err(err) = init_logging(level, &log_dir.to_string_lossy()) {
        eprintln!("unload-verifier: logging disabled: {err}");
    }

    match run(&config) {
        Ok(RunOutcome::Skipped(reason)) => {
            eprintln!("unload-verifier: skipped: {reason}");
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::Completed(report)) => {
            match serde_json::to_string_pretty(&report) {
                Ok(summary) => eprintln!("{summary}"),
                Err(err) => error!("event=cli_summary module=cli status=error error={err}"),
            }
            match report.failure_message() {
                None => ExitCode::SUCCESS,
                Some(message) => {
                    eprintln!("unload-verifier: {message}");
                    ExitCode::from(1)
                }
            }
        }
        Err(err) => {
            eprintln!("unload-verifier: {err}");
            ExitCode::from(2)
        }
    }
}

fn run(config: &HarnessConfig) -> HarnessResult<RunOutcome> {
    let settings = HarnessSettings::from_config(config)?;
    let registry = Arc::new(demo::demo_registry(&settings.base_layer));
    let context = Arc::new(
        DedicatedThreadContext::spawn("unload-verifier-host")
            .map_err(|err| HarnessError::ExecutionUnavailable(err.to_string()))?,
    );
    let harness = UnloadHarness::new(
        registry,
        context.clone(),
        Arc::new(SettleCollector::new(config.settle())),
        Arc::new(DirectoryArtifactStore::new(config.artifact_dir())),
        settings,
    );

    let mut sink = ServiceMessageSink::stdout();
    let outcome = harness.run(&config.policy(), &mut sink)?;

    shutdown_within(config.shutdown_wait(), move || context.close())?;
    Ok(outcome)
}

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info};

use magento_cloud_scd::config::{Action, Cli, Config};
use magento_cloud_scd::database::MysqlCli;
use magento_cloud_scd::dispatcher::ParallelDispatcher;
use magento_cloud_scd::environment::{Environment, FileFlags};
use magento_cloud_scd::error::DeployError;
use magento_cloud_scd::locale::LocaleCode;
use magento_cloud_scd::logging::{init_logging, LogConfig};
use magento_cloud_scd::planner::{final_stage, DeployOutcome, Plan, StaticDeployPlanner};
use magento_cloud_scd::shell::ProcessShell;
use magento_cloud_scd::snapshot::{error_chain, SnapshotBuilder, SnapshotOutcome};
use magento_cloud_scd::store::ConfigArtifact;

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            let code = e
                .downcast_ref::<DeployError>()
                .map(DeployError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(&LogConfig::from_env(cli.verbose)).context("Failed to initialize logging")?;
    let config = Config::from_cli(cli)?;

    // Validate Magento root
    if !config.magento_root.is_dir() {
        bail!("Magento root not found: {}", config.magento_root.display());
    }

    // Setup Ctrl+C handler
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_clone.store(true, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    let env = Environment::from_env();
    let artifact = ConfigArtifact::new(config.config_file.clone());

    if matches!(config.action, Action::Dump | Action::Run) {
        run_dump(&config, &env, artifact.clone());
    }

    if matches!(config.action, Action::Deploy | Action::Run) {
        let admin_locale = config
            .admin_locale
            .clone()
            .unwrap_or_else(|| env.admin_locale());
        run_deploy(&config, artifact, admin_locale, shutdown)?;
    }

    Ok(ExitCode::SUCCESS)
}

/// Config snapshot. Failures are logged, never fatal.
fn run_dump(config: &Config, env: &Environment, artifact: ConfigArtifact) {
    let database = match env.database() {
        Ok(relationship) => relationship,
        Err(e) => {
            error!("Something went wrong in running app:config:dump");
            error!("{}", error_chain(&e));
            return;
        }
    };

    let shell = ProcessShell::new(config.command_timeout);
    let db = MysqlCli::new(ProcessShell::new(config.command_timeout), database);
    let builder = SnapshotBuilder::for_magento(shell, db, artifact, &config.magento_root);

    let outcome = builder.build_snapshot();
    if let SnapshotOutcome::Persisted(report) = &outcome {
        info!(
            path = %report.path.display(),
            scrubbed = report.scrubbed_paths.len(),
            "Config snapshot persisted"
        );
    }
    info!(stage = %outcome.stage(), "config dump finished");
}

fn run_deploy(
    config: &Config,
    artifact: ConfigArtifact,
    admin_locale: LocaleCode,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let dispatcher = ParallelDispatcher::new(shutdown)
        .with_timeout(config.command_timeout)
        .with_progress(config.verbose);
    let planner = StaticDeployPlanner::new(
        dispatcher,
        FileFlags::new(&config.magento_root),
        artifact,
        config.build.clone(),
        admin_locale,
        config.magento_root.clone(),
    );

    if config.dry_run {
        match planner.plan()? {
            Plan::Skip(reason) => println!("Skipping static content deploy: {}", reason),
            Plan::Invoke(plan) => {
                println!("{}", plan.summary());
                for command in &plan.batch.commands {
                    println!("  {}", command);
                }
            }
        }
        return Ok(());
    }

    let start = Instant::now();
    let result = planner.deploy();
    let stage = final_stage(&result);
    if let Err(e) = &result {
        error!(stage = %stage, "{}", error_chain(e));
    }
    match result? {
        DeployOutcome::Deployed(report) => {
            println!(
                "Deployed static content for {} locale(s) in {:.2}s using {} thread(s)",
                report.results.len(),
                start.elapsed().as_secs_f64(),
                report.threads
            );
            for result in &report.results {
                println!(
                    "  {}: {:.2}s",
                    result.command,
                    result.duration.as_secs_f64()
                );
            }
        }
        DeployOutcome::Skipped(reason) => {
            info!(reason = %reason, stage = %stage, "static content deploy finished");
        }
    }

    Ok(())
}

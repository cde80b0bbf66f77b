use anyhow::{bail, Context};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::analyzers::verify_file;
use crate::archive::{CdsClient, CdsCredentials, ExistingDataPolicy, RawStore, RetrievalManager};
use crate::cli::args::{Cli, Commands};
use crate::cli::prompt::ConsoleDecision;
use crate::models::build_units;
use crate::processors::{Pipeline, PipelineAction, PipelineOptions};
use crate::settings::Settings;
use crate::utils::constants::DEFAULT_CONFIG_FILE;
use crate::utils::filename::DataLayout;

/// stderr logging filtered by `RUST_LOG` (info by default, debug with
/// `--verbose`), plus a plain-text copy in `log_file` when given.
pub fn init_logging(verbose: bool, log_file: Option<&Path>) -> anyhow::Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("initialising logging")?;
    Ok(())
}

struct Selection {
    action: PipelineAction,
    policy: ExistingDataPolicy,
    station: Option<String>,
}

fn select(command: Commands) -> Option<Selection> {
    let (action, overwrite, yes, station) = match command {
        Commands::Download {
            overwrite,
            yes,
            station,
        } => (PipelineAction::Download, overwrite, yes, station),
        Commands::Process { overwrite, station } => {
            (PipelineAction::Process, overwrite, true, station)
        }
        Commands::Encode { overwrite, station } => (PipelineAction::Encode, overwrite, true, station),
        Commands::Run {
            overwrite,
            yes,
            station,
        } => (PipelineAction::All, overwrite, yes, station),
        Commands::Verify { .. } => return None,
    };
    Some(Selection {
        action,
        policy: ExistingDataPolicy::from_flags(overwrite, yes),
        station,
    })
}

pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    init_logging(cli.verbose, cli.log_file.as_deref())?;

    if let Commands::Verify { file } = &cli.command {
        println!("{}", verify_file(file)?);
        return Ok(ExitCode::SUCCESS);
    }

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let mut settings = Settings::load(&config_path, cli.config.is_some())
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;
    if let Some(dir) = cli.data_dir {
        settings.data_dir = dir;
    }

    let Some(selection) = select(cli.command) else {
        return Ok(ExitCode::SUCCESS);
    };

    let mut stations = settings.station_requests()?;
    if let Some(id) = &selection.station {
        stations.retain(|s| &s.id == id);
        if stations.is_empty() {
            bail!("station '{}' is not in the configuration", id);
        }
    }

    let units = build_units(&stations, settings.retrieval.format);
    info!(
        "{} stations, {} units, data directory {}",
        stations.len(),
        units.len(),
        settings.data_dir.display()
    );

    let layout = DataLayout::new(&settings.data_dir);
    let options = PipelineOptions {
        action: selection.action,
        policy: selection.policy,
        max_workers: settings.processing.workers(),
        correction: settings.processing.correction_config(),
        silent: !std::io::stderr().is_terminal(),
    };
    let mut pipeline = Pipeline::new(layout.clone(), options)?;

    if matches!(selection.action, PipelineAction::Download | PipelineAction::All) {
        let credentials = CdsCredentials::resolve(settings.cds.url.clone(), settings.cds.key.clone())?;
        let client = CdsClient::new(credentials)?
            .with_poll_interval(settings.retrieval.poll_interval());
        let retrieval = RetrievalManager::new(Arc::new(client), RawStore::new(layout))
            .with_max_concurrent(settings.retrieval.max_concurrent_requests)
            .with_retry(settings.retrieval.retry_policy())
            .with_timeout(settings.retrieval.request_timeout())
            .with_decision_source(Arc::new(ConsoleDecision::new()));
        pipeline = pipeline.with_retrieval(retrieval);
    }

    let report = pipeline.run(&units).await?;
    println!("\n{}", report.generate_summary());

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_selection() {
        let selection = select(Commands::Run {
            overwrite: false,
            yes: false,
            station: None,
        })
        .unwrap();
        assert_eq!(selection.action, PipelineAction::All);
        assert_eq!(selection.policy, ExistingDataPolicy::Prompt);

        let selection = select(Commands::Process {
            overwrite: true,
            station: Some("SiteA".into()),
        })
        .unwrap();
        assert_eq!(selection.policy, ExistingDataPolicy::ForceOverwrite);
        assert_eq!(selection.station.as_deref(), Some("SiteA"));

        assert!(select(Commands::Verify {
            file: PathBuf::from("x.SFC")
        })
        .is_none());
    }
}

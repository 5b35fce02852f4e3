//! `relaycast run`: start the proxy server.
//!
//! Resolves the target list from the command line and/or a config file,
//! prepares the scratch directory, serves until a shutdown signal, then
//! waits (bounded by the delivery timeout) for in-flight broadcasts to
//! finish before exiting.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::buffer::RequestBuffer;
use crate::cli::RunArgs;
use crate::config::model::Config;
use crate::config::sources;
use crate::config::validation;
use crate::config::ConfigSource;
use crate::drain::DrainController;
use crate::error::RelaycastError;
use crate::ids::UuidGenerator;
use crate::logging;
use crate::server::{self, AppState, Stats};
use crate::target::Target;

pub async fn execute(args: RunArgs) -> Result<(), RelaycastError> {
    let log_format = logging::resolve_format(args.pretty, args.json);
    logging::init(&args.log_level, log_format);

    let config = load_config(&args).await?;
    let config = apply_cli_overrides(config, &args);

    if let Err(errors) = validation::validate(&config) {
        return Err(RelaycastError::ConfigValidation { errors });
    }

    let targets = parse_targets(&config.targets)?;
    let scratch_dir = config
        .scratch_dir
        .clone()
        .unwrap_or_else(std::env::temp_dir);
    prepare_scratch_dir(&scratch_dir).await?;

    let timeout = Duration::from_millis(config.timeout);
    let drain = Arc::new(DrainController::new());
    let stats = Arc::new(Stats::new());

    let state = Arc::new(AppState {
        targets: targets.into(),
        http_client: server::build_http_client(),
        buffer: RequestBuffer::new(scratch_dir.clone()),
        drain: drain.clone(),
        ids: Arc::new(UuidGenerator),
        timeout,
        stats: stats.clone(),
    });

    let router = server::build_router(state.clone(), args.max_body);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        addr = %addr,
        primary = %state.targets[0],
        secondaries = state.targets.len() - 1,
        timeout_ms = config.timeout,
        scratch_dir = %scratch_dir.display(),
        "relaycast started"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(server::shutdown_signal())
        .await?;

    if !drain.wait_for_zero_within(timeout).await {
        tracing::warn!(
            in_flight = drain.in_flight(),
            "shutting down with broadcasts still in flight"
        );
    }

    stats.log_summary();
    tracing::info!("relaycast stopped");
    Ok(())
}

async fn load_config(args: &RunArgs) -> Result<Config, RelaycastError> {
    let cwd = std::env::current_dir()?;
    match sources::resolve_file_source(args.config.as_deref(), &cwd).await? {
        Some(source) => {
            tracing::info!(
                source = source.name(),
                path = %source.path().display(),
                "loading config"
            );
            source.load().await
        }
        None if !args.targets.is_empty() => Ok(Config::default()),
        None => Err(RelaycastError::NoConfigSource {
            hint: "Provide --targets <url,url,...> or --config <file>.\n  \
                   Without either, ./relaycast.yaml is used when present."
                .into(),
        }),
    }
}

/// Command-line values take precedence over the config file.
#[must_use]
pub fn apply_cli_overrides(mut config: Config, args: &RunArgs) -> Config {
    if !args.targets.is_empty() {
        config.targets.clone_from(&args.targets);
    }
    if let Some(timeout) = args.timeout {
        config.timeout = timeout;
    }
    if let Some(ref dir) = args.scratch_dir {
        config.scratch_dir = Some(dir.clone());
    }
    config
}

pub fn parse_targets(urls: &[String]) -> Result<Vec<Target>, RelaycastError> {
    urls.iter()
        .map(|url| {
            Target::parse(url).map_err(|source| RelaycastError::TargetParse {
                url: url.clone(),
                source,
            })
        })
        .collect()
}

async fn prepare_scratch_dir(dir: &Path) -> Result<(), RelaycastError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| RelaycastError::ScratchDir {
            path: dir.to_path_buf(),
            source,
        })
}

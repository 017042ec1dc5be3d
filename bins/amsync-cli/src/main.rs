//! # amsync-cli
//!
//! Command-line runner for the AM-to-local-replica ingestion pipeline.
//!
//! ```bash
//! amsync-cli run --settings settings.json --env prd --auth cert
//! amsync-cli run --settings settings.json --env tei --auth cookie --cookie "$AM_COOKIE"
//! RUST_LOG=debug amsync-cli run --settings settings.json --env dev --auth jwt --pipeline-mode
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use amsync_core::retry::retry_bounded;
use amsync_core::{AuthMethod, Environment};
use amsync_pipeline::{load_settings, PipelineController};
use amsync_store::ArangoStore;
use amsync_upstream::auth::build_requester;
use amsync_upstream::{EmInfraClient, EmsonClient};

/// Attempts for the startup connectivity probes, spaced a few seconds
/// apart — enough to ride out an upstream that's mid-restart without
/// hanging forever on a genuinely unreachable one.
const CONNECTIVITY_CHECK_ATTEMPTS: u64 = 5;
const CONNECTIVITY_CHECK_DELAY: Duration = Duration::from_secs(3);

#[derive(Parser, Debug)]
#[command(name = "amsync-cli")]
#[command(about = "AM-to-local-replica ingestion pipeline runner")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline to completion (or resume it from its last
    /// persisted step).
    Run {
        /// Path to the settings JSON file.
        #[arg(long)]
        settings: std::path::PathBuf,

        /// Target AM environment.
        #[arg(long, value_enum)]
        env: EnvArg,

        /// Authentication mechanism to use against the upstream APIs.
        #[arg(long, value_enum)]
        auth: AuthArg,

        /// Session cookie value, required when `--auth cookie` is used.
        #[arg(long)]
        cookie: Option<String>,

        /// Page size for paged upstream listings.
        #[arg(long, default_value_t = 100)]
        page_size: u64,

        /// Run the high-volume resources (`assets`, `assetrelaties`)
        /// through the producer/consumer pipeline mode instead of the
        /// simple sequential fetch/handle loop.
        #[arg(long)]
        pipeline_mode: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum EnvArg {
    Prd,
    Dev,
    Tei,
    Aim,
}

impl From<EnvArg> for Environment {
    fn from(value: EnvArg) -> Self {
        match value {
            EnvArg::Prd => Environment::Prd,
            EnvArg::Dev => Environment::Dev,
            EnvArg::Tei => Environment::Tei,
            EnvArg::Aim => Environment::Aim,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum AuthArg {
    Jwt,
    Cert,
    Cookie,
}

impl From<AuthArg> for AuthMethod {
    fn from(value: AuthArg) -> Self {
        match value {
            AuthArg::Jwt => AuthMethod::Jwt,
            AuthArg::Cert => AuthMethod::Cert,
            AuthArg::Cookie => AuthMethod::Cookie,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => Ok(()),
        Err(err) => {
            error!(error = %err, "pipeline run failed");
            Err(err)
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let Command::Run { settings, env, auth, cookie, page_size, pipeline_mode } = args.command;

    let env: Environment = env.into();
    let auth: AuthMethod = auth.into();

    if matches!(auth, AuthMethod::Cookie) && cookie.is_none() {
        anyhow::bail!("--auth cookie requires --cookie <value>");
    }

    let settings = load_settings(&settings).context("loading settings file")?;
    let db_settings = settings
        .databases
        .get(&env)
        .with_context(|| format!("no database settings for environment {env}"))?;

    let store = ArangoStore::new(
        db_settings.base_url.clone(),
        db_settings.database.clone(),
        match (&db_settings.username, &db_settings.password) {
            (Some(u), Some(p)) => Some((u.as_str(), p.as_str())),
            _ => None,
        },
    );

    let em_infra_requester = build_requester(auth, env, &settings.authentication, cookie.as_deref())
        .context("building EM-Infra requester")?;
    let emson_requester = build_requester(auth, env, &settings.authentication, cookie.as_deref())
        .context("building EMSON requester")?;

    let em_infra = EmInfraClient::new(em_infra_requester);
    let emson = EmsonClient::new(emson_requester);

    retry_bounded("em-infra connectivity check", CONNECTIVITY_CHECK_DELAY, CONNECTIVITY_CHECK_ATTEMPTS, || {
        em_infra.test_connection()
    })
    .await
    .context("EM-Infra connectivity check failed")?;
    retry_bounded("emson connectivity check", CONNECTIVITY_CHECK_DELAY, CONNECTIVITY_CHECK_ATTEMPTS, || {
        emson.test_connection()
    })
    .await
    .context("EMSON connectivity check failed")?;

    PipelineController::new(&store, &em_infra, &emson)
        .with_page_size(page_size)
        .with_pipeline_mode(pipeline_mode)
        .run()
        .await
        .context("pipeline run failed")?;

    Ok(())
}

///
/// This module implements the CLI interface for thingsync: argument parsing,
/// config loading, and the async `run` entrypoint shared by `main()` and the
/// integration tests.
///
/// All publish logic (data model, staleness rules, orchestration) lives in the
/// [`thingsync-core`] crate. This module is glue: it resolves credentials,
/// wires the HTTP client into a `Publisher`, and persists the project config
/// once the run ends.
///
/// [`thingsync-core`]: ../../thingsync-core/
use crate::load_config::{
    default_user_config_path, ingest_project_texts, load_config, DEFAULT_PROJECT_CONFIG,
};
use crate::upload::ThingClient;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use thingsync_core::config::CredentialOverrides;
use thingsync_core::publish::{AttachmentOutcome, PublishReport, Publisher};

/// CLI for thingsync: publish a 3D-printable project to its remote thing.
#[derive(Parser, Debug)]
#[clap(
    name = "thingsync",
    version,
    about = "Create or update a remote thing and upload its files and images when they changed"
)]
pub struct Cli {
    /// Bearer token (overrides the user config)
    #[clap(long, env = "THINGSYNC_BEARER_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Account username (overrides the user config)
    #[clap(long, env = "THINGSYNC_USERNAME")]
    pub username: Option<String>,

    /// Log at debug level
    #[clap(short, long)]
    pub verbose: bool,

    /// Path to the project config file
    #[clap(long, default_value = DEFAULT_PROJECT_CONFIG)]
    pub config: PathBuf,

    /// Path to the user config file [default: <config dir>/thingsync/config.json]
    #[clap(long)]
    pub user_config: Option<PathBuf>,

    /// Resolve and print the thing metadata without calling the API or writing files
    #[clap(long)]
    pub dry_run: bool,
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!(config = %cli.config.display(), dry_run = cli.dry_run, "thingsync starting");

    let user_path = cli.user_config.clone().or_else(default_user_config_path);
    let loaded = load_config(user_path.as_deref(), &cli.config)?;
    let project_dir = loaded.project_dir();

    let mut config = loaded.config.clone();
    let ingested = ingest_project_texts(&mut config, &project_dir)?;

    let credentials = config.credentials(&CredentialOverrides {
        bearer_token: cli.token.clone(),
        username: cli.username.clone(),
    })?;

    if cli.dry_run {
        let payload = config.thing.payload();
        println!("{}", serde_json::to_string_pretty(&payload)?);
        println!(
            "Would publish as {} to {} ({} files, {} images)",
            credentials.username,
            config.api_url(),
            config.files.len(),
            config.images.len()
        );
        return Ok(());
    }

    let client = ThingClient::new(config.api_url(), &credentials)?;
    let mut publisher = Publisher::new(client, config, credentials, &project_dir);
    let result = publisher.publish().await;

    // Identifiers learned before a failure are kept for the next run.
    let saved = loaded.save(&publisher.into_config(), &ingested);

    match (result, saved) {
        (Ok(report), Ok(())) => {
            tracing::info!(command = "publish", ?report, "Publish complete");
            print_report(&report);
            Ok(())
        }
        (Ok(_), Err(e)) => Err(e),
        (Err(e), saved) => {
            if let Err(save_err) = saved {
                tracing::error!(error = %save_err, "Could not save project config after failed run");
            }
            tracing::error!(command = "publish", error = %e, "Publish failed");
            Err(anyhow::Error::new(e).context("Publish failed"))
        }
    }
}

fn print_report(report: &PublishReport) {
    println!("Publish complete: thing {} ({:?})", report.thing_id, report.thing_action);
    for attachment in &report.attachments {
        let what = match attachment.outcome {
            AttachmentOutcome::Uploaded => "uploaded",
            AttachmentOutcome::Replaced => "replaced",
            AttachmentOutcome::UpToDate => "up to date",
        };
        println!("  {} {}: {}", attachment.kind, attachment.path, what);
    }
}

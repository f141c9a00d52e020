use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::exit;
use std::sync::mpsc::channel;
use std::sync::Arc;
use tracing::{debug, error};
use vault_snapshot::snapshot::app_config::AppConfig;
use vault_snapshot::snapshot::credentials::Credentials;
use vault_snapshot::snapshot::progress::{ChannelSink, ProgressEvent};
use vault_snapshot::snapshot::redacted::{RedactedString, REDACTED_SECRET};
use vault_snapshot::snapshot::result_error::error::Error;
use vault_snapshot::snapshot::result_error::result::Result;
use vault_snapshot::snapshot::runner::SnapshotRunner;
use vault_snapshot::snapshot::upload::UploaderConfig;

/// Snapshot the agents, prompts and outputs folders, optionally to Backblaze B2
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Location of the application config file
    #[arg(short, long, default_value = "vault-snapshot.yml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create one snapshot and wait for it to finish
    Run {
        /// Keep the archives local, ignoring the configured uploader
        #[arg(long)]
        local_only: bool,

        /// Store the overrides before running
        #[arg(long)]
        save: bool,

        #[command(flatten)]
        overrides: Overrides,
    },
    /// Merge the given values into the stored credentials
    Save {
        #[command(flatten)]
        overrides: Overrides,
    },
    /// Print the stored credentials, secret redacted
    Show,
}

#[derive(Args, Debug, Default)]
struct Overrides {
    #[arg(long)]
    agent_folder: Option<String>,
    #[arg(long)]
    prompt_folder: Option<String>,
    #[arg(long)]
    output_folder: Option<String>,
    #[arg(long)]
    snapshot_folder: Option<String>,
    #[arg(long)]
    b2_key_id: Option<String>,
    #[arg(long)]
    b2_key_secret: Option<String>,
    #[arg(long)]
    b2_bucket_name: Option<String>,
    #[arg(long)]
    b2_folder: Option<String>,
}

impl From<Overrides> for Credentials {
    fn from(o: Overrides) -> Self {
        Credentials {
            agent_folder: o.agent_folder,
            prompt_folder: o.prompt_folder,
            output_folder: o.output_folder,
            snapshot_folder: o.snapshot_folder,
            b2_key_id: o.b2_key_id,
            b2_key_secret: o.b2_key_secret.map(RedactedString::from),
            b2_bucket_name: o.b2_bucket_name,
            b2_folder: o.b2_folder,
            ..Default::default()
        }
    }
}

fn run(mut app: AppConfig, local_only: bool, save: bool, overrides: Overrides) -> Result<bool> {
    if local_only {
        app.uploader = UploaderConfig::None;
    }
    let store = app.credential_store()?;
    let mut credentials = store.load()?;
    credentials.merge(overrides.into());
    if save {
        store.save(&credentials)?;
    }

    let job = credentials.job_configuration(app.uploader.is_remote());
    let runner = SnapshotRunner::new(app.build_orchestrator()?);
    let (tx, rx) = channel();
    let handle = runner.trigger(job, Arc::new(ChannelSink::new(tx)))?;

    let mut success = false;
    for event in rx {
        match event {
            ProgressEvent::Message(message) => println!("{message}"),
            ProgressEvent::Outcome(outcome) => success = outcome,
        }
    }

    match handle.join() {
        Ok(Ok(summary)) => debug!("{:?}", summary),
        Ok(Err(e)) => debug!("Snapshot failed: {e}"),
        Err(_) => return Err(Error::from(std::io::Error::other("snapshot job panicked"))),
    }
    Ok(success)
}

fn save(app: AppConfig, overrides: Overrides) -> Result<bool> {
    let store = app.credential_store()?;
    let mut credentials = store.load()?;
    credentials.merge(overrides.into());
    store.save(&credentials)?;
    println!("Saved credentials to {}", store.path().display());
    Ok(true)
}

fn show(app: AppConfig) -> Result<bool> {
    let store = app.credential_store()?;
    let mut credentials = store.load()?;
    credentials.b2_key_secret = credentials
        .b2_key_secret
        .take()
        .map(|_| RedactedString::from(REDACTED_SECRET));
    println!("{}", store.path().display());
    println!("{}", serde_json::to_string_pretty(&credentials)?);
    Ok(true)
}

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let res = AppConfig::load(&cli.config).and_then(|app| match cli.command {
        Command::Run {
            local_only,
            save: save_first,
            overrides,
        } => run(app, local_only, save_first, overrides),
        Command::Save { overrides } => save(app, overrides),
        Command::Show => show(app),
    });

    match res {
        Ok(true) => exit(0),
        Ok(false) => exit(1),
        Err(e) => {
            error!("{e}");
            exit(1)
        }
    }
}

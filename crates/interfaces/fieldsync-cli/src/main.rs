use anyhow::Context;
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use fieldsync_cli::commands::{self, InspectionInput};
use fieldsync_cli::{AppContext, CliRecordKind, CliReference, SessionArgs};
use fieldsync_config::{Settings, SettingsStore};
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Directory holding settings.json (defaults to the platform config dir)
    #[arg(long, env = "FIELDSYNC_CONFIG_DIR", global = true)]
    config_dir: Option<Utf8PathBuf>,
    /// Overrides the configured remote base URL
    #[arg(long, env = "FIELDSYNC_REMOTE_URL", global = true)]
    remote_url: Option<String>,
    #[arg(long, env = "FIELDSYNC_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,
    /// Overrides where the local database lives
    #[arg(long, env = "FIELDSYNC_DATA_DIR", global = true)]
    data_dir: Option<Utf8PathBuf>,
    #[command(flatten)]
    session: SessionArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record an equipment inspection, completing the saved draft
    Inspect {
        #[command(flatten)]
        form: InspectionInput,
    },
    /// The inspection form in progress
    Draft {
        #[command(subcommand)]
        command: DraftCommands,
    },
    /// Register equipment at a substation
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        location: String,
    },
    /// Send queued records now
    Sync,
    /// Inspect or review queued records
    Pending {
        #[command(subcommand)]
        command: PendingCommands,
    },
    /// Mirrored reference data
    Reference {
        #[command(subcommand)]
        command: ReferenceCommands,
    },
    /// Keep probing connectivity and sync on every reconnect
    Watch,
    /// Local store and queue state
    Status,
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum PendingCommands {
    List {
        #[arg(value_enum, default_value_t = CliRecordKind::Inspection)]
        kind: CliRecordKind,
    },
    /// Approve a queued equipment registration (admin)
    Approve { id: Uuid },
    /// Discard a queued equipment registration (admin)
    Reject { id: Uuid },
}

#[derive(Subcommand)]
enum DraftCommands {
    /// Fill in fields without submitting
    Save {
        #[command(flatten)]
        form: InspectionInput,
    },
    Show,
    Clear,
}

#[derive(Subcommand)]
enum ReferenceCommands {
    Refresh,
    Show {
        #[arg(value_enum)]
        kind: CliReference,
        /// Only equipment at this substation, including locally pending entries
        #[arg(long)]
        location: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    Show,
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).expect("default subscriber");

    let store = match &cli.config_dir {
        Some(dir) => SettingsStore::at(dir),
        None => SettingsStore::from_project_dirs()?,
    };

    if let Commands::Config { command } = &cli.command {
        match command {
            ConfigCommands::Show => {
                commands::cmd_config_show(&store)?;
            }
            ConfigCommands::Set { key, value } => {
                commands::cmd_config_set(&store, key, value)?;
            }
        }
        return Ok(());
    }

    let mut settings: Settings = store.load()?;
    if let Some(url) = cli.remote_url.clone() {
        settings.remote_url = Some(url);
    }
    if let Some(token) = cli.token.clone() {
        settings.token = Some(token);
    }
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| store.data_dir(&settings));

    if let Commands::Status = cli.command {
        commands::cmd_status(&settings, &data_dir).await?;
        return Ok(());
    }

    let ctx = AppContext::open(settings, &data_dir).await?;
    let session = cli.session.session();

    match cli.command {
        Commands::Inspect { form } => {
            commands::cmd_inspect(&ctx, &session, form).await?;
        }
        Commands::Draft { command } => match command {
            DraftCommands::Save { form } => {
                commands::cmd_draft_save(&ctx, form)?;
            }
            DraftCommands::Show => {
                commands::cmd_draft_show(&ctx)?;
            }
            DraftCommands::Clear => {
                commands::cmd_draft_clear(&ctx)?;
            }
        },
        Commands::Register { name, location } => {
            commands::cmd_register_equipment(&ctx, &session, name, location).await?;
        }
        Commands::Sync => {
            commands::cmd_sync(&ctx).await?;
        }
        Commands::Pending { command } => match command {
            PendingCommands::List { kind } => {
                commands::cmd_pending_list(&ctx, kind.into()).await?;
            }
            PendingCommands::Approve { id } => {
                commands::cmd_pending_approve(&ctx, &session, id).await?;
            }
            PendingCommands::Reject { id } => {
                commands::cmd_pending_reject(&ctx, &session, id).await?;
            }
        },
        Commands::Reference { command } => match command {
            ReferenceCommands::Refresh => {
                commands::cmd_reference_refresh(&ctx).await?;
            }
            ReferenceCommands::Show { kind, location } => {
                commands::cmd_reference_show(&ctx, kind.into(), location).await?;
            }
        },
        Commands::Watch => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_signal.cancel();
                }
            });
            commands::cmd_watch(&ctx, cancel)
                .await
                .context("Watch stopped with an error")?;
        }
        Commands::Status | Commands::Config { .. } => {}
    }

    Ok(())
}

use access_index::catalog::loader::load_catalog;
use access_index::index::association::OwnerKind;
use access_index::index::CancelToken;
use access_index::{jobs, settings, storage};
use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use sea_orm_migration::MigratorTrait;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "access-index",
    version,
    about = "Indexes the targets granted by entitlement hierarchies and roles"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the indexer over the catalog
    Run {
        /// Delete every indexed association before indexing
        #[arg(long)]
        full_reset: bool,
        /// Only index these applications (comma separated)
        #[arg(long, value_delimiter = ',')]
        applications: Option<Vec<String>>,
        /// Only index these roles (comma separated)
        #[arg(long, value_delimiter = ',')]
        roles: Option<Vec<String>>,
    },
    /// List who is associated with a target
    Targets {
        name: String,
        #[arg(long, value_enum)]
        owner_kind: Option<OwnerKind>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = settings::Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    // init storage (database)
    let db = storage::init(&settings.database).await?;
    migration::Migrator::up(&db, None).await.into_diagnostic()?;

    match cli.command {
        Command::Run {
            full_reset,
            applications,
            roles,
        } => {
            let catalog = load_catalog(&settings.catalog.path)?;
            tracing::info!(
                applications = catalog.applications.len(),
                nodes = catalog.nodes.len(),
                roles = catalog.roles.len(),
                "Loaded catalog"
            );

            let mut options = settings.indexer.options();
            options.full_reset |= full_reset;
            let mut scope = settings.indexer.scope();
            if applications.is_some() {
                scope.applications = applications;
            }
            if roles.is_some() {
                scope.roles = roles;
            }

            let cancel = CancelToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupt received, stopping after the current object");
                    on_signal.cancel();
                }
            });

            let result = jobs::run_indexing_job(&db, &catalog, options, scope, cancel).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&result).into_diagnostic()?
            );
            if let Some(e) = result.error {
                return Err(e.into());
            }
        }
        Command::Targets { name, owner_kind } => {
            let owners = storage::find_target_owners(&db, &name, owner_kind).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&owners).into_diagnostic()?
            );
        }
    }

    Ok(())
}

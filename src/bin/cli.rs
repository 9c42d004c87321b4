//! Content feeds CLI
//!
//! Local execution entry point for extraction and feed deployment.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use content_feeds::{
    config::{self, ConfigRegistry},
    error::{AppError, Result},
    models::{ContentType, EnvironmentName, FieldName, Settings},
    pipeline::{self, DeployRequest, Extractor},
    storage::{SnapshotStore, TransportClients},
};

/// Content feeds - organisation content extraction and feed deployment
#[derive(Parser, Debug)]
#[command(name = "feeds", version, about = "Content feed extraction and deployment")]
struct Cli {
    /// Path to the application settings file
    #[arg(short, long, default_value = "settings.toml")]
    settings: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate settings and every organisation configuration
    Validate,

    /// Extract teasers (or one article) for an organisation
    Extract {
        /// Organisation code
        organisation: String,

        /// Content type key, e.g. post or white-papers
        #[arg(short = 't', long = "type")]
        content_type: ContentType,

        /// Extract the article at this URL instead of listing teasers
        #[arg(long)]
        article: Option<String>,

        /// Write records as JSON to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Build a content type's feed and ship it to an environment
    Deploy {
        /// Target environment
        #[arg(short, long)]
        env: EnvironmentName,

        /// Content type key
        #[arg(short = 't', long = "type")]
        content_type: ContentType,

        /// Ship only rows from the first changed item onwards
        #[arg(long)]
        incremental: bool,
    },

    /// Re-deliver a feed kept after a failed delivery
    Reship {
        #[arg(short, long)]
        env: EnvironmentName,

        #[arg(short = 't', long = "type")]
        content_type: ContentType,
    },

    /// Show configuration and snapshot info
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn load_registry(settings: &Settings) -> Result<ConfigRegistry> {
    let registry = ConfigRegistry::new(&settings.paths.config_dir);
    registry.load_defaults()?;
    Ok(registry)
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = Settings::load_or_default(&cli.settings);
    settings.validate()?;
    log::info!("Loaded settings from {}", cli.settings.display());

    let settings = Arc::new(settings);
    let clients = TransportClients::new(Duration::from_secs(settings.transport.timeout_secs));

    match cli.command {
        Command::Validate => {
            log::info!("Validating configuration...");
            let registry = load_registry(&settings)?;
            let defaults = registry.defaults()?;
            for content in defaults.contents.values() {
                config::validate(content)?;
            }
            log::info!(
                "✓ {} OK",
                registry.directory().join(config::DEFAULTS_FILE).display()
            );

            let mut failures = 0;
            for code in registry.organisation_codes()? {
                match registry.organisation(&code) {
                    Ok(organisation) => {
                        log::info!(
                            "✓ {} ({} content types)",
                            code,
                            organisation.content_types().count()
                        );
                    }
                    Err(e) => {
                        failures += 1;
                        log::error!("✗ {}: {}", code, e);
                    }
                }
            }
            if failures > 0 {
                return Err(AppError::validation(format!(
                    "{failures} organisation configuration(s) failed"
                )));
            }
            log::info!("All validations passed!");
        }

        Command::Extract {
            organisation,
            content_type,
            article,
            output,
        } => {
            let registry = load_registry(&settings)?;
            let extractor = Extractor::new(Arc::clone(&settings))?;

            let records = match article {
                Some(url) => extractor
                    .article(&registry, &organisation, content_type, &url)
                    .await?
                    .into_iter()
                    .collect(),
                None => {
                    let outcome = extractor.teasers(&registry, &organisation, content_type).await?;
                    log::info!(
                        "{} pages ({} failed), {} records, {} dropped",
                        outcome.page_total,
                        outcome.page_failures,
                        outcome.records.len(),
                        outcome.dropped
                    );
                    outcome.records
                }
            };

            let rows: Vec<_> = records.iter().map(|r| &r.fields).collect();
            let json = serde_json::to_string_pretty(&rows)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    log::info!("Records saved to {}", path.display());
                }
                None => println!("{json}"),
            }
        }

        Command::Deploy {
            env,
            content_type,
            incremental,
        } => {
            let registry = load_registry(&settings)?;
            let store = SnapshotStore::load(&settings.paths.snapshot_file).await?;
            let request = DeployRequest {
                environment: env,
                content_type,
                incremental,
            };
            let report =
                pipeline::run_deploy(&settings, &registry, &clients, &store, &request).await?;
            log::info!(
                "{}: {} rows, {} changed, {} skipped",
                report.name,
                report.rows,
                report.changed,
                report.skipped
            );
            if !report.delivery.all_succeeded() {
                return Err(AppError::transport(
                    report.name,
                    "delivery failed for one or more targets",
                ));
            }
        }

        Command::Reship { env, content_type } => {
            let registry = load_registry(&settings)?;
            let report = pipeline::reship(&settings, &registry, &clients, env, content_type).await?;
            if !report.delivery.all_succeeded() {
                return Err(AppError::transport(
                    report.name,
                    "delivery failed for one or more targets",
                ));
            }
            log::info!("Reshipped {} ({} rows)", report.name, report.rows);
        }

        Command::Info => {
            log::info!("Config directory: {}", settings.paths.config_dir.display());
            log::info!("Working directory: {}", settings.paths.working_dir.display());
            for environment in &settings.environments {
                log::info!(
                    "Environment {}: directory={:?} host={:?} bucket={:?}",
                    environment.name,
                    environment.directory,
                    environment.host.as_ref().map(|h| h.destination()),
                    environment.bucket
                );
            }

            match SnapshotStore::load(&settings.paths.snapshot_file).await {
                Ok(store) => {
                    let snapshot = store.snapshot().await;
                    for content_type in ContentType::ALL {
                        let count = snapshot
                            .items
                            .iter()
                            .filter(|i| i.content_type == content_type)
                            .count();
                        if count > 0 {
                            log::info!("{}: {} items", content_type, count);
                        }
                    }
                    let titled = snapshot
                        .items
                        .iter()
                        .filter(|i| i.fields.is_filled(FieldName::Title))
                        .count();
                    log::info!("{} of {} items have a title", titled, snapshot.items.len());
                }
                Err(e) => log::info!("No snapshot loaded: {}", e),
            }
        }
    }

    log::info!("Done!");

    Ok(())
}

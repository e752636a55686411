//! templar CLI entrypoint
//! Parses command-line arguments and dispatches to the template broker.
#![deny(unsafe_code)]

// Internal imports (std, crate)
use std::path::PathBuf;
use std::sync::Arc;

// External imports (alphabetized)
use anyhow::Context;
use clap::Parser;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use templar::config::Config;
use templar::core::environment::EnvironmentProvisioner;
use templar::core::materializer::ProjectMaterializer;
use templar::core::orchestrator::{LifecycleOrchestrator, TracingSink};
use templar::core::registry::TemplateRegistry;
use templar::infrastructure::db::Catalog;
use templar::infrastructure::exec::ProcessRunner;
use templar::rpc::RpcServer;

#[derive(Parser)]
#[command(name = "templar")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Root directory for the catalog database and template environments
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Serve the template broker over JSON-RPC on stdin/stdout
    Serve,
    /// List registered templates
    List,
    /// Create the catalog database and run pending migrations
    #[command(name = "init-db")]
    InitDb,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with default level INFO; log to stderr so the
    // JSON-RPC frames own stdout
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match cli.base_dir {
        Some(base_dir) => Config::with_base_dir(base_dir),
        None => Config::from_env(),
    };

    match &cli.command {
        Commands::Serve => run_serve(&config).await?,
        Commands::List => run_list(&config).await?,
        Commands::InitDb => run_init_db(&config)?,
    }
    Ok(())
}

fn open_registry(config: &Config) -> anyhow::Result<(Arc<TemplateRegistry>, ProjectMaterializer)> {
    let catalog = Catalog::open(&config.db_path)
        .with_context(|| format!("failed to open catalog at {}", config.db_path.display()))?;
    let provisioner = Arc::new(EnvironmentProvisioner::new(
        config.envs_dir.clone(),
        Arc::new(ProcessRunner::new()),
    ));
    let registry = Arc::new(
        TemplateRegistry::new(provisioner.clone(), catalog)
            .context("failed to hydrate template registry")?,
    );
    let materializer = ProjectMaterializer::new(provisioner);
    Ok((registry, materializer))
}

/// Runtime handler for the serve command
async fn run_serve(config: &Config) -> anyhow::Result<()> {
    info!(base_dir = %config.base_dir.display(), "starting templar broker");
    let (registry, materializer) = open_registry(config)?;
    RpcServer::new(registry, materializer)
        .run()
        .await
        .context("JSON-RPC transport failed")?;
    info!("templar broker stopped");
    Ok(())
}

/// Runtime handler for the list command
async fn run_list(config: &Config) -> anyhow::Result<()> {
    let (registry, materializer) = open_registry(config)?;
    let orchestrator =
        LifecycleOrchestrator::new(registry, materializer, Arc::new(TracingSink));

    let templates = orchestrator.list_templates().await?;
    if templates.is_empty() {
        println!("No templates registered.");
        return Ok(());
    }
    for template in &templates {
        let state = if template.ready { "ready" } else { "pending" };
        let category = template.category.as_deref().unwrap_or("uncategorized");
        println!(
            "{}  [{}]  {}  ({})",
            template.name, category, template.description, state
        );
    }
    println!("\n{} template(s)", templates.len());
    Ok(())
}

/// Runtime handler for the init-db command
fn run_init_db(config: &Config) -> anyhow::Result<()> {
    Catalog::open(&config.db_path)
        .with_context(|| format!("failed to open catalog at {}", config.db_path.display()))?;
    println!("Catalog ready at {}", config.db_path.display());
    Ok(())
}

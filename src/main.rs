//! qclife CLI entrypoint.
//!
//! This is the main entrypoint for the qclife command-line tool.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use qingcloud_lifecycle::cli::{Cli, Commands, OutputFormatter};
use qingcloud_lifecycle::config::{
    ConfigParser, ManifestValidator, ProviderConfig, ResourceManifest,
};
use qingcloud_lifecycle::error::{ConfigError, LifecycleError, RemoteError, Result};
use qingcloud_lifecycle::lifecycle::{
    LifecycleOrchestrator, ResourceDriver, ResourceHandle, ResourceKind, RetryPolicy,
};
use qingcloud_lifecycle::qingcloud::{CacheDriver, InstanceDriver, QingCloudClient, RemoteClient};

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.log_json);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system. `RUST_LOG` takes precedence over the
/// verbosity flag.
fn init_logging(verbose: bool, json: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let cancel = deadline_token(cli.timeout);

    match cli.command {
        Commands::Validate { file } => cmd_validate(&file, &formatter),
        Commands::Create { file } => {
            let session = Session::open(cli.config.as_deref(), cancel)?;
            cmd_create(&session, &file, &formatter).await
        }
        Commands::Read { kind, id } => {
            let session = Session::open(cli.config.as_deref(), cancel)?;
            cmd_read(&session, ResourceHandle::new(kind, id), &formatter).await
        }
        Commands::Update { file, id } => {
            let session = Session::open(cli.config.as_deref(), cancel)?;
            cmd_update(&session, &file, id, &formatter).await
        }
        Commands::Delete { kind, id } => {
            let session = Session::open(cli.config.as_deref(), cancel)?;
            cmd_delete(&session, ResourceHandle::new(kind, id), &formatter).await
        }
    }
}

/// Returns a token that fires once the global timeout elapses.
fn deadline_token(timeout: Option<u64>) -> CancellationToken {
    let cancel = CancellationToken::new();

    if let Some(secs) = timeout {
        let deadline = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            warn!("Timeout of {secs}s elapsed, cancelling");
            deadline.cancel();
        });
    }

    cancel
}

// ============================================================================
// Commands
// ============================================================================

/// Validate a manifest.
fn cmd_validate(file: &Path, formatter: &OutputFormatter) -> Result<()> {
    let manifest = ConfigParser::new().load_manifest(file)?;
    let result = ManifestValidator::new().check(&manifest);

    println!("{}", formatter.format_validation(&manifest, &result));

    if result.is_valid() {
        Ok(())
    } else {
        Err(LifecycleError::Config(ConfigError::ValidationError {
            message: format!("{} error(s) in {}", result.error_count(), file.display()),
            field: None,
        }))
    }
}

/// Create the resource described by a manifest.
async fn cmd_create(session: &Session, file: &Path, formatter: &OutputFormatter) -> Result<()> {
    let manifest = load_valid_manifest(file)?;
    info!("Creating {} '{}'", manifest.kind(), manifest.name());

    let handle = match &manifest {
        ResourceManifest::Instance(spec) => session.instances().create(spec).await?,
        ResourceManifest::Cache(spec) => session.caches().create(spec).await?,
    };

    println!("{}", formatter.format_created(&handle));
    Ok(())
}

/// Show a resource.
async fn cmd_read(
    session: &Session,
    handle: ResourceHandle,
    formatter: &OutputFormatter,
) -> Result<()> {
    match handle.kind() {
        ResourceKind::Instance => read_with(&session.instances(), &handle, formatter).await,
        ResourceKind::Cache => read_with(&session.caches(), &handle, formatter).await,
    }
}

/// Update a resource to match a manifest.
async fn cmd_update(
    session: &Session,
    file: &Path,
    id: String,
    formatter: &OutputFormatter,
) -> Result<()> {
    let manifest = load_valid_manifest(file)?;
    let handle = ResourceHandle::new(manifest.kind(), id);

    match &manifest {
        ResourceManifest::Instance(spec) => {
            update_with(&session.instances(), &handle, spec, formatter).await
        }
        ResourceManifest::Cache(spec) => {
            update_with(&session.caches(), &handle, spec, formatter).await
        }
    }
}

/// Delete a resource.
async fn cmd_delete(
    session: &Session,
    handle: ResourceHandle,
    formatter: &OutputFormatter,
) -> Result<()> {
    let mut slot = Some(handle.clone());

    match handle.kind() {
        ResourceKind::Instance => session.instances().delete(&mut slot).await?,
        ResourceKind::Cache => session.caches().delete(&mut slot).await?,
    }

    println!("{}", formatter.format_deleted(&handle));
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Everything a remote command needs: provider configuration, the signed
/// client and the cancellation token.
struct Session {
    config: ProviderConfig,
    client: Arc<dyn RemoteClient>,
    cancel: CancellationToken,
}

impl Session {
    /// Loads provider configuration and builds the API client.
    fn open(config_path: Option<&Path>, cancel: CancellationToken) -> Result<Self> {
        let parser = ConfigParser::new();
        parser.load_dotenv()?;

        let config = parser.load_with_env(config_path)?;
        let client = QingCloudClient::new(&config)?;
        debug!("Using endpoint {} in zone {}", client.endpoint(), config.zone);

        Ok(Self {
            config,
            client: Arc::new(client),
            cancel,
        })
    }

    fn retry(&self) -> RetryPolicy {
        RetryPolicy::from_settings(&self.config.lifecycle.retry)
    }

    fn instances(&self) -> LifecycleOrchestrator<InstanceDriver> {
        let poll = self.config.lifecycle.poll_for(ResourceKind::Instance);
        LifecycleOrchestrator::new(InstanceDriver::new(Arc::clone(&self.client), poll), self.retry())
            .with_cancellation(self.cancel.clone())
    }

    fn caches(&self) -> LifecycleOrchestrator<CacheDriver> {
        let poll = self.config.lifecycle.poll_for(ResourceKind::Cache);
        LifecycleOrchestrator::new(CacheDriver::new(Arc::clone(&self.client), poll), self.retry())
            .with_cancellation(self.cancel.clone())
    }
}

/// Loads a manifest and rejects it on the first validation error.
fn load_valid_manifest(file: &Path) -> Result<ResourceManifest> {
    let manifest = ConfigParser::new().load_manifest(file)?;
    let result = ManifestValidator::new().validate(&manifest)?;

    for warning in &result.warnings {
        warn!("{warning}");
    }

    Ok(manifest)
}

async fn read_with<D: ResourceDriver>(
    orchestrator: &LifecycleOrchestrator<D>,
    handle: &ResourceHandle,
    formatter: &OutputFormatter,
) -> Result<()> {
    let attributes = orchestrator.read(handle).await?;
    println!("{}", formatter.format_attributes(handle, attributes.as_ref()));

    if attributes.is_none() {
        return Err(not_found(handle));
    }
    Ok(())
}

async fn update_with<D: ResourceDriver>(
    orchestrator: &LifecycleOrchestrator<D>,
    handle: &ResourceHandle,
    spec: &D::Spec,
    formatter: &OutputFormatter,
) -> Result<()> {
    let current = orchestrator
        .read(handle)
        .await?
        .ok_or_else(|| not_found(handle))?;
    let desired = orchestrator.driver().desired_attributes(spec);

    let report = orchestrator.update(handle, &desired, &current).await?;
    println!("{}", formatter.format_update(&report));
    Ok(())
}

fn not_found(handle: &ResourceHandle) -> LifecycleError {
    LifecycleError::Remote(RemoteError::ResourceNotFound {
        action: String::from("read"),
        message: format!("{handle} does not exist"),
    })
}

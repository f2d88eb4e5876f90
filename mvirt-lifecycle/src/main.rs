//! mvirt-lifecycle: drive the lifecycle adapter over a set of objects.
//!
//! Loads objects from a JSON file into an in-memory store, reconciles every
//! key until no more writes happen, optionally requests deletion of some
//! objects and converges again, then prints the resulting store contents.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mvirt_lifecycle::{LifecycleAdapter, LifecycleHandler, MemoryStore, ObjectStore, Resource};

type Managed = Resource<serde_json::Value>;

/// mvirt lifecycle driver
#[derive(Parser, Debug)]
#[command(name = "mvirt-lifecycle", version, about)]
struct Args {
    /// Adapter name, used as finalizer token
    #[arg(long, default_value = "mvirt-lifecycle")]
    name: String,

    /// JSON file holding an array of objects
    #[arg(long)]
    objects: PathBuf,

    /// Request deletion of this object after the first convergence (repeatable)
    #[arg(long)]
    delete: Vec<String>,

    /// Give up if the store has not settled after this many rounds
    #[arg(long, default_value = "10")]
    max_rounds: u32,
}

/// Handler that only reports lifecycle events.
struct LoggingHandler;

#[async_trait]
impl LifecycleHandler<Managed> for LoggingHandler {
    async fn initialize(&self, obj: &mut Managed) -> Result<()> {
        info!("Initialize {}: {}", obj.metadata.name, obj.spec);
        Ok(())
    }

    async fn finalize(&self, obj: &mut Managed) -> Result<()> {
        info!(
            "Finalize {} (remaining finalizers: {:?})",
            obj.metadata.name, obj.metadata.finalizers
        );
        Ok(())
    }

    async fn updated(&self, obj: Managed) -> Result<()> {
        debug!(
            "Updated {} at revision {}",
            obj.metadata.name, obj.metadata.resource_version
        );
        Ok(())
    }
}

/// Reconcile every key until a round produces no store writes.
async fn converge<H, S>(
    adapter: &LifecycleAdapter<Managed, H, S>,
    store: &MemoryStore<Managed>,
    max_rounds: u32,
) -> Result<u32>
where
    H: LifecycleHandler<Managed>,
    S: ObjectStore<Managed>,
{
    for round in 1..=max_rounds {
        let before = store.updates().await;

        for key in store.names().await {
            let obj = store.get(&key).await;
            match adapter.reconcile(&key, obj.as_ref()).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => debug!("{} vanished during reconcile", key),
                Err(e) => error!("Reconcile of {} failed: {}", key, e),
            }
        }

        let writes = store.updates().await - before;
        debug!("Round {}: {} writes", round, writes);
        if writes == 0 {
            return Ok(round);
        }
    }

    anyhow::bail!("store did not settle after {} rounds", max_rounds)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mvirt_lifecycle=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    info!("Starting lifecycle driver: {}", args.name);

    let raw = tokio::fs::read_to_string(&args.objects)
        .await
        .with_context(|| format!("Failed to read {}", args.objects.display()))?;
    let objects: Vec<Managed> = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid objects in {}", args.objects.display()))?;

    let store = Arc::new(MemoryStore::new());
    for obj in objects {
        let name = obj.metadata.name.clone();
        store
            .create(obj)
            .await
            .with_context(|| format!("Failed to load {}", name))?;
    }
    info!("Loaded {} objects", store.names().await.len());

    let adapter = LifecycleAdapter::new(args.name.clone(), LoggingHandler, Arc::clone(&store));

    let rounds = converge(&adapter, &store, args.max_rounds).await?;
    info!("Converged after {} rounds", rounds);

    if !args.delete.is_empty() {
        for name in &args.delete {
            match store.delete(name).await {
                Ok(()) => info!("Deletion requested for {}", name),
                Err(e) => warn!("Cannot delete {}: {}", name, e),
            }
        }
        let rounds = converge(&adapter, &store, args.max_rounds).await?;
        info!("Converged after deletion in {} rounds", rounds);
    }

    let remaining = store.list().await;
    println!(
        "{}",
        serde_json::to_string_pretty(&remaining).context("Failed to encode store contents")?
    );

    Ok(())
}

//! # tollgate: credit-gated admission for metered inference
//!
//! `tollgate` sits in front of an opaque inference endpoint and meters access
//! to it. Each caller presents an API key in the `x-api-key` header; the
//! gateway authenticates the key, confirms the account is active and holds
//! positive credit, atomically debits one credit, and only then forwards the
//! request to the downstream processor, returning the processor's result
//! together with the post-debit balance.
//!
//! ## Architecture
//!
//! The hard part is the ledger, not the plumbing: many requests for the same
//! key can arrive simultaneously, and a naive read-check-write sequence lets
//! a caller spend more credit than it owns. All balance mutation therefore
//! goes through one conditionally-guarded storage write (see
//! [`storage::AccountStore::try_debit`]) instead of in-process locking, so
//! correctness holds across multiple service instances, not just multiple
//! tasks in one process.
//!
//! The pieces, leaf-first:
//!
//! - [`storage`] — the account store: a trait over durable per-key records
//!   (`credits`, `is_active`), with PostgreSQL and in-memory backends.
//! - [`gate`] — the ledger gate implementing the
//!   authenticate → validate → debit protocol. One call, one terminal
//!   outcome; storage failures fail closed.
//! - [`processor`] — the opaque downstream inference call, invoked only
//!   after admission. Its outcome never feeds back into the ledger: a
//!   processor failure does not refund the debit.
//! - [`api`] — the axum HTTP surface wiring the above together.
//!
//! ## Quick start
//!
//! ```no_run
//! use clap::Parser;
//! use tollgate::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = tollgate::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     tollgate::telemetry::init_telemetry()?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await
//! }
//! ```

pub mod api;
pub mod config;
pub mod errors;
pub mod gate;
pub mod processor;
pub mod storage;
pub mod telemetry;

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, instrument};

pub use config::Config;

use crate::gate::LedgerGate;
use crate::processor::{HttpProcessor, Processor};
use crate::storage::{AccountStore, PostgresAccountStore};

/// Application state shared across all request handlers.
///
/// Generic over the account store so the HTTP layer can be exercised against
/// the in-memory backend in tests. The processor is an injected handle with
/// process-wide lifetime rather than a module-level singleton.
#[derive(Clone)]
pub struct AppState<S> {
    pub gate: LedgerGate<S>,
    pub processor: Arc<dyn Processor>,
}

/// Get the database migrator.
///
/// Runs at every startup; schema creation is idempotent.
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// The assembled gateway: pool, schema, seed account, and router.
pub struct Application {
    config: Config,
    router: Router,
}

impl Application {
    /// Connect to storage, ensure the schema, seed the bootstrap account,
    /// and build the router.
    ///
    /// Migration or seeding failures are fatal: serving without a valid
    /// schema is unsafe.
    #[instrument(skip_all)]
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = PostgresAccountStore::connect(&config.database_url, &config.pool)
            .await
            .context("failed to connect to the account database")?;

        migrator()
            .run(store.pool())
            .await
            .context("failed to run database migrations")?;

        if let Some(seed) = &config.seed_account {
            store
                .seed_account(&seed.api_key, seed.credits, seed.is_active)
                .await
                .context("failed to seed bootstrap account")?;
            info!("ensured bootstrap account exists");
        }

        let processor: Arc<dyn Processor> = Arc::new(HttpProcessor::new(&config.upstream));
        let state = AppState {
            gate: LedgerGate::new(store),
            processor,
        };
        let router = api::router(state, config.enable_metrics);

        Ok(Self { config, router })
    }

    /// Serve until the shutdown future resolves.
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;

        info!(%addr, "tollgate listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}

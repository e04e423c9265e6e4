use std::sync::Arc;

use blob_store::{BlobStore, BlobStoreError};
use common::capsule::{CapsuleEngine, UnlockScheduler};
use common::directory::UserDirectory;
use common::identity::IdentityProvider;
use common::mail::{EmailSender, LogMailer};
use common::notify::Notifier;
use common::outbox::Outbox;

use crate::database::{Database, DatabaseSetupError};
use crate::ServiceConfig;

/// Shared runtime state handed to every request handler and worker.
///
/// Cheap to clone; everything inside is a handle.
#[derive(Clone)]
pub struct State {
    database: Database,
    blobs: BlobStore,
    engine: Arc<CapsuleEngine>,
    scheduler: UnlockScheduler,
    identity: Arc<dyn IdentityProvider>,
}

impl State {
    /// Assemble the full service graph from configuration.
    pub async fn from_config(config: &ServiceConfig) -> Result<Self, StateSetupError> {
        // 1. Open the database (in-memory when no path is configured)
        let database_url = match &config.sqlite_path {
            Some(path) => url::Url::parse(&format!("sqlite://{}", path.display()))?,
            None => url::Url::parse("sqlite::memory:")?,
        };
        let database = Database::connect(&database_url).await?;

        // 2. Blob store for encrypted payloads
        let blobs = BlobStore::from_config(&config.blob_store).await?;

        // 3. Lifecycle fan-out: feed rows in the database, email on the
        //    log transport
        let directory: Arc<dyn UserDirectory> = Arc::new(database.clone());
        let notifier: Arc<dyn Notifier> = Arc::new(database.clone());
        let mailer: Arc<dyn EmailSender> = Arc::new(LogMailer);
        let outbox = Arc::new(Outbox::new(
            directory.clone(),
            notifier,
            mailer,
            config.portal_url.clone(),
        ));

        // 4. Capsule engine
        let engine = Arc::new(CapsuleEngine::new(
            Arc::new(database.clone()),
            blobs.clone(),
            config.master_key.clone(),
            directory,
            outbox,
            config.limits,
        ));

        // 5. Unlock scheduler; the process module starts its worker
        let scheduler = UnlockScheduler::new(engine.clone(), config.scheduler.clone());

        let identity: Arc<dyn IdentityProvider> = Arc::new(database.clone());

        Ok(Self {
            database,
            blobs,
            engine,
            scheduler,
            identity,
        })
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    pub fn engine(&self) -> &Arc<CapsuleEngine> {
        &self.engine
    }

    pub fn scheduler(&self) -> &UnlockScheduler {
        &self.scheduler
    }

    pub fn identity(&self) -> &Arc<dyn IdentityProvider> {
        &self.identity
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("invalid database url: {0}")]
    DatabaseUrl(#[from] url::ParseError),

    #[error("failed to set up database: {0}")]
    Database(#[from] DatabaseSetupError),

    #[error("failed to set up blob store: {0}")]
    BlobStore(#[from] BlobStoreError),
}

//! Shared test utilities for capsule lifecycle integration tests
#![allow(dead_code)]

use std::sync::Arc;

use blob_store::{BlobStore, LegacyStore, PrimaryStore};
use bytes::Bytes;
use common::capsule::{
    Capsule, CapsuleEngine, CreateCapsule, EngineLimits, MemoryCapsuleStore, PayloadUpload,
    SchedulerConfig, UnlockScheduler,
};
use common::crypto::Cipher;
use common::directory::MemoryDirectory;
use common::identity::Principal;
use common::mail::MemoryMailer;
use common::notify::MemoryNotifier;
use common::outbox::Outbox;
use time::{Duration, OffsetDateTime};

/// An engine wired onto in-memory backends, with two registered users and
/// handles to every collaborator so tests can assert on side effects.
pub struct TestEnv {
    pub engine: Arc<CapsuleEngine>,
    pub scheduler: UnlockScheduler,
    pub store: MemoryCapsuleStore,
    pub blobs: BlobStore,
    pub directory: MemoryDirectory,
    pub mailer: MemoryMailer,
    pub notifier: MemoryNotifier,
    pub owner: Principal,
    pub recipient: Principal,
}

/// Set up a test environment with a fresh key and two registered users.
pub async fn setup_test_env() -> TestEnv {
    build_env(BlobStore::memory(), Cipher::generate()).await
}

/// Same wiring, but the blob facade carries a legacy chunk store. Returns
/// the legacy handle and the engine's cipher so tests can seed records
/// that predate the primary backend.
pub async fn setup_legacy_test_env() -> (TestEnv, LegacyStore, Cipher) {
    let legacy = LegacyStore::in_memory().await.unwrap();
    let cipher = Cipher::generate();
    let blobs = BlobStore::new(PrimaryStore::memory(), Some(legacy.clone()));
    let env = build_env(blobs, cipher.clone()).await;
    (env, legacy, cipher)
}

async fn build_env(blobs: BlobStore, cipher: Cipher) -> TestEnv {
    let store = MemoryCapsuleStore::new();
    let directory = MemoryDirectory::new();
    let mailer = MemoryMailer::new();
    let notifier = MemoryNotifier::new();

    let outbox = Outbox::new(
        Arc::new(directory.clone()),
        Arc::new(notifier.clone()),
        Arc::new(mailer.clone()),
        "https://heirloom.example.com",
    );
    let engine = Arc::new(CapsuleEngine::new(
        Arc::new(store.clone()),
        blobs.clone(),
        cipher,
        Arc::new(directory.clone()),
        Arc::new(outbox),
        EngineLimits::default(),
    ));
    let scheduler = UnlockScheduler::new(engine.clone(), SchedulerConfig::default());

    let owner = directory.register("bruno@example.com", "bruno");
    let recipient = directory.register("ana@example.com", "ana");

    TestEnv {
        engine,
        scheduler,
        store,
        blobs,
        directory,
        mailer,
        notifier,
        owner: Principal {
            id: owner.id,
            email: owner.email,
        },
        recipient: Principal {
            id: recipient.id,
            email: recipient.email,
        },
    }
}

pub fn hour_ago() -> OffsetDateTime {
    OffsetDateTime::now_utc() - Duration::hours(1)
}

pub fn next_week() -> OffsetDateTime {
    OffsetDateTime::now_utc() + Duration::days(7)
}

/// Create a text-only capsule from the env's owner to its recipient.
pub async fn create_text_capsule(env: &TestEnv, unlock_at: OffsetDateTime) -> Capsule {
    env.engine
        .create(
            &env.owner,
            CreateCapsule {
                unlock_at,
                description: Some("open when you get here".to_string()),
                recipient_id: Some(env.recipient.id),
                recipient_email: None,
                payload: None,
            },
        )
        .await
        .unwrap()
}

/// Create a capsule carrying an uploaded file.
pub async fn create_file_capsule(
    env: &TestEnv,
    filename: &str,
    data: &[u8],
    unlock_at: OffsetDateTime,
) -> Capsule {
    env.engine
        .create(
            &env.owner,
            CreateCapsule {
                unlock_at,
                description: None,
                recipient_id: Some(env.recipient.id),
                recipient_email: None,
                payload: Some(PayloadUpload {
                    filename: filename.to_string(),
                    data: Bytes::copy_from_slice(data),
                }),
            },
        )
        .await
        .unwrap()
}

/// Register a third user and return them as a principal.
pub fn register_principal(env: &TestEnv, email: &str, display_name: &str) -> Principal {
    let record = env.directory.register(email, display_name);
    Principal {
        id: record.id,
        email: record.email,
    }
}

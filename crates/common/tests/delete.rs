//! Integration tests for capsule deletion

mod common;

use ::common::capsule::{CapsuleError, CapsuleStore};

#[tokio::test]
async fn test_owner_deletes_capsule() {
    let env = common::setup_test_env().await;
    let capsule =
        common::create_file_capsule(&env, "beach.png", b"pixels", common::next_week()).await;

    env.engine.delete(&env.owner, capsule.id).await.unwrap();

    // Record and sealed payload are both gone.
    assert!(env.store.fetch(capsule.id).await.unwrap().is_none());
    assert!(env.blobs.get(&capsule.locator).await.unwrap().is_none());

    let err = env
        .engine
        .get_metadata(&env.owner, capsule.id)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, CapsuleError::NotFound));
}

#[tokio::test]
async fn test_recipient_cannot_delete() {
    let env = common::setup_test_env().await;
    let capsule = common::create_text_capsule(&env, common::next_week()).await;

    let err = env
        .engine
        .delete(&env.recipient, capsule.id)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, CapsuleError::Forbidden));
    assert!(env.store.fetch(capsule.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_unlocked_capsule_is_still_deletable() {
    let env = common::setup_test_env().await;
    let capsule = common::create_text_capsule(&env, common::hour_ago()).await;
    env.engine.unlock(&env.recipient, capsule.id).await.unwrap();

    // Frozen means no edits; deletion stays available to the owner.
    env.engine.delete(&env.owner, capsule.id).await.unwrap();
    assert!(env.store.fetch(capsule.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_tolerates_missing_blob() {
    let env = common::setup_test_env().await;
    let capsule =
        common::create_file_capsule(&env, "gone.txt", b"bytes", common::next_week()).await;

    // The blob vanished out-of-band; the record must still be removable.
    assert!(env.blobs.delete(&capsule.locator).await.unwrap());

    env.engine.delete(&env.owner, capsule.id).await.unwrap();
    assert!(env.store.fetch(capsule.id).await.unwrap().is_none());
}

//! Integration tests for the daemon's SQLite persistence
//!
//! Exercises the capsule store, user directory, bearer token resolution, and
//! the notification feed against a real in-memory database with migrations
//! applied.

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use blob_store::BlobLocator;
use common::capsule::{
    Capsule, CapsuleChanges, CapsuleState, CapsuleStore, ContentKind, PageRequest, PayloadChange,
    UnlockFlip,
};
use common::directory::UserDirectory;
use common::identity::IdentityProvider;
use common::notify::Notifier;
use heirloom_daemon::Database;

/// Create an in-memory test database
async fn setup_test_db() -> Database {
    let db_url = url::Url::parse("sqlite::memory:").unwrap();
    Database::connect(&db_url).await.unwrap()
}

/// Provision a user row. Capsule columns carry foreign keys into `users`,
/// so owners and recipients have to exist before any capsule insert.
async fn seed_user(db: &Database, email: &str, display_name: &str) -> Uuid {
    db.create_user(email, display_name).await.unwrap().id
}

/// Current time truncated to whole seconds, matching column precision
fn now_secs() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(OffsetDateTime::now_utc().unix_timestamp()).unwrap()
}

fn locked_capsule(owner_id: Uuid, unlock_at: OffsetDateTime) -> Capsule {
    let now = now_secs();
    let id = Uuid::new_v4();
    Capsule {
        id,
        owner_id,
        recipient_id: None,
        recipient_email: Some("future@example.com".to_string()),
        description: Some("a letter".to_string()),
        filename: "letter.txt".to_string(),
        content_kind: ContentKind::Text,
        payload_size: 42,
        locator: BlobLocator::primary(format!("capsules/{}", id)),
        iv: vec![7u8; 12],
        state: CapsuleState::Locked,
        unlock_at,
        unlocked_at: None,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn test_insert_and_fetch_roundtrip() {
    let db = setup_test_db().await;
    let owner = seed_user(&db, "owner@example.com", "Owner").await;
    let capsule = locked_capsule(owner, now_secs() + Duration::days(30));

    db.insert(&capsule).await.unwrap();

    let fetched = db.fetch(capsule.id).await.unwrap().unwrap();
    assert_eq!(fetched, capsule);
}

#[tokio::test]
async fn test_fetch_missing_returns_none() {
    let db = setup_test_db().await;

    let fetched = db.fetch(Uuid::new_v4()).await.unwrap();
    assert!(fetched.is_none());
}

#[tokio::test]
async fn test_update_fields_partial() {
    let db = setup_test_db().await;
    let owner = seed_user(&db, "owner@example.com", "Owner").await;
    let capsule = locked_capsule(owner, now_secs() + Duration::days(30));
    db.insert(&capsule).await.unwrap();

    let new_unlock_at = now_secs() + Duration::days(60);
    let updated = db
        .update_fields(
            capsule.id,
            CapsuleChanges {
                description: Some("revised letter".to_string()),
                unlock_at: Some(new_unlock_at),
                payload: None,
            },
        )
        .await
        .unwrap();
    assert!(updated);

    let fetched = db.fetch(capsule.id).await.unwrap().unwrap();
    assert_eq!(fetched.description.as_deref(), Some("revised letter"));
    assert_eq!(fetched.unlock_at, new_unlock_at);
    // Untouched fields survive
    assert_eq!(fetched.filename, capsule.filename);
    assert_eq!(fetched.locator, capsule.locator);
    assert!(fetched.updated_at >= capsule.updated_at);

    // Updating a missing row reports false
    let missing = db
        .update_fields(
            Uuid::new_v4(),
            CapsuleChanges {
                description: Some("nope".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(!missing);
}

#[tokio::test]
async fn test_update_fields_payload_swap() {
    let db = setup_test_db().await;
    let owner = seed_user(&db, "owner@example.com", "Owner").await;
    let capsule = locked_capsule(owner, now_secs() + Duration::days(10));
    db.insert(&capsule).await.unwrap();

    let new_locator = BlobLocator::primary(format!("capsules/{}-v2", capsule.id));
    let updated = db
        .update_fields(
            capsule.id,
            CapsuleChanges {
                payload: Some(PayloadChange {
                    filename: "photo.jpg".to_string(),
                    content_kind: ContentKind::Image,
                    payload_size: 9000,
                    locator: new_locator.clone(),
                    iv: vec![9u8; 12],
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(updated);

    let fetched = db.fetch(capsule.id).await.unwrap().unwrap();
    assert_eq!(fetched.filename, "photo.jpg");
    assert_eq!(fetched.content_kind, ContentKind::Image);
    assert_eq!(fetched.payload_size, 9000);
    assert_eq!(fetched.locator, new_locator);
    assert_eq!(fetched.iv, vec![9u8; 12]);
}

#[tokio::test]
async fn test_delete_capsule() {
    let db = setup_test_db().await;
    let owner = seed_user(&db, "owner@example.com", "Owner").await;
    let capsule = locked_capsule(owner, now_secs() + Duration::days(30));
    db.insert(&capsule).await.unwrap();

    assert!(db.delete(capsule.id).await.unwrap());
    assert!(db.fetch(capsule.id).await.unwrap().is_none());

    // Second delete is a no-op
    assert!(!db.delete(capsule.id).await.unwrap());
}

#[tokio::test]
async fn test_list_scopes_to_involved_users() {
    let db = setup_test_db().await;
    let owner = seed_user(&db, "owner@example.com", "Owner").await;
    let recipient = seed_user(&db, "recipient@example.com", "Recipient").await;
    let stranger = Uuid::new_v4();

    let mut capsule = locked_capsule(owner, now_secs() + Duration::days(5));
    capsule.recipient_id = Some(recipient);
    db.insert(&capsule).await.unwrap();

    let owner_page = db
        .list_for_user(owner, true, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(owner_page.total, 1);

    let recipient_page = db
        .list_for_user(recipient, true, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(recipient_page.total, 1);

    let stranger_page = db
        .list_for_user(stranger, true, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(stranger_page.total, 0);
    assert!(stranger_page.items.is_empty());
}

#[tokio::test]
async fn test_list_pagination() {
    let db = setup_test_db().await;
    let owner = seed_user(&db, "owner@example.com", "Owner").await;

    for i in 0..5 {
        let capsule = locked_capsule(owner, now_secs() + Duration::days(i + 1));
        db.insert(&capsule).await.unwrap();
    }

    let first = db
        .list_for_user(owner, true, PageRequest::new(1, 2))
        .await
        .unwrap();
    assert_eq!(first.total, 5);
    assert_eq!(first.items.len(), 2);
    assert_eq!(first.total_pages(), 3);
    assert!(first.has_next());
    assert!(!first.has_prev());

    let last = db
        .list_for_user(owner, true, PageRequest::new(3, 2))
        .await
        .unwrap();
    assert_eq!(last.items.len(), 1);
    assert!(!last.has_next());
    assert!(last.has_prev());

    // Pages beyond the end are empty but still carry the total
    let beyond = db
        .list_for_user(owner, true, PageRequest::new(7, 2))
        .await
        .unwrap();
    assert_eq!(beyond.total, 5);
    assert!(beyond.items.is_empty());
}

#[tokio::test]
async fn test_list_can_exclude_locked() {
    let db = setup_test_db().await;
    let owner = seed_user(&db, "owner@example.com", "Owner").await;

    let locked = locked_capsule(owner, now_secs() + Duration::days(3));
    db.insert(&locked).await.unwrap();

    let released = locked_capsule(owner, now_secs() - Duration::days(1));
    db.insert(&released).await.unwrap();
    db.mark_unlocked(released.id, now_secs()).await.unwrap();

    let everything = db
        .list_for_user(owner, true, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(everything.total, 2);

    let unlocked_only = db
        .list_for_user(owner, false, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(unlocked_only.total, 1);
    assert_eq!(unlocked_only.items[0].id, released.id);
    assert_eq!(unlocked_only.items[0].state, CapsuleState::Unlocked);
}

#[tokio::test]
async fn test_due_for_unlock_order_and_limit() {
    let db = setup_test_db().await;
    let owner = seed_user(&db, "owner@example.com", "Owner").await;
    let now = now_secs();

    let oldest = locked_capsule(owner, now - Duration::days(3));
    let recent = locked_capsule(owner, now - Duration::days(1));
    let future = locked_capsule(owner, now + Duration::days(1));
    db.insert(&recent).await.unwrap();
    db.insert(&oldest).await.unwrap();
    db.insert(&future).await.unwrap();

    let due = db.due_for_unlock(now, 10).await.unwrap();
    assert_eq!(due.len(), 2);
    // Oldest release date first
    assert_eq!(due[0].id, oldest.id);
    assert_eq!(due[1].id, recent.id);

    let capped = db.due_for_unlock(now, 1).await.unwrap();
    assert_eq!(capped.len(), 1);
    assert_eq!(capped[0].id, oldest.id);

    // Released capsules drop out of the due set
    db.mark_unlocked(oldest.id, now).await.unwrap();
    let remaining = db.due_for_unlock(now, 10).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, recent.id);
}

#[tokio::test]
async fn test_mark_unlocked_flips_exactly_once() {
    let db = setup_test_db().await;
    let owner = seed_user(&db, "owner@example.com", "Owner").await;
    let capsule = locked_capsule(owner, now_secs() - Duration::hours(1));
    db.insert(&capsule).await.unwrap();

    let at = now_secs();
    let first = db.mark_unlocked(capsule.id, at).await.unwrap();
    assert_eq!(first, UnlockFlip::Flipped);

    let second = db.mark_unlocked(capsule.id, now_secs()).await.unwrap();
    assert_eq!(second, UnlockFlip::AlreadyUnlocked);

    let fetched = db.fetch(capsule.id).await.unwrap().unwrap();
    assert_eq!(fetched.state, CapsuleState::Unlocked);
    // The winning call's timestamp sticks
    assert_eq!(fetched.unlocked_at, Some(at));

    let gone = db.mark_unlocked(Uuid::new_v4(), now_secs()).await.unwrap();
    assert_eq!(gone, UnlockFlip::Gone);
}

#[tokio::test]
async fn test_stats_for_user() {
    let db = setup_test_db().await;
    let owner = seed_user(&db, "owner@example.com", "Owner").await;
    let neighbor = seed_user(&db, "neighbor@example.com", "Neighbor").await;
    let now = now_secs();

    // Locked, due next week: counts as unlocking soon
    let soon = locked_capsule(owner, now + Duration::days(3));
    db.insert(&soon).await.unwrap();

    // Locked, due far out
    let far = locked_capsule(owner, now + Duration::days(90));
    db.insert(&far).await.unwrap();

    // Unlocked image capsule
    let mut released = locked_capsule(owner, now - Duration::days(1));
    released.filename = "photo.jpg".to_string();
    released.content_kind = ContentKind::Image;
    db.insert(&released).await.unwrap();
    db.mark_unlocked(released.id, now).await.unwrap();

    // Someone else's capsule stays out of the numbers
    let other = locked_capsule(neighbor, now + Duration::days(2));
    db.insert(&other).await.unwrap();

    let stats = db.stats_for_user(owner).await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.locked, 2);
    assert_eq!(stats.unlocked, 1);
    assert_eq!(stats.unlocking_soon, 1);
    assert_eq!(stats.by_kind.text, 2);
    assert_eq!(stats.by_kind.image, 1);
    assert_eq!(stats.by_kind.video, 0);
}

#[tokio::test]
async fn test_user_directory_lookup_and_search() {
    let db = setup_test_db().await;

    let alice = db.create_user("alice@example.com", "Alice").await.unwrap();
    let alba = db.create_user("alba@example.com", "Alba").await.unwrap();
    db.create_user("bob@example.com", "Bob").await.unwrap();

    let found = db.lookup(alice.id).await.unwrap().unwrap();
    assert_eq!(found.email, "alice@example.com");
    assert_eq!(found.display_name, "Alice");

    let by_email = db.find_by_email("bob@example.com").await.unwrap().unwrap();
    assert_eq!(by_email.display_name, "Bob");
    assert!(db.find_by_email("nobody@example.com").await.unwrap().is_none());

    // Prefix search matches email and display name, excluding the caller
    let hits = db.search("al", alice.id, 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, alba.id);

    let all_al = db.search("al", Uuid::new_v4(), 10).await.unwrap();
    assert_eq!(all_al.len(), 2);

    let capped = db.search("al", Uuid::new_v4(), 1).await.unwrap();
    assert_eq!(capped.len(), 1);
}

#[tokio::test]
async fn test_token_resolution() {
    let db = setup_test_db().await;

    let user = db.create_user("carol@example.com", "Carol").await.unwrap();
    let token = db.issue_token(user.id).await.unwrap();

    let principal = db.resolve(&token).await.unwrap().unwrap();
    assert_eq!(principal.id, user.id);
    assert_eq!(principal.email, "carol@example.com");

    assert!(db.resolve("not-a-token").await.unwrap().is_none());
}

#[tokio::test]
async fn test_notification_feed() {
    let db = setup_test_db().await;
    let user = db.create_user("dave@example.com", "Dave").await.unwrap();
    let capsule_id = Uuid::new_v4();

    db.notify(user.id, "a capsule arrived", Some(capsule_id))
        .await
        .unwrap();
    db.notify(user.id, "a capsule unlocked", None).await.unwrap();

    let feed = db.list_notifications(user.id, false, false).await.unwrap();
    assert_eq!(feed.len(), 2);
    assert!(feed.iter().all(|n| !n.read));
    assert!(feed.iter().any(|n| n.capsule_id == Some(capsule_id)));

    // Mark one read and narrow to unread
    let first_id = feed[0].id;
    assert!(db.mark_notification_read(first_id, user.id).await.unwrap());

    let unread = db.list_notifications(user.id, true, false).await.unwrap();
    assert_eq!(unread.len(), 1);
    assert_ne!(unread[0].id, first_id);

    // A different user cannot mark someone else's notice
    let other = db.create_user("eve@example.com", "Eve").await.unwrap();
    assert!(!db
        .mark_notification_read(unread[0].id, other.id)
        .await
        .unwrap());

    // Their own feed is empty
    let other_feed = db.list_notifications(other.id, false, false).await.unwrap();
    assert!(other_feed.is_empty());
}

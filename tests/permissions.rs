// Integration tests for permission persistence and concurrent updates.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::join_all;

use crcon_bot::db::Database;
use crcon_bot::permissions::{PermissionStore, PermissionTier};

const OWNER: &str = "10001";

fn owners() -> BTreeSet<String> {
    BTreeSet::from([OWNER.to_string()])
}

#[tokio::test]
async fn test_grants_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}", dir.path().join("permissions.db").display());

    {
        let db = Arc::new(Database::new(&url).await.unwrap());
        let store = PermissionStore::load(db, owners()).await.unwrap();
        store
            .grant(OWNER, "20002", PermissionTier::SuperAdmin)
            .await
            .unwrap();
        store
            .grant("20002", "30003", PermissionTier::Admin)
            .await
            .unwrap();
        store
            .grant("20002", "40004", PermissionTier::Admin)
            .await
            .unwrap();
        store.revoke("20002", "40004").await.unwrap();
    }

    let db = Arc::new(Database::new(&url).await.unwrap());
    let store = PermissionStore::load(db, owners()).await.unwrap();
    assert_eq!(store.get_tier("20002"), PermissionTier::SuperAdmin);
    assert_eq!(store.get_tier("30003"), PermissionTier::Admin);
    assert_eq!(store.get_tier("40004"), PermissionTier::None);
    assert_eq!(store.get_tier(OWNER), PermissionTier::Owner);

    let audit = store.recent_audit(10).await.unwrap();
    assert_eq!(audit.len(), 4);
    assert_eq!(audit[0].operation, "revoke");
    assert_eq!(audit[0].target, "40004");
}

#[tokio::test]
async fn test_concurrent_grants_match_storage() {
    let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
    let store = Arc::new(PermissionStore::load(db.clone(), owners()).await.unwrap());

    // Distinct targets plus repeated updates of one shared target.
    let tasks = (0..40).map(|i| {
        let store = store.clone();
        async move {
            let (target, tier) = if i % 2 == 0 {
                (format!("5{i:05}"), PermissionTier::Admin)
            } else if i % 4 == 1 {
                ("77777".to_string(), PermissionTier::Admin)
            } else {
                ("77777".to_string(), PermissionTier::SuperAdmin)
            };
            store.grant(OWNER, &target, tier).await
        }
    });
    for result in join_all(tasks).await {
        result.unwrap();
    }

    let mirrored = store.list(None);
    assert_eq!(mirrored.len(), 21);

    let reloaded = PermissionStore::load(db, owners()).await.unwrap();
    assert_eq!(reloaded.list(None), mirrored);
}

#[tokio::test]
async fn test_concurrent_revoke_and_grant_settle_consistently() {
    let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
    let store = Arc::new(PermissionStore::load(db.clone(), owners()).await.unwrap());
    store
        .grant(OWNER, "60006", PermissionTier::Admin)
        .await
        .unwrap();

    let grant = {
        let store = store.clone();
        tokio::spawn(async move { store.grant(OWNER, "60006", PermissionTier::SuperAdmin).await })
    };
    let revoke = {
        let store = store.clone();
        tokio::spawn(async move { store.revoke(OWNER, "60006").await })
    };
    grant.await.unwrap().unwrap();
    revoke.await.unwrap().unwrap();

    let reloaded = PermissionStore::load(db, owners()).await.unwrap();
    assert_eq!(reloaded.get_tier("60006"), store.get_tier("60006"));
}

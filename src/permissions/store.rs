// Permission store: SQLite-backed records mirrored in memory.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use super::PermissionTier;
use crate::db::{AuditRow, Database};
use crate::error::{BotError, BotResult};
use crate::metrics;

/// Result of a successful `grant`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOutcome {
    /// The target now holds the requested tier; `previous` is what it held before.
    Granted { previous: PermissionTier },
    /// The target already held the requested tier.
    Unchanged,
}

/// Runtime permission records plus the configured owners.
///
/// Reads are served from the in-memory mirror and never fail. Mutations are
/// serialized per target identity and persisted before the mirror changes.
pub struct PermissionStore {
    db: Arc<Database>,
    owners: BTreeSet<String>,
    records: RwLock<BTreeMap<String, PermissionTier>>,
    identity_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl PermissionStore {
    /// Load persisted records into memory.
    pub async fn load(db: Arc<Database>, owners: BTreeSet<String>) -> Result<Self, sqlx::Error> {
        let mut records = BTreeMap::new();
        for row in db.list_permissions().await? {
            match row.tier.parse::<PermissionTier>() {
                Ok(tier) if tier.is_assignable() => {
                    records.insert(row.identity, tier);
                }
                _ => tracing::warn!(
                    identity = %row.identity,
                    tier = %row.tier,
                    "ignoring stored permission with unassignable tier"
                ),
            }
        }
        tracing::info!(
            owners = owners.len(),
            records = records.len(),
            "permission store loaded"
        );
        Ok(Self {
            db,
            owners,
            records: RwLock::new(records),
            identity_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn is_owner(&self, identity: &str) -> bool {
        self.owners.contains(identity)
    }

    pub fn get_tier(&self, identity: &str) -> PermissionTier {
        if self.is_owner(identity) {
            return PermissionTier::Owner;
        }
        self.records
            .read()
            .unwrap()
            .get(identity)
            .copied()
            .unwrap_or(PermissionTier::None)
    }

    /// Grant `tier` to `target` on behalf of `actor`.
    pub async fn grant(
        &self,
        actor: &str,
        target: &str,
        tier: PermissionTier,
    ) -> BotResult<GrantOutcome> {
        if !tier.is_assignable() {
            return Err(BotError::invalid_args(
                "admin | super_admin",
                format!("tier {} cannot be granted", tier.as_str()),
            ));
        }
        if self.is_owner(target) {
            return Err(BotError::ProtectedIdentity(target.to_string()));
        }
        let actor_tier = self.get_tier(actor);
        if actor_tier <= tier {
            return Err(BotError::InsufficientPrivilege {
                required: tier.next_above(),
                actual: actor_tier,
            });
        }

        let lock = self.identity_lock(target);
        let outcome = {
            let _guard = lock.lock().await;
            let current = self.get_tier(target);
            if current == tier {
                Ok(GrantOutcome::Unchanged)
            } else if current >= actor_tier {
                Err(BotError::InsufficientPrivilege {
                    required: current.next_above(),
                    actual: actor_tier,
                })
            } else {
                self.db.upsert_permission(target, tier.as_str(), actor).await?;
                self.records.write().unwrap().insert(target.to_string(), tier);
                metrics::PERMISSION_CHANGES_TOTAL
                    .with_label_values(&["grant", tier.as_str()])
                    .inc();
                tracing::info!(
                    actor,
                    target,
                    tier = tier.as_str(),
                    previous = current.as_str(),
                    "permission granted"
                );
                Ok(GrantOutcome::Granted { previous: current })
            }
        };
        self.release_identity_lock(target, lock);
        outcome
    }

    /// Remove whatever tier `target` holds. Returns the removed tier, or
    /// `None` when the target held nothing.
    pub async fn revoke(&self, actor: &str, target: &str) -> BotResult<Option<PermissionTier>> {
        if self.is_owner(target) {
            return Err(BotError::ProtectedIdentity(target.to_string()));
        }
        let actor_tier = self.get_tier(actor);

        let lock = self.identity_lock(target);
        let outcome = {
            let _guard = lock.lock().await;
            let current = self.get_tier(target);
            if actor_tier <= current {
                Err(BotError::InsufficientPrivilege {
                    required: current.next_above(),
                    actual: actor_tier,
                })
            } else if current == PermissionTier::None {
                Ok(None)
            } else {
                self.db.delete_permission(target, current.as_str(), actor).await?;
                self.records.write().unwrap().remove(target);
                metrics::PERMISSION_CHANGES_TOTAL
                    .with_label_values(&["revoke", current.as_str()])
                    .inc();
                tracing::info!(actor, target, tier = current.as_str(), "permission revoked");
                Ok(Some(current))
            }
        };
        self.release_identity_lock(target, lock);
        outcome
    }

    /// Owners first, then super admins, then admins; identities ascending
    /// within a tier.
    pub fn list(&self, filter: Option<PermissionTier>) -> Vec<(String, PermissionTier)> {
        let mut out: Vec<(String, PermissionTier)> = self
            .owners
            .iter()
            .map(|id| (id.clone(), PermissionTier::Owner))
            .collect();
        {
            let records = self.records.read().unwrap();
            out.extend(
                records
                    .iter()
                    .filter(|(id, _)| !self.owners.contains(*id))
                    .map(|(id, tier)| (id.clone(), *tier)),
            );
        }
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        if let Some(tier) = filter {
            out.retain(|(_, t)| *t == tier);
        }
        out
    }

    pub async fn recent_audit(&self, limit: i64) -> BotResult<Vec<AuditRow>> {
        Ok(self.db.recent_audit(limit).await?)
    }

    // ── Per-identity serialization ───────────────────────────────────

    fn identity_lock(&self, identity: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.identity_locks
            .lock()
            .unwrap()
            .entry(identity.to_string())
            .or_default()
            .clone()
    }

    fn release_identity_lock(&self, identity: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.identity_locks.lock().unwrap();
        // Map entry plus ours: nobody else is waiting on this identity.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(identity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: &str = "10001";
    const SUPER: &str = "20001";
    const ADMIN: &str = "30001";
    const NOBODY: &str = "40001";

    async fn test_store() -> PermissionStore {
        let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
        let owners = [OWNER.to_string()].into_iter().collect();
        let store = PermissionStore::load(db, owners).await.unwrap();
        store.grant(OWNER, SUPER, PermissionTier::SuperAdmin).await.unwrap();
        store.grant(SUPER, ADMIN, PermissionTier::Admin).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_get_tier_defaults_to_none() {
        let store = test_store().await;
        assert_eq!(store.get_tier(OWNER), PermissionTier::Owner);
        assert_eq!(store.get_tier(SUPER), PermissionTier::SuperAdmin);
        assert_eq!(store.get_tier(ADMIN), PermissionTier::Admin);
        assert_eq!(store.get_tier(NOBODY), PermissionTier::None);
    }

    #[tokio::test]
    async fn test_super_admin_can_grant_admin_but_not_super_admin() {
        let store = test_store().await;

        let outcome = store.grant(SUPER, NOBODY, PermissionTier::Admin).await.unwrap();
        assert_eq!(
            outcome,
            GrantOutcome::Granted {
                previous: PermissionTier::None
            }
        );
        assert_eq!(store.get_tier(NOBODY), PermissionTier::Admin);

        let err = store
            .grant(SUPER, "40002", PermissionTier::SuperAdmin)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BotError::InsufficientPrivilege {
                required: PermissionTier::Owner,
                actual: PermissionTier::SuperAdmin
            }
        ));
        assert_eq!(store.get_tier("40002"), PermissionTier::None);
    }

    #[tokio::test]
    async fn test_admin_cannot_grant() {
        let store = test_store().await;
        let err = store.grant(ADMIN, NOBODY, PermissionTier::Admin).await.unwrap_err();
        assert!(matches!(err, BotError::InsufficientPrivilege { .. }));
    }

    #[tokio::test]
    async fn test_grant_is_idempotent() {
        let store = test_store().await;
        let outcome = store.grant(SUPER, ADMIN, PermissionTier::Admin).await.unwrap();
        assert_eq!(outcome, GrantOutcome::Unchanged);
        assert_eq!(store.recent_audit(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cannot_demote_peer() {
        let store = test_store().await;
        store.grant(OWNER, "20002", PermissionTier::SuperAdmin).await.unwrap();

        let err = store.grant(SUPER, "20002", PermissionTier::Admin).await.unwrap_err();
        assert!(matches!(err, BotError::InsufficientPrivilege { .. }));
        assert_eq!(store.get_tier("20002"), PermissionTier::SuperAdmin);

        // The owner may.
        store.grant(OWNER, "20002", PermissionTier::Admin).await.unwrap();
        assert_eq!(store.get_tier("20002"), PermissionTier::Admin);
    }

    #[tokio::test]
    async fn test_owner_is_protected() {
        let store = test_store().await;
        assert!(matches!(
            store.revoke(OWNER, OWNER).await,
            Err(BotError::ProtectedIdentity(_))
        ));
        assert!(matches!(
            store.revoke(SUPER, OWNER).await,
            Err(BotError::ProtectedIdentity(_))
        ));
        assert!(matches!(
            store.grant(OWNER, OWNER, PermissionTier::Admin).await,
            Err(BotError::ProtectedIdentity(_))
        ));
        assert_eq!(store.get_tier(OWNER), PermissionTier::Owner);
    }

    #[tokio::test]
    async fn test_revoke_rules() {
        let store = test_store().await;

        // Peers cannot revoke each other.
        assert!(store.revoke(ADMIN, ADMIN).await.is_err());
        assert!(store.revoke(SUPER, SUPER).await.is_err());

        assert_eq!(
            store.revoke(SUPER, ADMIN).await.unwrap(),
            Some(PermissionTier::Admin)
        );
        assert_eq!(store.get_tier(ADMIN), PermissionTier::None);
        assert_eq!(store.revoke(SUPER, ADMIN).await.unwrap(), None);

        assert_eq!(
            store.revoke(OWNER, SUPER).await.unwrap(),
            Some(PermissionTier::SuperAdmin)
        );
    }

    #[tokio::test]
    async fn test_list_order_and_filter() {
        let store = test_store().await;
        store.grant(OWNER, "20000", PermissionTier::SuperAdmin).await.unwrap();
        store.grant(SUPER, "30000", PermissionTier::Admin).await.unwrap();

        let all: Vec<String> = store.list(None).into_iter().map(|(id, _)| id).collect();
        assert_eq!(all, vec![OWNER, "20000", SUPER, "30000", ADMIN]);

        let admins = store.list(Some(PermissionTier::Admin));
        assert_eq!(admins.len(), 2);
        assert!(admins.iter().all(|(_, t)| *t == PermissionTier::Admin));
    }

    #[tokio::test]
    async fn test_owner_tier_cannot_be_granted() {
        let store = test_store().await;
        assert!(matches!(
            store.grant(OWNER, NOBODY, PermissionTier::Owner).await,
            Err(BotError::InvalidArguments { .. })
        ));
        assert!(matches!(
            store.grant(OWNER, NOBODY, PermissionTier::None).await,
            Err(BotError::InvalidArguments { .. })
        ));
    }

    #[tokio::test]
    async fn test_identity_locks_are_released() {
        let store = test_store().await;
        store.grant(SUPER, NOBODY, PermissionTier::Admin).await.unwrap();
        assert!(store.identity_locks.lock().unwrap().is_empty());
    }
}

// Database access layer (SQLite via sqlx).

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteSynchronous};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PermissionRow {
    pub identity: String,
    pub tier: String,
    pub granted_by: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditRow {
    pub id: i64,
    pub operation: String,
    pub actor: String,
    pub target: String,
    pub tier: String,
    pub created_at: String,
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        // Grants must survive a crash right after the reply is sent.
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .synchronous(SqliteSynchronous::Full);

        // Every connection to ":memory:" is its own database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS permissions (
                identity TEXT PRIMARY KEY NOT NULL,
                tier TEXT NOT NULL,
                granted_by TEXT NOT NULL DEFAULT '',
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS permission_audit (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                operation TEXT NOT NULL,
                actor TEXT NOT NULL,
                target TEXT NOT NULL,
                tier TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ── Permissions ──────────────────────────────────────────────────

    pub async fn list_permissions(&self) -> Result<Vec<PermissionRow>, sqlx::Error> {
        sqlx::query_as::<_, PermissionRow>(
            "SELECT identity, tier, granted_by, updated_at FROM permissions ORDER BY identity",
        )
        .fetch_all(&self.pool)
        .await
    }

    pub async fn get_permission(&self, identity: &str) -> Result<Option<PermissionRow>, sqlx::Error> {
        sqlx::query_as::<_, PermissionRow>(
            "SELECT identity, tier, granted_by, updated_at FROM permissions WHERE identity = ?",
        )
        .bind(identity)
        .fetch_optional(&self.pool)
        .await
    }

    /// Insert or replace the tier held by `identity` and append an audit row,
    /// both in one transaction.
    pub async fn upsert_permission(
        &self,
        identity: &str,
        tier: &str,
        granted_by: &str,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO permissions (identity, tier, granted_by, updated_at)
            VALUES (?, ?, ?, datetime('now'))
            ON CONFLICT(identity) DO UPDATE SET
                tier = excluded.tier,
                granted_by = excluded.granted_by,
                updated_at = excluded.updated_at
        "#,
        )
        .bind(identity)
        .bind(tier)
        .bind(granted_by)
        .execute(&mut *tx)
        .await?;
        Self::insert_audit(&mut tx, "grant", granted_by, identity, tier).await?;
        tx.commit().await
    }

    /// Delete the record for `identity`. Returns whether a row was removed.
    pub async fn delete_permission(
        &self,
        identity: &str,
        tier: &str,
        actor: &str,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM permissions WHERE identity = ?")
            .bind(identity)
            .execute(&mut *tx)
            .await?;
        let removed = result.rows_affected() > 0;
        if removed {
            Self::insert_audit(&mut tx, "revoke", actor, identity, tier).await?;
        }
        tx.commit().await?;
        Ok(removed)
    }

    // ── Audit log ────────────────────────────────────────────────────

    async fn insert_audit(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        operation: &str,
        actor: &str,
        target: &str,
        tier: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO permission_audit (operation, actor, target, tier) VALUES (?, ?, ?, ?)",
        )
        .bind(operation)
        .bind(actor)
        .bind(target)
        .bind(tier)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Most recent audit entries, newest first.
    pub async fn recent_audit(&self, limit: i64) -> Result<Vec<AuditRow>, sqlx::Error> {
        sqlx::query_as::<_, AuditRow>(
            "SELECT id, operation, actor, target, tier, created_at FROM permission_audit ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> Database {
        Database::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_upsert_and_list_permissions() {
        let db = test_db().await;

        db.upsert_permission("20002", "admin", "10001").await.unwrap();
        db.upsert_permission("20001", "super_admin", "10001").await.unwrap();

        let rows = db.list_permissions().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].identity, "20001");
        assert_eq!(rows[0].tier, "super_admin");
        assert_eq!(rows[1].identity, "20002");
        assert_eq!(rows[1].granted_by, "10001");
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_tier() {
        let db = test_db().await;

        db.upsert_permission("20002", "admin", "10001").await.unwrap();
        db.upsert_permission("20002", "super_admin", "10001").await.unwrap();

        let row = db.get_permission("20002").await.unwrap().unwrap();
        assert_eq!(row.tier, "super_admin");
        assert_eq!(db.list_permissions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_permission() {
        let db = test_db().await;

        db.upsert_permission("20002", "admin", "10001").await.unwrap();
        assert!(db.delete_permission("20002", "admin", "10001").await.unwrap());
        assert!(db.get_permission("20002").await.unwrap().is_none());

        // Second delete is a no-op.
        assert!(!db.delete_permission("20002", "admin", "10001").await.unwrap());
    }

    #[tokio::test]
    async fn test_audit_trail_newest_first() {
        let db = test_db().await;

        db.upsert_permission("20002", "admin", "10001").await.unwrap();
        db.delete_permission("20002", "admin", "30003").await.unwrap();
        db.delete_permission("20002", "admin", "30003").await.unwrap();

        let audit = db.recent_audit(10).await.unwrap();
        assert_eq!(audit.len(), 2);
        assert_eq!(audit[0].operation, "revoke");
        assert_eq!(audit[0].actor, "30003");
        assert_eq!(audit[1].operation, "grant");
        assert_eq!(audit[1].target, "20002");
    }
}

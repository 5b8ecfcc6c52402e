//! Blocked IP model (block registry)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use validator::Validate;

use super::to_db_time;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BlockedIp {
    pub id: i64,
    pub ip_address: String,
    pub reason: String,
    pub blocked_at: DateTime<Utc>,
    pub active: bool,
    /// Firewall rules were confirmed in place when the block was recorded
    pub enforced: bool,
    pub unblocked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BlockIpRequest {
    #[validate(ip)]
    pub ip_address: String,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct BlockFilter {
    pub include_inactive: Option<bool>,
}

impl BlockedIp {
    pub async fn find_active(pool: &SqlitePool, ip: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, BlockedIp>(
            "SELECT * FROM blocked_ips WHERE ip_address = ? AND active = 1"
        )
        .bind(ip)
        .fetch_optional(pool)
        .await
    }

    /// Insert a new active row. Returns `None` when another active row for
    /// the same IP won the race.
    pub async fn insert_active(
        pool: &SqlitePool,
        ip: &str,
        reason: &str,
        enforced: bool,
    ) -> Result<Option<Self>, sqlx::Error> {
        let result = sqlx::query_as::<_, BlockedIp>(
            r#"
            INSERT INTO blocked_ips (ip_address, reason, blocked_at, active, enforced)
            VALUES (?, ?, ?, 1, ?)
            RETURNING *
            "#
        )
        .bind(ip)
        .bind(reason)
        .bind(to_db_time(&Utc::now()))
        .bind(enforced)
        .fetch_one(pool)
        .await;

        match result {
            Ok(row) => Ok(Some(row)),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Flip the active row to inactive. Returns `None` when nothing was active.
    pub async fn deactivate(pool: &SqlitePool, ip: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, BlockedIp>(
            r#"
            UPDATE blocked_ips
            SET active = 0, unblocked_at = ?
            WHERE ip_address = ? AND active = 1
            RETURNING *
            "#
        )
        .bind(to_db_time(&Utc::now()))
        .bind(ip)
        .fetch_optional(pool)
        .await
    }

    pub async fn list(pool: &SqlitePool, include_inactive: bool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, BlockedIp>(
            r#"
            SELECT * FROM blocked_ips
            WHERE (? OR active = 1)
            ORDER BY blocked_at DESC, id DESC
            "#
        )
        .bind(include_inactive)
        .fetch_all(pool)
        .await
    }

    pub async fn history(pool: &SqlitePool, ip: &str) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, BlockedIp>(
            "SELECT * FROM blocked_ips WHERE ip_address = ? ORDER BY id ASC"
        )
        .bind(ip)
        .fetch_all(pool)
        .await
    }
}

//! Correlation: alerts near in time that share an address

use chrono::Duration;
use sqlx::SqlitePool;

use crate::models::Alert;

pub const DEFAULT_WINDOW_MINUTES: i64 = 60;
pub const DEFAULT_LIMIT: i64 = 10;

/// Up to `limit` other alerts within `±window` of `alert` that share its
/// source or destination IP, newest first
pub async fn related(
    pool: &SqlitePool,
    alert: &Alert,
    window: Duration,
    limit: i64,
) -> Result<Vec<Alert>, sqlx::Error> {
    if limit <= 0 {
        return Ok(Vec::new());
    }

    Alert::sharing_ip_between(
        pool,
        alert,
        alert.timestamp - window,
        alert.timestamp + window,
        limit,
    )
    .await
}

/// `related`, with the resulting ids written back onto the alert
pub async fn related_and_record(
    pool: &SqlitePool,
    alert: &Alert,
    window: Duration,
    limit: i64,
) -> Result<Vec<Alert>, sqlx::Error> {
    let found = related(pool, alert, window, limit).await?;
    let ids: Vec<i64> = found.iter().map(|a| a.id).collect();
    Alert::save_related(pool, alert.id, &ids).await?;
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::models::alert::fixtures::new_alert;
    use crate::models::NewAlert;
    use chrono::{TimeZone, Utc};

    async fn insert_at(pool: &SqlitePool, mut data: NewAlert, minutes: i64) -> Alert {
        data.timestamp = Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap() + Duration::minutes(minutes);
        Alert::insert(pool, &data).await.unwrap()
    }

    #[tokio::test]
    async fn window_and_shared_address() {
        let pool = test_pool().await;
        let x = "203.0.113.5";

        let a = insert_at(&pool, new_alert("ET SCAN Nmap", 1, x, "10.0.0.2"), 0).await;
        let b = insert_at(&pool, new_alert("ET POLICY reply", 3, "10.0.0.7", x), 30).await;
        let _c = insert_at(&pool, new_alert("ET SCAN Nmap", 1, x, "10.0.0.2"), 90).await;
        let _unrelated = insert_at(&pool, new_alert("ET SCAN Nmap", 1, "198.51.100.1", "10.0.0.9"), 10).await;
        let earlier = insert_at(&pool, new_alert("ET SCAN Nmap", 1, "198.51.100.1", "10.0.0.2"), -20).await;

        let found = related(&pool, &a, Duration::minutes(DEFAULT_WINDOW_MINUTES), DEFAULT_LIMIT)
            .await
            .unwrap();
        let ids: Vec<i64> = found.iter().map(|r| r.id).collect();

        // newest first, the alert itself excluded
        assert_eq!(ids, vec![b.id, earlier.id]);
    }

    #[tokio::test]
    async fn limit_is_respected_and_ids_recorded() {
        let pool = test_pool().await;
        let x = "203.0.113.5";
        let a = insert_at(&pool, new_alert("ET SCAN Nmap", 1, x, "10.0.0.2"), 0).await;
        for minute in 1..=5 {
            insert_at(&pool, new_alert("ET SCAN Nmap", 1, x, "10.0.0.2"), minute).await;
        }

        let found = related_and_record(&pool, &a, Duration::minutes(60), 3).await.unwrap();
        assert_eq!(found.len(), 3);

        let stored = Alert::find_by_id(&pool, a.id).await.unwrap().unwrap();
        assert_eq!(stored.related_alert_ids, found.iter().map(|r| r.id).collect::<Vec<_>>());
        assert!(related(&pool, &a, Duration::minutes(60), 0).await.unwrap().is_empty());
    }
}

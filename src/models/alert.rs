//! Alert model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};
use validator::Validate;

use super::{db_time, decode_error, from_db_time, to_db_time};
use crate::logic::external_intel::{TechniqueMatch, ThreatIntelSnapshot};

/// Investigation state of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    New,
    Investigating,
    Resolved,
    FalsePositive,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::New => "new",
            AlertStatus::Investigating => "investigating",
            AlertStatus::Resolved => "resolved",
            AlertStatus::FalsePositive => "false_positive",
        }
    }
}

impl FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(AlertStatus::New),
            "investigating" => Ok(AlertStatus::Investigating),
            "resolved" => Ok(AlertStatus::Resolved),
            "false_positive" => Ok(AlertStatus::FalsePositive),
            other => Err(format!("unknown alert status: {}", other)),
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Containment outcome recorded at ingestion time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertAction {
    Allowed,
    Blocked,
}

impl AlertAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertAction::Allowed => "allowed",
            AlertAction::Blocked => "blocked",
        }
    }
}

impl FromStr for AlertAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allowed" => Ok(AlertAction::Allowed),
            "blocked" => Ok(AlertAction::Blocked),
            other => Err(format!("unknown alert action: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    /// Event timestamp was unparsable and ingestion time was used instead
    pub timestamp_fallback: bool,
    pub src_ip: String,
    pub src_port: Option<u16>,
    pub dest_ip: String,
    pub dest_port: Option<u16>,
    pub protocol: String,
    /// 1 = critical .. 4 = low
    pub severity: u8,
    pub signature: String,
    pub category: String,
    pub action: AlertAction,
    pub status: AlertStatus,
    pub payload_printable: Option<String>,
    pub raw_event: String,
    pub threat_intel: Option<ThreatIntelSnapshot>,
    pub mitre_techniques: Option<Vec<TechniqueMatch>>,
    pub kill_chain_phase: Option<String>,
    pub enriched_at: Option<DateTime<Utc>>,
    pub related_alert_ids: Vec<i64>,
    pub analyst_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for Alert {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let action: String = row.try_get("action")?;
        let status: String = row.try_get("status")?;
        let severity: i64 = row.try_get("severity")?;
        let enriched_at: Option<String> = row.try_get("enriched_at")?;
        let related: Option<String> = row.try_get("related_alert_ids")?;

        Ok(Self {
            id: row.try_get("id")?,
            timestamp: db_time(row, "timestamp")?,
            timestamp_fallback: row.try_get("timestamp_fallback")?,
            src_ip: row.try_get("src_ip")?,
            src_port: port(row, "src_port")?,
            dest_ip: row.try_get("dest_ip")?,
            dest_port: port(row, "dest_port")?,
            protocol: row.try_get("protocol")?,
            severity: u8::try_from(severity).map_err(|e| decode_error("severity", e))?,
            signature: row.try_get("signature")?,
            category: row.try_get("category")?,
            action: action.parse().map_err(|e: String| decode_error("action", e))?,
            status: status.parse().map_err(|e: String| decode_error("status", e))?,
            payload_printable: row.try_get("payload_printable")?,
            raw_event: row.try_get("raw_event")?,
            threat_intel: json_column(row, "threat_intel")?,
            mitre_techniques: json_column(row, "mitre_techniques")?,
            kill_chain_phase: row.try_get("kill_chain_phase")?,
            enriched_at: enriched_at
                .as_deref()
                .map(|s| from_db_time(s).map_err(|e| decode_error("enriched_at", e)))
                .transpose()?,
            related_alert_ids: related.as_deref().map(parse_id_list).unwrap_or_default(),
            analyst_notes: row.try_get("analyst_notes")?,
            created_at: db_time(row, "created_at")?,
        })
    }
}

fn port(row: &SqliteRow, column: &str) -> Result<Option<u16>, sqlx::Error> {
    let value: Option<i64> = row.try_get(column)?;
    Ok(value.and_then(|p| u16::try_from(p).ok()))
}

fn json_column<T: serde::de::DeserializeOwned>(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<T>, sqlx::Error> {
    let raw: Option<String> = row.try_get(column)?;
    raw.as_deref()
        .map(|s| serde_json::from_str(s).map_err(|e| decode_error(column, e)))
        .transpose()
}

fn parse_id_list(raw: &str) -> Vec<i64> {
    raw.split(',')
        .filter_map(|id| id.trim().parse().ok())
        .collect()
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(",")
}

/// A parsed, validated alert about to be stored
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub timestamp: DateTime<Utc>,
    pub timestamp_fallback: bool,
    pub src_ip: String,
    pub src_port: Option<u16>,
    pub dest_ip: String,
    pub dest_port: Option<u16>,
    pub protocol: String,
    pub severity: u8,
    pub signature: String,
    pub category: String,
    pub payload_printable: Option<String>,
    pub raw_event: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct AlertFilter {
    pub limit: Option<i64>,
    /// Exact severity
    pub severity: Option<u8>,
    /// At least this severe (`severity <= min_severity`)
    pub min_severity: Option<u8>,
    pub status: Option<AlertStatus>,
    pub hide_noise: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateAlertStatus {
    pub status: AlertStatus,
    #[validate(length(max = 4000))]
    pub notes: Option<String>,
}

/// Enrichment values written back onto an alert
#[derive(Debug, Clone)]
pub struct EnrichmentUpdate {
    pub threat_intel: ThreatIntelSnapshot,
    pub mitre_techniques: Vec<TechniqueMatch>,
    pub kill_chain_phase: Option<String>,
    pub enriched_at: DateTime<Utc>,
}

impl Alert {
    pub async fn insert(pool: &SqlitePool, data: &NewAlert) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Alert>(
            r#"
            INSERT INTO alerts (timestamp, timestamp_fallback, src_ip, src_port, dest_ip, dest_port,
                                protocol, severity, signature, category, payload_printable, raw_event, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#
        )
        .bind(to_db_time(&data.timestamp))
        .bind(data.timestamp_fallback)
        .bind(&data.src_ip)
        .bind(data.src_port.map(i64::from))
        .bind(&data.dest_ip)
        .bind(data.dest_port.map(i64::from))
        .bind(&data.protocol)
        .bind(i64::from(data.severity))
        .bind(&data.signature)
        .bind(&data.category)
        .bind(&data.payload_printable)
        .bind(&data.raw_event)
        .bind(to_db_time(&Utc::now()))
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Alert>("SELECT * FROM alerts WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Newest-first page matching the SQL-side filters
    pub async fn list_page(
        pool: &SqlitePool,
        filter: &AlertFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Alert>(
            r#"
            SELECT * FROM alerts
            WHERE (?1 IS NULL OR severity = ?1)
              AND (?2 IS NULL OR severity <= ?2)
              AND (?3 IS NULL OR status = ?3)
            ORDER BY timestamp DESC, id DESC
            LIMIT ?4 OFFSET ?5
            "#
        )
        .bind(filter.severity.map(i64::from))
        .bind(filter.min_severity.map(i64::from))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    /// Alerts with an event timestamp at or after `since`
    pub async fn list_since(pool: &SqlitePool, since: DateTime<Utc>) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Alert>("SELECT * FROM alerts WHERE timestamp >= ? ORDER BY timestamp ASC")
            .bind(to_db_time(&since))
            .fetch_all(pool)
            .await
    }

    pub async fn all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Alert>("SELECT * FROM alerts ORDER BY id ASC")
            .fetch_all(pool)
            .await
    }

    pub async fn set_action(pool: &SqlitePool, id: i64, action: AlertAction) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE alerts SET action = ? WHERE id = ?")
            .bind(action.as_str())
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Update status, keeping existing notes when none are given
    pub async fn update_status(
        pool: &SqlitePool,
        id: i64,
        status: AlertStatus,
        notes: Option<&str>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Alert>(
            r#"
            UPDATE alerts
            SET status = ?, analyst_notes = COALESCE(?, analyst_notes)
            WHERE id = ?
            RETURNING *
            "#
        )
        .bind(status.as_str())
        .bind(notes)
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn save_enrichment(
        pool: &SqlitePool,
        id: i64,
        update: &EnrichmentUpdate,
    ) -> Result<Option<Self>, sqlx::Error> {
        let threat_intel = serde_json::to_string(&update.threat_intel)
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        let techniques = serde_json::to_string(&update.mitre_techniques)
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

        sqlx::query_as::<_, Alert>(
            r#"
            UPDATE alerts
            SET threat_intel = ?, mitre_techniques = ?, kill_chain_phase = ?, enriched_at = ?
            WHERE id = ?
            RETURNING *
            "#
        )
        .bind(threat_intel)
        .bind(techniques)
        .bind(&update.kill_chain_phase)
        .bind(to_db_time(&update.enriched_at))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn save_related(pool: &SqlitePool, id: i64, related: &[i64]) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE alerts SET related_alert_ids = ? WHERE id = ?")
            .bind(join_ids(related))
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Other alerts sharing an IP with this one inside `[from, to]`, newest first
    pub async fn sharing_ip_between(
        pool: &SqlitePool,
        alert: &Alert,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Alert>(
            r#"
            SELECT * FROM alerts
            WHERE id != ?1
              AND (src_ip IN (?2, ?3) OR dest_ip IN (?2, ?3))
              AND timestamp >= ?4 AND timestamp <= ?5
            ORDER BY timestamp DESC, id DESC
            LIMIT ?6
            "#
        )
        .bind(alert.id)
        .bind(&alert.src_ip)
        .bind(&alert.dest_ip)
        .bind(to_db_time(&from))
        .bind(to_db_time(&to))
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Enrichment is missing or older than `stale_after_secs`
    pub fn needs_enrichment(&self, stale_after_secs: i64, now: DateTime<Utc>) -> bool {
        match self.enriched_at {
            Some(at) => (now - at).num_seconds() >= stale_after_secs,
            None => true,
        }
    }
}

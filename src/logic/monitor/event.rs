//! Suricata EVE record parsing
//!
//! Turns one line of `eve.json` into a validated `NewAlert`. Anything that
//! is not a well-formed alert comes back as an `EventParseError` and is
//! skipped by the caller.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::models::NewAlert;

const SURICATA_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%z";

#[derive(Debug, thiserror::Error)]
pub enum EventParseError {
    #[error("not valid JSON: {0}")]
    InvalidJson(String),

    #[error("event_type is {0:?}, not alert")]
    NotAnAlert(Option<String>),

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid `{field}`: {value}")]
    InvalidField { field: &'static str, value: String },
}

#[derive(Debug, Deserialize)]
struct EveRecord {
    event_type: Option<String>,
    timestamp: Option<String>,
    proto: Option<String>,
    src_ip: Option<String>,
    src_port: Option<u16>,
    dest_ip: Option<String>,
    dest_port: Option<u16>,
    alert: Option<EveAlert>,
    payload_printable: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EveAlert {
    severity: Option<i64>,
    signature: Option<String>,
    category: Option<String>,
    src_port: Option<u16>,
    dest_port: Option<u16>,
}

/// Parse one EVE line. `received_at` stands in for an unparsable timestamp.
pub fn parse_alert(line: &str, received_at: DateTime<Utc>) -> Result<NewAlert, EventParseError> {
    let record: EveRecord = serde_json::from_str(line.trim())
        .map_err(|e| EventParseError::InvalidJson(e.to_string()))?;

    if record.event_type.as_deref() != Some("alert") {
        return Err(EventParseError::NotAnAlert(record.event_type));
    }

    let alert = record.alert.ok_or(EventParseError::MissingField("alert"))?;
    let src_ip = parse_ip("src_ip", record.src_ip)?;
    let dest_ip = parse_ip("dest_ip", record.dest_ip)?;

    let severity = alert.severity.ok_or(EventParseError::MissingField("alert.severity"))?;
    let severity = u8::try_from(severity)
        .ok()
        .filter(|s| *s >= 1)
        .ok_or_else(|| EventParseError::InvalidField {
            field: "alert.severity",
            value: severity.to_string(),
        })?;

    let signature = alert
        .signature
        .filter(|s| !s.trim().is_empty())
        .ok_or(EventParseError::MissingField("alert.signature"))?;

    let (timestamp, timestamp_fallback) = match record.timestamp.as_deref().and_then(parse_timestamp) {
        Some(ts) => (ts, false),
        None => {
            tracing::debug!(
                "Unparsable event timestamp {:?}, using ingestion time",
                record.timestamp
            );
            (received_at, true)
        }
    };

    Ok(NewAlert {
        timestamp,
        timestamp_fallback,
        src_ip: src_ip.to_string(),
        src_port: alert.src_port.or(record.src_port),
        dest_ip: dest_ip.to_string(),
        dest_port: alert.dest_port.or(record.dest_port),
        protocol: record.proto.unwrap_or_else(|| "unknown".to_string()),
        severity,
        signature,
        category: alert.category.unwrap_or_default(),
        payload_printable: record.payload_printable,
        raw_event: line.trim().to_string(),
    })
}

fn parse_ip(field: &'static str, value: Option<String>) -> Result<IpAddr, EventParseError> {
    let value = value.ok_or(EventParseError::MissingField(field))?;
    value
        .trim()
        .parse()
        .map_err(|_| EventParseError::InvalidField { field, value })
}

/// Suricata writes `2024-01-10T08:00:00.123456+0000`; RFC 3339 is accepted too
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, SURICATA_TIME_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

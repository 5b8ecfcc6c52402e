//! Dashboard statistics
//!
//! Aggregates are computed in memory over the alerts in the requested
//! window, using the same noise filter as ingestion.

use std::collections::HashMap;

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::logic::external_intel::TechniqueMapper;
use crate::logic::threat::NoiseFilter;
use crate::models::Alert;

pub const TOP_TECHNIQUES: usize = 20;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeverityBreakdown {
    pub critical: u64,
    pub high: u64,
    pub medium: u64,
    pub low: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceCount {
    pub ip: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProtocolCount {
    pub protocol: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineBucket {
    pub hour: DateTime<Utc>,
    pub total: u64,
    pub critical: u64,
    pub high: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TechniqueCount {
    pub technique_id: String,
    pub technique_name: String,
    pub tactic: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NoiseSummary {
    pub total_alerts: u64,
    pub true_threats: u64,
    pub noise: u64,
    /// Share of noise in percent, one decimal
    pub noise_ratio: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertStatistics {
    pub window_hours: i64,
    pub total: u64,
    pub severity_counts: SeverityBreakdown,
    pub top_sources: Vec<SourceCount>,
    pub protocols: Vec<ProtocolCount>,
    pub timeline: Vec<TimelineBucket>,
    pub techniques: Vec<TechniqueCount>,
    pub noise: NoiseSummary,
}

pub struct StatsOptions {
    pub hours: i64,
    pub hide_noise: bool,
    pub top: usize,
}

impl Default for StatsOptions {
    fn default() -> Self {
        Self { hours: 24, hide_noise: true, top: 10 }
    }
}

pub async fn collect(
    pool: &SqlitePool,
    noise: &NoiseFilter,
    mapper: &TechniqueMapper,
    options: &StatsOptions,
) -> Result<AlertStatistics, sqlx::Error> {
    let since = Utc::now() - Duration::hours(options.hours.max(1));
    let alerts = Alert::list_since(pool, since).await?;
    Ok(aggregate(&alerts, noise, mapper, options))
}

/// Noise totals across the whole store
pub async fn noise_summary(pool: &SqlitePool, noise: &NoiseFilter) -> Result<NoiseSummary, sqlx::Error> {
    let alerts = Alert::all(pool).await?;
    Ok(summarize_noise(&alerts, noise))
}

pub fn summarize_noise(alerts: &[Alert], noise: &NoiseFilter) -> NoiseSummary {
    let total = alerts.len() as u64;
    let noisy = alerts.iter().filter(|a| noise.is_noise(*a)).count() as u64;

    NoiseSummary {
        total_alerts: total,
        true_threats: total - noisy,
        noise: noisy,
        noise_ratio: if total == 0 {
            0.0
        } else {
            (noisy as f64 / total as f64 * 1000.0).round() / 10.0
        },
    }
}

pub fn aggregate(
    alerts: &[Alert],
    noise: &NoiseFilter,
    mapper: &TechniqueMapper,
    options: &StatsOptions,
) -> AlertStatistics {
    let noise_summary = summarize_noise(alerts, noise);

    let visible: Vec<&Alert> = alerts
        .iter()
        .filter(|a| !options.hide_noise || !noise.is_noise(*a))
        .collect();

    let mut severity_counts = SeverityBreakdown::default();
    let mut sources: HashMap<&str, u64> = HashMap::new();
    let mut protocols: HashMap<&str, u64> = HashMap::new();
    let mut timeline: HashMap<DateTime<Utc>, TimelineBucket> = HashMap::new();
    let mut techniques: HashMap<String, TechniqueCount> = HashMap::new();

    for alert in &visible {
        match alert.severity {
            1 => severity_counts.critical += 1,
            2 => severity_counts.high += 1,
            3 => severity_counts.medium += 1,
            _ => severity_counts.low += 1,
        }

        *sources.entry(alert.src_ip.as_str()).or_default() += 1;
        *protocols.entry(alert.protocol.as_str()).or_default() += 1;

        let hour = alert
            .timestamp
            .duration_trunc(Duration::hours(1))
            .unwrap_or(alert.timestamp);
        let bucket = timeline.entry(hour).or_insert(TimelineBucket {
            hour,
            total: 0,
            critical: 0,
            high: 0,
        });
        bucket.total += 1;
        match alert.severity {
            1 => bucket.critical += 1,
            2 => bucket.high += 1,
            _ => {}
        }

        for technique in mapper.map_signature(&alert.signature) {
            techniques
                .entry(technique.technique_id.clone())
                .or_insert(TechniqueCount {
                    technique_id: technique.technique_id,
                    technique_name: technique.technique_name,
                    tactic: technique.tactic,
                    count: 0,
                })
                .count += 1;
        }
    }

    let mut top_sources: Vec<SourceCount> = sources
        .into_iter()
        .map(|(ip, count)| SourceCount { ip: ip.to_string(), count })
        .collect();
    top_sources.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.ip.cmp(&b.ip)));
    top_sources.truncate(options.top);

    let mut protocols: Vec<ProtocolCount> = protocols
        .into_iter()
        .map(|(protocol, count)| ProtocolCount { protocol: protocol.to_string(), count })
        .collect();
    protocols.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.protocol.cmp(&b.protocol)));

    let mut timeline: Vec<TimelineBucket> = timeline.into_values().collect();
    timeline.sort_by_key(|b| b.hour);

    let mut techniques: Vec<TechniqueCount> = techniques.into_values().collect();
    techniques.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.technique_id.cmp(&b.technique_id)));
    techniques.truncate(TOP_TECHNIQUES);

    AlertStatistics {
        window_hours: options.hours,
        total: visible.len() as u64,
        severity_counts,
        top_sources,
        protocols,
        timeline,
        techniques,
        noise: noise_summary,
    }
}

//! Reputation / geolocation providers
//!
//! - `AbuseIpDbProvider`: credentialed reputation API (primary)
//! - `IpApiProvider`: keyless geolocation API (fallback)

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::types::{LookupOutcome, ProviderError, ProviderReport};

/// One external source of IP context
#[async_trait]
pub trait ReputationProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Look up a single IP. Never panics, failures come back as `LookupOutcome::Failed`.
    async fn lookup(&self, ip: IpAddr) -> LookupOutcome;
}

fn build_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("Falling back to default HTTP client: {}", e);
            reqwest::Client::new()
        })
}

fn transport(provider: &'static str, err: reqwest::Error) -> ProviderError {
    ProviderError::Transport { provider, message: err.to_string() }
}

fn decode(provider: &'static str, err: reqwest::Error) -> ProviderError {
    ProviderError::Decode { provider, message: err.to_string() }
}

// ============================================================================
// ABUSEIPDB
// ============================================================================

const ABUSEIPDB: &str = "abuseipdb";
const MAX_AGE_IN_DAYS: &str = "90";

pub struct AbuseIpDbProvider {
    api_key: Option<String>,
    url: String,
    http_client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct AbuseIpDbResponse {
    data: Option<AbuseIpDbData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AbuseIpDbData {
    abuse_confidence_score: Option<u8>,
    country_code: Option<String>,
    isp: Option<String>,
    total_reports: Option<u32>,
    last_reported_at: Option<String>,
}

impl AbuseIpDbProvider {
    pub fn new(api_key: Option<String>, url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            api_key,
            url: url.into(),
            http_client: build_client(timeout_secs),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl ReputationProvider for AbuseIpDbProvider {
    fn name(&self) -> &'static str {
        ABUSEIPDB
    }

    async fn lookup(&self, ip: IpAddr) -> LookupOutcome {
        let Some(api_key) = self.api_key.as_deref() else {
            return LookupOutcome::Failed(ProviderError::NotConfigured { provider: ABUSEIPDB });
        };

        let ip_str = ip.to_string();
        let response = match self.http_client
            .get(&self.url)
            .header("Key", api_key)
            .header("Accept", "application/json")
            .query(&[("ipAddress", ip_str.as_str()), ("maxAgeInDays", MAX_AGE_IN_DAYS)])
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => return LookupOutcome::Failed(transport(ABUSEIPDB, e)),
        };

        if !response.status().is_success() {
            return LookupOutcome::Failed(ProviderError::Status {
                provider: ABUSEIPDB,
                status: response.status().as_u16(),
            });
        }

        let body: AbuseIpDbResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => return LookupOutcome::Failed(decode(ABUSEIPDB, e)),
        };

        match body.data {
            Some(data) => LookupOutcome::Found(ProviderReport {
                score: data.abuse_confidence_score,
                country_code: data.country_code,
                isp: data.isp,
                abuse_report_count: data.total_reports,
                last_reported_at: data.last_reported_at,
                ..Default::default()
            }),
            None => LookupOutcome::NoData,
        }
    }
}

// ============================================================================
// IP-API GEOLOCATION
// ============================================================================

const IP_API: &str = "ip-api";
const IP_API_FIELDS: &str = "status,message,country,countryCode,city,isp,lat,lon";

pub struct IpApiProvider {
    base_url: String,
    http_client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpApiResponse {
    status: String,
    country: Option<String>,
    country_code: Option<String>,
    city: Option<String>,
    isp: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

impl IpApiProvider {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            base_url: base_url.into(),
            http_client: build_client(timeout_secs),
        }
    }
}

#[async_trait]
impl ReputationProvider for IpApiProvider {
    fn name(&self) -> &'static str {
        IP_API
    }

    async fn lookup(&self, ip: IpAddr) -> LookupOutcome {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), ip);

        let response = match self.http_client
            .get(&url)
            .query(&[("fields", IP_API_FIELDS)])
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => return LookupOutcome::Failed(transport(IP_API, e)),
        };

        if !response.status().is_success() {
            return LookupOutcome::Failed(ProviderError::Status {
                provider: IP_API,
                status: response.status().as_u16(),
            });
        }

        match response.json::<IpApiResponse>().await {
            Ok(body) => geolocation_outcome(body),
            Err(e) => LookupOutcome::Failed(decode(IP_API, e)),
        }
    }
}

/// ip-api answers 200 with `status: "fail"` for reserved or unknown ranges
fn geolocation_outcome(body: IpApiResponse) -> LookupOutcome {
    if body.status != "success" {
        return LookupOutcome::NoData;
    }

    LookupOutcome::Found(ProviderReport {
        country: body.country,
        country_code: body.country_code,
        city: body.city,
        isp: body.isp,
        latitude: body.lat,
        longitude: body.lon,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_abuseipdb_fails_without_request() {
        let provider = AbuseIpDbProvider::new(None, "http://127.0.0.1:9/check", 1);
        assert!(!provider.is_configured());

        let outcome = provider.lookup("203.0.113.5".parse().unwrap()).await;
        assert!(matches!(
            outcome,
            LookupOutcome::Failed(ProviderError::NotConfigured { provider: "abuseipdb" })
        ));
    }

    #[test]
    fn abuseipdb_body_decodes() {
        let body: AbuseIpDbResponse = serde_json::from_str(
            r#"{"data":{"ipAddress":"203.0.113.5","abuseConfidenceScore":87,"countryCode":"NL",
                "isp":"Example BV","totalReports":12,"lastReportedAt":"2024-01-10T08:00:00+00:00"}}"#,
        )
        .unwrap();
        let data = body.data.unwrap();
        assert_eq!(data.abuse_confidence_score, Some(87));
        assert_eq!(data.total_reports, Some(12));
    }

    #[test]
    fn ip_api_fail_status_is_no_data() {
        let body: IpApiResponse =
            serde_json::from_str(r#"{"status":"fail","message":"reserved range"}"#).unwrap();
        assert!(matches!(geolocation_outcome(body), LookupOutcome::NoData));
    }

    #[test]
    fn ip_api_success_maps_fields() {
        let body: IpApiResponse = serde_json::from_str(
            r#"{"status":"success","country":"Netherlands","countryCode":"NL","city":"Amsterdam",
                "isp":"Example BV","lat":52.37,"lon":4.89}"#,
        )
        .unwrap();
        match geolocation_outcome(body) {
            LookupOutcome::Found(report) => {
                assert_eq!(report.country.as_deref(), Some("Netherlands"));
                assert_eq!(report.latitude, Some(52.37));
                assert_eq!(report.score, None);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}

/**
 * ALARM FETCHER - Récupération et normalisation des alarmes d'un host
 *
 * RÔLE : Un GET borné par timeout sur /api/v1/alarms d'un host, conversion de la
 * map brute (id → record) en `Alert` normalisées + statut de joignabilité.
 *
 * ERREURS :
 * - Timeout / connexion / statut HTTP non-2xx → host injoignable, zéro alerte
 *   (récupéré localement, jamais remonté)
 * - Payload illisible → `FetchError::Payload`, remonté à l'engine qui laisse
 *   le statut précédent du host intact
 */

use crate::models::{Alert, AlarmRecord, AlarmsPayload, Host, HostStatus, Severity};
use axum::body::Bytes;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::debug;

pub const ALARMS_ENDPOINT: &str = "api/v1/alarms";
pub const DEFAULT_ALARM_MESSAGE: &str = "No details available";
pub const USER_AGENT: &str = concat!("alarm-aggregator/", env!("CARGO_PKG_VERSION"));

const TIMEOUT_MESSAGE: &str = "Connection timeout";
const CONNECTION_MESSAGE: &str = "Connection error";

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid alarms payload from {host}: {source}")]
    Payload {
        host: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Résultat d'un fetch qui a abouti (host joignable ou non)
#[derive(Debug)]
pub struct FetchOutcome {
    pub alerts: Vec<Alert>,
    pub status: HostStatus,
}

/// Client HTTP partagé par le poller et le proxy.
/// Le timeout couvre tout l'échange (connexion, en-têtes, corps).
pub fn build_http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
}

#[derive(Debug, Clone)]
pub struct AlarmFetcher {
    client: reqwest::Client,
}

impl AlarmFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn alarms_url(host: &Host) -> String {
        format!("{}/{}", host.base_url(), ALARMS_ENDPOINT)
    }

    pub async fn fetch(&self, host: &Host) -> Result<FetchOutcome, FetchError> {
        let hostname = host.display_name.as_str();
        let url = Self::alarms_url(host);

        let body = match self.get_body(&url).await {
            Ok(body) => body,
            Err(e) => {
                let message = if e.is_timeout() { TIMEOUT_MESSAGE } else { CONNECTION_MESSAGE };
                debug!(host = hostname, error = %e, "alarms request failed");
                return Ok(FetchOutcome {
                    alerts: Vec::new(),
                    status: HostStatus::unreachable(hostname, message),
                });
            }
        };

        let payload: AlarmsPayload = serde_json::from_slice(&body)
            .map_err(|source| FetchError::Payload { host: hostname.to_string(), source })?;
        let alerts = parse_alarms(hostname, &payload.alarms)?;

        Ok(FetchOutcome {
            alerts,
            status: HostStatus::reachable(hostname, payload.alarms.len()),
        })
    }

    async fn get_body(&self, url: &str) -> reqwest::Result<Bytes> {
        self.client.get(url).send().await?.error_for_status()?.bytes().await
    }
}

/// Convertit la map brute en alertes. Les records CLEAR sont ignorés,
/// l'ordre de la map amont est conservé.
pub fn parse_alarms(
    hostname: &str,
    alarms: &serde_json::Map<String, serde_json::Value>,
) -> Result<Vec<Alert>, FetchError> {
    let mut alerts = Vec::with_capacity(alarms.len());

    for (alert_id, raw) in alarms {
        let record: AlarmRecord = serde_json::from_value(raw.clone())
            .map_err(|source| FetchError::Payload { host: hostname.to_string(), source })?;

        if record.status.as_deref() == Some("CLEAR") {
            continue;
        }

        let severity = Severity::from_status(record.status.as_deref().unwrap_or("INFO"));
        alerts.push(Alert {
            source_host: hostname.to_string(),
            alert_id: alert_id.clone(),
            name: record.name.unwrap_or_else(|| alert_id.clone()),
            severity,
            status: record.status.unwrap_or_else(|| "UNKNOWN".to_string()),
            timestamp: epoch_to_datetime(record.updated.unwrap_or(0.0)),
            value: record.value,
            message: record.info.unwrap_or_else(|| DEFAULT_ALARM_MESSAGE.to_string()),
        });
    }

    Ok(alerts)
}

/// Epoch secondes → date UTC; hors plage ou NaN = origine epoch
fn epoch_to_datetime(secs: f64) -> OffsetDateTime {
    if !secs.is_finite() {
        return OffsetDateTime::UNIX_EPOCH;
    }
    OffsetDateTime::from_unix_timestamp_nanos((secs * 1e9) as i128)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

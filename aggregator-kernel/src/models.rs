use reqwest::Url;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Instance amont configurée (une ligne de config/hosts.txt).
/// Identité = display_name, unique dans le registre.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub url: Url,
    pub display_name: String,
}

impl Host {
    /// URL de base sans slash final, pour concaténer un chemin
    pub fn base_url(&self) -> &str {
        self.url.as_str().trim_end_matches('/')
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    /// Ordre de tri : plus petit = plus grave
    pub fn priority(self) -> u8 {
        match self {
            Severity::Critical => 1,
            Severity::Warning => 2,
            Severity::Info => 3,
        }
    }

    /// CRITICAL / WARNING (casse ignorée), tout le reste = info
    pub fn from_status(status: &str) -> Self {
        if status.eq_ignore_ascii_case("CRITICAL") {
            Severity::Critical
        } else if status.eq_ignore_ascii_case("WARNING") {
            Severity::Warning
        } else {
            Severity::Info
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub source_host: String,
    pub alert_id: String,
    pub name: String,
    pub severity: Severity,
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub value: Option<f64>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostStatus {
    pub hostname: String,
    pub reachable: bool,
    pub last_check: OffsetDateTime,
    pub error_message: Option<String>,
    pub alert_count: usize,
}

impl HostStatus {
    pub fn reachable(hostname: &str, alert_count: usize) -> Self {
        Self {
            hostname: hostname.to_string(),
            reachable: true,
            last_check: OffsetDateTime::now_utc(),
            error_message: None,
            alert_count,
        }
    }

    pub fn unreachable(hostname: &str, error_message: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            reachable: false,
            last_check: OffsetDateTime::now_utc(),
            error_message: Some(error_message.to_string()),
            alert_count: 0,
        }
    }
}

// Contrat amont : GET /api/v1/alarms
#[derive(Debug, Deserialize)]
pub struct AlarmsPayload {
    #[serde(default)]
    pub alarms: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AlarmRecord {
    pub status: Option<String>,
    pub name: Option<String>,
    pub updated: Option<f64>,   // epoch secondes
    pub value: Option<f64>,
    pub info: Option<String>,
}

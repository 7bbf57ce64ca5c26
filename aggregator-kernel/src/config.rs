/**
 * CONFIGURATION KERNEL - Variables d'environnement + liste des hosts
 *
 * RÔLE : Paramètres runtime (intervalles, timeout, port, CORS) lus depuis l'env
 * (après chargement optionnel du .env) et parsing de config/hosts.txt.
 *
 * FORMAT hosts.txt : une entrée `url[|display_name]` par ligne, lignes vides et
 * `#` ignorées. Sans display_name, on prend le host de l'URL.
 * Le parsing est tout ou rien : une seule ligne invalide rejette le fichier.
 */

use crate::models::Host;
use reqwest::Url;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Hosts file not found: {0}")]
    HostsFileNotFound(PathBuf),
    #[error("No valid hosts found in {0}")]
    NoHosts(PathBuf),
    #[error("Invalid URL '{entry}' (line {line}): {reason}")]
    InvalidUrl { line: usize, entry: String, reason: String },
    #[error("Duplicate display name '{name}' (line {line})")]
    DuplicateHost { line: usize, name: String },
    #[error("Empty display name (line {line})")]
    EmptyDisplayName { line: usize },
    #[error("Invalid value for {key}: '{value}'")]
    InvalidEnv { key: String, value: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub port: u16,
    pub hosts_file: PathBuf,
    pub config_poll_interval: Duration,
    pub environment: String,
    pub log_format: LogFormat,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15),
            request_timeout: Duration::from_secs(5),
            port: 8000,
            hosts_file: PathBuf::from("config/hosts.txt"),
            config_poll_interval: Duration::from_secs(5),
            environment: "development".into(),
            log_format: LogFormat::Text,
        }
    }
}

impl KernelConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Construit la config depuis une source clé → valeur (l'env en prod, une map en test)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(v) = lookup("ALERT_POLL_INTERVAL") {
            cfg.poll_interval = Duration::from_secs(parse_positive("ALERT_POLL_INTERVAL", &v)?);
        }
        if let Some(v) = lookup("REQUEST_TIMEOUT") {
            cfg.request_timeout = Duration::from_secs(parse_positive("REQUEST_TIMEOUT", &v)?);
        }
        if let Some(v) = lookup("PORT") {
            cfg.port = v.trim().parse().map_err(|_| invalid("PORT", &v))?;
        }
        if let Some(v) = lookup("HOSTS_FILE") {
            cfg.hosts_file = PathBuf::from(v);
        }
        if let Some(v) = lookup("CONFIG_POLL_INTERVAL") {
            cfg.config_poll_interval = Duration::from_secs(parse_positive("CONFIG_POLL_INTERVAL", &v)?);
        }
        if let Some(v) = lookup("ENVIRONMENT") {
            cfg.environment = v;
        }
        if let Some(v) = lookup("LOG_FORMAT") {
            cfg.log_format = match v.trim().to_ascii_lowercase().as_str() {
                "text" => LogFormat::Text,
                "json" => LogFormat::Json,
                _ => return Err(invalid("LOG_FORMAT", &v)),
            };
        }

        Ok(cfg)
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// Origines CORS autorisées (front Next.js en dev uniquement)
    pub fn allowed_origins(&self) -> Vec<String> {
        if self.is_development() {
            vec!["http://localhost:3000".to_string()]
        } else {
            Vec::new()
        }
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnv { key: key.to_string(), value: value.to_string() }
}

fn parse_positive(key: &str, value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(invalid(key, value)),
    }
}

/// Lit et valide le fichier des hosts
pub fn load_hosts_file(path: &Path) -> Result<Vec<Host>, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::HostsFileNotFound(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path)?;
    let hosts = parse_hosts(&text)?;
    if hosts.is_empty() {
        return Err(ConfigError::NoHosts(path.to_path_buf()));
    }
    Ok(hosts)
}

/// Parse le contenu de hosts.txt. Ne renvoie jamais une liste partielle.
pub fn parse_hosts(text: &str) -> Result<Vec<Host>, ConfigError> {
    let mut hosts = Vec::new();
    let mut seen = HashSet::new();

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let host = parse_host_line(line, line_no)?;
        if !seen.insert(host.display_name.clone()) {
            return Err(ConfigError::DuplicateHost { line: line_no, name: host.display_name });
        }
        hosts.push(host);
    }

    Ok(hosts)
}

fn parse_host_line(line: &str, line_no: usize) -> Result<Host, ConfigError> {
    let (url_part, name_part) = match line.split_once('|') {
        Some((url, name)) => (url.trim(), Some(name.trim())),
        None => (line, None),
    };

    let bad_url = |reason: String| ConfigError::InvalidUrl {
        line: line_no,
        entry: url_part.to_string(),
        reason,
    };

    let url = Url::parse(url_part).map_err(|e| bad_url(e.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(bad_url("URL scheme must be http or https".into()));
    }
    let Some(url_host) = url.host_str().map(str::to_string) else {
        return Err(bad_url("URL has no host".into()));
    };

    let display_name = match name_part {
        Some("") => return Err(ConfigError::EmptyDisplayName { line: line_no }),
        Some(name) => name.to_string(),
        None => url_host,
    };

    Ok(Host { url, display_name })
}

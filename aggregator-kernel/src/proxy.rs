/**
 * PROXY GATEWAY - Relais validé vers un host nommé
 *
 * RÔLE : `forward(hostname, path, requête)` → réponse amont streamée, ou une
 * des trois erreurs typées (403 / 504 / 502).
 *
 * ÉTAPES (par requête, aucun état persistant) :
 * 1. Résolution du hostname dans le registre (allow-list) → HostNotAllowed
 * 2. Rejet des chemins contenant `..` ou absolus → BadGateway
 * 3. URL cible = base amont + "/" + chemin + query d'origine telle quelle
 * 4. Requête avec méthode/corps/query d'origine, en-têtes fixes uniquement
 *    (les en-têtes entrants ne sont PAS relayés), redirections suivies
 * 5. Relais du statut, des en-têtes (hors framing) et du corps en stream
 *
 * SÉCURITÉ : l'étape 2 empêche de sortir de l'espace de chemins de l'amont.
 * Aucun appel sortant tant que les étapes 1 et 2 ne sont pas passées.
 */

use crate::fetcher::USER_AGENT;
use crate::models::Host;
use crate::registry::HostRegistry;
use axum::body::Bytes;
use axum::http::header::{self, HeaderMap, HeaderName};
use axum::http::{Method, StatusCode};
use futures::stream::{BoxStream, StreamExt};
use tracing::{debug, warn};

pub const PATH_TRAVERSAL_REASON: &str = "Path traversal not allowed";

/// En-têtes de transport invalides une fois le corps re-servi par le proxy
pub static FRAMING_HEADERS: [HeaderName; 3] = [
    header::CONTENT_ENCODING,
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
];

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Hostname '{host}' not in configured hosts")]
    HostNotAllowed { host: String },
    #[error("{host} did not respond within timeout")]
    GatewayTimeout { host: String },
    #[error("Could not connect to {host}: {reason}")]
    BadGateway { host: String, reason: String },
}

impl ProxyError {
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::HostNotAllowed { .. } => "HostNotAllowed",
            ProxyError::GatewayTimeout { .. } => "GatewayTimeout",
            ProxyError::BadGateway { .. } => "BadGateway",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::HostNotAllowed { .. } => StatusCode::FORBIDDEN,
            ProxyError::GatewayTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::BadGateway { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn host(&self) -> &str {
        match self {
            ProxyError::HostNotAllowed { host }
            | ProxyError::GatewayTimeout { host }
            | ProxyError::BadGateway { host, .. } => host,
        }
    }
}

/// Partie de la requête entrante qui est relayée
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub query: Option<String>,
    pub body: Bytes,
}

impl ProxyRequest {
    pub fn new(method: Method) -> Self {
        Self { method, query: None, body: Bytes::new() }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

pub type BodyStream = BoxStream<'static, reqwest::Result<Bytes>>;

pub struct ProxiedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BodyStream,
}

impl std::fmt::Debug for ProxiedResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxiedResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct ProxyGateway {
    registry: HostRegistry,
    client: reqwest::Client,
}

impl ProxyGateway {
    pub fn new(registry: HostRegistry, client: reqwest::Client) -> Self {
        Self { registry, client }
    }

    pub async fn forward(
        &self,
        hostname: &str,
        path: &str,
        request: ProxyRequest,
    ) -> Result<ProxiedResponse, ProxyError> {
        let host = self
            .registry
            .resolve(hostname)
            .ok_or_else(|| ProxyError::HostNotAllowed { host: hostname.to_string() })?;

        if is_unsafe_path(path) {
            warn!(host = hostname, path, "rejected proxy path");
            return Err(ProxyError::BadGateway {
                host: hostname.to_string(),
                reason: PATH_TRAVERSAL_REASON.to_string(),
            });
        }

        let url = target_url(&host, path, request.query.as_deref());
        debug!(host = hostname, method = %request.method, %url, "forwarding request");

        let carries_body = matches!(request.method, Method::POST | Method::PUT | Method::PATCH);
        let mut builder = self
            .client
            .request(request.method, &url)
            .header(header::ACCEPT, "*/*")
            .header(header::USER_AGENT, USER_AGENT);
        if carries_body {
            builder = builder.body(request.body);
        }

        let response = builder.send().await.map_err(|e| classify(hostname, e))?;

        Ok(ProxiedResponse {
            status: response.status(),
            headers: filter_response_headers(response.headers()),
            body: response.bytes_stream().boxed(),
        })
    }
}

/// `..` n'importe où, ou chemin absolu
pub fn is_unsafe_path(path: &str) -> bool {
    path.contains("..") || path.starts_with('/')
}

pub fn target_url(host: &Host, path: &str, query: Option<&str>) -> String {
    let mut url = format!("{}/{}", host.base_url(), path.trim_start_matches('/'));
    if let Some(q) = query.filter(|q| !q.is_empty()) {
        url.push('?');
        url.push_str(q);
    }
    url
}

/// Copie tous les en-têtes amont sauf ceux de framing (multi-valeurs conservées)
pub fn filter_response_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        if !FRAMING_HEADERS.contains(name) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers
}

fn classify(hostname: &str, err: reqwest::Error) -> ProxyError {
    let host = hostname.to_string();
    if err.is_timeout() {
        ProxyError::GatewayTimeout { host }
    } else if err.is_connect() {
        ProxyError::BadGateway { host, reason: format!("connection refused: {err}") }
    } else {
        ProxyError::BadGateway { host, reason: err.to_string() }
    }
}

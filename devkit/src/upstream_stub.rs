/*!
Agent de monitoring simulé pour tests sans Netdata réel

Serveur axum local (127.0.0.1, port éphémère) qui imite l'API d'un agent :
- `/api/v1/alarms` sert le payload configuré (ou un corps brut volontairement cassé)
- `/moved` répond 302 vers `/api/v1/info`
- toute autre route renvoie un écho JSON `{method, path, query, body}`

Chaque requête reçue est enregistrée. Statut forcé, délai, compression gzip
et en-têtes additionnels s'appliquent à toutes les routes (sauf `/moved`
pour le statut et la compression). Pas de limite de taille sur les corps reçus.
Le serveur est arrêté quand le `MockAgent` est droppé.
*/

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const ALARMS_PATH: &str = "/api/v1/alarms";
pub const REDIRECT_PATH: &str = "/moved";
pub const REDIRECT_TARGET: &str = "/api/v1/info";

/// Requête telle que reçue par l'agent simulé
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub body: String,
    pub headers: HeaderMap,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[derive(Clone)]
struct Behaviour {
    payload: Value,
    raw_body: Option<String>,
    status: Option<StatusCode>,
    delay: Duration,
    gzip: bool,
    extra_headers: Vec<(HeaderName, HeaderValue)>,
}

impl Default for Behaviour {
    fn default() -> Self {
        Self {
            payload: json!({ "alarms": {} }),
            raw_body: None,
            status: None,
            delay: Duration::ZERO,
            gzip: false,
            extra_headers: Vec::new(),
        }
    }
}

#[derive(Default)]
struct StubState {
    behaviour: Mutex<Behaviour>,
    requests: Mutex<Vec<RecordedRequest>>,
}

pub struct MockAgent {
    addr: SocketAddr,
    state: Arc<StubState>,
    server: JoinHandle<()>,
}

impl MockAgent {
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(StubState::default());

        let app = Router::new()
            .fallback(handle)
            .layer(DefaultBodyLimit::disable())
            .with_state(state.clone());
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::warn!(error = %e, "mock agent server stopped");
            }
        });

        tracing::debug!(%addr, "mock agent listening");
        Ok(Self { addr, state, server })
    }

    /// URL de base, sans slash final
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn set_payload(&self, payload: Value) {
        let mut behaviour = self.state.behaviour.lock();
        behaviour.payload = payload;
        behaviour.raw_body = None;
    }

    /// Corps servi tel quel sur `/api/v1/alarms` (JSON invalide, HTML...)
    pub fn set_raw_body(&self, body: &str) {
        self.state.behaviour.lock().raw_body = Some(body.to_string());
    }

    /// Codes invalides ignorés
    pub fn set_status(&self, code: u16) {
        self.state.behaviour.lock().status = StatusCode::from_u16(code).ok();
    }

    pub fn set_delay(&self, delay: Duration) {
        self.state.behaviour.lock().delay = delay;
    }

    /// Corps compressés en gzip avec `content-encoding: gzip`
    pub fn set_gzip(&self, enabled: bool) {
        self.state.behaviour.lock().gzip = enabled;
    }

    pub fn add_response_header(&self, name: &str, value: &str) {
        if let (Ok(n), Ok(v)) = (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            self.state.behaviour.lock().extra_headers.push((n, v));
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }
}

impl Drop for MockAgent {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// URL d'un port local sur lequel plus personne n'écoute (connexion refusée)
pub fn unreachable_url() -> String {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .map(|a| a.port())
        .unwrap_or(9);
    format!("http://127.0.0.1:{port}")
}

async fn handle(
    State(state): State<Arc<StubState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let recorded = RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        body: String::from_utf8_lossy(&body).into_owned(),
        headers,
    };
    state.requests.lock().push(recorded.clone());

    let behaviour = state.behaviour.lock().clone();
    if !behaviour.delay.is_zero() {
        tokio::time::sleep(behaviour.delay).await;
    }

    let mut response = if recorded.path == REDIRECT_PATH {
        (StatusCode::FOUND, [(header::LOCATION, REDIRECT_TARGET)]).into_response()
    } else {
        let body = match (recorded.path.as_str(), behaviour.raw_body) {
            (ALARMS_PATH, Some(raw)) => raw.into_bytes(),
            (ALARMS_PATH, None) => behaviour.payload.to_string().into_bytes(),
            _ => json!({
                "method": recorded.method,
                "path": recorded.path,
                "query": recorded.query,
                "body": recorded.body,
            })
            .to_string()
            .into_bytes(),
        };

        let mut response = if behaviour.gzip {
            ([(header::CONTENT_ENCODING, "gzip")], gzip(&body)).into_response()
        } else {
            body.into_response()
        };
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(status) = behaviour.status {
            *response.status_mut() = status;
        }
        response
    };

    for (name, value) in behaviour.extra_headers {
        response.headers_mut().append(name, value);
    }
    response
}

fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    match encoder.write_all(bytes).and_then(|_| encoder.finish()) {
        Ok(compressed) => compressed,
        Err(e) => {
            tracing::warn!(error = %e, "gzip encoding failed, serving plain body");
            bytes.to_vec()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_serves_default_empty_alarms() {
        let agent = MockAgent::start().await.unwrap();
        let body: Value = reqwest::get(format!("{}{}", agent.url(), ALARMS_PATH))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body, json!({ "alarms": {} }));
        assert_eq!(agent.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_echo_records_request() {
        let agent = MockAgent::start().await.unwrap();
        agent.add_response_header("x-test", "1");
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{}/api/v1/manage?cmd=LIST", agent.url()))
            .body("hello")
            .send()
            .await
            .unwrap();
        assert_eq!(response.headers()["x-test"], "1");
        let echo: Value = response.json().await.unwrap();
        assert_eq!(echo["method"], "POST");
        assert_eq!(echo["path"], "/api/v1/manage");
        assert_eq!(echo["query"], "cmd=LIST");
        assert_eq!(echo["body"], "hello");

        let recorded = &agent.requests()[0];
        assert_eq!(recorded.body, "hello");
        assert!(recorded.header("host").is_some());
    }

    #[tokio::test]
    async fn test_status_override_and_raw_body() {
        let agent = MockAgent::start().await.unwrap();
        agent.set_status(503);
        agent.set_raw_body("{broken");

        let response = reqwest::get(format!("{}{}", agent.url(), ALARMS_PATH)).await.unwrap();
        assert_eq!(response.status().as_u16(), 503);
        assert_eq!(response.text().await.unwrap(), "{broken");
    }

    #[tokio::test]
    async fn test_gzip_bodies_are_encoded() {
        use flate2::read::GzDecoder;
        use std::io::Read;

        let agent = MockAgent::start().await.unwrap();
        agent.set_gzip(true);

        let response = reqwest::get(format!("{}/api/v1/info", agent.url())).await.unwrap();
        assert_eq!(response.headers()["content-encoding"], "gzip");
        let compressed = response.bytes().await.unwrap();

        let mut text = String::new();
        GzDecoder::new(&compressed[..]).read_to_string(&mut text).unwrap();
        let echo: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(echo["path"], "/api/v1/info");
    }

    #[tokio::test]
    async fn test_unreachable_url_refuses_connections() {
        let err = reqwest::get(unreachable_url()).await.unwrap_err();
        assert!(err.is_connect());
    }
}

use crate::config::LogFormat;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_DIRECTIVES: &str = "aggregator_kernel=info,tower_http=info";

/// Filtre : RUST_LOG si défini et valide, sinon les directives par défaut
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

pub fn init_tracing(format: LogFormat) {
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter()).with_target(true);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

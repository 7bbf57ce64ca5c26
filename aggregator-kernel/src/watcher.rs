use crate::registry::HostRegistry;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, PartialEq, Eq)]
pub enum WatchOutcome {
    Unchanged,
    Missing,
    Reloaded(usize),
    Rejected,
}

/// Surveille la date de modification de hosts.txt et recharge le registre
pub struct HostsWatcher {
    registry: HostRegistry,
    path: PathBuf,
    poll_interval: Duration,
    last_modified: Option<SystemTime>,
}

impl HostsWatcher {
    pub fn new(registry: HostRegistry, path: PathBuf, poll_interval: Duration) -> Self {
        let last_modified = modified_at(&path);
        Self { registry, path, poll_interval, last_modified }
    }

    /// Une vérification. La date vue est retenue même si le rechargement
    /// échoue : on ne retente qu'à la prochaine modification du fichier.
    pub fn check_once(&mut self) -> WatchOutcome {
        let Some(current) = modified_at(&self.path) else {
            return WatchOutcome::Missing;
        };
        if Some(current) == self.last_modified {
            return WatchOutcome::Unchanged;
        }

        info!(file = %self.path.display(), "hosts file changed, reloading config");
        self.last_modified = Some(current);
        match self.registry.reload_file(&self.path) {
            Ok(count) => WatchOutcome::Reloaded(count),
            Err(_) => WatchOutcome::Rejected,
        }
    }

    pub fn spawn(mut self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(file = %self.path.display(), interval_secs = self.poll_interval.as_secs(), "config polling started");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.poll_interval) => {
                        let outcome = self.check_once();
                        debug!(?outcome, "hosts file checked");
                    }
                }
            }
            debug!("config polling stopped");
        })
    }
}

fn modified_at(path: &std::path::Path) -> Option<SystemTime> {
    match std::fs::metadata(path).and_then(|m| m.modified()) {
        Ok(t) => Some(t),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!(file = %path.display(), error = %e, "error checking config file");
            None
        }
    }
}

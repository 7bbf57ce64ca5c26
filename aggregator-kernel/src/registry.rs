/**
 * HOST REGISTRY - Liste ordonnée des instances amont autorisées
 *
 * RÔLE : Source unique des hosts pour le poller ET l'allow-list du proxy.
 *
 * FONCTIONNEMENT :
 * - La liste est immuable, remplacée en bloc au rechargement (swap d'Arc)
 * - Une opération en cours garde sa version : ancienne liste complète
 *   ou nouvelle liste complète, jamais un mélange
 * - Rechargement tout ou rien : erreur de validation = liste précédente conservée
 */

use crate::config::{load_hosts_file, ConfigError};
use crate::models::Host;
use crate::state::Published;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct HostRegistry {
    hosts: Arc<Published<Vec<Host>>>,
}

impl HostRegistry {
    pub fn new(hosts: Vec<Host>) -> Self {
        Self { hosts: Arc::new(Published::new(hosts)) }
    }

    /// Chargement initial (erreur fatale au démarrage côté main)
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let hosts = load_hosts_file(path)?;
        info!(hosts = hosts.len(), file = %path.display(), "hosts loaded");
        Ok(Self::new(hosts))
    }

    /// Recharge depuis le fichier. En cas d'erreur rien n'est modifié.
    pub fn reload_file(&self, path: &Path) -> Result<usize, ConfigError> {
        match load_hosts_file(path) {
            Ok(hosts) => {
                let count = hosts.len();
                self.replace(hosts);
                info!(hosts = count, "config reloaded successfully");
                Ok(count)
            }
            Err(e) => {
                warn!(error = %e, "config reload failed, keeping old config");
                Err(e)
            }
        }
    }

    pub fn replace(&self, hosts: Vec<Host>) {
        self.hosts.publish(hosts);
    }

    /// Version courante complète de la liste
    pub fn snapshot(&self) -> Arc<Vec<Host>> {
        self.hosts.load()
    }

    /// Résolution par display_name (clé de routage du proxy)
    pub fn resolve(&self, display_name: &str) -> Option<Host> {
        self.snapshot()
            .iter()
            .find(|h| h.display_name == display_name)
            .cloned()
    }
}

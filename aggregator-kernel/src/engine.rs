/**
 * AGGREGATION ENGINE - Fan-out des fetchs + fusion + publication du snapshot
 *
 * RÔLE : Un cycle = un fetch parallèle par host enregistré, attente de TOUS les
 * résultats (barrière, pas de retour anticipé), concaténation, tri global puis
 * publication atomique de la liste d'alertes.
 *
 * CONCURRENCE :
 * - Statut par host écrit dès que SON fetch se termine (clés disjointes)
 * - Liste d'alertes publiée une seule fois en fin de cycle (swap d'Arc)
 * - Un lecteur peut donc voir les statuts du cycle N+1 et les alertes du cycle N
 *
 * ÉCHECS : un host en erreur (payload illisible, panic de la tâche) contribue
 * zéro alerte; son dernier statut connu est conservé tel quel.
 */

use crate::fetcher::{AlarmFetcher, FetchError};
use crate::models::{Alert, HostStatus};
use crate::registry::HostRegistry;
use crate::state::{new_state, Published, Shared};
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, error, warn};

pub type HostStatusMap = HashMap<String, HostStatus>;

pub struct AggregationEngine {
    registry: HostRegistry,
    fetcher: AlarmFetcher,
    alerts: Published<Vec<Alert>>,
    statuses: Shared<HostStatusMap>,
    cycles: AtomicU64,
    last_cycle: Mutex<Option<OffsetDateTime>>,
}

impl AggregationEngine {
    pub fn new(registry: HostRegistry, fetcher: AlarmFetcher) -> Self {
        Self {
            registry,
            fetcher,
            alerts: Published::default(),
            statuses: new_state(HashMap::new()),
            cycles: AtomicU64::new(0),
            last_cycle: Mutex::new(None),
        }
    }

    /// Un cycle complet de polling sur la liste de hosts courante
    pub async fn run_cycle(&self) {
        let hosts = self.registry.snapshot();

        let tasks = hosts.iter().cloned().map(|host| {
            let fetcher = self.fetcher.clone();
            let statuses = self.statuses.clone();
            tokio::spawn(async move {
                let outcome = fetcher.fetch(&host).await?;
                statuses.lock().insert(host.display_name.clone(), outcome.status);
                Ok::<_, FetchError>(outcome.alerts)
            })
        });
        let results = join_all(tasks).await;

        let mut merged = Vec::new();
        let mut failed = 0usize;
        for (host, result) in hosts.iter().zip(results) {
            match result {
                Ok(Ok(alerts)) => merged.extend(alerts),
                Ok(Err(e)) => {
                    failed += 1;
                    warn!(host = %host.display_name, error = %e, "alarm fetch failed, host skipped this cycle");
                }
                Err(e) => {
                    failed += 1;
                    error!(host = %host.display_name, error = %e, "alarm fetch task aborted");
                }
            }
        }

        sort_alerts(&mut merged);
        let total = merged.len();
        self.alerts.publish(merged);

        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        *self.last_cycle.lock() = Some(OffsetDateTime::now_utc());
        debug!(cycle, hosts = hosts.len(), alerts = total, failed, "poll cycle complete");
    }

    /// Snapshot courant des alertes, trié
    pub fn alerts(&self) -> Arc<Vec<Alert>> {
        self.alerts.load()
    }

    /// Copie de la map des statuts (inclut les hosts retirés de la config)
    pub fn host_statuses(&self) -> HostStatusMap {
        self.statuses.lock().clone()
    }

    pub fn host_status(&self, hostname: &str) -> Option<HostStatus> {
        self.statuses.lock().get(hostname).cloned()
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    pub fn last_cycle(&self) -> Option<OffsetDateTime> {
        *self.last_cycle.lock()
    }

    pub fn registry(&self) -> &HostRegistry {
        &self.registry
    }
}

/// Tri global : sévérité la plus grave d'abord, puis la plus récente.
/// `sort_by` est stable, l'ordre d'entrée départage les égalités.
pub fn sort_alerts(alerts: &mut [Alert]) {
    alerts.sort_by(|a, b| {
        a.severity
            .priority()
            .cmp(&b.severity.priority())
            .then_with(|| b.timestamp.cmp(&a.timestamp))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::build_http_client;
    use crate::models::{Host, Severity};
    use aggregator_devkit::test_utils::init_test_tracing;
    use aggregator_devkit::{alarm, alarms_payload, unreachable_url, MockAgent};
    use proptest::prelude::*;
    use std::time::Duration;

    fn host(url: &str, name: &str) -> Host {
        Host { url: reqwest::Url::parse(url).unwrap(), display_name: name.into() }
    }

    fn engine(hosts: Vec<Host>) -> AggregationEngine {
        let client = build_http_client(Duration::from_secs(2)).unwrap();
        AggregationEngine::new(HostRegistry::new(hosts), AlarmFetcher::new(client))
    }

    fn alert(id: &str, severity: Severity, ts: i64) -> Alert {
        Alert {
            source_host: "h".into(),
            alert_id: id.into(),
            name: id.into(),
            severity,
            status: format!("{severity:?}").to_uppercase(),
            timestamp: OffsetDateTime::from_unix_timestamp(ts).unwrap(),
            value: None,
            message: String::new(),
        }
    }

    fn assert_sorted(alerts: &[Alert]) {
        for pair in alerts.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(a.severity.priority() <= b.severity.priority());
            if a.severity == b.severity {
                assert!(a.timestamp >= b.timestamp);
            }
        }
    }

    #[test]
    fn test_sort_severity_then_recency() {
        let mut alerts = vec![
            alert("info-old", Severity::Info, 10),
            alert("warn-new", Severity::Warning, 500),
            alert("crit-old", Severity::Critical, 100),
            alert("info-new", Severity::Info, 900),
            alert("crit-new", Severity::Critical, 300),
            alert("warn-old", Severity::Warning, 50),
        ];
        sort_alerts(&mut alerts);

        let ids: Vec<_> = alerts.iter().map(|a| a.alert_id.as_str()).collect();
        assert_eq!(ids, ["crit-new", "crit-old", "warn-new", "warn-old", "info-new", "info-old"]);
        assert_sorted(&alerts);
    }

    #[test]
    fn test_sort_is_stable_for_equal_keys() {
        let mut alerts = vec![
            alert("first", Severity::Warning, 42),
            alert("second", Severity::Warning, 42),
            alert("third", Severity::Warning, 42),
        ];
        sort_alerts(&mut alerts);
        let ids: Vec<_> = alerts.iter().map(|a| a.alert_id.as_str()).collect();
        assert_eq!(ids, ["first", "second", "third"]);
    }

    fn severity_from_index(n: u8) -> Severity {
        match n {
            0 => Severity::Critical,
            1 => Severity::Warning,
            _ => Severity::Info,
        }
    }

    proptest! {
        #[test]
        fn test_sort_invariants_hold_for_any_input(
            keys in prop::collection::vec((0u8..3, 0i64..20), 0..80)
        ) {
            let mut alerts: Vec<Alert> = keys
                .iter()
                .enumerate()
                .map(|(i, (sev, ts))| alert(&i.to_string(), severity_from_index(*sev), *ts))
                .collect();

            sort_alerts(&mut alerts);

            prop_assert_eq!(alerts.len(), keys.len());
            assert_sorted(&alerts);
            // clés égales : ordre d'entrée conservé
            for pair in alerts.windows(2) {
                let (a, b) = (&pair[0], &pair[1]);
                if a.severity == b.severity && a.timestamp == b.timestamp {
                    let (ia, ib): (usize, usize) = (a.alert_id.parse().unwrap(), b.alert_id.parse().unwrap());
                    prop_assert!(ia < ib);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_cycle_with_one_reachable_and_one_unreachable_host() {
        let agent = MockAgent::start().await.unwrap();
        agent.set_payload(alarms_payload(vec![
            ("cpu", alarm("cpu_usage", "WARNING", 100)),
            ("ram", alarm("ram_usage", "CRITICAL", 50)),
            ("disk", alarm("disk_space", "CLEAR", 200)),
        ]));

        let engine = engine(vec![host(&agent.url(), "alive"), host(&unreachable_url(), "dead")]);
        engine.run_cycle().await;

        let alerts = engine.alerts();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert_eq!(alerts[1].severity, Severity::Warning);

        let statuses = engine.host_statuses();
        assert_eq!(statuses.len(), 2);
        assert!(statuses["alive"].reachable);
        assert_eq!(statuses["alive"].alert_count, 3);
        assert!(!statuses["dead"].reachable);
        assert_eq!(statuses["dead"].alert_count, 0);
        assert_eq!(engine.cycle_count(), 1);
        assert!(engine.last_cycle().is_some());
    }

    #[tokio::test]
    async fn test_merge_across_hosts_is_sorted() {
        let a = MockAgent::start().await.unwrap();
        a.set_payload(alarms_payload(vec![
            ("a1", alarm("a1", "WARNING", 10)),
            ("a2", alarm("a2", "INFO", 500)),
        ]));
        let b = MockAgent::start().await.unwrap();
        b.set_payload(alarms_payload(vec![
            ("b1", alarm("b1", "CRITICAL", 5)),
            ("b2", alarm("b2", "WARNING", 300)),
        ]));

        let engine = engine(vec![host(&a.url(), "a"), host(&b.url(), "b")]);
        engine.run_cycle().await;

        let alerts = engine.alerts();
        let ids: Vec<_> = alerts.iter().map(|a| a.alert_id.as_str()).collect();
        assert_eq!(ids, ["b1", "b2", "a1", "a2"]);
        assert_sorted(&alerts);
    }

    #[tokio::test]
    async fn test_each_cycle_replaces_snapshot() {
        let agent = MockAgent::start().await.unwrap();
        agent.set_payload(alarms_payload(vec![("cpu", alarm("cpu", "WARNING", 1))]));
        let engine = engine(vec![host(&agent.url(), "a")]);

        engine.run_cycle().await;
        let first = engine.alerts();
        assert_eq!(first.len(), 1);

        agent.set_payload(alarms_payload(vec![("cpu", alarm("cpu", "CLEAR", 2))]));
        engine.run_cycle().await;

        assert!(engine.alerts().is_empty());
        assert_eq!(first.len(), 1, "readers keep the version they loaded");
        assert_eq!(engine.host_status("a").unwrap().alert_count, 1);
    }

    #[tokio::test]
    async fn test_payload_failure_keeps_last_known_status() {
        init_test_tracing();
        let good = MockAgent::start().await.unwrap();
        good.set_payload(alarms_payload(vec![("cpu", alarm("cpu", "CRITICAL", 1))]));
        let flaky = MockAgent::start().await.unwrap();
        flaky.set_payload(alarms_payload(vec![("ram", alarm("ram", "WARNING", 1))]));

        let engine = engine(vec![host(&good.url(), "good"), host(&flaky.url(), "flaky")]);
        engine.run_cycle().await;
        let before = engine.host_status("flaky").unwrap();
        assert!(before.reachable);

        flaky.set_raw_body("{\"alarms\": [broken");
        engine.run_cycle().await;

        // le host fautif ne contribue rien, son statut reste celui du cycle précédent
        assert_eq!(engine.host_status("flaky").unwrap(), before);
        let alerts = engine.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].source_host, "good");
    }

    #[tokio::test]
    async fn test_payload_failure_on_first_poll_leaves_no_status() {
        let agent = MockAgent::start().await.unwrap();
        agent.set_raw_body("not json");

        let engine = engine(vec![host(&agent.url(), "garbled")]);
        engine.run_cycle().await;

        assert!(engine.host_status("garbled").is_none());
        assert!(engine.alerts().is_empty());
        assert_eq!(engine.cycle_count(), 1);
    }

    #[tokio::test]
    async fn test_status_survives_host_removal() {
        let agent = MockAgent::start().await.unwrap();
        let engine = engine(vec![host(&agent.url(), "old")]);
        engine.run_cycle().await;

        engine.registry().replace(Vec::new());
        engine.run_cycle().await;

        assert!(engine.host_status("old").is_some());
        assert!(engine.alerts().is_empty());
    }
}

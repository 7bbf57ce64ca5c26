/*!
# Aggregator DevKit - Stubs et utilitaires de test

Support de test pour le kernel d'agrégation :
- Agent de monitoring simulé (serveur HTTP local, requêtes enregistrées)
- Builders de payloads d'alarmes
- Helpers fichiers de hosts et logging de test
*/

pub mod alarm_builders;
pub mod test_utils;
pub mod upstream_stub;

pub use alarm_builders::{alarm, alarms_payload, AlarmBuilder};
pub use upstream_stub::{unreachable_url, MockAgent, RecordedRequest};

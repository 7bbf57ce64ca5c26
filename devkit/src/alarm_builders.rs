/*!
Builders pour payloads d'alarmes au format agent (`/api/v1/alarms`)
*/

use serde_json::{json, Map, Value};
use time::OffsetDateTime;

/// Un enregistrement d'alarme, tel que servi par un agent
#[derive(Debug, Clone)]
pub struct AlarmBuilder {
    name: String,
    status: String,
    updated: i64,
    value: Option<f64>,
    info: Option<String>,
}

impl AlarmBuilder {
    pub fn new(name: &str, status: &str) -> Self {
        Self {
            name: name.to_string(),
            status: status.to_string(),
            updated: 0,
            value: None,
            info: None,
        }
    }

    pub fn updated(mut self, epoch_secs: i64) -> Self {
        self.updated = epoch_secs;
        self
    }

    pub fn updated_at(self, at: OffsetDateTime) -> Self {
        self.updated(at.unix_timestamp())
    }

    pub fn value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn info(mut self, info: &str) -> Self {
        self.info = Some(info.to_string());
        self
    }

    pub fn build(self) -> Value {
        let mut record = json!({
            "name": self.name,
            "status": self.status,
            "updated": self.updated,
        });
        if let Some(v) = self.value {
            record["value"] = json!(v);
        }
        if let Some(info) = self.info {
            record["info"] = json!(info);
        }
        record
    }
}

/// Raccourci : nom, statut et date de mise à jour (epoch)
pub fn alarm(name: &str, status: &str, updated: i64) -> Value {
    AlarmBuilder::new(name, status).updated(updated).build()
}

/// Enveloppe `{"alarms": {id: record, ...}}` en conservant l'ordre donné
pub fn alarms_payload(records: Vec<(&str, Value)>) -> Value {
    let alarms: Map<String, Value> = records
        .into_iter()
        .map(|(id, record)| (id.to_string(), record))
        .collect();
    json!({ "alarms": alarms })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_builder_optional_fields() {
        let record = AlarmBuilder::new("cpu_usage", "WARNING")
            .updated_at(datetime!(2024-01-01 00:00 UTC))
            .value(91.5)
            .info("cpu high")
            .build();

        assert_eq!(record["updated"], 1_704_067_200);
        assert_eq!(record["value"], 91.5);
        assert_eq!(record["info"], "cpu high");

        let bare = alarm("disk", "CLEAR", 5);
        assert!(bare.get("value").is_none());
        assert!(bare.get("info").is_none());
    }

    #[test]
    fn test_payload_keeps_insertion_order() {
        let payload = alarms_payload(vec![
            ("zeta", alarm("z", "WARNING", 1)),
            ("alpha", alarm("a", "CRITICAL", 2)),
        ]);
        let ids: Vec<_> = payload["alarms"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(ids, ["zeta", "alpha"]);
    }
}

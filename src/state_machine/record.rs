use std::fmt::Debug;

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::stage::EntityKind;

/// Kind-specific domain fields of a tracked record.
///
/// Everything generic over entity kind (store, replication, service) is
/// written once against this trait.
pub trait Payload: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static {
    const KIND: EntityKind;

    /// Add this payload's scalar fields to the flat mirror projection.
    fn project(&self, fields: &mut Map<String, Value>);
}

/// A meal delivery from the kitchen to one school for one service day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryPayload {
    pub school_id: i64,
    pub school_name: String,
    #[serde(default)]
    pub driver_name: Option<String>,
    pub portions: u32,
    #[serde(default)]
    pub menu: Option<String>,
}

impl Payload for DeliveryPayload {
    const KIND: EntityKind = EntityKind::Delivery;

    fn project(&self, fields: &mut Map<String, Value>) {
        fields.insert("school_id".into(), self.school_id.into());
        fields.insert("school_name".into(), self.school_name.clone().into());
        fields.insert(
            "driver_name".into(),
            self.driver_name.clone().unwrap_or_default().into(),
        );
        fields.insert("portions".into(), self.portions.into());
        fields.insert("menu".into(), self.menu.clone().unwrap_or_default().into());
    }
}

/// Washing of the ompreng (food containers) returned from one delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningPayload {
    pub delivery_id: i64,
    pub school_name: String,
    pub container_count: u32,
    #[serde(default)]
    pub washer_name: Option<String>,
}

impl Payload for CleaningPayload {
    const KIND: EntityKind = EntityKind::Cleaning;

    fn project(&self, fields: &mut Map<String, Value>) {
        fields.insert("delivery_id".into(), self.delivery_id.into());
        fields.insert("school_name".into(), self.school_name.clone().into());
        fields.insert("container_count".into(), self.container_count.into());
        fields.insert(
            "washer_name".into(),
            self.washer_name.clone().unwrap_or_default().into(),
        );
    }
}

/// A tracked record as held by the authoritative store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<P> {
    pub id: i64,
    pub status: String,
    pub partition_date: NaiveDate,
    pub payload: P,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<P: Payload> Record<P> {
    pub fn kind(&self) -> EntityKind {
        P::KIND
    }

    /// Mirror path: `{domain}/{partition-date}/{kind}_{id}`.
    pub fn mirror_key(&self, domain: &str) -> String {
        format!(
            "{}/{}/{}_{}",
            domain.trim_matches('/'),
            self.partition_date.format("%Y-%m-%d"),
            P::KIND,
            self.id
        )
    }

    /// Flat scalar view written to the mirror. `written_at` becomes `last_updated`.
    pub fn projection(&self, written_at: DateTime<Utc>) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("id".into(), self.id.into());
        fields.insert("kind".into(), P::KIND.as_str().into());
        fields.insert("status".into(), self.status.clone().into());
        fields.insert(
            "partition_date".into(),
            self.partition_date.format("%Y-%m-%d").to_string().into(),
        );
        self.payload.project(&mut fields);
        fields.insert("created_at".into(), self.created_at.timestamp().into());
        fields.insert("updated_at".into(), self.updated_at.timestamp().into());
        fields.insert("last_updated".into(), written_at.timestamp().into());
        fields
    }
}

/// One accepted status change. Rows are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub id: i64,
    pub entity_kind: EntityKind,
    pub entity_id: i64,
    pub from_status: String,
    pub to_status: String,
    pub transitioned_at: DateTime<Utc>,
    pub transitioned_by: String,
    pub notes: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn delivery() -> Record<DeliveryPayload> {
        let at = Utc.with_ymd_and_hms(2026, 10, 18, 6, 30, 0).unwrap();
        Record {
            id: 7,
            status: "packed".into(),
            partition_date: NaiveDate::from_ymd_opt(2026, 10, 18).unwrap(),
            payload: DeliveryPayload {
                school_id: 12,
                school_name: "SDN 3 Sukamaju".into(),
                driver_name: None,
                portions: 240,
                menu: Some("nasi ayam".into()),
            },
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn mirror_key_uses_domain_date_and_identity() {
        let record = delivery();
        assert_eq!(
            record.mirror_key("delivery_monitoring"),
            "delivery_monitoring/2026-10-18/delivery_7"
        );
        assert_eq!(
            record.mirror_key("/delivery_monitoring/"),
            "delivery_monitoring/2026-10-18/delivery_7"
        );
    }

    #[test]
    fn projection_is_flat_and_scalar() {
        let record = delivery();
        let written = Utc.with_ymd_and_hms(2026, 10, 18, 7, 0, 0).unwrap();
        let fields = record.projection(written);

        assert_eq!(fields["id"], 7);
        assert_eq!(fields["kind"], "delivery");
        assert_eq!(fields["status"], "packed");
        assert_eq!(fields["school_name"], "SDN 3 Sukamaju");
        assert_eq!(fields["driver_name"], "");
        assert_eq!(fields["portions"], 240);
        assert_eq!(fields["last_updated"], written.timestamp());
        assert!(fields.values().all(|v| !v.is_object() && !v.is_array()));
    }

    #[test]
    fn cleaning_projection_carries_counts() {
        let payload = CleaningPayload {
            delivery_id: 7,
            school_name: "SDN 3 Sukamaju".into(),
            container_count: 240,
            washer_name: Some("Bu Sari".into()),
        };
        let mut fields = Map::new();
        payload.project(&mut fields);
        assert_eq!(fields["container_count"], 240);
        assert_eq!(fields["washer_name"], "Bu Sari");
        assert_eq!(CleaningPayload::KIND, EntityKind::Cleaning);
    }

    #[test]
    fn delivery_payload_optional_fields_default() {
        let payload: DeliveryPayload =
            serde_json::from_str(r#"{"school_id": 1, "school_name": "SDN 1", "portions": 100}"#)
                .unwrap();
        assert!(payload.driver_name.is_none());
        assert!(payload.menu.is_none());
    }
}

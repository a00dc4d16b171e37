use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use dualmode_common::{entity::STATE_UNKNOWN, EntityId, EntityState, StreamField};
use serde_json::Value;
use tracing::debug;

/// Local copy of the entities the thermostats watch, assembled from the
/// per-field topics of the MQTT state stream.
#[derive(Debug, Default)]
pub struct StateMirror {
    entities: HashMap<EntityId, EntityState>,
    dirty: HashSet<EntityId>,
}

impl StateMirror {
    /// Installs a full snapshot (e.g. one fetched over REST) without marking it dirty.
    pub fn seed(&mut self, state: EntityState) {
        self.entities.insert(state.entity_id.clone(), state);
    }

    #[cfg(test)]
    pub fn get(&self, entity_id: &EntityId) -> Option<&EntityState> {
        self.entities.get(entity_id)
    }

    /// Applies one stream message. Returns whether the entity changed.
    pub fn apply(&mut self, entity_id: EntityId, field: StreamField, payload: &str) -> bool {
        let entity = self
            .entities
            .entry(entity_id.clone())
            .or_insert_with(|| EntityState::new(entity_id.clone(), STATE_UNKNOWN));

        let changed = match field {
            StreamField::State => {
                let state = unquote(payload);
                if entity.state == state {
                    false
                } else {
                    entity.state = state.to_string();
                    true
                }
            }
            StreamField::Attribute(key) => {
                let value = decode_attribute(payload);
                if entity.attributes.get(&key) == Some(&value) {
                    false
                } else {
                    entity.attributes.insert(key, value);
                    true
                }
            }
            StreamField::LastChanged => match parse_timestamp(payload) {
                Some(at) => {
                    entity.last_changed = Some(at);
                    false
                }
                None => {
                    debug!("ignoring last_changed '{payload}' for {entity_id}");
                    false
                }
            },
            StreamField::LastUpdated => false,
        };

        if changed {
            self.dirty.insert(entity_id);
        }
        changed
    }

    /// Snapshots of every entity changed since the previous call.
    pub fn take_dirty(&mut self) -> Vec<EntityState> {
        let mut changed = Vec::with_capacity(self.dirty.len());
        for entity_id in self.dirty.drain() {
            if let Some(state) = self.entities.get(&entity_id) {
                changed.push(state.clone());
            }
        }
        changed
    }
}

/// Attribute payloads are JSON; anything else is kept as a plain string.
fn decode_attribute(payload: &str) -> Value {
    serde_json::from_str(payload).unwrap_or_else(|_| Value::String(payload.to_string()))
}

fn unquote(payload: &str) -> &str {
    let payload = payload.trim();
    payload
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(payload)
}

fn parse_timestamp(payload: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(unquote(payload))
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn climate_id() -> EntityId {
        "climate.heat_pump".parse().unwrap()
    }

    #[test]
    fn assembles_entity_from_fields() {
        let mut mirror = StateMirror::default();

        assert!(mirror.apply(climate_id(), StreamField::State, "cool"));
        assert!(mirror.apply(
            climate_id(),
            StreamField::Attribute("current_temperature".into()),
            "26.5"
        ));
        assert!(mirror.apply(
            climate_id(),
            StreamField::Attribute("hvac_modes".into()),
            r#"["off", "heat", "cool"]"#
        ));
        assert!(mirror.apply(
            climate_id(),
            StreamField::Attribute("preset_mode".into()),
            "\"eco\""
        ));

        let state = mirror.get(&climate_id()).unwrap();
        assert_eq!(state.state, "cool");
        assert_eq!(state.attr_f32("current_temperature"), Some(26.5));
        assert_eq!(state.attr_str("preset_mode"), Some("eco"));
        assert_eq!(
            state.attributes.get("hvac_modes"),
            Some(&json!(["off", "heat", "cool"]))
        );
    }

    #[test]
    fn non_json_attribute_is_kept_as_string() {
        let mut mirror = StateMirror::default();
        mirror.apply(
            climate_id(),
            StreamField::Attribute("friendly_name".into()),
            "Heat Pump",
        );
        assert_eq!(
            mirror.get(&climate_id()).unwrap().attr_str("friendly_name"),
            Some("Heat Pump")
        );
    }

    #[test]
    fn repeated_values_are_not_changes() {
        let mut mirror = StateMirror::default();
        assert!(mirror.apply(climate_id(), StreamField::State, "heat"));
        assert_eq!(mirror.take_dirty().len(), 1);

        assert!(!mirror.apply(climate_id(), StreamField::State, "heat"));
        assert!(mirror.take_dirty().is_empty());
    }

    #[test]
    fn take_dirty_drains_once_per_entity() {
        let mut mirror = StateMirror::default();
        mirror.apply(climate_id(), StreamField::State, "heat");
        mirror.apply(
            climate_id(),
            StreamField::Attribute("temperature".into()),
            "21",
        );

        let dirty = mirror.take_dirty();
        assert_eq!(dirty.len(), 1);
        assert_eq!(dirty[0].attr_f32("temperature"), Some(21.0));
        assert!(mirror.take_dirty().is_empty());
    }

    #[test]
    fn seeded_snapshot_is_updated_in_place() {
        let mut mirror = StateMirror::default();
        mirror.seed(EntityState::new(climate_id(), "heat").with_attribute("temperature", 20.0));
        assert!(mirror.take_dirty().is_empty());

        mirror.apply(climate_id(), StreamField::State, "cool");
        let state = mirror.get(&climate_id()).unwrap();
        assert_eq!(state.state, "cool");
        assert_eq!(state.attr_f32("temperature"), Some(20.0));
    }

    #[test]
    fn records_last_changed_without_marking_dirty() {
        let mut mirror = StateMirror::default();
        assert!(!mirror.apply(
            climate_id(),
            StreamField::LastChanged,
            "2024-05-01T12:00:00.123456+00:00"
        ));
        assert!(!mirror.apply(climate_id(), StreamField::LastChanged, "yesterday"));

        let state = mirror.get(&climate_id()).unwrap();
        assert_eq!(
            state.last_changed.map(|at| at.timestamp()),
            Some(1_714_564_800)
        );
        assert!(mirror.take_dirty().is_empty());
    }
}

use std::{collections::HashMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const STATE_UNAVAILABLE: &str = "unavailable";
pub const STATE_UNKNOWN: &str = "unknown";

pub const ATTR_CURRENT_TEMPERATURE: &str = "current_temperature";
pub const ATTR_TEMPERATURE: &str = "temperature";
pub const ATTR_TARGET_TEMP_LOW: &str = "target_temp_low";
pub const ATTR_TARGET_TEMP_HIGH: &str = "target_temp_high";
pub const ATTR_TARGET_TEMP_STEP: &str = "target_temp_step";
pub const ATTR_HVAC_MODE: &str = "hvac_mode";
pub const ATTR_HVAC_MODES: &str = "hvac_modes";
pub const ATTR_HVAC_ACTION: &str = "hvac_action";
pub const ATTR_MIN_TEMP: &str = "min_temp";
pub const ATTR_MAX_TEMP: &str = "max_temp";
pub const ATTR_PRESET_MODE: &str = "preset_mode";
pub const ATTR_PRESET_MODES: &str = "preset_modes";
pub const ATTR_FAN_MODE: &str = "fan_mode";
pub const ATTR_FAN_MODES: &str = "fan_modes";
pub const ATTR_SWING_MODE: &str = "swing_mode";
pub const ATTR_SWING_MODES: &str = "swing_modes";
pub const ATTR_UNIT_OF_MEASUREMENT: &str = "unit_of_measurement";
pub const ATTR_SUPPORTED_FEATURES: &str = "supported_features";
pub const ATTR_FRIENDLY_NAME: &str = "friendly_name";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntityIdError {
    #[error("entity_id must contain exactly one '.' separator")]
    InvalidFormat,
    #[error("domain cannot be empty")]
    EmptyDomain,
    #[error("object_id cannot be empty")]
    EmptyObjectId,
    #[error("domain contains invalid characters")]
    InvalidDomainChars,
    #[error("object_id contains invalid characters")]
    InvalidObjectIdChars,
}

/// A `domain.object_id` pair such as `climate.living_room`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    domain: String,
    object_id: String,
}

impl EntityId {
    pub fn new(
        domain: impl Into<String>,
        object_id: impl Into<String>,
    ) -> Result<Self, EntityIdError> {
        let domain = domain.into();
        let object_id = object_id.into();

        if domain.is_empty() {
            return Err(EntityIdError::EmptyDomain);
        }
        if object_id.is_empty() {
            return Err(EntityIdError::EmptyObjectId);
        }
        if domain.contains("__") || !is_valid_slug(&domain) {
            return Err(EntityIdError::InvalidDomainChars);
        }
        if !is_valid_slug(&object_id) {
            return Err(EntityIdError::InvalidObjectIdChars);
        }

        Ok(Self { domain, object_id })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn object_id(&self) -> &str {
        &self.object_id
    }
}

fn is_valid_slug(s: &str) -> bool {
    !s.starts_with('_')
        && !s.ends_with('_')
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

impl FromStr for EntityId {
    type Err = EntityIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((domain, object_id)) = s.split_once('.') else {
            return Err(EntityIdError::InvalidFormat);
        };
        if object_id.contains('.') {
            return Err(EntityIdError::InvalidFormat);
        }
        Self::new(domain, object_id)
    }
}

impl TryFrom<String> for EntityId {
    type Error = EntityIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.to_string()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.domain, self.object_id)
    }
}

/// Last known state of a host-platform entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: EntityId,
    pub state: String,
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_changed: Option<DateTime<Utc>>,
}

impl EntityState {
    pub fn new(entity_id: EntityId, state: impl Into<String>) -> Self {
        Self {
            entity_id,
            state: state.into(),
            attributes: HashMap::new(),
            last_changed: None,
        }
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn is_available(&self) -> bool {
        self.state != STATE_UNAVAILABLE && self.state != STATE_UNKNOWN
    }

    /// Numeric attribute; numbers encoded as strings are accepted too.
    pub fn attr_f32(&self, key: &str) -> Option<f32> {
        match self.attributes.get(key)? {
            serde_json::Value::Number(n) => n.as_f64().map(|v| v as f32),
            serde_json::Value::String(s) => s.trim().parse::<f32>().ok(),
            _ => None,
        }
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(serde_json::Value::as_str)
    }

    pub fn attr_str_list(&self, key: &str) -> Option<Vec<String>> {
        let values = self.attributes.get(key)?.as_array()?;
        Some(
            values
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_valid_entity_id() {
        let id: EntityId = "climate.living_room".parse().unwrap();
        assert_eq!(id.domain(), "climate");
        assert_eq!(id.object_id(), "living_room");
        assert_eq!(id.to_string(), "climate.living_room");
    }

    #[test]
    fn rejects_malformed_entity_ids() {
        assert_eq!(
            "climate".parse::<EntityId>(),
            Err(EntityIdError::InvalidFormat)
        );
        assert_eq!(
            "climate.a.b".parse::<EntityId>(),
            Err(EntityIdError::InvalidFormat)
        );
        assert_eq!(".x".parse::<EntityId>(), Err(EntityIdError::EmptyDomain));
        assert_eq!(
            "sensor.".parse::<EntityId>(),
            Err(EntityIdError::EmptyObjectId)
        );
        assert_eq!(
            "Climate.x".parse::<EntityId>(),
            Err(EntityIdError::InvalidDomainChars)
        );
        assert_eq!(
            "my__domain.x".parse::<EntityId>(),
            Err(EntityIdError::InvalidDomainChars)
        );
        assert_eq!(
            "sensor._temp".parse::<EntityId>(),
            Err(EntityIdError::InvalidObjectIdChars)
        );
    }

    #[test]
    fn reads_typed_attributes() {
        let id: EntityId = "climate.hall".parse().unwrap();
        let state = EntityState::new(id, "heat")
            .with_attribute(ATTR_CURRENT_TEMPERATURE, 21.5)
            .with_attribute(ATTR_MIN_TEMP, "16")
            .with_attribute(ATTR_HVAC_MODES, serde_json::json!(["heat", "cool", "off"]))
            .with_attribute(ATTR_PRESET_MODE, "eco");

        assert_eq!(state.attr_f32(ATTR_CURRENT_TEMPERATURE), Some(21.5));
        assert_eq!(state.attr_f32(ATTR_MIN_TEMP), Some(16.0));
        assert_eq!(state.attr_f32(ATTR_PRESET_MODE), None);
        assert_eq!(state.attr_str(ATTR_PRESET_MODE), Some("eco"));
        assert_eq!(
            state.attr_str_list(ATTR_HVAC_MODES),
            Some(vec!["heat".to_string(), "cool".to_string(), "off".to_string()])
        );
        assert!(state.is_available());
    }

    #[test]
    fn unknown_and_unavailable_are_not_available() {
        let id: EntityId = "sensor.t".parse().unwrap();
        assert!(!EntityState::new(id.clone(), STATE_UNKNOWN).is_available());
        assert!(!EntityState::new(id, STATE_UNAVAILABLE).is_available());
    }
}

use std::{collections::HashSet, time::Duration};

use serde::{de, Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::{entity::EntityId, types::HvacMode};

pub const PLATFORM: &str = "dualmode_generic";
pub const DEFAULT_NAME: &str = "Generic Thermostat";
pub const DEFAULT_TOLERANCE: f32 = 0.3;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("climate entry {index}: {message}")]
    Entry { index: usize, message: String },
    #[error("platform must be 'dualmode_generic', got '{0}'")]
    UnsupportedPlatform(String),
    #[error("{key} must not be negative (got {value})")]
    NegativeTolerance { key: &'static str, value: f32 },
    #[error("{0} must be a finite number")]
    NonFinite(&'static str),
    #[error("min_cycle_duration must be positive")]
    NonPositiveMinCycle,
    #[error("initial_hvac_mode '{0}' is not allowed")]
    InvalidInitialMode(HvacMode),
    #[error("target_temp_low ({low}) must not exceed target_temp_high ({high})")]
    InvalidTargetRange { low: f32, high: f32 },
    #[error("duplicate thermostat '{0}'")]
    Duplicate(String),
}

/// Time period in any of the host platform's configuration forms.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TimePeriod {
    Seconds(f64),
    Text(String),
    Parts(TimePeriodParts),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimePeriodParts {
    #[serde(default)]
    pub days: f64,
    #[serde(default)]
    pub hours: f64,
    #[serde(default)]
    pub minutes: f64,
    #[serde(default)]
    pub seconds: f64,
    #[serde(default)]
    pub milliseconds: f64,
}

impl TimePeriod {
    pub fn to_duration(&self) -> Result<Duration, String> {
        let secs = match self {
            Self::Seconds(secs) => *secs,
            Self::Text(text) => parse_period_text(text)?,
            Self::Parts(parts) => {
                parts.days * 86_400.0
                    + parts.hours * 3_600.0
                    + parts.minutes * 60.0
                    + parts.seconds
                    + parts.milliseconds / 1_000.0
            }
        };

        if !secs.is_finite() || secs < 0.0 {
            return Err(format!("time period must be a non-negative duration: {self:?}"));
        }
        Duration::try_from_secs_f64(secs)
            .map_err(|err| format!("time period out of range: {self:?}: {err}"))
    }
}

// Accepts "SS", "HH:MM" and "HH:MM:SS"; the seconds field may be fractional.
fn parse_period_text(text: &str) -> Result<f64, String> {
    let text = text.trim();
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let parts: Vec<&str> = body.split(':').collect();
    let number = |part: &str| -> Result<f64, String> {
        part.trim()
            .parse::<f64>()
            .map_err(|_| format!("invalid time period '{text}'"))
    };

    let secs = match parts[..] {
        [secs] => number(secs)?,
        [hours, minutes] => number(hours)? * 3_600.0 + number(minutes)? * 60.0,
        [hours, minutes, secs] => {
            number(hours)? * 3_600.0 + number(minutes)? * 60.0 + number(secs)?
        }
        _ => return Err(format!("invalid time period '{text}'")),
    };

    Ok(if negative { -secs } else { secs })
}

fn deserialize_time_period<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let period = Option::<TimePeriod>::deserialize(deserializer)?;
    period
        .map(|p| p.to_duration().map_err(de::Error::custom))
        .transpose()
}

fn default_name() -> String {
    DEFAULT_NAME.to_string()
}

fn default_tolerance() -> f32 {
    DEFAULT_TOLERANCE
}

/// One `dualmode_generic` platform entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThermostatConfig {
    pub platform: String,
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub unique_id: Option<String>,
    pub climate_entity_id: EntityId,
    #[serde(default)]
    pub custom_temp_entity_id: Option<EntityId>,
    #[serde(default)]
    pub target_temp: Option<f32>,
    #[serde(default)]
    pub target_temp_high: Option<f32>,
    #[serde(default)]
    pub target_temp_low: Option<f32>,
    #[serde(default, deserialize_with = "deserialize_time_period")]
    pub min_cycle_duration: Option<Duration>,
    #[serde(default = "default_tolerance")]
    pub cold_tolerance: f32,
    #[serde(default = "default_tolerance")]
    pub hot_tolerance: f32,
    #[serde(default)]
    pub initial_hvac_mode: Option<HvacMode>,
}

impl ThermostatConfig {
    pub fn new(climate_entity_id: EntityId) -> Self {
        Self {
            platform: PLATFORM.to_string(),
            name: default_name(),
            unique_id: None,
            climate_entity_id,
            custom_temp_entity_id: None,
            target_temp: None,
            target_temp_high: None,
            target_temp_low: None,
            min_cycle_duration: None,
            cold_tolerance: DEFAULT_TOLERANCE,
            hot_tolerance: DEFAULT_TOLERANCE,
            initial_hvac_mode: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.platform != PLATFORM {
            return Err(ConfigError::UnsupportedPlatform(self.platform.clone()));
        }

        for (key, value) in [
            ("cold_tolerance", self.cold_tolerance),
            ("hot_tolerance", self.hot_tolerance),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite(key));
            }
            if value < 0.0 {
                return Err(ConfigError::NegativeTolerance { key, value });
            }
        }

        for (key, value) in [
            ("target_temp", self.target_temp),
            ("target_temp_low", self.target_temp_low),
            ("target_temp_high", self.target_temp_high),
        ] {
            if value.is_some_and(|v| !v.is_finite()) {
                return Err(ConfigError::NonFinite(key));
            }
        }

        if let (Some(low), Some(high)) = (self.target_temp_low, self.target_temp_high) {
            if low > high {
                return Err(ConfigError::InvalidTargetRange { low, high });
            }
        }

        if self.min_cycle_duration.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::NonPositiveMinCycle);
        }

        if let Some(mode) = self.initial_hvac_mode {
            if !mode.is_valid_initial() {
                return Err(ConfigError::InvalidInitialMode(mode));
            }
        }

        Ok(())
    }

    pub fn min_cycle_ms(&self) -> u64 {
        self.min_cycle_duration
            .map(|d| d.as_millis().try_into().unwrap_or(u64::MAX))
            .unwrap_or(0)
    }

    /// Object id of the virtual entity, derived from `unique_id` or `name`.
    pub fn object_id(&self) -> String {
        let source = self.unique_id.as_deref().unwrap_or(&self.name);
        let slug = slugify(source);
        if slug.is_empty() {
            "dualmode_thermostat".to_string()
        } else {
            slug
        }
    }
}

fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}

/// Extracts every `dualmode_generic` entry from a configuration document with
/// a top-level `climate:` key. Entries of other platforms are skipped.
pub fn parse_platform_entries(yaml: &str) -> Result<Vec<ThermostatConfig>, ConfigError> {
    let document: serde_yaml::Value = serde_yaml::from_str(yaml)?;

    let entries = match document.get("climate") {
        None | Some(serde_yaml::Value::Null) => Vec::new(),
        Some(serde_yaml::Value::Sequence(items)) => items.clone(),
        Some(single) => vec![single.clone()],
    };

    let mut configs = Vec::new();
    let mut seen = HashSet::new();
    for (index, entry) in entries.into_iter().enumerate() {
        let platform = entry.get("platform").and_then(serde_yaml::Value::as_str);
        if platform != Some(PLATFORM) {
            continue;
        }

        let config: ThermostatConfig =
            serde_yaml::from_value(entry).map_err(|err| ConfigError::Entry {
                index,
                message: err.to_string(),
            })?;
        config.validate().map_err(|err| ConfigError::Entry {
            index,
            message: err.to_string(),
        })?;

        let object_id = config.object_id();
        if !seen.insert(object_id.clone()) {
            return Err(ConfigError::Duplicate(object_id));
        }
        configs.push(config);
    }

    Ok(configs)
}

/// Connection settings for the host platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub ha_url: String,
    pub ha_token: String,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
    pub statestream_base_topic: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            ha_url: "http://127.0.0.1:8123".to_string(),
            ha_token: String::new(),
            mqtt_host: "127.0.0.1".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
            statestream_base_topic: "homeassistant".to_string(),
        }
    }
}

/// Virtual thermostat state kept across restarts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub hvac_mode: Option<HvacMode>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub target_temp_low: Option<f32>,
    #[serde(default)]
    pub target_temp_high: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
climate:
  - platform: generic_thermostat
    name: Other
    heater: switch.heater
    target_sensor: sensor.t
  - platform: dualmode_generic
    name: Living Room
    unique_id: living_room_dualmode
    climate_entity_id: climate.living_room_ac
    custom_temp_entity_id: sensor.living_room_temperature
    target_temp_high: 24
    target_temp_low: 19.5
    min_cycle_duration:
      minutes: 5
    cold_tolerance: 0.5
    hot_tolerance: 0.4
    initial_hvac_mode: heat_cool
"#;

    #[test]
    fn parses_dualmode_entries_and_skips_other_platforms() {
        let configs = parse_platform_entries(SAMPLE).unwrap();
        assert_eq!(configs.len(), 1);

        let config = &configs[0];
        assert_eq!(config.name, "Living Room");
        assert_eq!(config.climate_entity_id.to_string(), "climate.living_room_ac");
        assert_eq!(
            config.custom_temp_entity_id.as_ref().map(ToString::to_string),
            Some("sensor.living_room_temperature".to_string())
        );
        assert_eq!(config.target_temp_high, Some(24.0));
        assert_eq!(config.target_temp_low, Some(19.5));
        assert_eq!(config.min_cycle_ms(), 300_000);
        assert_eq!(config.cold_tolerance, 0.5);
        assert_eq!(config.hot_tolerance, 0.4);
        assert_eq!(config.initial_hvac_mode, Some(HvacMode::HeatCool));
        assert_eq!(config.object_id(), "living_room_dualmode");
    }

    #[test]
    fn applies_defaults() {
        let yaml = "climate:\n  platform: dualmode_generic\n  climate_entity_id: climate.ac\n";
        let configs = parse_platform_entries(yaml).unwrap();
        let config = &configs[0];

        assert_eq!(config.name, DEFAULT_NAME);
        assert_eq!(config.cold_tolerance, DEFAULT_TOLERANCE);
        assert_eq!(config.hot_tolerance, DEFAULT_TOLERANCE);
        assert_eq!(config.min_cycle_duration, None);
        assert_eq!(config.min_cycle_ms(), 0);
        assert_eq!(config.initial_hvac_mode, None);
        assert_eq!(config.object_id(), "generic_thermostat");
    }

    #[test]
    fn missing_climate_section_yields_no_entries() {
        assert!(parse_platform_entries("sensor: []\n").unwrap().is_empty());
    }

    #[test]
    fn time_period_forms() {
        let text = |s: &str| TimePeriod::Text(s.to_string()).to_duration().unwrap();
        assert_eq!(text("00:05"), Duration::from_secs(300));
        assert_eq!(text("01:02:03"), Duration::from_secs(3_723));
        assert_eq!(text("45"), Duration::from_secs(45));
        assert_eq!(
            TimePeriod::Seconds(90.0).to_duration().unwrap(),
            Duration::from_secs(90)
        );
        assert_eq!(
            TimePeriod::Parts(TimePeriodParts {
                hours: 1.0,
                seconds: 30.0,
                ..Default::default()
            })
            .to_duration()
            .unwrap(),
            Duration::from_secs(3_630)
        );
        assert!(TimePeriod::Text("-00:05".to_string()).to_duration().is_err());
        assert!(TimePeriod::Text("a:b".to_string()).to_duration().is_err());
        assert!(TimePeriod::Text("1:2:3:4".to_string()).to_duration().is_err());
        assert!(TimePeriod::Seconds(1e30).to_duration().is_err());
        assert!(TimePeriod::Parts(TimePeriodParts {
            days: 1e20,
            ..Default::default()
        })
        .to_duration()
        .is_err());
    }

    #[test]
    fn huge_min_cycle_duration_is_a_config_error() {
        let yaml = "climate:\n  - platform: dualmode_generic\n    climate_entity_id: climate.ac\n    min_cycle_duration: 1e30\n";
        assert!(matches!(
            parse_platform_entries(yaml),
            Err(ConfigError::Entry { index: 0, .. })
        ));
    }

    #[test]
    fn string_min_cycle_duration_is_accepted() {
        let yaml = "climate:\n  - platform: dualmode_generic\n    climate_entity_id: climate.ac\n    min_cycle_duration: \"00:10:00\"\n";
        let configs = parse_platform_entries(yaml).unwrap();
        assert_eq!(configs[0].min_cycle_ms(), 600_000);
    }

    #[test]
    fn rejects_invalid_entries() {
        let bad_entity = "climate:\n  - platform: dualmode_generic\n    climate_entity_id: not-an-entity\n";
        assert!(matches!(
            parse_platform_entries(bad_entity),
            Err(ConfigError::Entry { index: 0, .. })
        ));

        let unknown_key = "climate:\n  - platform: dualmode_generic\n    climate_entity_id: climate.ac\n    heater: switch.x\n";
        assert!(parse_platform_entries(unknown_key).is_err());

        let bad_mode = "climate:\n  - platform: dualmode_generic\n    climate_entity_id: climate.ac\n    initial_hvac_mode: boost\n";
        assert!(parse_platform_entries(bad_mode).is_err());

        let zero_cycle = "climate:\n  - platform: dualmode_generic\n    climate_entity_id: climate.ac\n    min_cycle_duration: 0\n";
        assert!(parse_platform_entries(zero_cycle).is_err());
    }

    #[test]
    fn validate_catches_semantic_errors() {
        let id: EntityId = "climate.ac".parse().unwrap();

        let mut config = ThermostatConfig::new(id.clone());
        config.cold_tolerance = -0.1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NegativeTolerance { key: "cold_tolerance", .. })
        ));

        let mut config = ThermostatConfig::new(id.clone());
        config.target_temp_low = Some(25.0);
        config.target_temp_high = Some(20.0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTargetRange { .. })
        ));

        let mut config = ThermostatConfig::new(id.clone());
        config.initial_hvac_mode = Some(HvacMode::Auto);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidInitialMode(HvacMode::Auto))
        ));

        let mut config = ThermostatConfig::new(id);
        config.platform = "generic_thermostat".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedPlatform(_))
        ));
    }

    #[test]
    fn duplicate_thermostats_are_rejected() {
        let yaml = "climate:\n  - platform: dualmode_generic\n    climate_entity_id: climate.a\n  - platform: dualmode_generic\n    climate_entity_id: climate.b\n";
        assert!(matches!(
            parse_platform_entries(yaml),
            Err(ConfigError::Duplicate(name)) if name == "generic_thermostat"
        ));
    }

    #[test]
    fn object_id_is_slugified_name() {
        let mut config = ThermostatConfig::new("climate.ac".parse().unwrap());
        config.name = "  Upstairs Heat-Pump #2 ".to_string();
        assert_eq!(config.object_id(), "upstairs_heat_pump_2");
    }
}

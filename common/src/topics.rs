use crate::entity::EntityId;

pub const COMMAND_ROOT: &str = "dualmode";

/// Wildcard matching every command of every virtual thermostat.
pub const TOPIC_COMMAND_FILTER: &str = "dualmode/+/set/+";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThermostatCommand {
    HvacMode,
    Temperature,
    PresetMode,
    FanMode,
    SwingMode,
}

impl ThermostatCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HvacMode => "hvac_mode",
            Self::Temperature => "temperature",
            Self::PresetMode => "preset_mode",
            Self::FanMode => "fan_mode",
            Self::SwingMode => "swing_mode",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "hvac_mode" => Some(Self::HvacMode),
            "temperature" => Some(Self::Temperature),
            "preset_mode" => Some(Self::PresetMode),
            "fan_mode" => Some(Self::FanMode),
            "swing_mode" => Some(Self::SwingMode),
            _ => None,
        }
    }
}

pub fn state_topic(object_id: &str) -> String {
    format!("{COMMAND_ROOT}/{object_id}/state")
}

pub fn command_topic(object_id: &str, command: ThermostatCommand) -> String {
    format!("{COMMAND_ROOT}/{object_id}/set/{}", command.as_str())
}

pub fn parse_command_topic(topic: &str) -> Option<(&str, ThermostatCommand)> {
    let mut parts = topic.split('/');
    let (Some(COMMAND_ROOT), Some(object_id), Some("set"), Some(command), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return None;
    };
    if object_id.is_empty() {
        return None;
    }
    Some((object_id, ThermostatCommand::parse(command)?))
}

/// Field of an entity exported by the host's MQTT state stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamField {
    State,
    LastChanged,
    LastUpdated,
    Attribute(String),
}

/// Subscription covering every field the state stream exports for `entity_id`.
pub fn statestream_filter(base_topic: &str, entity_id: &EntityId) -> String {
    format!(
        "{}/{}/{}/#",
        base_topic.trim_end_matches('/'),
        entity_id.domain(),
        entity_id.object_id()
    )
}

pub fn parse_statestream_topic(base_topic: &str, topic: &str) -> Option<(EntityId, StreamField)> {
    let rest = topic
        .strip_prefix(base_topic.trim_end_matches('/'))?
        .strip_prefix('/')?;
    let mut parts = rest.split('/');
    let (Some(domain), Some(object_id), Some(field), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };

    let entity_id = EntityId::new(domain, object_id).ok()?;
    let field = match field {
        "state" => StreamField::State,
        "last_changed" => StreamField::LastChanged,
        "last_updated" => StreamField::LastUpdated,
        "" => return None,
        attribute => StreamField::Attribute(attribute.to_string()),
    };
    Some((entity_id, field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn command_topics_round_trip() {
        let topic = command_topic("living_room", ThermostatCommand::Temperature);
        assert_eq!(topic, "dualmode/living_room/set/temperature");
        assert_eq!(
            parse_command_topic(&topic),
            Some(("living_room", ThermostatCommand::Temperature))
        );
        assert_eq!(state_topic("living_room"), "dualmode/living_room/state");
    }

    #[test]
    fn rejects_foreign_command_topics() {
        assert_eq!(parse_command_topic("dualmode/living_room/state"), None);
        assert_eq!(parse_command_topic("dualmode//set/hvac_mode"), None);
        assert_eq!(parse_command_topic("dualmode/x/set/boost"), None);
        assert_eq!(parse_command_topic("dualmode/x/set/hvac_mode/extra"), None);
        assert_eq!(parse_command_topic("other/x/set/hvac_mode"), None);
    }

    #[test]
    fn parses_statestream_topics() {
        let climate: EntityId = "climate.heat_pump".parse().unwrap();
        assert_eq!(
            statestream_filter("homeassistant/", &climate),
            "homeassistant/climate/heat_pump/#"
        );
        assert_eq!(
            parse_statestream_topic("homeassistant", "homeassistant/climate/heat_pump/state"),
            Some((climate.clone(), StreamField::State))
        );
        assert_eq!(
            parse_statestream_topic(
                "homeassistant",
                "homeassistant/climate/heat_pump/current_temperature"
            ),
            Some((
                climate.clone(),
                StreamField::Attribute("current_temperature".to_string())
            ))
        );
        assert_eq!(
            parse_statestream_topic("homeassistant", "homeassistant/climate/heat_pump/last_changed"),
            Some((climate, StreamField::LastChanged))
        );
        assert_eq!(
            parse_statestream_topic("homeassistant", "homeassistantx/climate/heat_pump/state"),
            None
        );
        assert_eq!(
            parse_statestream_topic("homeassistant", "homeassistant/climate/heat_pump"),
            None
        );
        assert_eq!(
            parse_statestream_topic("homeassistant", "homeassistant/Climate/heat_pump/state"),
            None
        );
    }
}

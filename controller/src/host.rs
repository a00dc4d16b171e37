use std::{
    collections::BTreeSet,
    path::PathBuf,
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};

use anyhow::Context;
use chrono::{DateTime, Utc};
use dualmode_common::{
    parse_platform_entries, parse_command_topic, parse_statestream_topic, state_topic,
    statestream_filter, ConnectionConfig, DualModeEngine, EngineAction, EntityId, EntityState,
    HvacMode, PersistedState, TemperatureUpdate, ThermostatCommand, ThermostatConfig,
    TOPIC_COMMAND_FILTER,
};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{rest::HomeAssistantClient, statestream::StateMirror, store::AppStore};

const MAX_MQTT_PAYLOAD_BYTES: usize = 512;

/// Offset of the monotonic clock so switches that happened shortly before
/// startup still have a representable timestamp.
const MONOTONIC_ORIGIN_MS: u64 = 24 * 60 * 60 * 1000;

#[derive(Clone)]
struct AppState {
    thermostats: Arc<Vec<Thermostat>>,
    mirror: Arc<Mutex<StateMirror>>,
    mqtt: AsyncClient,
    client: HomeAssistantClient,
    store: AppStore,
    base_topic: Arc<String>,
}

#[derive(Clone)]
struct Thermostat {
    object_id: String,
    engine: Arc<Mutex<DualModeEngine>>,
    last_saved: Arc<Mutex<Option<PersistedState>>>,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let connection = connection_from_env();
    let config_path = std::env::var("DUALMODE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./configuration.yaml"));
    let raw = tokio::fs::read_to_string(&config_path)
        .await
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let configs = parse_platform_entries(&raw)
        .with_context(|| format!("invalid configuration in {}", config_path.display()))?;
    if configs.is_empty() {
        anyhow::bail!(
            "no dualmode_generic thermostats configured in {}",
            config_path.display()
        );
    }

    if connection.ha_token.is_empty() {
        warn!("HA_TOKEN is not set; REST calls will be rejected");
    }
    let client = HomeAssistantClient::new(&connection.ha_url, &connection.ha_token)
        .context("failed to build home assistant client")?;
    let store = AppStore::from_env();

    let mut mirror = StateMirror::default();
    let mut thermostats = Vec::with_capacity(configs.len());
    for config in configs {
        thermostats.push(start_thermostat(config, &client, &store, &mut mirror).await);
    }

    let mut mqtt_options = MqttOptions::new(
        "dualmode-controller",
        connection.mqtt_host.clone(),
        connection.mqtt_port,
    );
    if !connection.mqtt_user.is_empty() {
        mqtt_options.set_credentials(connection.mqtt_user.clone(), connection.mqtt_pass.clone());
    }

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);

    let app_state = AppState {
        thermostats: Arc::new(thermostats),
        mirror: Arc::new(Mutex::new(mirror)),
        mqtt,
        client,
        store,
        base_topic: Arc::new(connection.statestream_base_topic),
    };

    spawn_mqtt_loop(app_state.clone(), eventloop);
    spawn_control_loop(app_state.clone());
    spawn_state_publish_loop(app_state.clone());

    info!(
        "managing {} dualmode thermostat(s)",
        app_state.thermostats.len()
    );
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("shutting down");
    for thermostat in app_state.thermostats.iter() {
        if let Err(err) = persist_if_changed(&app_state, thermostat).await {
            warn!("failed to persist {}: {err:#}", thermostat.object_id);
        }
    }
    Ok(())
}

fn connection_from_env() -> ConnectionConfig {
    let defaults = ConnectionConfig::default();
    ConnectionConfig {
        ha_url: std::env::var("HA_URL").unwrap_or(defaults.ha_url),
        ha_token: std::env::var("HA_TOKEN").unwrap_or(defaults.ha_token),
        mqtt_host: std::env::var("MQTT_HOST").unwrap_or(defaults.mqtt_host),
        mqtt_port: std::env::var("MQTT_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(defaults.mqtt_port),
        mqtt_user: std::env::var("MQTT_USER").unwrap_or(defaults.mqtt_user),
        mqtt_pass: std::env::var("MQTT_PASS").unwrap_or(defaults.mqtt_pass),
        statestream_base_topic: std::env::var("STATESTREAM_BASE_TOPIC")
            .unwrap_or(defaults.statestream_base_topic),
    }
}

/// Builds one engine and brings it up to date with the wrapped entities and
/// the state saved by the previous run.
async fn start_thermostat(
    config: ThermostatConfig,
    client: &HomeAssistantClient,
    store: &AppStore,
    mirror: &mut StateMirror,
) -> Thermostat {
    let object_id = config.object_id();
    let mut engine = DualModeEngine::new(config);

    let climate = fetch_snapshot(client, engine.climate_entity_id()).await;
    let sensor = match engine.sensor_entity_id().cloned() {
        Some(sensor_id) => fetch_snapshot(client, &sensor_id).await,
        None => None,
    };
    let previous = store.load_state(&object_id).await.unwrap_or_else(|err| {
        warn!("failed to load saved state of {object_id}: {err:#}");
        None
    });

    engine.restore(previous.as_ref(), climate.as_ref());

    let now_ms = monotonic_ms();
    match climate {
        Some(state) => {
            info!("{object_id}: updating internal state from {}", state.entity_id);
            engine.observe_climate(&state, now_ms);
            if let Some(at_ms) = state.last_changed.and_then(|at| monotonic_at(at, now_ms)) {
                engine.seed_last_switch(at_ms);
            }
            mirror.seed(state);
        }
        None => warn!(
            "{object_id}: {} is not available yet",
            engine.climate_entity_id()
        ),
    }
    if let Some(state) = sensor {
        engine.observe_sensor(&state);
        mirror.seed(state);
    }

    info!(
        "{object_id}: started in {} wrapping {}",
        engine.hvac_mode(),
        engine.climate_entity_id()
    );

    let last_saved = Some(engine.persisted_state());
    Thermostat {
        object_id,
        engine: Arc::new(Mutex::new(engine)),
        last_saved: Arc::new(Mutex::new(last_saved)),
    }
}

async fn fetch_snapshot(client: &HomeAssistantClient, entity_id: &EntityId) -> Option<EntityState> {
    match client.fetch_state(entity_id).await {
        Ok(state) => state,
        Err(err) => {
            warn!("failed to fetch {entity_id}: {err}");
            None
        }
    }
}

async fn subscribe_topics(app_state: &AppState) -> anyhow::Result<()> {
    let mut topics = BTreeSet::new();
    for thermostat in app_state.thermostats.iter() {
        let engine = thermostat.engine.lock().await;
        topics.insert(statestream_filter(
            &app_state.base_topic,
            engine.climate_entity_id(),
        ));
        if let Some(sensor_id) = engine.sensor_entity_id() {
            topics.insert(statestream_filter(&app_state.base_topic, sensor_id));
        }
    }
    topics.insert(TOPIC_COMMAND_FILTER.to_string());

    for topic in topics {
        app_state.mqtt.subscribe(topic, QoS::AtMostOnce).await?;
    }
    Ok(())
}

fn spawn_mqtt_loop(app_state: AppState, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) =
                        handle_mqtt_message(&app_state, message.topic, message.payload.to_vec())
                            .await
                    {
                        warn!("mqtt message handling error: {err:#}");
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                    // Clean sessions drop subscriptions on every reconnect.
                    if let Err(err) = subscribe_topics(&app_state).await {
                        warn!("mqtt resubscribe failed: {err:#}");
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

/// Feeds changed entities to the engines and lets them re-check the
/// minimum cycle once a second.
fn spawn_control_loop(app_state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));

        loop {
            interval.tick().await;
            let now_ms = monotonic_ms();
            let changed = { app_state.mirror.lock().await.take_dirty() };

            for thermostat in app_state.thermostats.iter() {
                let (climate_id, actions) = {
                    let mut engine = thermostat.engine.lock().await;
                    let mut actions = Vec::new();
                    for state in &changed {
                        actions.extend(engine.climate_state_changed(state, now_ms));
                        actions.extend(engine.sensor_state_changed(state, now_ms));
                    }
                    actions.extend(engine.tick(now_ms));
                    (engine.climate_entity_id().clone(), actions)
                };

                if !actions.is_empty() {
                    execute_engine_actions(&app_state, &climate_id, actions).await;
                }
                if !changed.is_empty() {
                    publish_state(&app_state, thermostat).await;
                }
            }
        }
    });
}

fn spawn_state_publish_loop(app_state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(10));
        loop {
            interval.tick().await;

            for thermostat in app_state.thermostats.iter() {
                publish_state(&app_state, thermostat).await;
                if let Err(err) = persist_if_changed(&app_state, thermostat).await {
                    warn!("failed to persist {}: {err:#}", thermostat.object_id);
                }
            }
        }
    });
}

async fn publish_state(app_state: &AppState, thermostat: &Thermostat) {
    let payload = {
        let engine = thermostat.engine.lock().await;
        serde_json::to_vec(&engine.state_payload())
    };

    match payload {
        Ok(body) => {
            if let Err(err) = app_state
                .mqtt
                .publish(
                    state_topic(&thermostat.object_id),
                    QoS::AtLeastOnce,
                    true,
                    body,
                )
                .await
            {
                warn!("{} state publish failed: {err}", thermostat.object_id);
            }
        }
        Err(err) => warn!("{} state serialization failed: {err}", thermostat.object_id),
    }
}

async fn persist_if_changed(app_state: &AppState, thermostat: &Thermostat) -> anyhow::Result<()> {
    let current = { thermostat.engine.lock().await.persisted_state() };
    let mut last_saved = thermostat.last_saved.lock().await;
    if last_saved.as_ref() == Some(&current) {
        return Ok(());
    }

    app_state
        .store
        .save_state(&thermostat.object_id, &current)
        .await?;
    *last_saved = Some(current);
    Ok(())
}

/// Forwards engine decisions to the wrapped entity. Failures are logged and
/// the engine state is left as is.
async fn execute_engine_actions(
    app_state: &AppState,
    climate_id: &EntityId,
    actions: Vec<EngineAction>,
) {
    for action in actions {
        info!("{climate_id}: {action:?}");
        let call = action.service_call(climate_id);
        if let Err(err) = app_state.client.call_service(&call).await {
            warn!(
                "{climate_id}: {}.{} failed: {err}",
                call.domain, call.service
            );
        }
    }
}

async fn handle_mqtt_message(
    app_state: &AppState,
    topic: String,
    payload: Vec<u8>,
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    let message = String::from_utf8(payload).context("payload is not UTF-8")?;

    if let Some((object_id, command)) = parse_command_topic(&topic) {
        return handle_command(app_state, object_id, command, message.trim()).await;
    }

    if let Some((entity_id, field)) = parse_statestream_topic(&app_state.base_topic, &topic) {
        app_state.mirror.lock().await.apply(entity_id, field, &message);
        return Ok(());
    }

    debug!("ignoring message on {topic}");
    Ok(())
}

async fn handle_command(
    app_state: &AppState,
    object_id: &str,
    command: ThermostatCommand,
    message: &str,
) -> anyhow::Result<()> {
    let Some(thermostat) = app_state
        .thermostats
        .iter()
        .find(|thermostat| thermostat.object_id == object_id)
    else {
        warn!("command for unknown thermostat {object_id}");
        return Ok(());
    };

    let now_ms = monotonic_ms();
    let (climate_id, result) = {
        let mut engine = thermostat.engine.lock().await;
        let result = apply_command(&mut engine, command, message, now_ms);
        (engine.climate_entity_id().clone(), result)
    };

    match result {
        Ok(actions) => execute_engine_actions(app_state, &climate_id, actions).await,
        Err(err) => warn!(
            "{object_id}: rejected {} '{message}': {err:#}",
            command.as_str()
        ),
    }

    publish_state(app_state, thermostat).await;
    persist_if_changed(app_state, thermostat).await
}

fn apply_command(
    engine: &mut DualModeEngine,
    command: ThermostatCommand,
    message: &str,
    now_ms: u64,
) -> anyhow::Result<Vec<EngineAction>> {
    let actions = match command {
        ThermostatCommand::HvacMode => {
            let mode = message.parse::<HvacMode>().map_err(anyhow::Error::msg)?;
            engine.set_hvac_mode(mode, now_ms)?
        }
        ThermostatCommand::Temperature => {
            let update = message
                .parse::<TemperatureUpdate>()
                .map_err(anyhow::Error::msg)?;
            engine.set_temperature(update, now_ms)?
        }
        ThermostatCommand::PresetMode => engine.set_preset_mode(message)?,
        ThermostatCommand::FanMode => engine.set_fan_mode(message)?,
        ThermostatCommand::SwingMode => engine.set_swing_mode(message)?,
    };
    Ok(actions)
}

/// Monotonic timestamp of a wall-clock instant in the past, if it falls
/// within the clock's range.
fn monotonic_at(at: DateTime<Utc>, now_ms: u64) -> Option<u64> {
    let age_ms = u64::try_from((Utc::now() - at).num_milliseconds().max(0)).ok()?;
    now_ms.checked_sub(age_ms)
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    let elapsed: u64 = START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX - MONOTONIC_ORIGIN_MS);
    MONOTONIC_ORIGIN_MS + elapsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use dualmode_common::{entity::ATTR_HVAC_MODES, EngineError};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn engine() -> DualModeEngine {
        let climate_id: EntityId = "climate.heat_pump".parse().unwrap();
        let mut engine = DualModeEngine::new(ThermostatConfig::new(climate_id.clone()));
        let climate = EntityState::new(climate_id, "off")
            .with_attribute(ATTR_HVAC_MODES, json!(["off", "heat", "cool"]))
            .with_attribute("current_temperature", 18.0);
        engine.restore(None, Some(&climate));
        engine.observe_climate(&climate, MONOTONIC_ORIGIN_MS);
        engine
    }

    #[test]
    fn hvac_mode_command_drives_the_engine() {
        let mut engine = engine();
        let actions =
            apply_command(&mut engine, ThermostatCommand::HvacMode, "heat", MONOTONIC_ORIGIN_MS)
                .unwrap();
        assert_eq!(engine.hvac_mode(), HvacMode::Heat);
        assert!(actions.contains(&EngineAction::SetHvacMode(HvacMode::Heat)));
    }

    #[test]
    fn malformed_commands_are_rejected() {
        let mut engine = engine();
        assert!(apply_command(&mut engine, ThermostatCommand::HvacMode, "warm", 0).is_err());
        assert!(apply_command(&mut engine, ThermostatCommand::Temperature, "hot", 0).is_err());
        assert_eq!(engine.hvac_mode(), HvacMode::Off);
    }

    #[test]
    fn engine_errors_pass_through() {
        let mut engine = engine();
        let err = apply_command(&mut engine, ThermostatCommand::HvacMode, "dry", 0).unwrap_err();
        assert_eq!(
            err.downcast_ref::<EngineError>(),
            Some(&EngineError::UnsupportedHvacMode(HvacMode::Dry))
        );
    }

    #[test]
    fn temperature_command_accepts_json_range() {
        let mut engine = engine();
        apply_command(
            &mut engine,
            ThermostatCommand::Temperature,
            r#"{"target_temp_low": 19.0, "target_temp_high": 25.0}"#,
            MONOTONIC_ORIGIN_MS,
        )
        .unwrap();
        assert_eq!(engine.target_temperature_low(), Some(19.0));
        assert_eq!(engine.target_temperature_high(), Some(25.0));
    }

    #[test]
    fn monotonic_at_places_past_changes() {
        let now_ms = MONOTONIC_ORIGIN_MS + 5_000;
        let at = Utc::now() - chrono::Duration::seconds(60);
        let placed = monotonic_at(at, now_ms).unwrap();
        assert!((now_ms - 61_000..=now_ms - 60_000).contains(&placed));

        let ancient = Utc::now() - chrono::Duration::days(3);
        assert_eq!(monotonic_at(ancient, now_ms), None);
    }
}

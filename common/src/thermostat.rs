use std::str::FromStr;

use serde::Deserialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    config::{PersistedState, ThermostatConfig},
    entity::*,
    selector::{select_mode, ModeDecision, Setpoints},
    types::{features, HvacAction, HvacMode, ServiceCall, ThermostatStatePayload},
};

pub const DEFAULT_MIN_TEMP: f32 = 7.0;
pub const DEFAULT_MAX_TEMP: f32 = 35.0;
pub const DEFAULT_TEMPERATURE_UNIT: &str = "°C";

const CLIMATE_DOMAIN: &str = "climate";

#[derive(Debug, Clone, PartialEq)]
pub enum EngineAction {
    SetHvacMode(HvacMode),
    SetTemperature(f32),
    SetPresetMode(String),
    SetFanMode(String),
    SetSwingMode(String),
}

impl EngineAction {
    pub fn service_call(&self, entity_id: &EntityId) -> ServiceCall {
        let (service, key, value) = match self {
            Self::SetHvacMode(mode) => ("set_hvac_mode", ATTR_HVAC_MODE, json!(mode.as_str())),
            Self::SetTemperature(temp) => ("set_temperature", ATTR_TEMPERATURE, json!(temp)),
            Self::SetPresetMode(preset) => ("set_preset_mode", ATTR_PRESET_MODE, json!(preset)),
            Self::SetFanMode(fan) => ("set_fan_mode", ATTR_FAN_MODE, json!(fan)),
            Self::SetSwingMode(swing) => ("set_swing_mode", ATTR_SWING_MODE, json!(swing)),
        };

        let mut data = Map::new();
        data.insert("entity_id".to_string(), json!(entity_id.to_string()));
        data.insert(key.to_string(), value);
        ServiceCall {
            domain: CLIMATE_DOMAIN,
            service,
            data,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("unrecognized hvac mode: {0}")]
    UnsupportedHvacMode(HvacMode),
    #[error("unsupported {kind}: {value}")]
    UnsupportedOption { kind: &'static str, value: String },
    #[error("no temperature given")]
    MissingTemperature,
    #[error("temperature must be a finite number")]
    NonFiniteTemperature,
    #[error("temperature {value} is outside [{min}, {max}]")]
    TemperatureOutOfRange { value: f32, min: f32, max: f32 },
    #[error("target_temp_low ({low}) must not exceed target_temp_high ({high})")]
    InvertedRange { low: f32, high: f32 },
}

/// Arguments of a `set_temperature` request; at least one must be set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct TemperatureUpdate {
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub target_temp_low: Option<f32>,
    #[serde(default)]
    pub target_temp_high: Option<f32>,
}

impl FromStr for TemperatureUpdate {
    type Err = String;

    /// A bare number sets `temperature`; otherwise a JSON object is expected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(temperature) = s.parse::<f32>() {
            return Ok(Self {
                temperature: Some(temperature),
                ..Default::default()
            });
        }
        serde_json::from_str(s).map_err(|err| format!("invalid temperature payload: {err}"))
    }
}

/// Virtual dual-mode thermostat wrapping one climate entity.
#[derive(Debug, Clone)]
pub struct DualModeEngine {
    config: ThermostatConfig,
    min_cycle_ms: u64,

    hvac_mode: Option<HvacMode>,
    target_temp: Option<f32>,
    target_temp_low: Option<f32>,
    target_temp_high: Option<f32>,
    current_temp: Option<f32>,
    active: bool,

    climate: Option<EntityState>,
    commanded_mode: Option<HvacMode>,
    last_switch_ms: Option<u64>,
}

impl DualModeEngine {
    pub fn new(config: ThermostatConfig) -> Self {
        Self {
            min_cycle_ms: config.min_cycle_ms(),
            hvac_mode: config.initial_hvac_mode,
            target_temp: config.target_temp,
            target_temp_low: config.target_temp_low,
            target_temp_high: config.target_temp_high,
            current_temp: None,
            active: false,
            climate: None,
            commanded_mode: None,
            last_switch_ms: None,
            config,
        }
    }

    pub fn config(&self) -> &ThermostatConfig {
        &self.config
    }

    pub fn climate_entity_id(&self) -> &EntityId {
        &self.config.climate_entity_id
    }

    pub fn sensor_entity_id(&self) -> Option<&EntityId> {
        self.config.custom_temp_entity_id.as_ref()
    }

    /// Fills in whatever the configuration left open from the previous run,
    /// falling back to the wrapped entity's temperature bounds.
    pub fn restore(&mut self, previous: Option<&PersistedState>, climate: Option<&EntityState>) {
        let (min_temp, max_temp) = temperature_bounds(climate);

        if let Some(previous) = previous {
            if self.hvac_mode.is_none() {
                self.hvac_mode = previous.hvac_mode;
            }
            if self.target_temp.is_none() {
                self.target_temp = previous.temperature;
            }
            if self.target_temp_low.is_none() {
                self.target_temp_low = previous.target_temp_low;
            }
            if self.target_temp_high.is_none() {
                self.target_temp_high = previous.target_temp_high;
            }
        }

        if self.target_temp.is_none() && self.hvac_mode != Some(HvacMode::HeatCool) {
            self.apply_default_targets(min_temp, max_temp);
        }
        if self.hvac_mode == Some(HvacMode::HeatCool)
            && (self.target_temp_low.is_none() || self.target_temp_high.is_none())
        {
            self.apply_default_targets(min_temp, max_temp);
        }
        self.target_temp_low.get_or_insert(min_temp);
        self.target_temp_high.get_or_insert(max_temp);

        if self.hvac_mode.is_none() {
            self.hvac_mode = Some(HvacMode::Off);
        }
    }

    fn apply_default_targets(&mut self, min_temp: f32, max_temp: f32) {
        match self.hvac_mode {
            Some(HvacMode::Cool | HvacMode::FanOnly) => self.target_temp = Some(max_temp),
            Some(HvacMode::HeatCool) => {
                self.target_temp_low.get_or_insert(min_temp);
                self.target_temp_high.get_or_insert(max_temp);
            }
            _ => self.target_temp = Some(min_temp),
        }
        warn!(
            "{}: no saved target temperature, falling back to {:?} ({:?}..{:?})",
            self.config.name, self.target_temp, self.target_temp_low, self.target_temp_high
        );
    }

    /// Used at startup when the wrapped entity reports how long it has been in
    /// its current mode.
    pub fn seed_last_switch(&mut self, at_ms: u64) {
        if self.last_switch_ms.is_none() {
            self.last_switch_ms = Some(at_ms);
        }
    }

    /// Ingests a snapshot of the wrapped climate entity without running control.
    pub fn observe_climate(&mut self, state: &EntityState, now_ms: u64) {
        let previous_mode = self.wrapped_mode();
        let first_snapshot = self.climate.is_none();
        self.climate = Some(state.clone());

        if !state.is_available() {
            debug!(
                "{}: climate entity {} is {}",
                self.config.name, state.entity_id, state.state
            );
            return;
        }

        if self.config.custom_temp_entity_id.is_none() {
            match state.attr_f32(ATTR_CURRENT_TEMPERATURE) {
                Some(temp) if temp.is_finite() => self.current_temp = Some(temp),
                Some(temp) => error!("{}: ignoring current temperature {temp}", self.config.name),
                None => debug!(
                    "{}: current temperature is not present in climate entity state",
                    self.config.name
                ),
            }
        }

        let wrapped_mode = match state.state.parse::<HvacMode>() {
            Ok(mode) => mode,
            Err(err) => {
                warn!("{}: climate entity reported {err}", self.config.name);
                return;
            }
        };

        if let Some(temp) = state.attr_f32(ATTR_TEMPERATURE) {
            self.update_target_temp(wrapped_mode, temp);
        }

        let mode_changed = previous_mode != Some(wrapped_mode);
        if !(mode_changed || first_snapshot) {
            return;
        }
        if !first_snapshot {
            self.last_switch_ms = Some(now_ms);
        }
        self.commanded_mode = Some(wrapped_mode);

        let follow = match self.hvac_mode {
            Some(HvacMode::HeatCool) => !matches!(wrapped_mode, HvacMode::Heat | HvacMode::Cool),
            current => current != Some(wrapped_mode),
        };
        if follow {
            info!(
                "{}: climate entity changed to {wrapped_mode} while thermostat was set to {:?}",
                self.config.name, self.hvac_mode
            );
            self.hvac_mode = Some(wrapped_mode);
        }
    }

    fn update_target_temp(&mut self, wrapped_mode: HvacMode, temp: f32) {
        if !temp.is_finite() {
            error!("{}: ignoring target temperature {temp}", self.config.name);
            return;
        }

        let slot = match (wrapped_mode, self.hvac_mode) {
            (HvacMode::Heat, Some(HvacMode::HeatCool)) => &mut self.target_temp_low,
            (HvacMode::Heat, Some(HvacMode::Heat)) => &mut self.target_temp,
            (HvacMode::Cool, Some(HvacMode::HeatCool)) => &mut self.target_temp_high,
            (HvacMode::Cool, Some(HvacMode::Cool)) => &mut self.target_temp,
            _ => return,
        };

        if *slot != Some(temp) {
            info!(
                "{}: target for {wrapped_mode} changed from {:?} to {temp}",
                self.config.name, *slot
            );
            *slot = Some(temp);
        }
    }

    pub fn climate_state_changed(&mut self, state: &EntityState, now_ms: u64) -> Vec<EngineAction> {
        if state.entity_id != self.config.climate_entity_id {
            return Vec::new();
        }

        self.observe_climate(state, now_ms);
        if !state.is_available() {
            return Vec::new();
        }
        self.control(false, now_ms)
    }

    /// Takes the reading of the custom temperature sensor without running
    /// control. Returns whether the reading was usable.
    pub fn observe_sensor(&mut self, state: &EntityState) -> bool {
        if Some(&state.entity_id) != self.config.custom_temp_entity_id.as_ref() {
            return false;
        }

        if !state.is_available() {
            debug!(
                "{}: sensor {} is {}",
                self.config.name, state.entity_id, state.state
            );
            return false;
        }

        match state.state.trim().parse::<f32>() {
            Ok(temp) if temp.is_finite() => {
                self.current_temp = Some(temp);
                true
            }
            Ok(temp) => {
                error!("{}: unable to update from sensor: {temp}", self.config.name);
                false
            }
            Err(err) => {
                error!(
                    "{}: unable to update from sensor '{}': {err}",
                    self.config.name, state.state
                );
                false
            }
        }
    }

    pub fn sensor_state_changed(&mut self, state: &EntityState, now_ms: u64) -> Vec<EngineAction> {
        if !self.observe_sensor(state) {
            return Vec::new();
        }
        self.control(false, now_ms)
    }

    /// Re-runs control so switches held back by the minimum cycle go out once
    /// the cycle has elapsed.
    pub fn tick(&mut self, now_ms: u64) -> Vec<EngineAction> {
        self.control(false, now_ms)
    }

    pub fn set_hvac_mode(
        &mut self,
        mode: HvacMode,
        now_ms: u64,
    ) -> Result<Vec<EngineAction>, EngineError> {
        if !self.hvac_modes().contains(&mode) {
            error!("{}: unrecognized hvac mode: {mode}", self.config.name);
            return Err(EngineError::UnsupportedHvacMode(mode));
        }

        self.hvac_mode = Some(mode);
        if mode == HvacMode::Off {
            let mut actions = Vec::new();
            if self.commanded_mode != Some(HvacMode::Off) {
                self.push_mode(HvacMode::Off, now_ms, &mut actions);
            }
            return Ok(actions);
        }

        Ok(self.control(true, now_ms))
    }

    pub fn set_temperature(
        &mut self,
        update: TemperatureUpdate,
        now_ms: u64,
    ) -> Result<Vec<EngineAction>, EngineError> {
        let (min_temp, max_temp) = (self.min_temp(), self.max_temp());
        let values = [
            update.temperature,
            update.target_temp_low,
            update.target_temp_high,
        ];
        if values.iter().all(Option::is_none) {
            return Err(EngineError::MissingTemperature);
        }
        for value in values.into_iter().flatten() {
            if !value.is_finite() {
                return Err(EngineError::NonFiniteTemperature);
            }
            if value < min_temp || value > max_temp {
                return Err(EngineError::TemperatureOutOfRange {
                    value,
                    min: min_temp,
                    max: max_temp,
                });
            }
        }
        let low = update.target_temp_low.or(self.target_temp_low);
        let high = update.target_temp_high.or(self.target_temp_high);
        if let (Some(low), Some(high)) = (low, high) {
            if low > high {
                return Err(EngineError::InvertedRange { low, high });
            }
        }

        let wrapped = self.wrapped_mode();
        let mut actions = Vec::new();
        if let Some(temp) = update.temperature {
            self.target_temp = Some(temp);
            if matches!(wrapped, Some(HvacMode::Heat | HvacMode::Cool)) {
                actions.push(EngineAction::SetTemperature(temp));
            }
        }
        if let Some(low) = update.target_temp_low {
            self.target_temp_low = Some(low);
            if wrapped == Some(HvacMode::Heat) {
                actions.push(EngineAction::SetTemperature(low));
            }
        }
        if let Some(high) = update.target_temp_high {
            self.target_temp_high = Some(high);
            if wrapped == Some(HvacMode::Cool) {
                actions.push(EngineAction::SetTemperature(high));
            }
        }

        actions.extend(self.control(true, now_ms));
        actions.dedup();
        Ok(actions)
    }

    pub fn set_preset_mode(&self, preset: &str) -> Result<Vec<EngineAction>, EngineError> {
        self.ensure_offered("preset_mode", ATTR_PRESET_MODES, preset)?;
        Ok(vec![EngineAction::SetPresetMode(preset.to_string())])
    }

    pub fn set_fan_mode(&self, fan: &str) -> Result<Vec<EngineAction>, EngineError> {
        self.ensure_offered("fan_mode", ATTR_FAN_MODES, fan)?;
        Ok(vec![EngineAction::SetFanMode(fan.to_string())])
    }

    pub fn set_swing_mode(&self, swing: &str) -> Result<Vec<EngineAction>, EngineError> {
        self.ensure_offered("swing_mode", ATTR_SWING_MODES, swing)?;
        Ok(vec![EngineAction::SetSwingMode(swing.to_string())])
    }

    fn ensure_offered(
        &self,
        kind: &'static str,
        list_attr: &str,
        value: &str,
    ) -> Result<(), EngineError> {
        match self.climate_list(list_attr) {
            Some(offered) if !offered.iter().any(|v| v == value) => {
                Err(EngineError::UnsupportedOption {
                    kind,
                    value: value.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    fn control(&mut self, force: bool, now_ms: u64) -> Vec<EngineAction> {
        let mut actions = Vec::new();

        if !self.active && self.has_required_temperatures() {
            self.active = true;
            info!(
                "{}: obtained current and target temperature, dual-mode thermostat active ({:?}, {:?}..{:?})",
                self.config.name, self.current_temp, self.target_temp_low, self.target_temp_high
            );
        }

        let Some(mode) = self.hvac_mode else {
            return actions;
        };
        if !self.active || mode == HvacMode::Off {
            return actions;
        }

        if mode == HvacMode::HeatCool {
            let (Some(current), Some(setpoints)) = (self.current_temp, self.setpoints()) else {
                return actions;
            };

            match select_mode(
                current,
                &setpoints,
                self.commanded_mode,
                self.since_last_switch(now_ms),
                self.min_cycle_ms,
            ) {
                ModeDecision::Switch(HvacMode::Cool) => {
                    info!("{}: turning on cooling mode at {current}", self.config.name);
                    if self.push_mode(HvacMode::Cool, now_ms, &mut actions) {
                        actions.push(EngineAction::SetTemperature(setpoints.target_temp_high));
                    }
                }
                ModeDecision::Switch(desired) => {
                    info!("{}: turning on heating mode at {current}", self.config.name);
                    if self.push_mode(desired, now_ms, &mut actions) {
                        actions.push(EngineAction::SetTemperature(setpoints.target_temp_low));
                    }
                }
                ModeDecision::Suppressed {
                    desired,
                    remaining_ms,
                } => debug!(
                    "{}: switch to {desired} held back for {remaining_ms} ms",
                    self.config.name
                ),
                ModeDecision::Retain => {}
            }
            return actions;
        }

        if self.commanded_mode != Some(mode) {
            if force || self.can_switch(now_ms) {
                self.push_mode(mode, now_ms, &mut actions);
            } else {
                debug!("{}: switch to {mode} held back by min cycle", self.config.name);
            }
        }
        if force && matches!(mode, HvacMode::Heat | HvacMode::Cool) {
            if let Some(temp) = self.target_temp {
                actions.push(EngineAction::SetTemperature(temp));
            }
        }

        actions
    }

    fn push_mode(&mut self, mode: HvacMode, now_ms: u64, actions: &mut Vec<EngineAction>) -> bool {
        if !self.climate_supports(mode) {
            warn!(
                "{}: {} does not support hvac mode {mode}",
                self.config.name, self.config.climate_entity_id
            );
            return false;
        }

        actions.push(EngineAction::SetHvacMode(mode));
        self.commanded_mode = Some(mode);
        self.last_switch_ms = Some(now_ms);
        true
    }

    fn has_required_temperatures(&self) -> bool {
        if self.current_temp.is_none() {
            return false;
        }
        match self.hvac_mode {
            Some(HvacMode::HeatCool) => {
                self.target_temp_low.is_some() && self.target_temp_high.is_some()
            }
            _ => self.target_temp.is_some(),
        }
    }

    fn setpoints(&self) -> Option<Setpoints> {
        Some(Setpoints {
            target_temp_low: self.target_temp_low?,
            target_temp_high: self.target_temp_high?,
            cold_tolerance: self.config.cold_tolerance,
            hot_tolerance: self.config.hot_tolerance,
        })
    }

    fn since_last_switch(&self, now_ms: u64) -> Option<u64> {
        self.last_switch_ms.map(|last| now_ms.saturating_sub(last))
    }

    fn can_switch(&self, now_ms: u64) -> bool {
        self.since_last_switch(now_ms)
            .map(|elapsed| elapsed >= self.min_cycle_ms)
            .unwrap_or(true)
    }

    fn climate_supports(&self, mode: HvacMode) -> bool {
        self.climate_list(ATTR_HVAC_MODES)
            .is_some_and(|modes| modes.iter().any(|m| m == mode.as_str()))
    }

    fn climate_list(&self, key: &str) -> Option<Vec<String>> {
        self.climate.as_ref()?.attr_str_list(key)
    }

    fn climate_str(&self, key: &str) -> Option<String> {
        self.climate.as_ref()?.attr_str(key).map(str::to_string)
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn hvac_mode(&self) -> HvacMode {
        self.hvac_mode.unwrap_or(HvacMode::Off)
    }

    /// Mode the wrapped entity currently reports.
    pub fn wrapped_mode(&self) -> Option<HvacMode> {
        self.climate.as_ref()?.state.parse().ok()
    }

    /// Mode last commanded to, or observed on, the wrapped entity.
    pub fn commanded_mode(&self) -> Option<HvacMode> {
        self.commanded_mode
    }

    pub fn last_switch_ms(&self) -> Option<u64> {
        self.last_switch_ms
    }

    pub fn hvac_modes(&self) -> Vec<HvacMode> {
        let mut modes = vec![HvacMode::HeatCool];
        for name in self.climate_list(ATTR_HVAC_MODES).unwrap_or_default() {
            match name.parse::<HvacMode>() {
                Ok(mode) if !modes.contains(&mode) => modes.push(mode),
                Ok(_) => {}
                Err(err) => debug!("{}: skipping {err}", self.config.name),
            }
        }
        modes
    }

    pub fn hvac_action(&self) -> HvacAction {
        let current = self.current_temp;
        let above = |target: Option<f32>| matches!((current, target), (Some(c), Some(t)) if c > t);
        let below = |target: Option<f32>| matches!((current, target), (Some(c), Some(t)) if c < t);

        match self.hvac_mode() {
            HvacMode::Off => HvacAction::Off,
            HvacMode::Cool if above(self.target_temp) => HvacAction::Cooling,
            HvacMode::Heat if below(self.target_temp) => HvacAction::Heating,
            HvacMode::FanOnly => HvacAction::Fan,
            HvacMode::Dry => HvacAction::Drying,
            HvacMode::HeatCool => match self.wrapped_mode() {
                Some(HvacMode::Heat) if below(self.target_temp_low) => HvacAction::Heating,
                Some(HvacMode::Cool) if above(self.target_temp_high) => HvacAction::Cooling,
                Some(HvacMode::Heat | HvacMode::Cool) => HvacAction::Idle,
                other => {
                    debug!(
                        "{}: climate entity in unexpected mode {other:?}, assuming idle",
                        self.config.name
                    );
                    HvacAction::Idle
                }
            },
            _ => HvacAction::Idle,
        }
    }

    pub fn current_temperature(&self) -> Option<f32> {
        self.current_temp
    }

    pub fn target_temperature(&self) -> Option<f32> {
        self.target_temp
    }

    pub fn target_temperature_low(&self) -> Option<f32> {
        self.target_temp_low
    }

    pub fn target_temperature_high(&self) -> Option<f32> {
        self.target_temp_high
    }

    pub fn min_temp(&self) -> f32 {
        temperature_bounds(self.climate.as_ref()).0
    }

    pub fn max_temp(&self) -> f32 {
        temperature_bounds(self.climate.as_ref()).1
    }

    pub fn target_temperature_step(&self) -> Option<f32> {
        self.climate.as_ref()?.attr_f32(ATTR_TARGET_TEMP_STEP)
    }

    pub fn temperature_unit(&self) -> String {
        self.climate_str(ATTR_UNIT_OF_MEASUREMENT)
            .unwrap_or_else(|| DEFAULT_TEMPERATURE_UNIT.to_string())
    }

    pub fn preset_mode(&self) -> Option<String> {
        self.climate_str(ATTR_PRESET_MODE)
    }

    pub fn preset_modes(&self) -> Option<Vec<String>> {
        self.climate_list(ATTR_PRESET_MODES)
    }

    pub fn fan_mode(&self) -> Option<String> {
        self.climate_str(ATTR_FAN_MODE)
    }

    pub fn fan_modes(&self) -> Option<Vec<String>> {
        self.climate_list(ATTR_FAN_MODES)
    }

    pub fn swing_mode(&self) -> Option<String> {
        self.climate_str(ATTR_SWING_MODE)
    }

    pub fn swing_modes(&self) -> Option<Vec<String>> {
        self.climate_list(ATTR_SWING_MODES)
    }

    pub fn supported_features(&self) -> u32 {
        features::DUALMODE
    }

    pub fn persisted_state(&self) -> PersistedState {
        PersistedState {
            hvac_mode: self.hvac_mode,
            temperature: self.target_temp,
            target_temp_low: self.target_temp_low,
            target_temp_high: self.target_temp_high,
        }
    }

    pub fn state_payload(&self) -> ThermostatStatePayload {
        let mut attributes = Map::new();
        let mut put = |key: &str, value: Value| {
            attributes.insert(key.to_string(), value);
        };

        put(ATTR_FRIENDLY_NAME, json!(self.config.name));
        put(
            ATTR_HVAC_MODES,
            json!(self
                .hvac_modes()
                .iter()
                .map(|m| m.as_str())
                .collect::<Vec<_>>()),
        );
        put(ATTR_HVAC_ACTION, json!(self.hvac_action().as_str()));
        put(ATTR_CURRENT_TEMPERATURE, json!(self.current_temp));
        put(ATTR_TEMPERATURE, json!(self.target_temp));
        put(ATTR_TARGET_TEMP_LOW, json!(self.target_temp_low));
        put(ATTR_TARGET_TEMP_HIGH, json!(self.target_temp_high));
        put(ATTR_MIN_TEMP, json!(self.min_temp()));
        put(ATTR_MAX_TEMP, json!(self.max_temp()));
        put(ATTR_UNIT_OF_MEASUREMENT, json!(self.temperature_unit()));
        put(ATTR_SUPPORTED_FEATURES, json!(self.supported_features()));

        if let Some(step) = self.target_temperature_step() {
            put(ATTR_TARGET_TEMP_STEP, json!(step));
        }
        let optional = [
            (ATTR_PRESET_MODE, self.preset_mode().map(Value::from)),
            (ATTR_PRESET_MODES, self.preset_modes().map(Value::from)),
            (ATTR_FAN_MODE, self.fan_mode().map(Value::from)),
            (ATTR_FAN_MODES, self.fan_modes().map(Value::from)),
            (ATTR_SWING_MODE, self.swing_mode().map(Value::from)),
            (ATTR_SWING_MODES, self.swing_modes().map(Value::from)),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                put(key, value);
            }
        }

        ThermostatStatePayload {
            state: self.hvac_mode(),
            attributes,
        }
    }
}

fn temperature_bounds(climate: Option<&EntityState>) -> (f32, f32) {
    let min = climate
        .and_then(|c| c.attr_f32(ATTR_MIN_TEMP))
        .unwrap_or(DEFAULT_MIN_TEMP);
    let max = climate
        .and_then(|c| c.attr_f32(ATTR_MAX_TEMP))
        .unwrap_or(DEFAULT_MAX_TEMP);
    (min, max)
}

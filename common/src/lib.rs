pub mod config;
pub mod entity;
pub mod selector;
pub mod thermostat;
pub mod topics;
pub mod types;

pub use config::{parse_platform_entries, ConfigError, ConnectionConfig, PersistedState, ThermostatConfig};
pub use entity::{EntityId, EntityIdError, EntityState};
pub use selector::{select_mode, ModeDecision, Setpoints};
pub use thermostat::{DualModeEngine, EngineAction, EngineError, TemperatureUpdate};
pub use topics::*;
pub use types::{HvacAction, HvacMode, ServiceCall, ThermostatStatePayload};

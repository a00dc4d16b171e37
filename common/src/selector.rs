//! Heat/cool selection for the combined `heat_cool` mode.

use crate::types::HvacMode;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Setpoints {
    pub target_temp_low: f32,
    pub target_temp_high: f32,
    pub cold_tolerance: f32,
    pub hot_tolerance: f32,
}

impl Setpoints {
    /// Below this reading the wrapped entity should heat.
    pub fn heat_threshold(&self) -> f32 {
        self.target_temp_low - self.cold_tolerance
    }

    /// Above this reading the wrapped entity should cool.
    pub fn cool_threshold(&self) -> f32 {
        self.target_temp_high + self.hot_tolerance
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeDecision {
    Retain,
    Switch(HvacMode),
    Suppressed { desired: HvacMode, remaining_ms: u64 },
}

/// Mode demanded by the reading alone, `None` inside the dead band.
pub fn demanded_mode(current_temp: f32, setpoints: &Setpoints) -> Option<HvacMode> {
    if current_temp < setpoints.heat_threshold() {
        Some(HvacMode::Heat)
    } else if current_temp > setpoints.cool_threshold() {
        Some(HvacMode::Cool)
    } else {
        None
    }
}

/// `since_last_switch_ms` is `None` when no switch has happened yet.
pub fn select_mode(
    current_temp: f32,
    setpoints: &Setpoints,
    current_mode: Option<HvacMode>,
    since_last_switch_ms: Option<u64>,
    min_cycle_ms: u64,
) -> ModeDecision {
    let Some(desired) = demanded_mode(current_temp, setpoints) else {
        return ModeDecision::Retain;
    };

    if current_mode == Some(desired) {
        return ModeDecision::Retain;
    }

    match since_last_switch_ms {
        Some(elapsed) if elapsed < min_cycle_ms => ModeDecision::Suppressed {
            desired,
            remaining_ms: min_cycle_ms - elapsed,
        },
        _ => ModeDecision::Switch(desired),
    }
}

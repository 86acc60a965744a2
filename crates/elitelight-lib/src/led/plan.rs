//! Command plans: the ordered bulb operations that realise an [`LedState`].
//!
//! A plan is what a transport executes against the strip. It mirrors the
//! bulb API of Tuya-style controllers (work mode, colour, scene data point,
//! power) without committing to any wire encoding.

use std::time::Duration;

use serde::Serialize;

use super::color::Rgb;
use super::state::LedState;

/// Data point holding scene data on Tuya RGB strips.
pub const DP_SCENE_DATA: u32 = 25;

/// Pause after a work-mode change before the strip accepts colour/scene data.
pub const MODE_SETTLE: Duration = Duration::from_millis(200);

/// Work mode of the strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkMode {
    Colour,
    Scene,
}

/// One bulb operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DeviceOp {
    SetMode { mode: WorkMode },
    Settle { ms: u64 },
    SetColour { r: u8, g: u8, b: u8 },
    SetValue { dp: u32, value: String },
    TurnOn,
    TurnOff,
}

/// Build the operation sequence for a desired state.
pub fn plan_for(state: &LedState) -> Vec<DeviceOp> {
    let settle = DeviceOp::Settle {
        ms: MODE_SETTLE.as_millis() as u64,
    };
    match *state {
        LedState::Off => vec![DeviceOp::TurnOff],
        LedState::SolidColor(Rgb { r, g, b }) => vec![
            DeviceOp::SetMode {
                mode: WorkMode::Colour,
            },
            settle,
            DeviceOp::SetColour { r, g, b },
            DeviceOp::TurnOn,
        ],
        LedState::Scene { scene, speed } => vec![
            DeviceOp::SetMode {
                mode: WorkMode::Scene,
            },
            settle,
            DeviceOp::SetValue {
                dp: DP_SCENE_DATA,
                value: scene.data_point(speed),
            },
            DeviceOp::TurnOn,
        ],
    }
}

//! LED vocabulary: colours, scenes, speeds and the bulb operations behind them.

mod color;
mod plan;
mod state;

pub use color::{NAMED_COLORS, Rgb, format_color, named_color, parse_color};
pub use plan::{DP_SCENE_DATA, DeviceOp, MODE_SETTLE, WorkMode, plan_for};
pub use state::{LedState, Scene, Speed};

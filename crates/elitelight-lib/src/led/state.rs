//! Desired LED state: solid colour, animated scene, or off.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::color::{self, Rgb};

/// Animation speed for scenes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speed {
    Fast,
    #[default]
    Normal,
    Slow,
}

impl Speed {
    pub const ALL: [Speed; 3] = [Speed::Fast, Speed::Normal, Speed::Slow];

    pub fn as_str(self) -> &'static str {
        match self {
            Speed::Fast => "fast",
            Speed::Normal => "normal",
            Speed::Slow => "slow",
        }
    }

    /// Speed field as encoded inside scene data points.
    pub fn code(self) -> &'static str {
        match self {
            Speed::Fast => "0f0f",
            Speed::Normal => "1212",
            Speed::Slow => "3c3c",
        }
    }

    pub fn parse(s: &str) -> crate::error::Result<Self> {
        let s = s.trim();
        Speed::ALL
            .into_iter()
            .find(|sp| sp.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                crate::ElitelightError::Color(format!(
                    "Invalid speed: {s} (use fast, normal or slow)"
                ))
            })
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Built-in animated scenes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scene {
    RedAlert,
    OrangeAlert,
    FsdJump,
    BreathingYellow,
}

impl Scene {
    pub const ALL: [Scene; 4] = [
        Scene::RedAlert,
        Scene::OrangeAlert,
        Scene::FsdJump,
        Scene::BreathingYellow,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Scene::RedAlert => "red_alert",
            Scene::OrangeAlert => "orange_alert",
            Scene::FsdJump => "fsd_jump",
            Scene::BreathingYellow => "breathing_yellow",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Scene::ALL
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(name))
    }

    /// Scene data-point value sent to the strip.
    ///
    /// Only the alert scenes honour `speed`; the jump and breathing scenes
    /// carry their own timing.
    pub fn data_point(self, speed: Speed) -> String {
        let spd = speed.code();
        match self {
            Scene::RedAlert => format!("c9{spd}01000003e803e800000000{spd}0100ec00000000000000"),
            Scene::OrangeAlert => {
                format!("c9{spd}01000b03e803e800000000{spd}01000b00000000000000")
            }
            Scene::FsdJump => "0447470200f803e803e80000000047470200b703e803e8000000004747\
                               02008b03e803e80000000047470200b903e803e800000000"
                .to_string(),
            Scene::BreathingYellow => {
                "07464602000003e803e800000000464602003703e803e800000000".to_string()
            }
        }
    }
}

impl fmt::Display for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired state of the LED strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedState {
    SolidColor(Rgb),
    Scene { scene: Scene, speed: Speed },
    Off,
}

impl LedState {
    /// Parse a user-facing state name.
    ///
    /// `off` turns the strip off, `on` is solid white, scene names (and the
    /// `under attack` alias) select a scene at `speed`, anything else must be
    /// a colour accepted by [`color::parse_color`]. `NavRoute` is an alias
    /// for white.
    pub fn parse(s: &str, speed: Speed) -> crate::error::Result<Self> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("off") {
            return Ok(LedState::Off);
        }
        if trimmed.eq_ignore_ascii_case("on") || trimmed.eq_ignore_ascii_case("navroute") {
            return Ok(LedState::SolidColor(Rgb::WHITE));
        }
        if trimmed.eq_ignore_ascii_case("under attack") {
            return Ok(LedState::Scene {
                scene: Scene::RedAlert,
                speed,
            });
        }
        if let Some(scene) = Scene::from_name(trimmed) {
            return Ok(LedState::Scene { scene, speed });
        }
        color::parse_color(trimmed).map(LedState::SolidColor)
    }
}

impl fmt::Display for LedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedState::SolidColor(rgb) => write!(f, "{rgb}"),
            LedState::Scene { scene, speed } => write!(f, "{scene} ({speed})"),
            LedState::Off => f.write_str("off"),
        }
    }
}

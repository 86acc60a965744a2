//! Event-to-state mapping.
//!
//! Game events are identified by name (`Docked`, `StartJump`, ...). The table
//! is built once from configuration entries and is read-only afterwards.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::led::{LedState, Speed};

/// One `[events]` entry as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEntry {
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<Speed>,
}

impl EventEntry {
    pub fn new(color: &str, speed: Option<Speed>) -> Self {
        Self {
            color: color.to_string(),
            speed,
        }
    }

    pub fn to_state(&self) -> crate::error::Result<LedState> {
        LedState::parse(&self.color, self.speed.unwrap_or_default())
    }
}

/// Event id to desired LED state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventMapping {
    states: HashMap<String, LedState>,
}

impl EventMapping {
    pub fn new(states: HashMap<String, LedState>) -> Self {
        Self { states }
    }

    /// Build the table from config entries.
    ///
    /// Every entry is checked; the error lists each bad event.
    pub fn from_entries(entries: &HashMap<String, EventEntry>) -> crate::error::Result<Self> {
        let mut states = HashMap::with_capacity(entries.len());
        let mut problems = Vec::new();
        for (event, entry) in entries {
            match entry.to_state() {
                Ok(state) => {
                    states.insert(event.clone(), state);
                }
                Err(e) => problems.push(format!("{event}: {e}")),
            }
        }
        if problems.is_empty() {
            Ok(Self { states })
        } else {
            problems.sort();
            Err(crate::ElitelightError::Config(format!(
                "invalid event mapping: {}",
                problems.join("; ")
            )))
        }
    }

    pub fn get(&self, event_id: &str) -> Option<LedState> {
        self.states.get(event_id).copied()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Entries sorted by event id.
    pub fn sorted(&self) -> Vec<(&str, LedState)> {
        let mut v: Vec<_> = self.states.iter().map(|(k, s)| (k.as_str(), *s)).collect();
        v.sort_by(|a, b| a.0.cmp(b.0));
        v
    }
}

/// Look up the state for `event_id`. Unknown ids yield `None`.
pub fn resolve(event_id: &str, mapping: &EventMapping) -> Option<LedState> {
    mapping.get(event_id)
}

/// Event table used when the config has no `[events]` section.
pub fn default_entries() -> HashMap<String, EventEntry> {
    [
        ("LoadGame", "white", None),
        ("Shutdown", "white", None),
        ("StartJump", "fsd_jump", None),
        ("DockingGranted", "white", None),
        ("Undocked", "yellow", None),
        ("UnderAttack", "red_alert", Some(Speed::Fast)),
        ("Docked", "white", None),
        ("FuelScoopStart", "breathing_yellow", None),
        ("FuelScoopEnd", "white", None),
    ]
    .into_iter()
    .map(|(event, color, speed)| (event.to_string(), EventEntry::new(color, speed)))
    .collect()
}

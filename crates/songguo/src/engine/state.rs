use std::collections::BTreeMap;
use std::collections::HashMap;

use serde::Serialize;

/// State of a switch entity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SwitchState {
    /// Whether the switch is on or off.
    pub on: bool,

    /// Whether the last poll or command reached the device.
    pub available: bool,

    /// Frontend icon hint, e.g. "mdi:desktop-classic".
    pub icon: String,

    /// Extra attributes exposed alongside the state.
    pub attributes: BTreeMap<String, String>,

    /// The physical device behind the switch, if the integration knows it.
    pub device: Option<DeviceInfo>,
}

/// Static description of a physical device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    /// (domain, unique id) pairs identifying the device
    pub identifiers: Vec<(String, String)>,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
}

/// Centralized snapshot of the entire engine state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct State {
    pub switches: HashMap<String, SwitchState>,
}

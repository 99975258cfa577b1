use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::entry::ConfigEntry;
use super::vendor::Command;
use super::vendor::CommandStatus;
use super::vendor::Credentials;
use super::vendor::VendorApi;
use super::DOMAIN;
use crate::engine::DeviceInfo;
use crate::engine::Entity;
use crate::engine::SwitchState;

const ICON_ON: &str = "mdi:desktop-classic";
const ICON_OFF: &str = "mdi:desktop-classic-off";
const MANUFACTURER: &str = "松果电子";
const MODEL: &str = "Computer Control";

/// What a poll of the listing endpoint did to the switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The device was found and the state was refreshed.
    Updated,
    /// The listing did not contain this device; state was left untouched.
    DeviceMissing,
    /// The request failed; the switch is now unavailable.
    Failed,
}

/// Power switch for one remote-controlled computer.
pub struct ComputerSwitch {
    api: Arc<dyn VendorApi>,
    credentials: Credentials,
    device_name: String,
    entity_id: String,
    unique_id: String,
    is_on: bool,
    available: bool,
}

impl ComputerSwitch {
    /// The entity id follows the entry id, which the store keeps unique.
    pub fn new(api: Arc<dyn VendorApi>, entry: &ConfigEntry) -> Self {
        let data = &entry.data;
        Self {
            api,
            credentials: data.credentials(),
            device_name: data.device_name.clone(),
            entity_id: format!("switch.{}", entry.entry_id),
            unique_id: data.unique_id(),
            is_on: false,
            available: true,
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn is_on(&self) -> bool {
        self.is_on
    }

    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            identifiers: vec![(DOMAIN.to_string(), self.unique_id.clone())],
            name: self.device_name.clone(),
            manufacturer: MANUFACTURER.to_string(),
            model: MODEL.to_string(),
        }
    }

    pub fn extra_state_attributes(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("device_name".to_string(), self.device_name.clone()),
            ("account".to_string(), self.credentials.account.clone()),
            (
                "status".to_string(),
                if self.available { "online" } else { "offline" }.to_string(),
            ),
        ])
    }

    pub fn icon(&self) -> &'static str {
        if self.available && self.is_on {
            ICON_ON
        } else {
            ICON_OFF
        }
    }

    /// Snapshot reported to the engine
    pub fn state(&self) -> SwitchState {
        SwitchState {
            on: self.is_on,
            available: self.available,
            icon: self.icon().to_string(),
            attributes: self.extra_state_attributes(),
            device: Some(self.device_info()),
        }
    }

    pub async fn turn_on(&mut self) -> bool {
        let ok = self.send_request(Command::Startup).await;
        if ok {
            self.is_on = true;
        }
        ok
    }

    pub async fn turn_off(&mut self) -> bool {
        let ok = self.send_request(Command::Shutdown).await;
        if ok {
            self.is_on = false;
        }
        ok
    }

    pub async fn force_shutdown(&mut self) -> bool {
        self.send_request(Command::ForceShutdown).await
    }

    pub async fn force_restart(&mut self) -> bool {
        self.send_request(Command::ForceRestart).await
    }

    /// Refresh state from the listing endpoint
    pub async fn update(&mut self) -> UpdateOutcome {
        let devices = match self.api.list_devices(&self.credentials).await {
            Ok(devices) => devices,
            Err(e) => {
                error!("Error getting status of {}: {}", self.device_name, e);
                self.available = false;
                return UpdateOutcome::Failed;
            }
        };

        match devices.iter().find(|d| d.name == self.device_name) {
            Some(device) => {
                self.available = !device.is_offline();
                self.is_on = device.is_on();
                debug!(
                    "{} status={:?} -> on={}, available={}",
                    self.device_name, device.status, self.is_on, self.available
                );
                UpdateOutcome::Updated
            }
            None => {
                debug!("{} not present in device list", self.device_name);
                UpdateOutcome::DeviceMissing
            }
        }
    }

    /// Send a command and fold the vendor's answer into availability.
    ///
    /// Never fails: every problem is logged and reported as `false`.
    async fn send_request(&mut self, command: Command) -> bool {
        let status = match self
            .api
            .send_command(&self.credentials, &self.device_name, command)
            .await
        {
            Ok(status) => status,
            Err(e) => {
                error!("Error sending {} to {}: {}", command, self.device_name, e);
                self.available = false;
                return false;
            }
        };

        match &status {
            CommandStatus::Success => {
                info!("Sent {} to {}", command, self.device_name);
            }
            CommandStatus::AuthFailed => {
                error!("Authentication failed: Invalid account or password");
            }
            CommandStatus::DeviceNotFound => {
                error!("Device not found: {}", self.device_name);
            }
            CommandStatus::Offline => {
                warn!("Device is offline: {}", self.device_name);
            }
            CommandStatus::Unknown(raw) => {
                warn!(
                    "Unexpected status {:?} for {} on {}",
                    raw, command, self.device_name
                );
            }
        }

        if status.marks_unavailable() {
            self.available = false;
        }
        status.is_success()
    }
}

impl Entity for ComputerSwitch {
    fn entity_id(&self) -> &str {
        &self.entity_id
    }

    fn name(&self) -> &str {
        &self.device_name
    }

    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn platform(&self) -> &'static str {
        "switch"
    }

    fn available(&self) -> bool {
        self.available
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::sgdz::entry::EntryData;
    use crate::integrations::sgdz::vendor::device;
    use crate::integrations::sgdz::vendor::MockVendorApi;

    fn switch_with(mock: Arc<MockVendorApi>) -> ComputerSwitch {
        let entry = ConfigEntry::new(
            "PC1".to_string(),
            EntryData {
                account: "alice".to_string(),
                password: "secret".to_string(),
                device_name: "PC1".to_string(),
            },
        );
        ComputerSwitch::new(mock, &entry)
    }

    #[test]
    fn test_initial_state() {
        let switch = switch_with(Arc::new(MockVendorApi::new()));
        assert!(!switch.is_on());
        assert!(switch.available());
        assert_eq!(switch.entity_id(), "switch.alice_pc1");
        assert_eq!(switch.unique_id(), "sgdz_computer_alice_PC1");
        assert_eq!(switch.name(), "PC1");
        assert_eq!(switch.platform(), "switch");
        assert_eq!(switch.icon(), ICON_OFF);
    }

    #[test]
    fn test_device_info_and_attributes() {
        let switch = switch_with(Arc::new(MockVendorApi::new()));
        let info = switch.device_info();
        assert_eq!(
            info.identifiers,
            vec![("sgdz_computer".to_string(), "sgdz_computer_alice_PC1".to_string())]
        );
        assert_eq!(info.manufacturer, "松果电子");
        assert_eq!(info.model, "Computer Control");

        let state = serde_json::to_value(switch.state()).unwrap();
        assert_eq!(state["device"]["manufacturer"], "松果电子");
        assert_eq!(state["device"]["name"], "PC1");

        let attrs = switch.extra_state_attributes();
        assert_eq!(attrs["device_name"], "PC1");
        assert_eq!(attrs["account"], "alice");
        assert_eq!(attrs["status"], "online");
        assert!(!attrs.values().any(|v| v == "secret"));
    }

    #[tokio::test]
    async fn test_update_device_on() {
        let mock = Arc::new(MockVendorApi::with_devices(vec![device("PC1", 1)]));
        let mut switch = switch_with(mock);

        assert_eq!(switch.update().await, UpdateOutcome::Updated);
        assert!(switch.is_on());
        assert!(switch.available());
        assert_eq!(switch.icon(), ICON_ON);
    }

    #[tokio::test]
    async fn test_update_device_offline() {
        let mock = Arc::new(MockVendorApi::with_devices(vec![device("PC1", 2)]));
        let mut switch = switch_with(mock);

        assert_eq!(switch.update().await, UpdateOutcome::Updated);
        assert!(!switch.is_on());
        assert!(!switch.available());
        assert_eq!(switch.extra_state_attributes()["status"], "offline");
        assert_eq!(switch.icon(), ICON_OFF);
    }

    #[tokio::test]
    async fn test_update_device_off() {
        let mock = Arc::new(MockVendorApi::with_devices(vec![device("PC1", 0)]));
        let mut switch = switch_with(mock);

        assert_eq!(switch.update().await, UpdateOutcome::Updated);
        assert!(!switch.is_on());
        assert!(switch.available());
    }

    #[tokio::test]
    async fn test_update_missing_device_keeps_state() {
        let mock = Arc::new(MockVendorApi::with_devices(vec![device("PC1", 1)]));
        let mut switch = switch_with(mock.clone());
        switch.update().await;

        mock.set_devices(Some(vec![device("Other", 2)]));
        assert_eq!(switch.update().await, UpdateOutcome::DeviceMissing);
        assert!(switch.is_on());
        assert!(switch.available());
    }

    #[tokio::test]
    async fn test_update_failure_marks_unavailable() {
        let mock = Arc::new(MockVendorApi::with_devices(vec![device("PC1", 1)]));
        let mut switch = switch_with(mock.clone());
        switch.update().await;

        mock.set_devices(None);
        assert_eq!(switch.update().await, UpdateOutcome::Failed);
        assert!(!switch.available());
        assert!(switch.is_on());
    }

    #[tokio::test]
    async fn test_turn_on_success_is_idempotent() {
        let mock = Arc::new(MockVendorApi::new());
        mock.set_status(Some(CommandStatus::Success));
        let mut switch = switch_with(mock.clone());

        assert!(switch.turn_on().await);
        assert!(switch.is_on());
        assert!(switch.turn_on().await);
        assert!(switch.is_on());
        assert!(switch.available());

        assert_eq!(
            mock.sent(),
            vec![
                ("PC1".to_string(), Command::Startup),
                ("PC1".to_string(), Command::Startup)
            ]
        );
    }

    #[tokio::test]
    async fn test_turn_off_success() {
        let mock = Arc::new(MockVendorApi::with_devices(vec![device("PC1", 1)]));
        mock.set_status(Some(CommandStatus::Success));
        let mut switch = switch_with(mock.clone());
        switch.update().await;

        assert!(switch.turn_off().await);
        assert!(!switch.is_on());
        assert_eq!(mock.sent(), vec![("PC1".to_string(), Command::Shutdown)]);
    }

    #[tokio::test]
    async fn test_turn_on_auth_failure() {
        let mock = Arc::new(MockVendorApi::new());
        mock.set_status(Some(CommandStatus::AuthFailed));
        let mut switch = switch_with(mock);

        assert!(!switch.turn_on().await);
        assert!(!switch.is_on());
        assert!(!switch.available());
    }

    #[tokio::test]
    async fn test_turn_off_failure_keeps_on() {
        let mock = Arc::new(MockVendorApi::with_devices(vec![device("PC1", 1)]));
        mock.set_status(Some(CommandStatus::Offline));
        let mut switch = switch_with(mock);
        switch.update().await;

        assert!(!switch.turn_off().await);
        assert!(switch.is_on());
        assert!(!switch.available());
    }

    #[tokio::test]
    async fn test_unavailable_statuses() {
        for status in [
            CommandStatus::AuthFailed,
            CommandStatus::DeviceNotFound,
            CommandStatus::Offline,
        ] {
            let mock = Arc::new(MockVendorApi::new());
            mock.set_status(Some(status.clone()));
            let mut switch = switch_with(mock);

            assert!(!switch.force_restart().await, "{:?}", status);
            assert!(!switch.available(), "{:?}", status);
        }
    }

    #[tokio::test]
    async fn test_unknown_status_keeps_availability() {
        let mock = Arc::new(MockVendorApi::new());
        mock.set_status(Some(CommandStatus::Unknown(Some("7".to_string()))));
        let mut switch = switch_with(mock);

        assert!(!switch.turn_on().await);
        assert!(!switch.is_on());
        assert!(switch.available());
    }

    #[tokio::test]
    async fn test_transport_failure_marks_unavailable() {
        let mock = Arc::new(MockVendorApi::new());
        let mut switch = switch_with(mock);

        assert!(!switch.force_shutdown().await);
        assert!(!switch.available());
    }

    #[tokio::test]
    async fn test_force_commands_do_not_touch_power_state() {
        let mock = Arc::new(MockVendorApi::with_devices(vec![device("PC1", 1)]));
        mock.set_status(Some(CommandStatus::Success));
        let mut switch = switch_with(mock.clone());
        switch.update().await;

        assert!(switch.force_shutdown().await);
        assert!(switch.is_on());
        assert!(switch.force_restart().await);
        assert!(switch.is_on());

        assert_eq!(
            mock.sent(),
            vec![
                ("PC1".to_string(), Command::ForceShutdown),
                ("PC1".to_string(), Command::ForceRestart)
            ]
        );
    }

    #[test]
    fn test_state_snapshot() {
        let switch = switch_with(Arc::new(MockVendorApi::new()));
        let state = switch.state();
        assert!(!state.on);
        assert!(state.available);
        assert_eq!(state.icon, ICON_OFF);
        assert_eq!(state.attributes["status"], "online");
    }
}

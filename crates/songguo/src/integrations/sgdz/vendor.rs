//! Client for the SGDZ cloud API.
//!
//! The vendor exposes two JSON-over-HTTP endpoints: one that lists the devices
//! registered to an account, and one that sends a power command to a single
//! device. Both answer with a JSON document that has been percent-encoded as a
//! whole, so every response body is decoded before it is parsed.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use tracing::debug;
use tracing::warn;

use crate::config::VendorConfig;

/// Endpoint that accepts power commands.
pub const COMMAND_URL: &str = "https://songguoyun.topwd.top/Esp_Api_new.php";

/// Endpoint that lists the devices on an account.
pub const DEVICE_LIST_URL: &str = "https://songguoyun.topwd.top/Esp_Api_advance.php";

/// Per-request deadline used when the configuration does not override it.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Account credentials. The vendor expects the password in cleartext.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub account: String,
    pub password: String,
}

impl Credentials {
    pub fn new(account: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account", &self.account)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A device as reported by the listing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Device {
    #[serde(rename = "deviceName", default)]
    pub name: String,

    /// Raw vendor status: 1 is powered on, 2 is offline. Anything that is not
    /// an integer is kept as `None` rather than failing the whole listing.
    #[serde(default, deserialize_with = "integer_or_none")]
    pub status: Option<i64>,
}

impl Device {
    pub fn is_offline(&self) -> bool {
        self.status == Some(2)
    }

    pub fn is_on(&self) -> bool {
        self.status == Some(1)
    }
}

fn integer_or_none<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_i64())
}

/// Power commands understood by the command endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Command {
    Shutdown,
    Startup,
    ForceRestart,
    ForceShutdown,
}

impl Command {
    /// Numeric value the vendor expects in the `value` field.
    pub fn value(self) -> u8 {
        match self {
            Command::Shutdown => 0,
            Command::Startup => 1,
            Command::ForceRestart => 2,
            Command::ForceShutdown => 14,
        }
    }
}

/// Outcome reported by the command endpoint in its `status` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    AuthFailed,
    DeviceNotFound,
    Offline,
    Unknown(Option<String>),
}

impl CommandStatus {
    pub fn from_raw(raw: Option<&str>) -> Self {
        match raw {
            Some("0") => CommandStatus::Success,
            Some("-2") => CommandStatus::AuthFailed,
            Some("-3") => CommandStatus::DeviceNotFound,
            Some("2") => CommandStatus::Offline,
            other => CommandStatus::Unknown(other.map(str::to_string)),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CommandStatus::Success)
    }

    /// Whether this status means the device cannot be reached with the
    /// configured credentials.
    pub fn marks_unavailable(&self) -> bool {
        matches!(
            self,
            CommandStatus::AuthFailed | CommandStatus::DeviceNotFound | CommandStatus::Offline
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VendorError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to parse vendor response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("unexpected vendor response: {0}")]
    UnexpectedBody(String),
}

#[derive(Serialize)]
struct DeviceListRequest<'a> {
    sgdz_account: &'a str,
    sgdz_password: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct CommandRequest<'a> {
    sgdz_account: &'a str,
    sgdz_password: &'a str,
    device_name: &'a str,
    value: String,
}

#[derive(Deserialize)]
struct DeviceListResponse {
    #[serde(default)]
    deviceslist: Option<Vec<Device>>,
}

impl<'a> DeviceListRequest<'a> {
    fn new(credentials: &'a Credentials) -> Self {
        Self {
            sgdz_account: &credentials.account,
            sgdz_password: &credentials.password,
            kind: "1",
        }
    }
}

impl<'a> CommandRequest<'a> {
    fn new(credentials: &'a Credentials, device_name: &'a str, command: Command) -> Self {
        Self {
            sgdz_account: &credentials.account,
            sgdz_password: &credentials.password,
            device_name,
            value: command.value().to_string(),
        }
    }
}

/// Undo the vendor's percent-encoding of the response body.
///
/// `+` is left alone and invalid UTF-8 is replaced rather than rejected.
pub fn decode_body(body: &str) -> String {
    let bytes = urlencoding::decode_binary(body.as_bytes());
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Decode and parse a response body into a JSON object.
pub fn parse_body(body: &str) -> Result<Map<String, Value>, VendorError> {
    let decoded = decode_body(body);
    debug!("Decoded vendor response: {}", decoded);

    match serde_json::from_str::<Value>(&decoded)? {
        Value::Object(map) => Ok(map),
        other => Err(VendorError::UnexpectedBody(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

fn devices_from_body(body: Map<String, Value>) -> Result<Vec<Device>, VendorError> {
    let response: DeviceListResponse = serde_json::from_value(Value::Object(body))?;
    Ok(response.deviceslist.unwrap_or_default())
}

fn status_from_body(body: &Map<String, Value>) -> CommandStatus {
    CommandStatus::from_raw(body.get("status").and_then(Value::as_str))
}

/// Operations offered by the vendor API.
///
/// This trait allows for mocking the vendor for testing purposes
#[async_trait]
pub trait VendorApi: Send + Sync {
    /// List the devices registered to an account.
    async fn list_devices(&self, credentials: &Credentials) -> Result<Vec<Device>, VendorError>;

    /// Send a power command to one device.
    async fn send_command(
        &self,
        credentials: &Credentials,
        device_name: &str,
        command: Command,
    ) -> Result<CommandStatus, VendorError>;
}

/// Real vendor client implementation using reqwest
pub struct HttpVendorApi {
    client: Client,
    command_url: String,
    list_url: String,
}

impl HttpVendorApi {
    pub fn new(config: &VendorConfig) -> Result<Self, VendorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(VendorError::Client)?;

        Ok(Self {
            client,
            command_url: config.command_url.clone(),
            list_url: config.list_url.clone(),
        })
    }

    async fn post<T: Serialize + Sync>(
        &self,
        url: &str,
        payload: &T,
    ) -> Result<Map<String, Value>, VendorError> {
        let transport = |source| VendorError::Transport {
            url: url.to_string(),
            source,
        };

        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(transport)?;

        let body = response.text().await.map_err(transport)?;
        parse_body(&body)
    }
}

#[async_trait]
impl VendorApi for HttpVendorApi {
    async fn list_devices(&self, credentials: &Credentials) -> Result<Vec<Device>, VendorError> {
        let body = self
            .post(&self.list_url, &DeviceListRequest::new(credentials))
            .await?;

        let devices = devices_from_body(body)?;
        if devices.is_empty() {
            warn!("No devices found for account {}", credentials.account);
        }
        Ok(devices)
    }

    async fn send_command(
        &self,
        credentials: &Credentials,
        device_name: &str,
        command: Command,
    ) -> Result<CommandStatus, VendorError> {
        let body = self
            .post(
                &self.command_url,
                &CommandRequest::new(credentials, device_name, command),
            )
            .await?;

        Ok(status_from_body(&body))
    }
}

/// Mock vendor for testing
///
/// `devices` and `status` hold the next reply; `None` makes the call fail as
/// if the transport had broken.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockVendorApi {
    pub devices: std::sync::Mutex<Option<Vec<Device>>>,
    pub status: std::sync::Mutex<Option<CommandStatus>>,
    pub commands: std::sync::Mutex<Vec<(String, Command)>>,
    pub list_calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockVendorApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_devices(devices: Vec<Device>) -> Self {
        let mock = Self::new();
        mock.set_devices(Some(devices));
        mock
    }

    pub fn set_devices(&self, devices: Option<Vec<Device>>) {
        *self.devices.lock().unwrap() = devices;
    }

    pub fn set_status(&self, status: Option<CommandStatus>) {
        *self.status.lock().unwrap() = status;
    }

    pub fn sent(&self) -> Vec<(String, Command)> {
        self.commands.lock().unwrap().clone()
    }
}

#[cfg(test)]
pub fn device(name: &str, status: i64) -> Device {
    Device {
        name: name.to_string(),
        status: Some(status),
    }
}

#[cfg(test)]
#[async_trait]
impl VendorApi for MockVendorApi {
    async fn list_devices(&self, _credentials: &Credentials) -> Result<Vec<Device>, VendorError> {
        self.list_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.devices
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| VendorError::UnexpectedBody("mock transport failure".to_string()))
    }

    async fn send_command(
        &self,
        _credentials: &Credentials,
        device_name: &str,
        command: Command,
    ) -> Result<CommandStatus, VendorError> {
        self.commands
            .lock()
            .unwrap()
            .push((device_name.to_string(), command));
        self.status
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| VendorError::UnexpectedBody("mock transport failure".to_string()))
    }
}

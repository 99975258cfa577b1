//! Setup flow for a new entry.
//!
//! Two steps:
//! - `user`: collect account and password, list the account's devices.
//! - `select_device`: pick one of the listed devices and create the entry.
//!
//! The device choice is a [`DeviceOption`], which can only be obtained from
//! the `select_device` form, so a name outside the listed set cannot be
//! submitted.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Arc;

use tracing::error;
use tracing::info;

use super::entry::unique_id;
use super::entry::EntryData;
use super::vendor::Credentials;
use super::vendor::Device;
use super::vendor::VendorApi;

pub const CONF_ACCOUNT: &str = "sgdz_account";
pub const CONF_PASSWORD: &str = "sgdz_password";
pub const CONF_DEVICE_NAME: &str = "device_name";

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum StepId {
    User,
    SelectDevice,
}

/// Error codes shown on a redisplayed form
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum FormError {
    CannotConnect,
    NoDevices,
    Required,
}

impl FormError {
    pub fn message(self) -> &'static str {
        match self {
            FormError::CannotConnect => "Failed to connect, please check the account and network",
            FormError::NoDevices => "No devices found on this account",
            FormError::Required => "This field is required",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum AbortReason {
    AlreadyConfigured,
}

/// A device the user may pick in the `select_device` step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceOption {
    name: String,
}

impl DeviceOption {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// One input on a form. Every field is required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Text { key: &'static str, secret: bool },
    Select {
        key: &'static str,
        options: Vec<DeviceOption>,
    },
}

impl Field {
    pub fn key(&self) -> &'static str {
        match self {
            Field::Text { key, .. } | Field::Select { key, .. } => *key,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormErrors {
    pub base: Option<FormError>,
    pub fields: BTreeMap<&'static str, FormError>,
}

impl FormErrors {
    pub fn is_empty(&self) -> bool {
        self.base.is_none() && self.fields.is_empty()
    }

    fn base(error: FormError) -> Self {
        Self {
            base: Some(error),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowResult {
    ShowForm {
        step_id: StepId,
        fields: Vec<Field>,
        errors: FormErrors,
    },
    CreateEntry {
        title: String,
        data: EntryData,
    },
    Abort {
        reason: AbortReason,
    },
}

impl FlowResult {
    /// The options offered by a `select_device` form
    pub fn device_options(&self) -> &[DeviceOption] {
        match self {
            FlowResult::ShowForm { fields, .. } => fields
                .iter()
                .find_map(|f| match f {
                    Field::Select { options, .. } => Some(options.as_slice()),
                    _ => None,
                })
                .unwrap_or(&[]),
            _ => &[],
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("step {0} submitted before the account was verified")]
    OutOfOrder(StepId),

    #[error("device {0} was not offered for the current account")]
    NotOffered(String),
}

/// Input of the `user` step
#[derive(Clone)]
pub struct UserInput {
    pub account: String,
    pub password: String,
}

struct VerifiedAccount {
    credentials: Credentials,
    devices: Vec<Device>,
}

/// Two-step setup flow
pub struct ConfigFlow {
    api: Arc<dyn VendorApi>,
    configured: HashSet<String>,
    account: Option<VerifiedAccount>,
}

impl ConfigFlow {
    /// `configured` holds the unique ids of entries that already exist.
    pub fn new(api: Arc<dyn VendorApi>, configured: impl IntoIterator<Item = String>) -> Self {
        Self {
            api,
            configured: configured.into_iter().collect(),
            account: None,
        }
    }

    /// The initial form
    pub fn start(&self) -> FlowResult {
        Self::user_form(FormErrors::default())
    }

    pub async fn step_user(&mut self, input: UserInput) -> FlowResult {
        // A resubmitted user step invalidates any earlier listing.
        self.account = None;

        let mut errors = FormErrors::default();
        if input.account.is_empty() {
            errors.fields.insert(CONF_ACCOUNT, FormError::Required);
        }
        if input.password.is_empty() {
            errors.fields.insert(CONF_PASSWORD, FormError::Required);
        }
        if !errors.is_empty() {
            return Self::user_form(errors);
        }

        let credentials = Credentials::new(input.account, input.password);
        let devices = match self.api.list_devices(&credentials).await {
            Ok(devices) => devices,
            Err(e) => {
                error!("Failed to connect: {}", e);
                return Self::user_form(FormErrors::base(FormError::CannotConnect));
            }
        };

        let devices: Vec<Device> = devices.into_iter().filter(|d| !d.name.is_empty()).collect();
        if devices.is_empty() {
            return Self::user_form(FormErrors::base(FormError::NoDevices));
        }

        info!(
            "Account {} has {} device(s)",
            credentials.account,
            devices.len()
        );
        self.account = Some(VerifiedAccount {
            credentials,
            devices,
        });
        self.select_device_form()
    }

    pub fn step_select_device(&mut self, choice: DeviceOption) -> Result<FlowResult, FlowError> {
        let account = self
            .account
            .as_ref()
            .ok_or(FlowError::OutOfOrder(StepId::SelectDevice))?;

        if !account.devices.iter().any(|d| d.name == choice.name) {
            return Err(FlowError::NotOffered(choice.name));
        }

        let account_name = &account.credentials.account;
        if self.configured.contains(&unique_id(account_name, &choice.name)) {
            info!("{} on {} is already configured", choice.name, account_name);
            return Ok(FlowResult::Abort {
                reason: AbortReason::AlreadyConfigured,
            });
        }

        Ok(FlowResult::CreateEntry {
            title: choice.name.clone(),
            data: EntryData {
                account: account.credentials.account.clone(),
                password: account.credentials.password.clone(),
                device_name: choice.name,
            },
        })
    }

    fn user_form(errors: FormErrors) -> FlowResult {
        FlowResult::ShowForm {
            step_id: StepId::User,
            fields: vec![
                Field::Text {
                    key: CONF_ACCOUNT,
                    secret: false,
                },
                Field::Text {
                    key: CONF_PASSWORD,
                    secret: true,
                },
            ],
            errors,
        }
    }

    fn select_device_form(&self) -> FlowResult {
        let options = self
            .account
            .iter()
            .flat_map(|a| a.devices.iter())
            .map(|d| DeviceOption {
                name: d.name.clone(),
            })
            .collect();

        FlowResult::ShowForm {
            step_id: StepId::SelectDevice,
            fields: vec![Field::Select {
                key: CONF_DEVICE_NAME,
                options,
            }],
            errors: FormErrors::default(),
        }
    }
}

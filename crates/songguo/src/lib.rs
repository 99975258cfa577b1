pub mod api;
pub mod config;
pub mod engine;
pub mod integrations;

pub use config::Config;
pub use config::LogLevel;
pub use engine::Engine;
pub use engine::State;
pub use engine::SwitchAction;
pub use engine::SwitchState;
pub use integrations::sgdz::entry::ConfigEntry;
pub use integrations::sgdz::entry::EntryStore;
pub use integrations::sgdz::flow::ConfigFlow;
pub use integrations::sgdz::switch::ComputerSwitch;
pub use integrations::sgdz::vendor::HttpVendorApi;
pub use integrations::sgdz::vendor::VendorApi;

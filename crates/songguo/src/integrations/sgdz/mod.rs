//! SGDZ remote computer power control.
//!
//! Each configured entry pairs an SGDZ account with one of its devices and is
//! exposed to the engine as a single power switch.

pub mod entry;
pub mod flow;
mod integration;
pub mod switch;
pub mod vendor;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
pub use integration::SgdzIntegration;
use linkme::distributed_slice;
use tracing::info;

use crate::engine;

pub const DOMAIN: &str = "sgdz_computer";

/// Poll interval used when the configuration does not override it.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(30);

#[distributed_slice(engine::INTEGRATION_REGISTRY)]
fn init_sgdz(ctx: &engine::IntegrationContext) -> engine::IntegrationFactoryResult {
    let entries = ctx.entries.entries();
    if entries.is_empty() {
        return Ok(Vec::new());
    }

    let api: Arc<dyn vendor::VendorApi> = Arc::new(
        vendor::HttpVendorApi::new(&ctx.config.vendor).context("Failed to create vendor client")?,
    );
    let scan_interval = Duration::from_secs(ctx.config.vendor.scan_interval_secs);

    info!("Initializing SGDZ integration for {} entries", entries.len());
    Ok(entries
        .iter()
        .map(|entry| {
            let ctx = entry::setup_entry(entry, api.clone());
            Box::new(SgdzIntegration::new(ctx, scan_interval)) as Box<dyn engine::Integration>
        })
        .collect())
}

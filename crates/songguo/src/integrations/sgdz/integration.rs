use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::entry::unload_entry;
use super::entry::EntryContext;
use super::switch::ComputerSwitch;
use crate::engine::Entity;
use crate::engine::FromIntegrationMessage;
use crate::engine::FromIntegrationSender;
use crate::engine::Integration;
use crate::engine::SwitchAction;
use crate::engine::ToIntegrationMessage;

/// Integration driving the switch of one configured entry
///
/// Commands from the engine and the periodic poll share the switch through a
/// mutex, so at most one vendor request is in flight per entry.
pub struct SgdzIntegration {
    name: String,
    ctx: Option<EntryContext>,
    scan_interval: Duration,
    to_engine: Option<FromIntegrationSender>,
    /// Handle to the background polling task
    poll_task: Option<JoinHandle<()>>,
}

impl SgdzIntegration {
    pub fn new(ctx: EntryContext, scan_interval: Duration) -> Self {
        Self {
            name: format!("{}.{}", super::DOMAIN, ctx.entry_id),
            ctx: Some(ctx),
            scan_interval,
            to_engine: None,
            poll_task: None,
        }
    }

    fn switch(&self) -> Result<Arc<Mutex<ComputerSwitch>>, Box<dyn Error + Send>> {
        self.ctx
            .as_ref()
            .map(|ctx| ctx.switch.clone())
            .ok_or_else(|| -> Box<dyn Error + Send> {
                Box::new(std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    "entry already unloaded",
                ))
            })
    }

    /// Poll the vendor on a fixed interval until the task is aborted
    async fn poll_task(
        switch: Arc<Mutex<ComputerSwitch>>,
        scan_interval: Duration,
        to_engine: FromIntegrationSender,
    ) {
        let start = tokio::time::Instant::now() + scan_interval;
        let mut ticker = tokio::time::interval_at(start, scan_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let mut guard = switch.lock().await;
            let outcome = guard.update().await;
            debug!("Polled {}: {:?}", guard.entity_id(), outcome);
            Self::report_state_static(&guard, &to_engine).await;
        }
    }

    /// Report the current state of the switch to the engine (static version)
    async fn report_state_static(switch: &ComputerSwitch, to_engine: &FromIntegrationSender) {
        let msg = FromIntegrationMessage::SwitchStateChanged {
            entity_id: switch.entity_id().to_string(),
            state: switch.state(),
        };
        if let Err(e) = to_engine.send(msg).await {
            warn!("Failed to send SwitchStateChanged message: {}", e);
        }
    }

    /// Run one action against the switch and report the result
    pub async fn run_action(&self, action: SwitchAction) -> Result<(), Box<dyn Error + Send>> {
        let switch = self.switch()?;
        let mut guard = switch.lock().await;

        let ok = match action {
            SwitchAction::TurnOn => guard.turn_on().await,
            SwitchAction::TurnOff => guard.turn_off().await,
            SwitchAction::ForceShutdown => guard.force_shutdown().await,
            SwitchAction::ForceRestart => guard.force_restart().await,
            SwitchAction::Update => {
                let outcome = guard.update().await;
                debug!("Refreshed {}: {:?}", guard.entity_id(), outcome);
                true
            }
        };

        if ok {
            info!("[{}] {} succeeded", self.name, action);
        } else {
            warn!("[{}] {} failed", self.name, action);
        }

        if let Some(tx) = &self.to_engine {
            Self::report_state_static(&guard, tx).await;
        }
        Ok(())
    }
}

#[async_trait]
impl Integration for SgdzIntegration {
    fn name(&self) -> &str {
        &self.name
    }

    async fn setup(&mut self, tx: FromIntegrationSender) -> Result<(), Box<dyn Error + Send>> {
        self.to_engine = Some(tx.clone());
        let switch = self.switch()?;

        {
            let mut guard = switch.lock().await;
            let msg = FromIntegrationMessage::EntityDiscovered {
                entity_id: guard.entity_id().to_string(),
                integration_name: self.name.clone(),
                platform: guard.platform(),
                name: guard.name().to_string(),
            };
            if let Err(e) = tx.send(msg).await {
                warn!("Failed to send EntityDiscovered message: {}", e);
            }

            // Entities are added with an initial refresh
            let outcome = guard.update().await;
            info!(
                "[{}] Registered {} (initial update: {:?})",
                self.name,
                guard.entity_id(),
                outcome
            );
            Self::report_state_static(&guard, &tx).await;
        }

        let scan_interval = self.scan_interval;
        let task = tokio::spawn(async move {
            Self::poll_task(switch, scan_interval, tx).await;
        });
        self.poll_task = Some(task);

        Ok(())
    }

    async fn handle_message(
        &mut self,
        msg: ToIntegrationMessage,
    ) -> Result<(), Box<dyn Error + Send>> {
        match msg {
            ToIntegrationMessage::SwitchCommand { entity_id, action } => {
                info!("[{}] Handling {} for {}", self.name, action, entity_id);
                self.run_action(action).await
            }
        }
    }

    async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>> {
        info!("[{}] Shutting down", self.name);

        if let Some(task) = self.poll_task.take() {
            task.abort();
        }

        if let Some(ctx) = self.ctx.take() {
            let entity_id = ctx.switch.lock().await.entity_id().to_string();
            if let Some(tx) = &self.to_engine {
                let msg = FromIntegrationMessage::EntityRemoved { entity_id };
                if let Err(e) = tx.send(msg).await {
                    warn!("Failed to send EntityRemoved message: {}", e);
                }
            }
            unload_entry(ctx);
        }

        Ok(())
    }
}

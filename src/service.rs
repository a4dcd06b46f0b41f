//! Process wiring: store, engine, dispatcher, heartbeat and transport poller.

use crate::clock::{Clock, SystemClock};
use crate::commands::Dispatcher;
use crate::config::TricksterConfig;
use crate::context::{ContextStorage, ContextStore};
use crate::error::{Result, TricksterError};
use crate::gateway::{MessagingGateway, TelegramGateway};
use crate::proposal::ProposalEngine;
use crate::scheduler::Heartbeat;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Running assistant. Background tasks stop on [`shutdown`](Self::shutdown).
pub struct Service {
    engine: Arc<ProposalEngine>,
    dispatcher: Arc<Dispatcher>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Service {
    /// Open the store and wire the core around `gateway` and `clock`.
    /// No background task is started.
    ///
    /// # Errors
    ///
    /// Fails when the record directory exists but cannot be listed.
    pub fn new(
        config: Arc<TricksterConfig>,
        gateway: Arc<dyn MessagingGateway>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let storage = ContextStorage::new(config.storage_dir());
        let store = Arc::new(ContextStore::open(storage)?);
        let engine = Arc::new(ProposalEngine::new(store, gateway, config, clock));
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&engine)));
        Ok(Self {
            engine,
            dispatcher,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        })
    }

    /// Validate `config` and start the full service over Telegram.
    ///
    /// # Errors
    ///
    /// [`TricksterError::Config`] for an invalid configuration or a missing
    /// bot token, or the store error from [`new`](Self::new).
    pub fn launch(config: TricksterConfig) -> Result<Self> {
        config.validate()?;
        if config.telegram.bot_token.trim().is_empty() {
            return Err(TricksterError::Config(
                "telegram.bot_token is empty (set it or TRICKSTER_BOT_TOKEN)".to_owned(),
            ));
        }
        let config = Arc::new(config);
        let telegram = Arc::new(TelegramGateway::new(&config.telegram));
        let clock = Arc::new(SystemClock::new(config.offset()));
        let mut service = Self::new(
            Arc::clone(&config),
            Arc::clone(&telegram) as Arc<dyn MessagingGateway>,
            clock,
        )?;

        service.spawn_heartbeat();
        let poller = telegram.run(
            Arc::clone(&service.dispatcher),
            Arc::new(config.catalog.clone()),
            service.cancel.child_token(),
        );
        service.tasks.push(tokio::spawn(poller));
        info!(
            conversations = service.engine.store().len(),
            "trickster service started"
        );
        Ok(service)
    }

    /// Start the heartbeat loop.
    pub fn spawn_heartbeat(&mut self) {
        let heartbeat = Heartbeat::new(Arc::clone(&self.engine), self.cancel.child_token());
        self.tasks.push(heartbeat.spawn());
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<ProposalEngine> {
        &self.engine
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Cancel the heartbeat and the poller and wait for their loops to exit.
    /// Handlers already running are not awaited.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("background task ended abnormally: {e}");
            }
        }
        info!("trickster service stopped");
    }
}

//! Shared collaborators for one harvest run.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::Config;
use crate::services::{
    FetchScheduler, JsonParser, LogProgress, NoProgress, PageParser, ProgressReporter, Transport,
    TransportClient,
};
use crate::storage::{CheckpointStore, LocalStorage};

/// Everything a harvest needs: config, storage, transport, parser,
/// progress sink and the run-scoped cancellation token.
#[derive(Clone)]
pub struct HarvestContext {
    pub config: Arc<Config>,
    pub storage: Arc<LocalStorage>,
    pub transport: Arc<dyn Transport>,
    pub parser: Arc<dyn PageParser>,
    pub cancel: CancellationToken,
    /// Reference date for age calculation
    pub today: NaiveDate,
    progress: Option<Arc<dyn ProgressReporter>>,
}

impl HarvestContext {
    /// Validate `config` and build the HTTP transport from it.
    pub fn new(config: Config, cancel: CancellationToken) -> Result<Self> {
        config.validate()?;
        let transport = Arc::new(TransportClient::new(&config.http)?);
        let storage = Arc::new(LocalStorage::new(&config.checkpoint.dir));
        Ok(Self {
            config: Arc::new(config),
            storage,
            transport,
            parser: Arc::new(JsonParser),
            cancel,
            today: Utc::now().date_naive(),
            progress: None,
        })
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_parser(mut self, parser: Arc<dyn PageParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Send all progress to `progress` instead of the log.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn progress(&self, label: &str) -> Arc<dyn ProgressReporter> {
        match &self.progress {
            Some(progress) => progress.clone(),
            None if self.config.logging.show_progress => Arc::new(LogProgress::new(label)),
            None => Arc::new(NoProgress),
        }
    }

    /// Fresh scheduler; limits are per run.
    pub fn scheduler(&self, label: &str) -> FetchScheduler {
        FetchScheduler::new(
            self.transport.clone(),
            &self.config,
            self.cancel.clone(),
            self.progress(label),
        )
    }

    pub fn checkpoint(&self, name: &str) -> CheckpointStore {
        CheckpointStore::new(self.storage.clone(), name, &self.config.checkpoint)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

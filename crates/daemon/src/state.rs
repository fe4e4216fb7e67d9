use std::sync::Arc;

use anyhow::Result;
use log::info;
use sluice_engine::{FileSinkConnector, MemorySink, Pipeline, SinkConnector};

use crate::config::{DaemonConfig, SinkKind};

pub struct DaemonState {
    pub config: DaemonConfig,
    pub pipeline: Pipeline,
}

impl DaemonState {
    pub fn new(config: DaemonConfig) -> Result<Self> {
        let connector: Arc<dyn SinkConnector> = match config.sink {
            SinkKind::File => Arc::new(FileSinkConnector::new(&config.sink_path)?),
            SinkKind::Memory => Arc::new(MemorySink::new()),
        };
        Self::with_connector(config, connector)
    }

    pub fn with_connector(config: DaemonConfig, connector: Arc<dyn SinkConnector>) -> Result<Self> {
        info!("persisting to {}", connector.describe());
        let pipeline = Pipeline::start(config.pipeline.clone(), connector)?;
        Ok(Self { config, pipeline })
    }
}

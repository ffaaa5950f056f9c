//! Process-wide context, built once at startup and shared by reference.

use crate::acquisition::http_client::{HttpTransport, Transport, TransportClient};
use crate::acquisition::retry::RetryPolicy;
use crate::config::Config;
use crate::downstream::{self, Downstream};
use anyhow::Result;
use std::sync::Arc;

pub struct Context {
    pub config: Config,
    pub client: TransportClient,
    /// Run in order after the document is persisted.
    pub downstream: Vec<Box<dyn Downstream>>,
}

impl Context {
    /// Production wiring: reqwest transport, default retry policy, and the
    /// downstream stages named in `config`.
    pub fn from_config(config: Config) -> Result<Self> {
        let transport = HttpTransport::new(config.request_timeout)?;
        let stages = downstream::stages_from_config(&config);
        Ok(Self::new(
            config,
            Arc::new(transport),
            RetryPolicy::default(),
            stages,
        ))
    }

    pub fn new(
        config: Config,
        transport: Arc<dyn Transport>,
        policy: RetryPolicy,
        downstream: Vec<Box<dyn Downstream>>,
    ) -> Self {
        let client = TransportClient::new(transport, policy, config.concurrency);
        Self {
            config,
            client,
            downstream,
        }
    }
}

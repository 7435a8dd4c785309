use crate::error::DeliveryError;
use crate::record::LogEntry;
use crate::sink::{BoxError, LogSink};
use async_trait::async_trait;
use reqwest::Client;

/// Configuration for [`HttpDelivery`].
#[derive(Clone, Debug)]
pub struct HttpDeliveryConfig {
    /// Base URL without path, e.g. "https://logs.timber.io"
    pub endpoint: String,
    pub api_key: String,
    pub source_id: String,
}

/// Default [`LogSink`] posting batches to the Timber ingestion API.
///
/// Each batch is sent as one JSON array of flattened entries to
/// `{endpoint}/sources/{source_id}/frames`.
#[derive(Clone)]
pub struct HttpDelivery {
    client: Client,
    config: HttpDeliveryConfig,
}

impl HttpDelivery {
    /// Construct a new delivery strategy using the provided configuration.
    ///
    /// **Parameters**
    /// - `config`: [`HttpDeliveryConfig`] describing the endpoint, source
    ///   and credentials.
    ///
    /// **Returns**
    /// - A ready-to-use [`HttpDelivery`] that can be passed into
    ///   [`Timber::with_sink`](crate::timber::Timber::with_sink).
    pub fn new(config: HttpDeliveryConfig) -> Self {
        let client = Client::new();
        Self { client, config }
    }

    pub fn frames_url(&self) -> String {
        format!(
            "{}/sources/{}/frames",
            self.config.endpoint.trim_end_matches('/'),
            urlencoding::encode(&self.config.source_id)
        )
    }

    async fn post(&self, logs: &[LogEntry]) -> Result<(), DeliveryError> {
        let resp = self
            .client
            .post(self.frames_url())
            .bearer_auth(&self.config.api_key)
            .json(logs)
            .send()
            .await?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
            Err(DeliveryError::Status { status, body })
        }
    }
}

#[async_trait]
impl LogSink for HttpDelivery {
    async fn sync(&self, logs: Vec<LogEntry>) -> Result<Vec<LogEntry>, BoxError> {
        self.post(&logs).await?;
        Ok(logs)
    }
}

// HTTP snapshot source: `GET {base}/items`.

use async_trait::async_trait;
use tracing::debug;

use gavel_core::snapshot::{Snapshot, SnapshotSource};
use gavel_core::ClientError;

pub struct HttpSnapshotSource {
    http: reqwest::Client,
    url: String,
}

impl HttpSnapshotSource {
    /// `base_url` is the server's HTTP root, e.g. `http://localhost:3000`.
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: format!("{}/items", base_url.trim_end_matches('/')),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn failure(reason: impl std::fmt::Display) -> ClientError {
    ClientError::ClockMeasurementFailure {
        reason: reason.to_string(),
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch(&self) -> Result<Snapshot, ClientError> {
        debug!("Requesting snapshot from {}", self.url);
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(failure)?
            .error_for_status()
            .map_err(failure)?;
        response.json::<Snapshot>().await.map_err(failure)
    }
}

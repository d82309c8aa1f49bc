// Initial snapshot: the item list plus the server's clock reading.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ClientError;
use crate::model::{timestamp, Item};

/// Response of the one-shot snapshot request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub items: Vec<Item>,
    #[serde(with = "timestamp")]
    pub server_time: DateTime<Utc>,
}

/// Anything that can answer the snapshot request.
///
/// Implementations map transport failures and undecodable bodies to
/// [`ClientError::ClockMeasurementFailure`].
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self) -> Result<Snapshot, ClientError>;
}

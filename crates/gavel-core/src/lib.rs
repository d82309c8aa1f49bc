// Library root for the client-side synchronization core: clock offset,
// per-item countdowns, registration, bid intents and state reconciliation.

pub mod bid;
pub mod clock;
pub mod config;
pub mod countdown;
pub mod error;
pub mod model;
pub mod protocol;
pub mod reconcile;
pub mod registration;
pub mod snapshot;
pub mod ws_client;

pub use error::ClientError;

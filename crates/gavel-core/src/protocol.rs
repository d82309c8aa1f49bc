// Wire protocol for the push channel.
//
// Every frame is a JSON object `{"type": "...", "payload": {...}}` with
// camelCase payload fields.

use serde::{Deserialize, Serialize};

use crate::model::{ConnectionId, Item, ItemId};

/// Events pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerEvent {
    /// The channel (re)connected and assigned this client an identity.
    #[serde(rename = "CONNECTED")]
    Connected { id: ConnectionId },

    /// Registration accepted; `username` is the authoritative display name.
    #[serde(rename = "REGISTERED")]
    Registered { username: String },

    /// Authoritative replacement for one item.
    #[serde(rename = "UPDATE_BID", rename_all = "camelCase")]
    UpdateBid { item_id: ItemId, item: Item },

    /// A bid from this client was rejected.
    #[serde(rename = "BID_ERROR")]
    BidError { error: String },
}

impl ServerEvent {
    pub fn parse(text: &str) -> Result<ServerEvent, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Events this client emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientEvent {
    #[serde(rename = "REGISTER")]
    Register { username: String },

    #[serde(rename = "BID_PLACED", rename_all = "camelCase")]
    BidPlaced { item_id: ItemId, amount: u64 },
}

impl ClientEvent {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

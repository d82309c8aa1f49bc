// Item data model and the ordered item collection.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Stable identifier of an auction item, unique within the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity token the push channel assigns to this client on connect.
///
/// Only meaningful for the lifetime of one connection; a reconnect may hand
/// out a different token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        ConnectionId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// One auctionable entity as last reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    /// Display title; opaque to the core.
    pub title: String,
    /// Current highest bid, in whole currency units.
    #[serde(deserialize_with = "amount::deserialize")]
    pub current_bid: u64,
    /// Absolute deadline in server time.
    #[serde(with = "timestamp")]
    pub auction_end_time: DateTime<Utc>,
    /// Connection identity of the last bidder, absent until the first bid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_bidder: Option<String>,
    /// Display name paired with `last_bidder`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_bidder_name: Option<String>,
}

impl Item {
    /// Whether anyone has bid on this item yet.
    pub fn has_bids(&self) -> bool {
        self.last_bidder.is_some()
    }
}

// ---------------------------------------------------------------------------
// ItemCollection
// ---------------------------------------------------------------------------

/// Items keyed by id, in the order the server listed them.
///
/// Replaced wholesale by the initial snapshot and afterwards patched one
/// item at a time. Updates never create entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemCollection {
    items: Vec<Item>,
}

impl ItemCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole collection, returning the ids that were dropped.
    ///
    /// Duplicate ids in `items` keep their first occurrence.
    pub fn replace_all(&mut self, items: Vec<Item>) -> Vec<ItemId> {
        let mut fresh: Vec<Item> = Vec::with_capacity(items.len());
        for item in items {
            if fresh.iter().any(|existing| existing.id == item.id) {
                warn!("Duplicate item id {} in snapshot, keeping the first entry", item.id);
                continue;
            }
            fresh.push(item);
        }

        let removed = self
            .items
            .iter()
            .map(|item| item.id)
            .filter(|id| !fresh.iter().any(|item| item.id == *id))
            .collect();

        self.items = fresh;
        removed
    }

    /// Replace the entry for `item_id` with `item`.
    ///
    /// The entry stays keyed by `item_id` even if the payload carries a
    /// different `id`. Returns the previous value, or `None` (leaving the
    /// collection untouched) when `item_id` is unknown.
    pub fn apply_update(&mut self, item_id: ItemId, mut item: Item) -> Option<Item> {
        let slot = self.items.iter_mut().find(|existing| existing.id == item_id)?;
        if item.id != item_id {
            warn!(
                "Update for item {} carries payload id {}, keeping {}",
                item_id, item.id, item_id
            );
            item.id = item_id;
        }
        Some(std::mem::replace(slot, item))
    }

    pub fn get(&self, item_id: ItemId) -> Option<&Item> {
        self.items.iter().find(|item| item.id == item_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Timestamp serde
// ---------------------------------------------------------------------------

/// Serde adapter for server timestamps.
///
/// Accepts RFC 3339 strings or integer epoch milliseconds; always writes
/// RFC 3339 with millisecond precision.
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Millis(i64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        match RawTimestamp::deserialize(deserializer)? {
            RawTimestamp::Millis(ms) => DateTime::from_timestamp_millis(ms)
                .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {ms}"))),
            RawTimestamp::Text(text) => DateTime::parse_from_rfc3339(&text)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| D::Error::custom(format!("invalid timestamp {text:?}: {e}"))),
        }
    }
}

/// Bid amounts: whole, non-negative numbers. `110.0` is read as `110`;
/// anything with a fractional part is malformed.
pub mod amount {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawAmount {
        Whole(u64),
        Float(f64),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        match RawAmount::deserialize(deserializer)? {
            RawAmount::Whole(n) => Ok(n),
            RawAmount::Float(f) if f >= 0.0 && f.fract() == 0.0 && f < u64::MAX as f64 => Ok(f as u64),
            RawAmount::Float(f) => Err(D::Error::custom(format!("bid amount must be a whole number, got {f}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

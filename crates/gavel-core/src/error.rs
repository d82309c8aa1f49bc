// Failure taxonomy for the client. None of these are fatal to the session.

use thiserror::Error;

use crate::model::ItemId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Snapshot/time fetch failed or returned malformed data. The session
    /// carries on with a zero offset and an empty collection.
    #[error("clock measurement failed: {reason}")]
    ClockMeasurementFailure { reason: String },

    #[error("display name must not be empty")]
    InvalidRegistrationInput,

    #[error("already registered as {display_name}")]
    AlreadyRegistered { display_name: String },

    #[error("register before placing a bid")]
    NotRegistered,

    #[error("no item with id {item_id}")]
    UnknownItem { item_id: ItemId },

    #[error("auction for item {item_id} has ended")]
    AuctionEnded { item_id: ItemId },

    /// Server-side rejection, delivered as a `BID_ERROR` event.
    #[error("bid rejected: {message}")]
    BidRejected { message: String },

    /// Update referencing an id that is not in the collection.
    #[error("ignored update for unknown item {item_id}")]
    UnknownItemUpdate { item_id: ItemId },
}

impl ClientError {
    /// Whether the failure must be shown to the user alongside the action
    /// that caused it. The rest only need to reach the logs.
    pub fn is_user_visible(&self) -> bool {
        !matches!(
            self,
            ClientError::ClockMeasurementFailure { .. } | ClientError::UnknownItemUpdate { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_only_failures_are_not_user_visible() {
        assert!(!ClientError::UnknownItemUpdate { item_id: ItemId(3) }.is_user_visible());
        assert!(!ClientError::ClockMeasurementFailure { reason: "timeout".into() }.is_user_visible());
    }

    #[test]
    fn local_and_server_rejections_are_user_visible() {
        assert!(ClientError::NotRegistered.is_user_visible());
        assert!(ClientError::InvalidRegistrationInput.is_user_visible());
        assert!(ClientError::BidRejected { message: "too low".into() }.is_user_visible());
        assert!(ClientError::AuctionEnded { item_id: ItemId(1) }.is_user_visible());
    }

    #[test]
    fn messages_name_the_item() {
        let err = ClientError::UnknownItem { item_id: ItemId(42) };
        assert_eq!(err.to_string(), "no item with id 42");
    }
}

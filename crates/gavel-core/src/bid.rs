// Bid intent gate.
//
// Turns a user's "bid on this item" into a BID_PLACED event. The gate never
// touches local item state; the new amount only shows up once the server
// pushes an UPDATE_BID (or a BID_ERROR comes back instead).

use tracing::info;

use crate::error::ClientError;
use crate::model::ItemId;
use crate::protocol::ClientEvent;
use crate::registration::RegistrationState;

/// Default fixed bid increment.
pub const DEFAULT_BID_INCREMENT: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BidIntentGate {
    increment: u64,
}

impl BidIntentGate {
    pub fn new(increment: u64) -> Self {
        Self { increment }
    }

    /// Propose `observed_current_bid + increment` for `item_id`.
    ///
    /// The amount is derived from what this client last saw; the server
    /// settles any race with concurrent bidders.
    pub fn place_bid(
        &self,
        registration: &RegistrationState,
        item_id: ItemId,
        observed_current_bid: u64,
    ) -> Result<ClientEvent, ClientError> {
        if !registration.is_registered() {
            return Err(ClientError::NotRegistered);
        }

        let amount = observed_current_bid.saturating_add(self.increment);
        info!("Placing bid: item={item_id} amount={amount}");
        Ok(ClientEvent::BidPlaced { item_id, amount })
    }
}

impl Default for BidIntentGate {
    fn default() -> Self {
        BidIntentGate::new(DEFAULT_BID_INCREMENT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConnectionId;

    fn registered() -> RegistrationState {
        RegistrationState::Registered {
            identity: Some(ConnectionId::new("sock-42")),
            display_name: "alice".into(),
        }
    }

    #[test]
    fn unregistered_bid_fails_without_event() {
        let gate = BidIntentGate::default();
        assert_eq!(
            gate.place_bid(&RegistrationState::Unregistered, ItemId(1), 100),
            Err(ClientError::NotRegistered)
        );
    }

    #[test]
    fn amount_is_observed_bid_plus_increment() {
        let gate = BidIntentGate::default();
        assert_eq!(
            gate.place_bid(&registered(), ItemId(1), 100),
            Ok(ClientEvent::BidPlaced {
                item_id: ItemId(1),
                amount: 110
            })
        );
    }

    #[test]
    fn custom_increment() {
        let gate = BidIntentGate::new(25);
        match gate.place_bid(&registered(), ItemId(4), 1_000).unwrap() {
            ClientEvent::BidPlaced { amount, .. } => assert_eq!(amount, 1_025),
            other => panic!("expected BidPlaced, got {other:?}"),
        }
    }
}

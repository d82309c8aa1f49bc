// State reconciler: the only code path that mutates the item collection,
// the registration state and the connection identity.

use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::model::{ConnectionId, Item, ItemCollection, ItemId};
use crate::protocol::ServerEvent;
use crate::registration::{self, RegistrationState};

/// What applying one server event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    /// The channel assigned a (possibly new) identity.
    IdentityAssigned(ConnectionId),
    /// Registration committed.
    Registered(RegistrationState),
    /// An item was replaced; `previous` is the value it replaced.
    ItemReplaced { item_id: ItemId, previous: Item },
    /// Nothing changed, but the consumer should hear about it. Covers
    /// `BidRejected` (user-visible) and `UnknownItemUpdate` (diagnostic).
    Notice(ClientError),
    /// Nothing changed.
    Unchanged,
}

/// Who holds the high bid on an item, from this client's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    NoBids,
    Winning,
    Outbid,
}

#[derive(Debug, Default)]
pub struct StateReconciler {
    items: ItemCollection,
    registration: RegistrationState,
    connection: Option<ConnectionId>,
}

impl StateReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &ItemCollection {
        &self.items
    }

    pub fn item(&self, item_id: ItemId) -> Option<&Item> {
        self.items.get(item_id)
    }

    pub fn registration(&self) -> &RegistrationState {
        &self.registration
    }

    pub fn connection_identity(&self) -> Option<&ConnectionId> {
        self.connection.as_ref()
    }

    /// Replace the collection with the initial snapshot. Returns the ids
    /// that are no longer present.
    pub fn load_snapshot(&mut self, items: Vec<Item>) -> Vec<ItemId> {
        let removed = self.items.replace_all(items);
        info!(
            "Loaded snapshot: {} items ({} removed)",
            self.items.len(),
            removed.len()
        );
        removed
    }

    /// The channel dropped; the old identity no longer means anything.
    pub fn connection_lost(&mut self) {
        if let Some(id) = self.connection.take() {
            debug!("Cleared connection identity {id}");
        }
    }

    /// Apply one server event, in delivery order.
    pub fn apply(&mut self, event: ServerEvent) -> Reconciled {
        match event {
            ServerEvent::Connected { id } => {
                info!("Connection identity assigned: {id}");
                self.connection = Some(id.clone());
                Reconciled::IdentityAssigned(id)
            }
            ServerEvent::Registered { username } => {
                let identity = self.connection.clone();
                if registration::confirm(&mut self.registration, identity, username) {
                    Reconciled::Registered(self.registration.clone())
                } else {
                    Reconciled::Unchanged
                }
            }
            ServerEvent::UpdateBid { item_id, item } => {
                let new_bid = item.current_bid;
                match self.items.apply_update(item_id, item) {
                    Some(previous) => {
                        if new_bid < previous.current_bid {
                            warn!(
                                "Item {item_id} bid went down from {} to {new_bid}",
                                previous.current_bid
                            );
                        }
                        debug!("Item {item_id} replaced (bid {new_bid})");
                        Reconciled::ItemReplaced { item_id, previous }
                    }
                    None => {
                        warn!("Ignoring bid update for unknown item {item_id}");
                        Reconciled::Notice(ClientError::UnknownItemUpdate { item_id })
                    }
                }
            }
            ServerEvent::BidError { error } => {
                info!("Bid rejected by server: {error}");
                Reconciled::Notice(ClientError::BidRejected { message: error })
            }
        }
    }

    /// `true` when this connection placed the last bid.
    fn am_i_winning(&self, item: &Item) -> bool {
        match (&item.last_bidder, &self.connection) {
            (Some(bidder), Some(me)) => bidder == me.as_str(),
            _ => false,
        }
    }

    /// `true` when someone else placed the last bid.
    fn someone_else_is_bidding(&self, item: &Item) -> bool {
        item.has_bids() && !self.am_i_winning(item)
    }

    pub fn ownership(&self, item: &Item) -> Ownership {
        if self.am_i_winning(item) {
            Ownership::Winning
        } else if self.someone_else_is_bidding(item) {
            Ownership::Outbid
        } else {
            Ownership::NoBids
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn item(id: u64, bid: u64, bidder: Option<&str>) -> Item {
        Item {
            id: ItemId(id),
            title: format!("Lot {id}"),
            current_bid: bid,
            auction_end_time: Utc.with_ymd_and_hms(2026, 3, 1, 12, 5, 0).unwrap(),
            last_bidder: bidder.map(str::to_string),
            last_bidder_name: bidder.map(|b| format!("name-of-{b}")),
        }
    }

    fn loaded() -> StateReconciler {
        let mut state = StateReconciler::new();
        state.load_snapshot(vec![item(1, 100, None), item(2, 50, Some("sock-7"))]);
        state
    }

    fn connect(state: &mut StateReconciler, id: &str) {
        state.apply(ServerEvent::Connected {
            id: ConnectionId::new(id),
        });
    }

    #[test]
    fn connected_sets_current_identity() {
        let mut state = loaded();
        connect(&mut state, "sock-1");
        connect(&mut state, "sock-2");
        assert_eq!(state.connection_identity(), Some(&ConnectionId::new("sock-2")));

        state.connection_lost();
        assert!(state.connection_identity().is_none());
    }

    #[test]
    fn registration_binds_current_identity_and_server_name() {
        let mut state = loaded();
        connect(&mut state, "sock-42");
        let outcome = state.apply(ServerEvent::Registered {
            username: "Alice".into(),
        });
        let expected = RegistrationState::Registered {
            identity: Some(ConnectionId::new("sock-42")),
            display_name: "Alice".into(),
        };
        assert_eq!(outcome, Reconciled::Registered(expected.clone()));
        assert_eq!(state.registration(), &expected);

        let again = state.apply(ServerEvent::Registered {
            username: "Someone".into(),
        });
        assert_eq!(again, Reconciled::Unchanged);
        assert_eq!(state.registration(), &expected);
    }

    #[test]
    fn update_replaces_known_item() {
        let mut state = loaded();
        let outcome = state.apply(ServerEvent::UpdateBid {
            item_id: ItemId(1),
            item: item(1, 110, Some("sock-9")),
        });
        assert_eq!(
            outcome,
            Reconciled::ItemReplaced {
                item_id: ItemId(1),
                previous: item(1, 100, None)
            }
        );
        assert_eq!(state.item(ItemId(1)), Some(&item(1, 110, Some("sock-9"))));
    }

    #[test]
    fn update_with_mismatched_payload_id_stays_on_addressed_item() {
        let mut state = loaded();
        let outcome = state.apply(ServerEvent::UpdateBid {
            item_id: ItemId(1),
            item: item(2, 110, Some("sock-9")),
        });
        assert!(matches!(
            outcome,
            Reconciled::ItemReplaced { item_id: ItemId(1), .. }
        ));

        let ids: Vec<ItemId> = state.items().iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![ItemId(1), ItemId(2)]);
        assert_eq!(state.item(ItemId(1)).unwrap().current_bid, 110);
        assert_eq!(state.item(ItemId(2)).unwrap().current_bid, 50);

        let next = state.apply(ServerEvent::UpdateBid {
            item_id: ItemId(1),
            item: item(1, 120, Some("sock-3")),
        });
        assert!(matches!(next, Reconciled::ItemReplaced { .. }));
        assert_eq!(state.item(ItemId(1)).unwrap().current_bid, 120);
    }

    #[test]
    fn duplicate_update_is_idempotent() {
        let event = ServerEvent::UpdateBid {
            item_id: ItemId(2),
            item: item(2, 75, Some("sock-3")),
        };

        let mut once = loaded();
        once.apply(event.clone());

        let mut twice = loaded();
        twice.apply(event.clone());
        twice.apply(event);

        assert_eq!(once.items(), twice.items());
    }

    #[test]
    fn unknown_item_update_leaves_collection_unchanged() {
        let mut state = loaded();
        let before = state.items().clone();

        let outcome = state.apply(ServerEvent::UpdateBid {
            item_id: ItemId(99),
            item: item(99, 1_000, Some("sock-1")),
        });

        assert_eq!(
            outcome,
            Reconciled::Notice(ClientError::UnknownItemUpdate { item_id: ItemId(99) })
        );
        assert_eq!(state.items(), &before);
        assert_eq!(state.items().len(), 2);
    }

    #[test]
    fn bid_error_is_a_notice_without_mutation() {
        let mut state = loaded();
        let before = state.items().clone();
        let outcome = state.apply(ServerEvent::BidError {
            error: "Auction has ended".into(),
        });
        assert_eq!(
            outcome,
            Reconciled::Notice(ClientError::BidRejected {
                message: "Auction has ended".into()
            })
        );
        assert_eq!(state.items(), &before);
        assert!(!state.registration().is_registered());
    }

    #[test]
    fn winning_after_own_bid_update() {
        let mut state = loaded();
        connect(&mut state, "sock-42");
        state.apply(ServerEvent::Registered {
            username: "alice".into(),
        });
        state.apply(ServerEvent::UpdateBid {
            item_id: ItemId(1),
            item: item(1, 110, Some("sock-42")),
        });

        let current = state.item(ItemId(1)).unwrap();
        assert!(state.am_i_winning(current));
        assert!(!state.someone_else_is_bidding(current));
        assert_eq!(state.ownership(current), Ownership::Winning);
    }

    #[test]
    fn ownership_predicates_are_exclusive() {
        let mut state = loaded();
        let cases = [
            item(1, 100, None),
            item(1, 100, Some("sock-42")),
            item(1, 100, Some("sock-7")),
        ];

        for identity in [None, Some("sock-42")] {
            if let Some(id) = identity {
                connect(&mut state, id);
            } else {
                state.connection_lost();
            }
            for case in &cases {
                let winning = state.am_i_winning(case);
                let outbid = state.someone_else_is_bidding(case);
                assert!(!(winning && outbid));
                assert_eq!(!winning && !outbid, case.last_bidder.is_none());
            }
        }
    }

    #[test]
    fn no_identity_and_no_bidder_is_not_winning() {
        let state = loaded();
        let fresh = item(1, 100, None);
        assert!(!state.am_i_winning(&fresh));
        assert_eq!(state.ownership(&fresh), Ownership::NoBids);
    }

    #[test]
    fn reconnect_changes_ownership() {
        let mut state = loaded();
        connect(&mut state, "sock-42");
        let mine = item(1, 110, Some("sock-42"));
        assert!(state.am_i_winning(&mine));

        connect(&mut state, "sock-43");
        assert!(!state.am_i_winning(&mine));
        assert!(state.someone_else_is_bidding(&mine));
    }
}

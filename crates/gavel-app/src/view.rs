// Messages exchanged between the app loop and its consumer (the console).

use gavel_core::countdown::{ItemCountdown, ENDED_LABEL};
use gavel_core::model::{ConnectionId, Item, ItemId};
use gavel_core::reconcile::{Ownership, StateReconciler};
use gavel_core::registration::RegistrationState;
use gavel_core::ClientError;

/// State of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

/// Everything a consumer needs to draw one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemView {
    pub item: Item,
    /// `"{h}h {m}m {s}s"` or `"ENDED"`.
    pub countdown: String,
    pub ended: bool,
    /// Set for a short while after the current bid changed.
    pub flashing: bool,
    /// Who holds the high bid, relative to this connection.
    pub ownership: Ownership,
}

impl ItemView {
    pub fn new(item: &Item, countdown: Option<&ItemCountdown>, reconciler: &StateReconciler) -> Self {
        let (display, ended, flashing) = match countdown {
            Some(c) => (c.display().to_string(), c.is_ended(), c.is_flashing()),
            None => (ENDED_LABEL.to_string(), true, false),
        };
        ItemView {
            item: item.clone(),
            countdown: display,
            ended,
            flashing,
            ownership: reconciler.ownership(item),
        }
    }
}

/// Updates pushed from the app loop to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiUpdate {
    ConnectionStatus(ConnectionStatus),
    /// This client's current channel identity.
    Identity(Option<ConnectionId>),
    Registration(RegistrationState),
    /// Full item list, in display order.
    Items(Vec<ItemView>),
    /// One item was replaced by the server.
    ItemChanged(ItemView),
    /// Countdown display for one item moved.
    Countdown {
        item_id: ItemId,
        display: String,
        ended: bool,
    },
    Flash {
        item_id: ItemId,
        active: bool,
    },
    /// A user-visible failure.
    Notice(ClientError),
}

/// Commands from the consumer to the app loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Register(String),
    PlaceBid(ItemId),
    ListItems,
    Quit,
}

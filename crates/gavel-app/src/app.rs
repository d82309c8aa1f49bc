// Session context and the single event loop.
//
// The loop owns every piece of mutable session state: the clock offset,
// the reconciler (items, registration, identity), the bid gate and the
// countdown arena. Channel frames, the one-shot snapshot measurement, timer
// events and user commands all arrive over channels and are handled here in
// arrival order, one at a time.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use gavel_core::bid::BidIntentGate;
use gavel_core::clock::{Clock, ClockOffset, Measurement};
use gavel_core::config::Config;
use gavel_core::model::ItemId;
use gavel_core::protocol::{ClientEvent, ServerEvent};
use gavel_core::reconcile::{Reconciled, StateReconciler};
use gavel_core::registration::registration_intent;
use gavel_core::ws_client::ChannelEvent;
use gavel_core::ClientError;

use crate::timers::{CountdownBoard, TimerEvent};
use crate::view::{ConnectionStatus, ItemView, UiUpdate, UserCommand};

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Everything one client session knows.
pub struct AppState {
    pub config: Config,
    clock: Arc<dyn Clock>,
    pub offset: ClockOffset,
    /// Set once the startup measurement has been applied.
    pub synced: bool,
    pub reconciler: StateReconciler,
    pub gate: BidIntentGate,
    pub countdowns: CountdownBoard,
    pub connection_status: ConnectionStatus,
}

impl AppState {
    pub fn new(config: Config, clock: Arc<dyn Clock>, timer_tx: mpsc::Sender<TimerEvent>) -> Self {
        let countdowns = CountdownBoard::new(
            config.timing.tick_interval(),
            config.timing.flash_duration(),
            timer_tx,
        );
        let gate = BidIntentGate::new(config.bidding.increment);
        AppState {
            config,
            clock,
            offset: ClockOffset::zero(),
            synced: false,
            reconciler: StateReconciler::new(),
            gate,
            countdowns,
            connection_status: ConnectionStatus::Disconnected,
        }
    }

    /// Local time corrected by the measured offset.
    pub fn server_now(&self) -> DateTime<Utc> {
        self.offset.server_now(self.clock.now())
    }

    pub fn item_view(&self, item_id: ItemId) -> Option<ItemView> {
        let item = self.reconciler.item(item_id)?;
        Some(ItemView::new(item, self.countdowns.get(item_id), &self.reconciler))
    }

    /// All items in display order.
    pub fn item_views(&self) -> Vec<ItemView> {
        self.reconciler
            .items()
            .iter()
            .map(|item| ItemView::new(item, self.countdowns.get(item.id), &self.reconciler))
            .collect()
    }

    /// Apply the startup measurement. Only the first one counts.
    pub fn apply_measurement(&mut self, measurement: Measurement) -> Vec<UiUpdate> {
        if self.synced {
            warn!("Ignoring extra clock measurement");
            return Vec::new();
        }
        self.synced = true;
        self.offset = measurement.offset;

        let removed = self.reconciler.load_snapshot(measurement.items);
        for item_id in removed {
            self.countdowns.evict(item_id);
        }

        let now = self.server_now();
        self.countdowns.retick_all(now);
        let items: Vec<_> = self.reconciler.items().iter().cloned().collect();
        for item in &items {
            self.countdowns.sync_item(item, now);
        }

        vec![UiUpdate::Items(self.item_views())]
    }

    pub fn handle_channel_event(&mut self, event: ChannelEvent) -> Vec<UiUpdate> {
        match event {
            ChannelEvent::Opened { url } => {
                info!("Channel open ({url})");
                self.connection_status = ConnectionStatus::Connected;
                vec![UiUpdate::ConnectionStatus(ConnectionStatus::Connected)]
            }
            ChannelEvent::Closed => {
                info!("Channel closed");
                self.connection_status = ConnectionStatus::Disconnected;
                self.reconciler.connection_lost();
                // Ownership depends on the identity, so every row may change.
                vec![
                    UiUpdate::ConnectionStatus(ConnectionStatus::Disconnected),
                    UiUpdate::Identity(None),
                    UiUpdate::Items(self.item_views()),
                ]
            }
            ChannelEvent::Message(json) => self.handle_server_message(&json),
        }
    }

    fn handle_server_message(&mut self, json: &str) -> Vec<UiUpdate> {
        let event = match ServerEvent::parse(json) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping undecodable frame: {e}");
                debug!("Frame was: {json}");
                return Vec::new();
            }
        };

        match self.reconciler.apply(event) {
            Reconciled::IdentityAssigned(id) => {
                vec![UiUpdate::Identity(Some(id)), UiUpdate::Items(self.item_views())]
            }
            Reconciled::Registered(registration) => vec![UiUpdate::Registration(registration)],
            Reconciled::ItemReplaced { item_id, .. } => {
                let now = self.server_now();
                let Some(item) = self.reconciler.item(item_id).cloned() else {
                    return Vec::new();
                };
                self.countdowns.sync_item(&item, now);
                self.item_view(item_id)
                    .map(UiUpdate::ItemChanged)
                    .into_iter()
                    .collect()
            }
            Reconciled::Notice(err) if err.is_user_visible() => vec![UiUpdate::Notice(err)],
            Reconciled::Notice(_) | Reconciled::Unchanged => Vec::new(),
        }
    }

    pub fn handle_timer(&mut self, event: TimerEvent) -> Vec<UiUpdate> {
        let now = self.server_now();
        let Some((item_id, change)) = self.countdowns.on_timer(event, now) else {
            return Vec::new();
        };

        let mut updates = Vec::new();
        if change.countdown_changed {
            if let Some(countdown) = self.countdowns.get(item_id) {
                updates.push(UiUpdate::Countdown {
                    item_id,
                    display: countdown.display().to_string(),
                    ended: countdown.is_ended(),
                });
            }
        }
        if change.flash_cleared {
            updates.push(UiUpdate::Flash {
                item_id,
                active: false,
            });
        }
        updates
    }

    /// Handle one user command. Returns the event to send (if any) and the
    /// updates for the consumer. `Quit` is handled by [`run`].
    pub fn handle_command(&mut self, cmd: UserCommand) -> (Option<ClientEvent>, Vec<UiUpdate>) {
        let outcome = match cmd {
            UserCommand::Register(name) => registration_intent(self.reconciler.registration(), &name),
            UserCommand::PlaceBid(item_id) => self.bid_intent(item_id),
            UserCommand::ListItems => return (None, vec![UiUpdate::Items(self.item_views())]),
            UserCommand::Quit => return (None, Vec::new()),
        };

        match outcome {
            Ok(event) => (Some(event), Vec::new()),
            Err(err) => {
                info!("Command rejected: {err}");
                (None, vec![UiUpdate::Notice(err)])
            }
        }
    }

    fn bid_intent(&self, item_id: ItemId) -> Result<ClientEvent, ClientError> {
        let registration = self.reconciler.registration();
        if !registration.is_registered() {
            return Err(ClientError::NotRegistered);
        }
        let item = self
            .reconciler
            .item(item_id)
            .ok_or(ClientError::UnknownItem { item_id })?;
        let ended = self
            .countdowns
            .get(item_id)
            .is_some_and(|countdown| countdown.is_ended())
            || item.auction_end_time <= self.server_now();
        if ended {
            return Err(ClientError::AuctionEnded { item_id });
        }
        self.gate.place_bid(registration, item_id, item.current_bid)
    }
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

async fn emit(ui_tx: &mpsc::Sender<UiUpdate>, updates: Vec<UiUpdate>) {
    for update in updates {
        if ui_tx.send(update).await.is_err() {
            debug!("UI channel closed, dropping update");
            return;
        }
    }
}

/// Main event loop.
///
/// Runs until `Quit`, or until the command or channel side hangs up.
/// Every countdown and flash timer is cancelled on the way out.
pub async fn run(
    mut channel_rx: mpsc::Receiver<ChannelEvent>,
    mut snapshot_rx: oneshot::Receiver<Measurement>,
    mut timer_rx: mpsc::Receiver<TimerEvent>,
    mut cmd_rx: mpsc::Receiver<UserCommand>,
    outbound_tx: mpsc::Sender<ClientEvent>,
    ui_tx: mpsc::Sender<UiUpdate>,
    mut state: AppState,
) -> anyhow::Result<()> {
    info!("Application event loop started");

    // Once the oneshot resolves it must not be polled again.
    let mut snapshot_pending = true;

    loop {
        tokio::select! {
            measurement = &mut snapshot_rx, if snapshot_pending => {
                snapshot_pending = false;
                match measurement {
                    Ok(measurement) => {
                        let updates = state.apply_measurement(measurement);
                        emit(&ui_tx, updates).await;
                    }
                    Err(_) => warn!("Snapshot task ended without a measurement"),
                }
            }

            event = channel_rx.recv() => {
                match event {
                    Some(event) => {
                        let updates = state.handle_channel_event(event);
                        emit(&ui_tx, updates).await;
                    }
                    None => {
                        info!("Channel task ended, shutting down");
                        break;
                    }
                }
            }

            Some(event) = timer_rx.recv() => {
                let updates = state.handle_timer(event);
                emit(&ui_tx, updates).await;
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UserCommand::Quit) => {
                        info!("Quit command received, shutting down");
                        break;
                    }
                    Some(cmd) => {
                        let (event, updates) = state.handle_command(cmd);
                        if let Some(event) = event {
                            if outbound_tx.send(event).await.is_err() {
                                warn!("Outbound channel closed, event dropped");
                            }
                        }
                        emit(&ui_tx, updates).await;
                    }
                    None => {
                        info!("Command channel closed, shutting down");
                        break;
                    }
                }
            }
        }
    }

    state.countdowns.clear();
    info!("Application event loop stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

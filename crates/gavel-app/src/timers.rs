// Per-item timer arena.
//
// Owns one `ItemCountdown` per item plus the tasks that drive it: a
// repeating tick and a one-shot flash clear. Timer tasks never touch state;
// they only post `TimerEvent`s back to the app loop. Evicting an entry
// aborts its tasks, and each event carries the generation of the task that
// sent it so anything still queued from a cancelled task is dropped.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use gavel_core::countdown::ItemCountdown;
use gavel_core::model::{Item, ItemId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Tick { item_id: ItemId, generation: u64 },
    FlashCleared { item_id: ItemId, generation: u64 },
}

/// What a timer event or an item sync changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerChange {
    pub countdown_changed: bool,
    pub flash_started: bool,
    pub flash_cleared: bool,
}

struct Entry {
    countdown: ItemCountdown,
    ticker: Option<(u64, JoinHandle<()>)>,
    flash: Option<(u64, JoinHandle<()>)>,
}

impl Entry {
    fn stop_ticker(&mut self) {
        if let Some((_, handle)) = self.ticker.take() {
            handle.abort();
        }
    }

    fn stop_flash(&mut self) {
        if let Some((_, handle)) = self.flash.take() {
            handle.abort();
        }
    }
}

impl Drop for Entry {
    fn drop(&mut self) {
        self.stop_ticker();
        self.stop_flash();
    }
}

pub struct CountdownBoard {
    entries: HashMap<ItemId, Entry>,
    next_generation: u64,
    tick_interval: Duration,
    flash_duration: Duration,
    timer_tx: mpsc::Sender<TimerEvent>,
}

impl CountdownBoard {
    pub fn new(
        tick_interval: Duration,
        flash_duration: Duration,
        timer_tx: mpsc::Sender<TimerEvent>,
    ) -> Self {
        CountdownBoard {
            entries: HashMap::new(),
            next_generation: 0,
            tick_interval,
            flash_duration,
            timer_tx,
        }
    }

    pub fn get(&self, item_id: ItemId) -> Option<&ItemCountdown> {
        self.entries.get(&item_id).map(|entry| &entry.countdown)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bring the countdown for `item` in line with the item's deadline and
    /// bid, creating it (and its ticker) on first sight.
    pub fn sync_item(&mut self, item: &Item, server_now: DateTime<Utc>) -> TimerChange {
        if !self.entries.contains_key(&item.id) {
            let countdown = ItemCountdown::new(item.auction_end_time, item.current_bid, server_now);
            let mut entry = Entry {
                countdown,
                ticker: None,
                flash: None,
            };
            if !entry.countdown.is_ended() {
                let generation = self.bump_generation();
                entry.ticker = Some((generation, self.spawn_ticker(item.id, generation)));
            }
            self.entries.insert(item.id, entry);
            return TimerChange {
                countdown_changed: true,
                ..TimerChange::default()
            };
        }

        let flash_generation = self.bump_generation();
        let tx = self.timer_tx.clone();
        let flash_duration = self.flash_duration;

        let Some(entry) = self.entries.get_mut(&item.id) else {
            return TimerChange::default();
        };
        let countdown_changed = entry
            .countdown
            .set_end_time(item.auction_end_time, server_now);
        if entry.countdown.is_ended() {
            entry.stop_ticker();
        }

        let flash_started = entry.countdown.observe_bid(item.current_bid);
        if flash_started {
            entry.stop_flash();
            let handle = spawn_flash_clear(tx, item.id, flash_generation, flash_duration);
            entry.flash = Some((flash_generation, handle));
        }

        TimerChange {
            countdown_changed,
            flash_started,
            flash_cleared: false,
        }
    }

    /// Drop an item's countdown and cancel its timers.
    pub fn evict(&mut self, item_id: ItemId) -> bool {
        let removed = self.entries.remove(&item_id).is_some();
        if removed {
            debug!("Evicted countdown for item {item_id}");
        }
        removed
    }

    /// Re-derive every countdown (after the offset changed). Returns the
    /// items whose display moved.
    pub fn retick_all(&mut self, server_now: DateTime<Utc>) -> Vec<ItemId> {
        let mut changed = Vec::new();
        for (item_id, entry) in self.entries.iter_mut() {
            if entry.countdown.tick(server_now) {
                changed.push(*item_id);
            }
            if entry.countdown.is_ended() {
                entry.stop_ticker();
            }
        }
        changed
    }

    /// Apply an event from a timer task. Stale events are ignored.
    pub fn on_timer(
        &mut self,
        event: TimerEvent,
        server_now: DateTime<Utc>,
    ) -> Option<(ItemId, TimerChange)> {
        match event {
            TimerEvent::Tick { item_id, generation } => {
                let entry = self.entries.get_mut(&item_id)?;
                if entry.ticker.as_ref().map(|(g, _)| *g) != Some(generation) {
                    return None;
                }
                let countdown_changed = entry.countdown.tick(server_now);
                if entry.countdown.is_ended() {
                    debug!("Item {item_id} ended, stopping its ticker");
                    entry.stop_ticker();
                }
                Some((
                    item_id,
                    TimerChange {
                        countdown_changed,
                        ..TimerChange::default()
                    },
                ))
            }
            TimerEvent::FlashCleared { item_id, generation } => {
                let entry = self.entries.get_mut(&item_id)?;
                if entry.flash.as_ref().map(|(g, _)| *g) != Some(generation) {
                    return None;
                }
                entry.flash = None;
                entry.countdown.clear_flash();
                Some((
                    item_id,
                    TimerChange {
                        flash_cleared: true,
                        ..TimerChange::default()
                    },
                ))
            }
        }
    }

    /// Cancel everything (view torn down).
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn bump_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    fn spawn_ticker(&self, item_id: ItemId, generation: u64) -> JoinHandle<()> {
        let tx = self.timer_tx.clone();
        let period = self.tick_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if tx.send(TimerEvent::Tick { item_id, generation }).await.is_err() {
                    break;
                }
            }
        })
    }
}

fn spawn_flash_clear(
    tx: mpsc::Sender<TimerEvent>,
    item_id: ItemId,
    generation: u64,
    duration: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(duration).await;
        let _ = tx.send(TimerEvent::FlashCleared { item_id, generation }).await;
    })
}

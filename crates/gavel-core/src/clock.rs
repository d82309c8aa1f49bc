// Clock offset estimation against the server's authoritative time.
//
// One round trip per session: record local time before the snapshot
// request, read the server's time from the response, record local time
// again on receipt, and assume the one-way delay is half the round trip.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::info;

use crate::error::ClientError;
use crate::model::Item;
use crate::snapshot::SnapshotSource;

// ---------------------------------------------------------------------------
// Local clock
// ---------------------------------------------------------------------------

/// Source of local wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The operating system's wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// ---------------------------------------------------------------------------
// ClockOffset
// ---------------------------------------------------------------------------

/// Correction added to local time to approximate server time.
///
/// Countdown code must go through [`ClockOffset::server_now`]; raw local
/// time is never compared with server-issued timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClockOffset(TimeDelta);

impl ClockOffset {
    pub fn zero() -> Self {
        ClockOffset(TimeDelta::zero())
    }

    pub fn from_delta(delta: TimeDelta) -> Self {
        ClockOffset(delta)
    }

    /// `offset = server_time - t1 + (t1 - t0) / 2`.
    ///
    /// A negative round trip (local clock stepped backwards mid-request)
    /// counts as zero delay.
    pub fn from_round_trip(t0: DateTime<Utc>, server_time: DateTime<Utc>, t1: DateTime<Utc>) -> Self {
        let delay = ((t1 - t0) / 2).max(TimeDelta::zero());
        ClockOffset(server_time - t1 + delay)
    }

    pub fn as_delta(&self) -> TimeDelta {
        self.0
    }

    /// Estimated server time for the given local reading.
    ///
    /// Falls back to the local reading when the offset would carry it
    /// outside the representable date range.
    pub fn server_now(&self, local: DateTime<Utc>) -> DateTime<Utc> {
        local.checked_add_signed(self.0).unwrap_or(local)
    }
}

impl Default for ClockOffset {
    fn default() -> Self {
        ClockOffset::zero()
    }
}

// ---------------------------------------------------------------------------
// ClockSynchronizer
// ---------------------------------------------------------------------------

/// Result of the startup measurement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measurement {
    pub offset: ClockOffset,
    pub round_trip: TimeDelta,
    pub items: Vec<Item>,
}

/// Issues the snapshot request and derives the clock offset from it.
pub struct ClockSynchronizer<S> {
    source: S,
    clock: Arc<dyn Clock>,
}

impl<S: SnapshotSource> ClockSynchronizer<S> {
    pub fn new(source: S, clock: Arc<dyn Clock>) -> Self {
        Self { source, clock }
    }

    /// Perform one round-trip measurement.
    ///
    /// On failure the caller keeps running with [`ClockOffset::zero`] and an
    /// empty collection until a later attempt succeeds.
    pub async fn measure(&self) -> Result<Measurement, ClientError> {
        let t0 = self.clock.now();
        let snapshot = self.source.fetch().await?;
        let t1 = self.clock.now();

        let offset = ClockOffset::from_round_trip(t0, snapshot.server_time, t1);
        let round_trip = t1 - t0;
        info!(
            offset_ms = offset.as_delta().num_milliseconds(),
            round_trip_ms = round_trip.num_milliseconds(),
            items = snapshot.items.len(),
            "Server time offset measured"
        );

        Ok(Measurement {
            offset,
            round_trip,
            items: snapshot.items,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemId;
    use crate::snapshot::Snapshot;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn at_ms(ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap() + TimeDelta::milliseconds(ms)
    }

    /// Hands out pre-recorded readings, one per call.
    struct ScriptedClock {
        readings: Mutex<VecDeque<DateTime<Utc>>>,
    }

    impl ScriptedClock {
        fn new(readings: &[DateTime<Utc>]) -> Arc<Self> {
            Arc::new(ScriptedClock {
                readings: Mutex::new(readings.iter().copied().collect()),
            })
        }
    }

    impl Clock for ScriptedClock {
        fn now(&self) -> DateTime<Utc> {
            self.readings.lock().unwrap().pop_front().expect("clock read too often")
        }
    }

    struct FixedSource(Result<Snapshot, ClientError>);

    #[async_trait]
    impl SnapshotSource for FixedSource {
        async fn fetch(&self) -> Result<Snapshot, ClientError> {
            self.0.clone()
        }
    }

    fn lamp() -> Item {
        Item {
            id: ItemId(1),
            title: "Lamp".into(),
            current_bid: 100,
            auction_end_time: at_ms(60_000),
            last_bidder: None,
            last_bidder_name: None,
        }
    }

    #[test]
    fn offset_formula_matches_round_trip_midpoint() {
        let triples = [
            (0_i64, 5_000_i64, 200_i64),
            (1_000, 900, 1_001),
            (-3_000, 10, 4_000),
            (500, 500, 500),
            (0, -7_250, 333),
        ];
        for (t0, ts, t1) in triples {
            let offset = ClockOffset::from_round_trip(at_ms(t0), at_ms(ts), at_ms(t1));
            let expected = TimeDelta::milliseconds(ts - t1) + TimeDelta::milliseconds(t1 - t0) / 2;
            assert_eq!(offset.as_delta(), expected, "t0={t0} ts={ts} t1={t1}");

            // At completion, corrected local time lands within RTT/2 of server time.
            let error = offset.server_now(at_ms(t1)) - at_ms(ts);
            let bound = TimeDelta::milliseconds(t1 - t0) / 2;
            assert!(error >= -bound && error <= bound);
        }
    }

    #[test]
    fn odd_round_trip_keeps_sub_millisecond_precision() {
        let offset = ClockOffset::from_round_trip(at_ms(0), at_ms(1_000), at_ms(3));
        assert_eq!(offset.as_delta(), TimeDelta::microseconds(998_500));
    }

    #[test]
    fn backwards_local_clock_counts_as_zero_delay() {
        let offset = ClockOffset::from_round_trip(at_ms(100), at_ms(1_000), at_ms(40));
        assert_eq!(offset.as_delta(), TimeDelta::milliseconds(960));
    }

    #[test]
    fn server_now_adds_offset() {
        let offset = ClockOffset::from_delta(TimeDelta::milliseconds(-250));
        assert_eq!(offset.server_now(at_ms(1_000)), at_ms(750));
        assert_eq!(ClockOffset::default().server_now(at_ms(1_000)), at_ms(1_000));
    }

    #[test]
    fn out_of_range_offset_falls_back_to_local_time() {
        let offset = ClockOffset::from_round_trip(at_ms(0), DateTime::<Utc>::MAX_UTC, at_ms(0));
        assert_eq!(offset.server_now(at_ms(1_000)), at_ms(1_000));
        assert_eq!(offset.server_now(at_ms(0)), DateTime::<Utc>::MAX_UTC);

        let offset = ClockOffset::from_round_trip(at_ms(0), DateTime::<Utc>::MIN_UTC, at_ms(0));
        assert_eq!(offset.server_now(at_ms(-1_000)), at_ms(-1_000));
    }

    #[tokio::test]
    async fn measure_uses_readings_around_the_request() {
        let clock = ScriptedClock::new(&[at_ms(1_000), at_ms(1_200)]);
        let source = FixedSource(Ok(Snapshot {
            items: vec![lamp()],
            server_time: at_ms(5_000),
        }));
        let sync = ClockSynchronizer::new(source, clock);

        let measurement = sync.measure().await.unwrap();
        assert_eq!(measurement.offset.as_delta(), TimeDelta::milliseconds(3_900));
        assert_eq!(measurement.round_trip, TimeDelta::milliseconds(200));
        assert_eq!(measurement.items, vec![lamp()]);
    }

    #[tokio::test]
    async fn failed_fetch_surfaces_measurement_failure() {
        let clock = ScriptedClock::new(&[at_ms(0)]);
        let source = FixedSource(Err(ClientError::ClockMeasurementFailure {
            reason: "connection refused".into(),
        }));
        let sync = ClockSynchronizer::new(source, clock);

        match sync.measure().await {
            Err(ClientError::ClockMeasurementFailure { reason }) => {
                assert_eq!(reason, "connection refused")
            }
            other => panic!("expected ClockMeasurementFailure, got {other:?}"),
        }
    }
}

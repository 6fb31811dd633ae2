//! Deterministic block pacing.
//!
//! The consensus engine asks how long to wait before the next proposal. The
//! schedule anchors on `(initial_time, initial_height)` and targets
//! `initial_time + target * (height - initial_height)` for each height, so
//! an occasional slow block is amortized by faster subsequent ones instead of
//! permanently shifting the chain's cadence.
//!
//! A gap larger than the stall threshold (network outage, long maintenance
//! window) re-anchors the schedule at the current time rather than producing
//! a burst of zero-delay blocks to "catch up".

use causeway_types::BlockHeight;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Default target spacing between blocks.
pub const DEFAULT_TARGET_BLOCK_TIME: Duration = Duration::from_secs(2);

/// Gap beyond which the schedule is considered stalled and re-anchored.
pub const DEFAULT_MAX_STALL_GAP: Duration = Duration::from_secs(5 * 60);

/// Smallest delay this calculator ever returns.
///
/// A zero duration means "use the node-local default timeout" in the engine's
/// configuration, so zero must never leak out of this path.
pub const MIN_BLOCK_DELAY: Duration = Duration::from_micros(1);

/// Size of the serialized schedule.
pub const SCHEDULE_BYTES: usize = 24;

/// Failure decoding a persisted schedule.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("block delay schedule must be {SCHEDULE_BYTES} bytes, got {0}")]
pub struct ScheduleDecodeError(pub usize);

/// Block delay calculator and its persisted schedule.
#[derive(Debug, Clone)]
pub struct BlockDelay {
    target: Duration,
    max_stall_gap: Duration,
    initial_time: SystemTime,
    initial_height: u64,
    previous_block_time: SystemTime,
}

impl BlockDelay {
    /// Start a schedule anchored at `initial_time` / `initial_height`.
    pub fn new(initial_time: SystemTime, initial_height: BlockHeight) -> Self {
        Self::with_timing(
            initial_time,
            initial_height,
            DEFAULT_TARGET_BLOCK_TIME,
            DEFAULT_MAX_STALL_GAP,
        )
    }

    /// Start a schedule with explicit pacing constants.
    pub fn with_timing(
        initial_time: SystemTime,
        initial_height: BlockHeight,
        target: Duration,
        max_stall_gap: Duration,
    ) -> Self {
        Self {
            target,
            max_stall_gap,
            initial_time,
            initial_height: initial_height.0,
            previous_block_time: initial_time,
        }
    }

    /// The wait before proposing at `height`, observed at `now`.
    ///
    /// Mutates the schedule: `previous_block_time` advances every call, and a
    /// detected stall re-anchors the whole schedule.
    pub fn next(&mut self, now: SystemTime, height: BlockHeight) -> Duration {
        let gap = now
            .duration_since(self.previous_block_time)
            .unwrap_or_default();

        if gap > self.max_stall_gap {
            self.initial_time = now;
            self.initial_height = height.0;
            self.previous_block_time = now;
            return self.target;
        }

        self.previous_block_time = now;

        let elapsed_heights = height.0.saturating_sub(self.initial_height);
        let scheduled = self.initial_time
            + self
                .target
                .saturating_mul(elapsed_heights.try_into().unwrap_or(u32::MAX));

        match scheduled.duration_since(now) {
            Ok(remaining) if remaining > Duration::ZERO => remaining,
            _ => MIN_BLOCK_DELAY,
        }
    }

    /// Serialize as three little-endian 64-bit values:
    /// initial unix seconds, initial height, previous-block unix seconds.
    pub fn to_bytes(&self) -> [u8; SCHEDULE_BYTES] {
        let mut out = [0u8; SCHEDULE_BYTES];
        out[0..8].copy_from_slice(&unix_secs(self.initial_time).to_le_bytes());
        out[8..16].copy_from_slice(&(self.initial_height as i64).to_le_bytes());
        out[16..24].copy_from_slice(&unix_secs(self.previous_block_time).to_le_bytes());
        out
    }

    /// Restore a persisted schedule, keeping the given pacing constants.
    ///
    /// Times round-trip at one-second precision.
    pub fn from_bytes(
        bytes: &[u8],
        target: Duration,
        max_stall_gap: Duration,
    ) -> Result<Self, ScheduleDecodeError> {
        if bytes.len() != SCHEDULE_BYTES {
            return Err(ScheduleDecodeError(bytes.len()));
        }
        let field = |range: std::ops::Range<usize>| {
            i64::from_le_bytes(bytes[range].try_into().unwrap_or([0u8; 8]))
        };
        Ok(Self {
            target,
            max_stall_gap,
            initial_time: from_unix_secs(field(0..8)),
            initial_height: field(8..16).max(0) as u64,
            previous_block_time: from_unix_secs(field(16..24)),
        })
    }

    /// The configured target spacing.
    pub fn target(&self) -> Duration {
        self.target
    }

    /// Anchor time of the schedule, unix seconds.
    pub fn initial_time_unix(&self) -> i64 {
        unix_secs(self.initial_time)
    }

    /// Anchor height of the schedule.
    pub fn initial_height(&self) -> BlockHeight {
        BlockHeight(self.initial_height)
    }
}

fn unix_secs(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}

fn from_unix_secs(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor() -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    #[test]
    fn test_waits_out_the_remaining_schedule() {
        let t0 = anchor();
        let mut delay = BlockDelay::with_timing(
            t0,
            BlockHeight(1),
            Duration::from_secs(2),
            DEFAULT_MAX_STALL_GAP,
        );

        // Height 2 is scheduled at t0 + 2s; observed 1s in, 1s remains.
        assert_eq!(
            delay.next(t0 + Duration::from_secs(1), BlockHeight(2)),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_late_block_floors_at_min_delay() {
        let t0 = anchor();
        let mut delay = BlockDelay::with_timing(
            t0,
            BlockHeight(1),
            Duration::from_secs(2),
            DEFAULT_MAX_STALL_GAP,
        );

        // 5s past a 2s schedule: no wait left, but never exactly zero.
        assert_eq!(
            delay.next(t0 + Duration::from_secs(5), BlockHeight(2)),
            MIN_BLOCK_DELAY
        );
    }

    #[test]
    fn test_stall_reanchors_and_returns_target() {
        let t0 = anchor();
        let target = Duration::from_secs(2);
        let mut delay =
            BlockDelay::with_timing(t0, BlockHeight(1), target, DEFAULT_MAX_STALL_GAP);

        let resumed = t0 + Duration::from_secs(6 * 60);
        assert_eq!(delay.next(resumed, BlockHeight(9)), target);
        assert_eq!(delay.initial_time_unix(), unix_secs(resumed));
        assert_eq!(delay.initial_height(), BlockHeight(9));

        // The re-anchored schedule paces from the resume point.
        assert_eq!(
            delay.next(resumed + Duration::from_secs(1), BlockHeight(10)),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_exact_stall_gap_is_not_a_stall() {
        let t0 = anchor();
        let mut delay = BlockDelay::with_timing(
            t0,
            BlockHeight(1),
            Duration::from_secs(2),
            Duration::from_secs(300),
        );
        // Exactly at the threshold: still on schedule (strictly greater trips).
        let got = delay.next(t0 + Duration::from_secs(300), BlockHeight(2));
        assert_eq!(got, MIN_BLOCK_DELAY);
        assert_eq!(delay.initial_height(), BlockHeight(1));
    }

    #[test]
    fn test_on_time_chain_paces_steadily() {
        let t0 = anchor();
        let target = Duration::from_secs(2);
        let mut delay =
            BlockDelay::with_timing(t0, BlockHeight(1), target, DEFAULT_MAX_STALL_GAP);

        // Each height observed exactly on schedule gets the full target wait
        // to the next one.
        for h in 2u64..6 {
            let now = t0 + target * (h - 1) as u32 - target;
            let wait = delay.next(now, BlockHeight(h));
            assert_eq!(wait, target, "height {h}");
        }
    }

    #[test]
    fn test_serialization_round_trips_to_second_precision() {
        let t0 = anchor() + Duration::from_millis(750);
        let mut delay = BlockDelay::new(t0, BlockHeight(7));
        delay.next(t0 + Duration::from_secs(3), BlockHeight(8));

        let restored = BlockDelay::from_bytes(
            &delay.to_bytes(),
            delay.target(),
            DEFAULT_MAX_STALL_GAP,
        )
        .unwrap();

        assert_eq!(restored.initial_time_unix(), delay.initial_time_unix());
        assert_eq!(restored.initial_height(), delay.initial_height());
        assert_eq!(
            unix_secs(restored.previous_block_time),
            unix_secs(delay.previous_block_time)
        );
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        assert_eq!(
            BlockDelay::from_bytes(&[0u8; 23], DEFAULT_TARGET_BLOCK_TIME, DEFAULT_MAX_STALL_GAP)
                .unwrap_err(),
            ScheduleDecodeError(23)
        );
    }
}

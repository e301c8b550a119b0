use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};

/// Width of the member (node) id, stored in the high-order bits.
pub const MEMBER_BITS: u32 = 8;
/// Width of the startup timestamp field in milliseconds.
pub const TIMESTAMP_BITS: u32 = 40;
/// Width of the per-generator counter, stored in the low-order bits.
pub const COUNTER_BITS: u32 = 16;

const SUFFIX_BITS: u32 = TIMESTAMP_BITS + COUNTER_BITS;

/// Generates 64-bit saga ids laid out as
/// `[8 bits member id][40 bits startup millis][16 bits counter]`.
///
/// The timestamp and counter fields are incremented together as one 56-bit
/// suffix: a counter overflow carries into the timestamp field, so ids from
/// one generator are strictly increasing until the suffix wraps after 2^56
/// calls.
#[derive(Debug)]
pub struct IdGenerator {
    prefix: u64,
    suffix: Mutex<u64>,
}

impl IdGenerator {
    #[must_use]
    pub fn new(member_id: u8, now: DateTime<Utc>) -> Self {
        let millis = u64::try_from(now.timestamp_millis()).unwrap_or_default();
        Self {
            prefix: u64::from(member_id) << SUFFIX_BITS,
            suffix: Mutex::new(low_bits(millis, TIMESTAMP_BITS) << COUNTER_BITS),
        }
    }

    /// Returns the next id.
    pub fn next(&self) -> u64 {
        let mut suffix = self.suffix.lock().unwrap_or_else(PoisonError::into_inner);
        *suffix = low_bits(suffix.wrapping_add(1), SUFFIX_BITS);
        self.prefix | *suffix
    }

    #[must_use]
    pub fn member_id(&self) -> u8 {
        IdParts::from(self.prefix).member_id
    }
}

/// The three fields of a generated id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdParts {
    pub member_id: u8,
    pub timestamp: u64,
    pub counter: u16,
}

impl From<u64> for IdParts {
    fn from(id: u64) -> Self {
        Self {
            member_id: u8::try_from(id >> SUFFIX_BITS).unwrap_or(u8::MAX),
            timestamp: low_bits(id >> COUNTER_BITS, TIMESTAMP_BITS),
            counter: u16::try_from(low_bits(id, COUNTER_BITS)).unwrap_or(u16::MAX),
        }
    }
}

fn low_bits(value: u64, bits: u32) -> u64 {
    value & (u64::MAX >> (u64::BITS - bits))
}

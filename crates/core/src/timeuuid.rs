//! Time-ordered (version 1 layout) UUID generation.
//!
//! These ids serve double duty as unique identifiers and as the canonical
//! "processed at" clock: the embedded 100ns-tick timestamp is the only
//! processing time the kernel stores, recovered with [`instant_of`].

use std::net::UdpSocket;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, TimeZone, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

/// Milliseconds between the Gregorian reform epoch (1582-10-15T00:00:00Z),
/// from which v1 UUID timestamps count, and the Unix epoch.
const GREGORIAN_TO_UNIX_MILLIS: i64 = 12_219_292_800_000;

/// 100ns ticks per millisecond.
const TICKS_PER_MILLI: u64 = 10_000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimeUuidError {
    #[error("can only decode the timestamp of a version 1 uuid (provided version {0})")]
    NotTimeOrdered(usize),
}

/// Generates globally-unique, time-sortable version 1 UUIDs.
///
/// The 48-bit node and 14-bit clock sequence are derived once per generator
/// from a digest of local network addresses and platform properties. Each
/// call to [`next`](Self::next) produces a strictly larger embedded
/// timestamp than the one before, even under concurrency and even when the
/// wall clock stalls or steps backwards.
///
/// The generator is ordinary process state: construct one at startup and
/// share it by `Arc` with the components that assign processing ids.
#[derive(Debug)]
pub struct TimeUuidGenerator {
    clock_seq_and_node: u64,
    last_timestamp: AtomicU64,
}

impl Default for TimeUuidGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeUuidGenerator {
    pub fn new() -> Self {
        Self {
            clock_seq_and_node: make_clock_seq_and_node(),
            last_timestamp: AtomicU64::new(0),
        }
    }

    /// Produce the next time-ordered UUID.
    ///
    /// Never fails; blocks at most until the wall clock advances a
    /// millisecond when a millisecond's tick budget is exhausted.
    pub fn next(&self) -> Uuid {
        let ticks = self.next_timestamp(|| Utc::now().timestamp_millis());
        Uuid::from_u64_pair(make_msb(ticks), self.clock_seq_and_node)
    }

    /// Claim the next published tick value. The clock is re-read on every
    /// retry: when all 10,000 ticks of a millisecond have been published,
    /// the loop waits for the clock to roll over rather than spinning on a
    /// stale reading. Split out from [`next`](Self::next) so the ordering
    /// guarantee is testable with a controlled clock.
    fn next_timestamp(&self, clock: impl Fn() -> i64) -> u64 {
        loop {
            let now = ticks_from_unix_millis(clock());
            let last = self.last_timestamp.load(Ordering::SeqCst);
            if now > last {
                if self
                    .last_timestamp
                    .compare_exchange(last, now, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    return now;
                }
                continue;
            }

            let last_millis = millis_of(last);
            if millis_of(now) < last_millis {
                // Wall clock stepped backwards across a millisecond
                // boundary: keep publishing monotonically past `last`.
                return self.last_timestamp.fetch_add(1, Ordering::SeqCst) + 1;
            }

            let candidate = last + 1;
            if millis_of(candidate) == last_millis {
                if self
                    .last_timestamp
                    .compare_exchange(last, candidate, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    return candidate;
                }
                continue;
            }

            // Millisecond exhausted: loop until the clock advances.
            std::hint::spin_loop();
        }
    }
}

/// Is this id usable as a processing id?
pub fn is_time_ordered(uuid: &Uuid) -> bool {
    uuid.get_version_num() == 1
}

/// Recover the Unix milliseconds embedded in a time-ordered UUID.
pub fn unix_millis_of(uuid: &Uuid) -> Result<i64, TimeUuidError> {
    if !is_time_ordered(uuid) {
        return Err(TimeUuidError::NotTimeOrdered(uuid.get_version_num()));
    }

    let ticks = ticks_of(uuid);
    Ok((ticks / TICKS_PER_MILLI) as i64 - GREGORIAN_TO_UNIX_MILLIS)
}

/// Recover the instant embedded in a time-ordered UUID: the exact inverse
/// of the generator's tick computation, to millisecond resolution.
pub fn instant_of(uuid: &Uuid) -> Result<DateTime<Utc>, TimeUuidError> {
    let millis = unix_millis_of(uuid)?;
    Ok(Utc
        .timestamp_millis_opt(millis)
        .single()
        .unwrap_or_else(|| Utc.timestamp_millis_opt(0).unwrap()))
}

fn ticks_from_unix_millis(millis: i64) -> u64 {
    ((millis + GREGORIAN_TO_UNIX_MILLIS) as u64) * TICKS_PER_MILLI
}

fn millis_of(ticks: u64) -> u64 {
    ticks / TICKS_PER_MILLI
}

/// Scatter the 60-bit tick count into the v1 msb layout (time_low,
/// time_mid, time_hi) with the version nybble set.
fn make_msb(ticks: u64) -> u64 {
    0x1000
        | ((ticks & 0xFFFF_FFFF) << 32)
        | ((ticks & 0xFFFF_0000_0000) >> 16)
        | ((ticks & 0x0FFF_0000_0000_0000) >> 48)
}

/// Inverse of [`make_msb`].
fn ticks_of(uuid: &Uuid) -> u64 {
    let (msb, _) = uuid.as_u64_pair();
    (msb >> 32) | (((msb >> 16) & 0xFFFF) << 32) | ((msb & 0x0FFF) << 48)
}

/// Derive the 48-bit node from a digest of local addresses and platform
/// properties, then fold in 14 clock-sequence bits and the RFC 4122
/// variant.
fn make_clock_seq_and_node() -> u64 {
    let digest = identity_digest();

    let mut node = 0x0000_0100_0000_0000u64;
    for (i, byte) in digest.iter().take(6).enumerate() {
        node |= (*byte as u64) << (i * 8);
    }

    let mut seed = [0u8; 8];
    seed.copy_from_slice(&digest[6..14]);
    let clock_seq =
        u64::from_le_bytes(seed) ^ Utc::now().timestamp_nanos_opt().unwrap_or(0) as u64;

    node | ((clock_seq & 0x3FFF) << 48) | 0x8000_0000_0000_0000
}

fn identity_digest() -> [u8; 32] {
    let mut hasher = Sha256::new();

    for address in local_addresses() {
        hasher.update(address.as_bytes());
    }
    for property in [
        std::env::consts::OS,
        std::env::consts::ARCH,
        std::env::consts::FAMILY,
    ] {
        hasher.update(property.as_bytes());
    }
    hasher.update(std::process::id().to_le_bytes());

    hasher.finalize().into()
}

/// Best-effort enumeration of local addresses; binding a UDP socket sends
/// no traffic.
fn local_addresses() -> Vec<String> {
    let mut addresses = Vec::new();

    if let Ok(hostname) = std::env::var("HOSTNAME") {
        addresses.push(hostname);
    }
    if let Ok(socket) = UdpSocket::bind(("0.0.0.0", 0)) {
        if let Ok(local) = socket.local_addr() {
            addresses.push(local.to_string());
        }
    }

    addresses
}

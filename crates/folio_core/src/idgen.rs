//! Short, collision-resistant content keys and time-ordered version tokens.
//!
//! Keys pack `[elapsed:41][sequence:24][random:32]` and versions pack
//! `[elapsed:41][sequence:14]`, where `elapsed` is milliseconds since the
//! generator's base time. Both are rendered in lowercase base 36. Issuance
//! order is preserved by the packed integer, not by the string form.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;

use crate::time::{Clock, SystemClock};
use crate::{FolioError, FolioResult};

type HmacSha1 = Hmac<Sha1>;

/// 2019-06-01T00:00:00Z.
pub const DEFAULT_BASE_TIME_MS: i64 = 1_559_347_200_000;

const TIME_BITS: u32 = 41;
const TIME_MAX: i64 = (1 << TIME_BITS) - 1;

const SEQUENCE_BITS: u32 = 24;
const SEQUENCE_MAX: u64 = (1 << SEQUENCE_BITS) - 1;

const MINOR_SEQUENCE_BITS: u32 = 14;
const MINOR_SEQUENCE_MAX: u64 = (1 << MINOR_SEQUENCE_BITS) - 1;

const RANDOM_BITS: u32 = 32;
const SEED_LEN: usize = 20;

const BACKOFF: Duration = Duration::from_millis(2);
const VERSION_RETRIES: u32 = 10;

#[derive(Debug, Default)]
struct SequenceState {
    elapsed: i64,
    counter: u64,
}

pub struct IdGenerator {
    base_time: i64,
    clock: Arc<dyn Clock>,
    id_sequence: Mutex<SequenceState>,
    version_sequence: Mutex<SequenceState>,
    nonce: AtomicU64,
    seed: [u8; SEED_LEN],
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IdParts {
    pub elapsed: i64,
    pub sequence: u64,
    pub random: u32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct VersionParts {
    pub elapsed: i64,
    pub sequence: u64,
}

impl IdGenerator {
    pub fn new() -> FolioResult<Self> {
        Self::with_base_time(DEFAULT_BASE_TIME_MS)
    }

    pub fn with_base_time(base_time_ms: i64) -> FolioResult<Self> {
        Self::with_clock(base_time_ms, Arc::new(SystemClock))
    }

    pub fn with_clock(base_time_ms: i64, clock: Arc<dyn Clock>) -> FolioResult<Self> {
        let now = clock.now_millis();
        if base_time_ms < 0 || base_time_ms > now {
            return Err(FolioError::configuration(
                "base time must be between the epoch and now",
            ));
        }
        let elapsed = now - base_time_ms;
        if elapsed > TIME_MAX {
            return Err(FolioError::configuration(
                "base time is too far in the past for a 41-bit clock",
            ));
        }
        let mut seed = [0u8; SEED_LEN];
        rand::thread_rng().fill_bytes(&mut seed);
        Ok(Self {
            base_time: base_time_ms,
            clock,
            id_sequence: Mutex::new(SequenceState {
                elapsed,
                counter: 0,
            }),
            version_sequence: Mutex::new(SequenceState {
                elapsed,
                counter: 0,
            }),
            nonce: AtomicU64::new(0),
            seed,
        })
    }

    pub fn base_time(&self) -> i64 {
        self.base_time
    }

    /// Issues a content key, typically 15-18 base-36 characters.
    pub fn next_id(&self) -> FolioResult<String> {
        let (mut elapsed, mut sequence) = next_sequence(&self.id_sequence, self.elapsed()?);
        if sequence > SEQUENCE_MAX {
            thread::sleep(BACKOFF);
            (elapsed, sequence) = next_sequence(&self.id_sequence, self.elapsed()?);
            if sequence > SEQUENCE_MAX {
                return Err(FolioError::capacity("id sequence exhausted"));
            }
        }
        let random = self.next_random()?;
        let packed = ((elapsed as u128) << (SEQUENCE_BITS + RANDOM_BITS))
            | ((sequence as u128) << RANDOM_BITS)
            | random as u128;
        Ok(encode_base36(packed))
    }

    /// Issues a version token, typically 8-10 base-36 characters.
    pub fn next_version(&self) -> FolioResult<String> {
        let (mut elapsed, mut sequence) =
            next_sequence(&self.version_sequence, self.elapsed()?);
        let mut retries = VERSION_RETRIES;
        while sequence > MINOR_SEQUENCE_MAX {
            if retries == 0 {
                return Err(FolioError::capacity("version sequence exhausted"));
            }
            retries -= 1;
            thread::sleep(BACKOFF);
            (elapsed, sequence) = next_sequence(&self.version_sequence, self.elapsed()?);
        }
        let packed = ((elapsed as u128) << MINOR_SEQUENCE_BITS) | sequence as u128;
        Ok(encode_base36(packed))
    }

    fn elapsed(&self) -> FolioResult<i64> {
        let elapsed = self.clock.now_millis() - self.base_time;
        if elapsed < 0 {
            return Err(FolioError::configuration("clock is behind the base time"));
        }
        if elapsed > TIME_MAX {
            return Err(FolioError::configuration("exceeded the 41-bit time limit"));
        }
        Ok(elapsed)
    }

    fn next_random(&self) -> FolioResult<u32> {
        let nonce = self.nonce.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        let mut mac = HmacSha1::new_from_slice(&self.seed)
            .map_err(|err| FolioError::configuration(format!("hmac key: {err}")))?;
        mac.update(&nonce.to_be_bytes());
        mac.update(&self.seed);
        let digest = mac.finalize().into_bytes();
        let tail = &digest[digest.len() - 4..];
        Ok(u32::from_be_bytes([tail[0], tail[1], tail[2], tail[3]]))
    }
}

/// Returns the millisecond to pack with and its sequence number. A clock
/// that steps backwards keeps counting in the newest millisecond seen.
fn next_sequence(state: &Mutex<SequenceState>, elapsed: i64) -> (i64, u64) {
    let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
    if elapsed > state.elapsed {
        state.elapsed = elapsed;
        state.counter = 0;
    }
    let sequence = state.counter;
    state.counter += 1;
    (state.elapsed, sequence)
}

pub fn decode_id(value: &str) -> FolioResult<IdParts> {
    let packed = decode_base36(value)
        .ok_or_else(|| FolioError::invalid(format!("invalid id '{value}'")))?;
    Ok(IdParts {
        elapsed: (packed >> (SEQUENCE_BITS + RANDOM_BITS)) as i64,
        sequence: ((packed >> RANDOM_BITS) as u64) & SEQUENCE_MAX,
        random: packed as u32,
    })
}

pub fn decode_version(value: &str) -> FolioResult<VersionParts> {
    let packed = decode_base36(value)
        .ok_or_else(|| FolioError::invalid(format!("invalid version '{value}'")))?;
    Ok(VersionParts {
        elapsed: (packed >> MINOR_SEQUENCE_BITS) as i64,
        sequence: (packed as u64) & MINOR_SEQUENCE_MAX,
    })
}

const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

pub fn encode_base36(mut value: u128) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::with_capacity(26);
    while value > 0 {
        buf.push(BASE36_DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).unwrap_or_default()
}

pub fn decode_base36(value: &str) -> Option<u128> {
    if value.is_empty() {
        return None;
    }
    let mut acc: u128 = 0;
    for ch in value.chars() {
        let digit = ch.to_digit(36)? as u128;
        acc = acc.checked_mul(36)?.checked_add(digit)?;
    }
    Some(acc)
}

//! Deterministic identifiers.
//!
//! An [`Identifier`] packs a millisecond instant and a per-instant sequence
//! number into 12 bytes. The byte layout is fixed:
//!
//! | bytes   | content                                      |
//! |---------|----------------------------------------------|
//! | 0..4    | instant bytes 7, 6, 5, 4 (low 32 bits, LSB first) |
//! | 4, 5    | instant bytes 1, 0 (the two most significant) |
//! | 6..10   | sequence, big-endian                         |
//! | 10, 11  | instant bytes 3, 2                           |
//!
//! where "instant byte n" is byte `n` of the big-endian encoding of the
//! instant. The layout is a bijection; it does not make the hex form sort by
//! time.

use crate::error::{CoreError, CoreResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Length of an identifier in bytes.
pub const IDENTIFIER_LEN: usize = 12;

/// Length of the hexadecimal form of an identifier.
pub const IDENTIFIER_HEX_LEN: usize = IDENTIFIER_LEN * 2;

/// A 12-byte identifier produced by an [`IdentifierGenerator`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Identifier([u8; IDENTIFIER_LEN]);

/// The components of an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedIdentifier {
    /// Milliseconds since the Unix epoch.
    pub instant_millis: i64,
    /// Sequence number within the instant.
    pub sequence: i32,
}

impl Identifier {
    /// Encodes an instant and a sequence number.
    #[must_use]
    pub fn encode(instant_millis: i64, sequence: i32) -> Self {
        let t = instant_millis.to_be_bytes();
        let s = sequence.to_be_bytes();
        Self([
            t[7], t[6], t[5], t[4], t[1], t[0], s[0], s[1], s[2], s[3], t[3], t[2],
        ])
    }

    /// Recovers the instant and sequence number.
    #[must_use]
    pub fn decode(&self) -> DecodedIdentifier {
        let b = &self.0;
        let instant = [b[5], b[4], b[11], b[10], b[3], b[2], b[1], b[0]];
        DecodedIdentifier {
            instant_millis: i64::from_be_bytes(instant),
            sequence: i32::from_be_bytes([b[6], b[7], b[8], b[9]]),
        }
    }

    /// Creates an identifier from raw bytes.
    #[inline]
    #[must_use]
    pub const fn from_bytes(bytes: [u8; IDENTIFIER_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; IDENTIFIER_LEN] {
        &self.0
    }

    /// Creates an identifier from a slice.
    ///
    /// Returns `None` if the slice is not exactly 12 bytes.
    #[must_use]
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        <[u8; IDENTIFIER_LEN]>::try_from(slice).ok().map(Self)
    }

    /// Parses the 24-character hexadecimal form, in either case.
    pub fn parse_hex(s: &str) -> CoreResult<Self> {
        if s.len() != IDENTIFIER_HEX_LEN {
            return Err(CoreError::invalid_identifier(format!(
                "expected {IDENTIFIER_HEX_LEN} hex characters, got {}",
                s.len()
            )));
        }
        let mut bytes = [0u8; IDENTIFIER_LEN];
        for (i, pair) in s.as_bytes().chunks_exact(2).enumerate() {
            let hi = hex_digit(pair[0])?;
            let lo = hex_digit(pair[1])?;
            bytes[i] = (hi << 4) | lo;
        }
        Ok(Self(bytes))
    }

    /// Renders the uppercase hexadecimal form.
    #[must_use]
    pub fn to_upper_hex(&self) -> String {
        format!("{self:X}")
    }
}

fn hex_digit(c: u8) -> CoreResult<u8> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(CoreError::invalid_identifier(format!(
            "invalid hex character {:?}",
            char::from(c)
        ))),
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({self:x})")
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(self, f)
    }
}

impl fmt::LowerHex for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::UpperHex for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02X}")?;
        }
        Ok(())
    }
}

impl FromStr for Identifier {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_hex(s)
    }
}

impl From<[u8; IDENTIFIER_LEN]> for Identifier {
    fn from(bytes: [u8; IDENTIFIER_LEN]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<Identifier> for [u8; IDENTIFIER_LEN] {
    fn from(id: Identifier) -> Self {
        id.0
    }
}

/// Persistable state of an [`IdentifierGenerator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GeneratorState {
    /// Last instant an identifier was produced for.
    pub previous_instant: i64,
    /// Last sequence number used at `previous_instant`.
    pub previous_sequence: i32,
}

/// Produces collision-free identifiers from non-decreasing instants.
///
/// Each call is a single critical section over the previous instant and
/// sequence.
#[derive(Debug, Default)]
pub struct IdentifierGenerator {
    state: Mutex<GeneratorState>,
}

impl IdentifierGenerator {
    /// Creates a generator starting at the epoch with sequence 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a generator from persisted state.
    #[must_use]
    pub fn from_state(state: GeneratorState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Returns a copy of the current state.
    pub fn state(&self) -> GeneratorState {
        *self.state.lock()
    }

    /// Produces the next identifier for `instant`.
    pub fn next_identity(&self, instant: SystemTime) -> CoreResult<Identifier> {
        self.next_identity_at(system_time_millis(instant))
    }

    /// Produces the next identifier for the current system time.
    pub fn next_identity_now(&self) -> CoreResult<Identifier> {
        self.next_identity(SystemTime::now())
    }

    /// Produces the next identifier for an instant in milliseconds since the
    /// Unix epoch.
    ///
    /// Instants must not decrease across calls. Repeating an instant bumps
    /// the sequence; a later instant restarts it at 1.
    pub fn next_identity_at(&self, instant_millis: i64) -> CoreResult<Identifier> {
        let mut state = self.state.lock();
        let sequence = match instant_millis.cmp(&state.previous_instant) {
            std::cmp::Ordering::Equal => {
                if state.previous_sequence == i32::MAX {
                    return Err(CoreError::SequenceExhausted { instant_millis });
                }
                state.previous_sequence + 1
            }
            std::cmp::Ordering::Greater => 1,
            std::cmp::Ordering::Less => {
                return Err(CoreError::NonMonotonicInstant {
                    previous_millis: state.previous_instant,
                    requested_millis: instant_millis,
                });
            }
        };
        state.previous_instant = instant_millis;
        state.previous_sequence = sequence;
        Ok(Identifier::encode(instant_millis, sequence))
    }
}

/// Milliseconds between the Unix epoch and `instant`, negative before it.
#[must_use]
pub fn system_time_millis(instant: SystemTime) -> i64 {
    match instant.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_millis()).unwrap_or(i64::MAX),
        Err(before) => i64::try_from(before.duration().as_millis())
            .map(|ms| -ms)
            .unwrap_or(i64::MIN),
    }
}

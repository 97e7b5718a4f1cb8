// rorchestrator-gate/src/hashing.rs
// ============================================================================
// Module: Gate Bucket Hashing
// Description: FNV-1a-64 over UTF-16 code units and rollout bucketing.
// Purpose: Provide platform-stable hashing shared by rollout gates and plans.
// Dependencies: none
// ============================================================================

//! ## Overview
//! Rollout bucketing and plan hashing both require a hash that is identical
//! on every platform and deployment. This module implements FNV-1a-64 fed
//! with UTF-16 code units in little-endian byte order (low byte, then high
//! byte), which fixes the byte stream independent of host endianness.

// ============================================================================
// SECTION: Constants
// ============================================================================

/// FNV-1a 64-bit offset basis.
const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

/// FNV-1a 64-bit prime.
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Number of rollout buckets.
const BUCKET_COUNT: u64 = 100;

// ============================================================================
// SECTION: Hasher
// ============================================================================

/// Incremental FNV-1a-64 hasher with UTF-16 string support.
///
/// # Invariants
/// - Byte order is fixed little-endian regardless of host endianness.
#[derive(Debug, Clone, Copy)]
pub struct Fnv64 {
    /// Current hash state.
    state: u64,
}

impl Default for Fnv64 {
    fn default() -> Self {
        Self::new()
    }
}

impl Fnv64 {
    /// Creates a hasher seeded with the FNV-1a offset basis.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: FNV_OFFSET_BASIS,
        }
    }

    /// Feeds a single byte.
    pub const fn write_u8(&mut self, byte: u8) {
        self.state ^= byte as u64;
        self.state = self.state.wrapping_mul(FNV_PRIME);
    }

    /// Feeds a 16-bit value as two bytes, low byte first.
    pub const fn write_u16_le(&mut self, value: u16) {
        let [low, high] = value.to_le_bytes();
        self.write_u8(low);
        self.write_u8(high);
    }

    /// Feeds a 32-bit value as four bytes, least significant first.
    pub const fn write_u32_le(&mut self, value: u32) {
        let bytes = value.to_le_bytes();
        self.write_u8(bytes[0]);
        self.write_u8(bytes[1]);
        self.write_u8(bytes[2]);
        self.write_u8(bytes[3]);
    }

    /// Feeds a 64-bit value as eight bytes, least significant first.
    pub const fn write_u64_le(&mut self, value: u64) {
        let bytes = value.to_le_bytes();
        let mut index = 0;
        while index < bytes.len() {
            self.write_u8(bytes[index]);
            index += 1;
        }
    }

    /// Feeds a string as raw UTF-16 code units without a length prefix.
    pub fn write_str_utf16(&mut self, value: &str) {
        for unit in value.encode_utf16() {
            self.write_u16_le(unit);
        }
    }

    /// Feeds a string prefixed with its UTF-16 code-unit count.
    ///
    /// The count is written as a little-endian `u32`. Counts beyond `u32`
    /// range saturate, which keeps the encoding total even for pathological
    /// inputs.
    pub fn write_str_len_prefixed(&mut self, value: &str) {
        let count = value.encode_utf16().count();
        let prefix = u32::try_from(count).unwrap_or(u32::MAX);
        self.write_u32_le(prefix);
        self.write_str_utf16(value);
    }

    /// Returns the accumulated hash.
    #[must_use]
    pub const fn finish(self) -> u64 {
        self.state
    }
}

// ============================================================================
// SECTION: Rollout Bucketing
// ============================================================================

/// Computes the rollout bucket for a user and salt, in `0..100`.
///
/// The bucket hashes `user_id`, a zero code unit, then `salt`, each UTF-16
/// code unit contributing its low byte then its high byte, and reduces the
/// result modulo 100. A rollout gate at `percent` allows buckets strictly
/// below `percent`, so raising `percent` never revokes an allowance.
#[must_use]
pub fn rollout_bucket(user_id: &str, salt: &str) -> u64 {
    let mut hasher = Fnv64::new();
    hasher.write_str_utf16(user_id);
    hasher.write_u16_le(0);
    hasher.write_str_utf16(salt);
    hasher.finish() % BUCKET_COUNT
}

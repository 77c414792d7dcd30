//! Bidirectional name interning, persisted in the MainDb.
//!
//! Kinds and edge roles intern to 16-bit codes, attribute names to
//! 32-bit codes. Codes are dense, allocated from 1 upwards (0 is
//! reserved for "unknown") and returned as little-endian bytes, which
//! is exactly how they appear inside tree entry keys. Both directions
//! of each mapping are kept as individual MainDb entries under the
//! `\x01` prefix; writes become durable with the surrounding flush.

use std::sync::Arc;

use crate::storage::MainDb;

const FWD16_PREFIX: &str = "\u{1}f16:";
const REV16_PREFIX: &str = "\u{1}r16:";
const FWD32_PREFIX: &str = "\u{1}f32:";
const REV32_PREFIX: &str = "\u{1}r32:";
const COUNTER16_KEY: &str = "\u{1}cnt16";
const COUNTER32_KEY: &str = "\u{1}cnt32";

/// Interns kind/role and attribute names to fixed-width codes.
#[derive(Clone)]
pub struct NamesManager {
    main: Arc<MainDb>,
}

impl NamesManager {
    /// Creates a names manager over the given MainDb.
    #[must_use]
    pub fn new(main: Arc<MainDb>) -> Self {
        Self { main }
    }

    /// Returns the 16-bit code of a kind or role name.
    ///
    /// With `create` set, an unknown name is assigned the next code;
    /// otherwise `None` is returned for unknown names.
    #[must_use]
    pub fn encode16(&self, name: &str, create: bool) -> Option<[u8; 2]> {
        let forward_key = format!("{FWD16_PREFIX}{name}");
        if let Some(data) = self.main.get(&forward_key) {
            return data.try_into().ok();
        }
        if !create {
            return None;
        }
        let next = self.main.get_counter(COUNTER16_KEY) + 1;
        self.main.set_counter(COUNTER16_KEY, next);
        #[allow(clippy::cast_possible_truncation)]
        let code = (next as u16).to_le_bytes();
        self.main.put(&forward_key, code.to_vec());
        self.main
            .put(&format!("{REV16_PREFIX}{next}"), name.as_bytes().to_vec());
        Some(code)
    }

    /// Returns the name behind a 16-bit code, if known.
    #[must_use]
    pub fn decode16(&self, code: [u8; 2]) -> Option<String> {
        let number = u16::from_le_bytes(code);
        self.main
            .get(&format!("{REV16_PREFIX}{number}"))
            .map(|data| String::from_utf8_lossy(&data).into_owned())
    }

    /// Returns the 32-bit code of an attribute name.
    ///
    /// With `create` set, an unknown name is assigned the next code;
    /// otherwise `None` is returned for unknown names.
    #[must_use]
    pub fn encode32(&self, name: &str, create: bool) -> Option<[u8; 4]> {
        let forward_key = format!("{FWD32_PREFIX}{name}");
        if let Some(data) = self.main.get(&forward_key) {
            return data.try_into().ok();
        }
        if !create {
            return None;
        }
        let next = self.main.get_counter(COUNTER32_KEY) + 1;
        self.main.set_counter(COUNTER32_KEY, next);
        #[allow(clippy::cast_possible_truncation)]
        let code = (next as u32).to_le_bytes();
        self.main.put(&forward_key, code.to_vec());
        self.main
            .put(&format!("{REV32_PREFIX}{next}"), name.as_bytes().to_vec());
        Some(code)
    }

    /// Returns the name behind a 32-bit code, if known.
    #[must_use]
    pub fn decode32(&self, code: [u8; 4]) -> Option<String> {
        let number = u32::from_le_bytes(code);
        self.main
            .get(&format!("{REV32_PREFIX}{number}"))
            .map(|data| String::from_utf8_lossy(&data).into_owned())
    }
}

//! Canonical packing
//!
//! Signatures are always taken over a deterministic binary encoding of the
//! semantic fields of a value, never over JSON, so that the same bytes can be
//! rebuilt by a settlement contract during a dispute.
//!
//! Encoding rules (ABI-style, 32-byte words):
//! - every packed value starts with a domain tag word,
//!   `keccak("clearnode:<kind>:v1")`
//! - addresses are left-padded to 32 bytes
//! - unsigned integers and booleans are big-endian words
//! - strings and opaque bytes are replaced by their Keccak-256 digest
//! - amounts are scaled to [`AMOUNT_SCALE`] decimals and encoded as signed
//!   256-bit two's complement words
//! - lists are a length word followed by their items

mod ids;
mod pack;

pub use ids::*;
pub use pack::*;

use crate::error::{CoreError, CoreResult};
use crate::types::{Address, Ledger, H256};
use rust_decimal::Decimal;
use sha3::{Digest as _, Keccak256};

/// Fixed decimal scale of packed amounts
pub const AMOUNT_SCALE: u32 = 18;

/// Keccak-256 digest
pub fn keccak256(data: &[u8]) -> H256 {
    let out = Keccak256::digest(data);
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&out);
    H256(hash)
}

/// Domain tag for a packed value kind
pub fn domain_tag(kind: &str) -> H256 {
    keccak256(format!("clearnode:{kind}:v1").as_bytes())
}

/// Word-oriented encoder
#[derive(Debug, Clone)]
pub struct Packer {
    buf: Vec<u8>,
}

impl Packer {
    /// Start a packed value of the given kind
    pub fn new(kind: &str) -> Self {
        let mut packer = Self {
            buf: Vec::with_capacity(32 * 16),
        };
        packer.h256(&domain_tag(kind));
        packer
    }

    pub fn word(&mut self, word: [u8; 32]) -> &mut Self {
        self.buf.extend_from_slice(&word);
        self
    }

    pub fn h256(&mut self, value: &H256) -> &mut Self {
        self.word(value.0)
    }

    pub fn address(&mut self, value: &Address) -> &mut Self {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&value.0);
        self.word(word)
    }

    pub fn uint(&mut self, value: u64) -> &mut Self {
        let mut word = [0u8; 32];
        word[24..].copy_from_slice(&value.to_be_bytes());
        self.word(word)
    }

    pub fn boolean(&mut self, value: bool) -> &mut Self {
        self.uint(u64::from(value))
    }

    pub fn string(&mut self, value: &str) -> &mut Self {
        self.h256(&keccak256(value.as_bytes()))
    }

    pub fn optional_h256(&mut self, value: Option<&H256>) -> &mut Self {
        self.h256(value.unwrap_or(&H256::ZERO))
    }

    pub fn amount(&mut self, value: &Decimal) -> CoreResult<&mut Self> {
        let word = amount_word(value)?;
        Ok(self.word(word))
    }

    pub fn ledger(&mut self, ledger: &Ledger) -> CoreResult<&mut Self> {
        self.address(&ledger.token_address)
            .uint(ledger.blockchain_id)
            .amount(&ledger.user_balance)?
            .amount(&ledger.user_net_flow)?
            .amount(&ledger.node_balance)?
            .amount(&ledger.node_net_flow)
    }

    /// Packed bytes
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    /// Keccak-256 of the packed bytes
    pub fn digest(self) -> H256 {
        keccak256(&self.buf)
    }
}

/// Encode an amount as a signed 256-bit word at [`AMOUNT_SCALE`] decimals
pub fn amount_word(value: &Decimal) -> CoreResult<[u8; 32]> {
    let normalized = value.normalize();
    let scale = normalized.scale();
    if scale > AMOUNT_SCALE {
        return Err(CoreError::AmountOutOfRange {
            amount: value.to_string(),
            reason: format!("more than {AMOUNT_SCALE} fractional digits"),
        });
    }
    let factor = 10i128.pow(AMOUNT_SCALE - scale);
    let scaled = normalized
        .mantissa()
        .checked_mul(factor)
        .ok_or_else(|| CoreError::AmountOutOfRange {
            amount: value.to_string(),
            reason: "scaled value overflows 128 bits".to_string(),
        })?;

    let fill = if scaled < 0 { 0xff } else { 0x00 };
    let mut word = [fill; 32];
    word[16..].copy_from_slice(&scaled.to_be_bytes());
    Ok(word)
}

//! Account addresses: a 32-byte public key rendered as 58 characters of
//! unpadded base32 with a 4-byte SHA-512/256 checksum suffix.

use std::fmt;

use sha2::{Digest, Sha512_256};

use crate::errors::{ClientError, Result};

/// RFC 4648 base32 alphabet, no padding.
const ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

const PUBLIC_KEY_LEN: usize = 32;
const CHECKSUM_LEN: usize = 4;

/// Rendered length of an address: 36 bytes spread over 5-bit groups.
pub const ADDRESS_LEN: usize = 58;

/// Domain separator mixed into the escrow account derivation.
const ESCROW_PREFIX: &[u8] = b"appID";

/// A validated 32-byte account public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(pub [u8; PUBLIC_KEY_LEN]);

impl Address {
    /// Parses a rendered address, verifying length and checksum.
    pub fn parse(text: &str) -> Result<Self> {
        if text.len() != ADDRESS_LEN {
            return Err(ClientError::InvalidAddress(format!(
                "expected {ADDRESS_LEN} characters, got {}",
                text.len()
            )));
        }
        let raw = base32_decode(text)?;
        let (public_key, checksum) = raw.split_at(PUBLIC_KEY_LEN);
        let digest = Sha512_256::digest(public_key);
        if digest[PUBLIC_KEY_LEN - CHECKSUM_LEN..] != *checksum {
            return Err(ClientError::InvalidAddress("checksum mismatch".to_string()));
        }
        let mut key = [0u8; PUBLIC_KEY_LEN];
        key.copy_from_slice(public_key);
        Ok(Address(key))
    }

    /// The escrow account owned by an application, derived from its id.
    /// Payments to a contract are sent here, never to the app creator.
    pub fn escrow(app_id: u64) -> Self {
        let mut hasher = Sha512_256::new();
        hasher.update(ESCROW_PREFIX);
        hasher.update(app_id.to_be_bytes());
        let digest = hasher.finalize();
        let mut key = [0u8; PUBLIC_KEY_LEN];
        key.copy_from_slice(&digest);
        Address(key)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut raw = [0u8; PUBLIC_KEY_LEN + CHECKSUM_LEN];
        raw[..PUBLIC_KEY_LEN].copy_from_slice(&self.0);
        let digest = Sha512_256::digest(self.0);
        raw[PUBLIC_KEY_LEN..].copy_from_slice(&digest[PUBLIC_KEY_LEN - CHECKSUM_LEN..]);
        f.write_str(&base32_encode(&raw))
    }
}

/// Encodes bytes as unpadded base32. A trailing group shorter than five
/// bits is left-aligned and zero-filled.
pub(crate) fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() * 8 + 4) / 5);
    let mut buffer: u32 = 0;
    let mut bits = 0u32;
    for &byte in data {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

fn base32_decode(text: &str) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0u32;
    for c in text.bytes() {
        let value = match c {
            b'A'..=b'Z' => c - b'A',
            b'2'..=b'7' => c - b'2' + 26,
            _ => {
                return Err(ClientError::InvalidAddress(format!(
                    "character {:?} is not base32",
                    c as char
                )))
            }
        };
        buffer = (buffer << 5) | u32::from(value);
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push(((buffer >> bits) & 0xff) as u8);
        }
    }
    Ok(out)
}

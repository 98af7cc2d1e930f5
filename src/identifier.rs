//! Identifiers, XOR distances, and peer records.
//!
//! An [`Identifier`] is a fixed-width unsigned integer in `[0, 2^m)` for a
//! width `m` of at most 256 bits. It is stored big-endian and right-aligned
//! in a 32-byte array, so XOR distance is a byte-wise XOR and numeric
//! comparison is a lexicographic byte comparison. No bigint library is
//! involved; every operation is a short scan over the limbs.

use std::fmt;

use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Widest supported identifier, bounded by the SHA-256 derivation path.
pub const MAX_BITS: u16 = 256;

/// Number of bytes of entropy hashed into a fresh identifier.
const ENTROPY_BYTES: usize = 64;

fn bit_length_of(bytes: &[u8; 32]) -> usize {
    for (i, byte) in bytes.iter().enumerate() {
        if *byte != 0 {
            return (32 - i) * 8 - byte.leading_zeros() as usize;
        }
    }
    0
}

/// A fixed-width Kademlia identifier.
///
/// Equality covers both the numeric value and the width tag: the 4-bit
/// identifier `0b0101` and the 8-bit identifier `0b00000101` are distinct.
/// Identifiers are immutable and cheap to copy.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identifier {
    bytes: [u8; 32],
    bits: u16,
}

impl Identifier {
    /// Draw a fresh identifier uniformly from `[0, 2^bits)`.
    ///
    /// 512 random bits are hashed with SHA-256 and the digest is truncated
    /// to `bits` bits, zeroing the excess high bits of the leading byte.
    /// The hash indirection is behaviorally neutral for uniformity; it is
    /// what caps identifier widths at the 256-bit digest size.
    pub fn random(bits: u16, rng: &mut impl RngCore) -> Result<Self> {
        Self::check_width(bits)?;

        let mut entropy = [0u8; ENTROPY_BYTES];
        rng.fill_bytes(&mut entropy);
        let digest = Sha256::digest(entropy);

        let nbytes = usize::from(bits).div_ceil(8);
        let mut bytes = [0u8; 32];
        bytes[32 - nbytes..].copy_from_slice(&digest[..nbytes]);

        let excess = (nbytes * 8 - usize::from(bits)) as u32;
        bytes[32 - nbytes] &= 0xffu8.wrapping_shr(excess);

        Ok(Self { bytes, bits })
    }

    /// Build an identifier from a right-aligned big-endian byte value.
    pub fn from_bytes(bits: u16, bytes: [u8; 32]) -> Result<Self> {
        Self::check_width(bits)?;
        if bit_length_of(&bytes) > usize::from(bits) {
            return Err(Error::invalid(format!(
                "identifier value does not fit in {bits} bits"
            )));
        }
        Ok(Self { bytes, bits })
    }

    /// Parse a minimal-length hex string as produced by [`Identifier::to_hex`].
    pub fn from_hex(bits: u16, hex_str: &str) -> Result<Self> {
        if hex_str.is_empty() {
            return Err(Error::invalid("empty hex identifier"));
        }
        let padded = if hex_str.len() % 2 == 1 {
            format!("0{hex_str}")
        } else {
            hex_str.to_owned()
        };
        let raw = hex::decode(&padded)
            .map_err(|err| Error::invalid(format!("malformed hex identifier: {err}")))?;
        if raw.len() > 32 {
            return Err(Error::invalid("hex identifier longer than 256 bits"));
        }
        let mut bytes = [0u8; 32];
        bytes[32 - raw.len()..].copy_from_slice(&raw);
        Self::from_bytes(bits, bytes)
    }

    fn check_width(bits: u16) -> Result<()> {
        if bits == 0 {
            return Err(Error::invalid("identifier width must be at least 1 bit"));
        }
        if bits > MAX_BITS {
            return Err(Error::invalid(format!(
                "identifier width must not exceed {MAX_BITS} bits"
            )));
        }
        Ok(())
    }

    /// Width of this identifier in bits.
    pub fn bits(&self) -> u16 {
        self.bits
    }

    /// XOR distance to another identifier of the same width.
    pub fn distance(&self, other: &Identifier) -> Distance {
        debug_assert_eq!(self.bits, other.bits, "identifier widths must match");
        let mut out = [0u8; 32];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.bytes[i] ^ other.bytes[i];
        }
        Distance(out)
    }

    /// Draw an identifier whose distance from `self` has its highest set bit
    /// at position `bucket`, i.e. one that lands in bucket `bucket` of a
    /// routing table owned by `self`.
    ///
    /// Implemented as `self XOR r` where `r` is a uniform `(bucket + 1)`-bit
    /// value with bit `bucket` forced to 1.
    pub fn random_in_bucket(&self, bucket: usize, rng: &mut impl RngCore) -> Result<Self> {
        if bucket >= usize::from(self.bits) {
            return Err(Error::invalid(format!(
                "bucket index {bucket} out of range for a {}-bit identifier",
                self.bits
            )));
        }

        let width = bucket + 1;
        let nbytes = width.div_ceil(8);
        let mut flip = [0u8; 32];
        rng.fill_bytes(&mut flip[32 - nbytes..]);
        let excess = (nbytes * 8 - width) as u32;
        flip[32 - nbytes] &= 0xffu8.wrapping_shr(excess);
        flip[31 - bucket / 8] |= 1 << (bucket % 8);

        let mut bytes = self.bytes;
        for (byte, flip_byte) in bytes.iter_mut().zip(flip.iter()) {
            *byte ^= flip_byte;
        }
        Ok(Self {
            bytes,
            bits: self.bits,
        })
    }

    fn bit(&self, i: usize) -> bool {
        self.bytes[31 - i / 8] & (1 << (i % 8)) != 0
    }

    /// Minimal-length lowercase hex rendering; the zero identifier is `"0"`.
    pub fn to_hex(&self) -> String {
        let encoded = hex::encode(self.bytes);
        let trimmed = encoded.trim_start_matches('0');
        if trimmed.is_empty() {
            "0".to_owned()
        } else {
            trimmed.to_owned()
        }
    }

    /// Binary rendering, left-padded with zeros to the full width.
    pub fn to_binary(&self) -> String {
        (0..usize::from(self.bits))
            .rev()
            .map(|i| if self.bit(i) { '1' } else { '0' })
            .collect()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({}/{})", self.to_hex(), self.bits)
    }
}

/// XOR distance between two identifiers of the same width.
///
/// Ordering is numeric: the byte array is big-endian, so the derived
/// lexicographic comparison coincides with unsigned integer comparison.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Distance([u8; 32]);

impl Distance {
    /// Position of the highest set bit plus one; 0 for the zero distance.
    pub fn bit_length(&self) -> usize {
        bit_length_of(&self.0)
    }

    /// Routing-table bucket index for this distance: `bit_length() - 1`.
    ///
    /// `None` for the zero distance — an owner has no bucket for itself.
    pub fn bucket_index(&self) -> Option<usize> {
        self.bit_length().checked_sub(1)
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|byte| *byte == 0)
    }
}

impl fmt::Debug for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = hex::encode(self.0);
        let trimmed = encoded.trim_start_matches('0');
        write!(
            f,
            "Distance({})",
            if trimmed.is_empty() { "0" } else { trimmed }
        )
    }
}

/// Handle of a joined node: its index in the network arena.
///
/// The index doubles as the 0-based GML node id, because nodes are appended
/// to the arena in join order. Handles order by join order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NodeRef(usize);

impl NodeRef {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

/// A routing-table entry: the handle of a peer plus a copy of its identifier.
///
/// Carrying the identifier by value keeps distance computations local to the
/// routing structures — no arena access is needed to sort or to pick a
/// bucket, mirroring how a DHT contact record travels with its node id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Peer {
    pub node: NodeRef,
    pub id: Identifier,
}

impl Peer {
    pub fn new(node: NodeRef, id: Identifier) -> Self {
        Self { node, id }
    }
}

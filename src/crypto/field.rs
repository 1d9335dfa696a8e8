//! BN254 scalar field arithmetic underlying the kernel's commitment hashing.
//!
//! The field is the BN254 (alt_bn128) scalar field, the 254-bit prime field
//! a circuit-compatible Poseidon instance over this curve would use, so that
//! [`crate::crypto::PoseidonBn254Hasher`]'s output is field-compatible with
//! an eventual ZK circuit swap-in (see [`crate::crypto::FieldHasher`] for the
//! swap seam); only the permutation's round constants remain to be matched
//! against that circuit's own derivation.

use std::cmp::Ordering;
use std::fmt;

use super::poseidon::CryptoError;

/// A 256-bit unsigned integer as four 64-bit limbs, little-endian
/// (`limbs[0]` is the least-significant word).
type Limbs = [u64; 4];

const ZERO_LIMBS: Limbs = [0, 0, 0, 0];

/// The BN254 scalar field modulus, as little-endian `u64` limbs.
///
/// `21888242871839275222246405745257275088548364400416034343698204186575808495617`,
/// i.e. `0x30644e72e131a029b85045b68181585d2833e84879b9709143e1f593f0000001`.
pub const FIELD_MODULUS_LIMBS: Limbs = [0x43e1f593f0000001, 0x2833e84879b97091, 0xb85045b68181585d, 0x30644e72e131a029];

/// Decimal rendering of [`FIELD_MODULUS_LIMBS`], for diagnostics and
/// documentation.
pub const FIELD_MODULUS_DECIMAL: &str = "21888242871839275222246405745257275088548364400416034343698204186575808495617";

fn limbs_cmp(a: &Limbs, b: &Limbs) -> Ordering {
    for i in (0..4).rev() {
        match a[i].cmp(&b[i]) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

fn limbs_add(a: &Limbs, b: &Limbs) -> Limbs {
    let mut result = ZERO_LIMBS;
    let mut carry = 0u128;
    for i in 0..4 {
        let sum = a[i] as u128 + b[i] as u128 + carry;
        result[i] = sum as u64;
        carry = sum >> 64;
    }
    result
}

fn limbs_sub(a: &Limbs, b: &Limbs) -> Limbs {
    let mut result = ZERO_LIMBS;
    let mut borrow = 0i128;
    for i in 0..4 {
        let diff = a[i] as i128 - b[i] as i128 - borrow;
        if diff < 0 {
            result[i] = (diff + (1i128 << 64)) as u64;
            borrow = 1;
        } else {
            result[i] = diff as u64;
            borrow = 0;
        }
    }
    result
}

/// Reduce a sum of two already-reduced operands (so `< 2 * FIELD_MODULUS`)
/// back into `[0, FIELD_MODULUS)` with a single conditional subtraction.
fn reduce_once(limbs: Limbs) -> Limbs {
    if limbs_cmp(&limbs, &FIELD_MODULUS_LIMBS) != Ordering::Less {
        limbs_sub(&limbs, &FIELD_MODULUS_LIMBS)
    } else {
        limbs
    }
}

fn add_mod(a: &Limbs, b: &Limbs) -> Limbs {
    reduce_once(limbs_add(a, b))
}

/// `a * b mod p` via double-and-add over `b`'s bits, most significant first.
/// Avoids needing a wide (512-bit) multiply-then-reduce step: every
/// intermediate stays a reduced field element.
fn mul_mod(a: &Limbs, b: &Limbs) -> Limbs {
    let mut acc = ZERO_LIMBS;
    for limb_index in (0..4).rev() {
        for bit in (0..64).rev() {
            acc = add_mod(&acc, &acc);
            if (b[limb_index] >> bit) & 1 == 1 {
                acc = add_mod(&acc, a);
            }
        }
    }
    acc
}

/// An element of the BN254 scalar field, always kept in reduced form
/// (`< FIELD_MODULUS_LIMBS`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct FieldElement(Limbs);

impl FieldElement {
    /// The additive identity.
    pub const ZERO: FieldElement = FieldElement(ZERO_LIMBS);
    /// The multiplicative identity.
    pub const ONE: FieldElement = FieldElement([1, 0, 0, 0]);

    /// Lift a `u64` into the field. Infallible: every `u64` is trivially
    /// smaller than the 254-bit modulus, so there is no out-of-field case to
    /// reject here.
    pub fn from_u64(value: u64) -> Self {
        FieldElement([value, 0, 0, 0])
    }

    /// Fold an arbitrary byte string into one field element by treating it
    /// as a base-256 big-endian number reduced modulo the field prime.
    ///
    /// Used internally for domain-separation seeds and the `hash_string`
    /// encoding path, both of which are bounded well under the modulus
    /// (`hash_string` caps its input at 31 bytes, i.e. `< 2^248`) so this
    /// never actually wraps for those callers. It is `pub` only for that
    /// internal use; code that must reject an out-of-field value explicitly
    /// should go through [`FieldElement::try_from`] instead.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut acc = ZERO_LIMBS;
        let base = FieldElement::from_u64(256).0;
        for &byte in bytes {
            acc = mul_mod(&acc, &base);
            acc = add_mod(&acc, &FieldElement::from_u64(byte as u64).0);
        }
        FieldElement(acc)
    }

    /// Field addition.
    pub fn add(self, other: FieldElement) -> FieldElement {
        FieldElement(add_mod(&self.0, &other.0))
    }

    /// Field multiplication.
    pub fn mul(self, other: FieldElement) -> FieldElement {
        FieldElement(mul_mod(&self.0, &other.0))
    }

    /// Raise to an integer power via square-and-multiply.
    pub fn pow(self, mut exponent: u64) -> FieldElement {
        let mut base = self;
        let mut result = FieldElement::ONE;
        while exponent > 0 {
            if exponent & 1 == 1 {
                result = result.mul(base);
            }
            base = base.mul(base);
            exponent >>= 1;
        }
        result
    }

    /// Big-endian byte encoding, fixed at 32 bytes (the field's full width).
    pub fn to_bytes(self) -> [u8; 32] {
        let mut out = [0u8; 32];
        for i in 0..4 {
            let start = (3 - i) * 8;
            out[start..start + 8].copy_from_slice(&self.0[i].to_be_bytes());
        }
        out
    }

    /// `0x`-prefixed hex encoding, for the Merkle-root field in persisted
    /// snapshot documents.
    pub fn to_hex(self) -> String {
        format!("0x{}", hex::encode(self.to_bytes()))
    }

    /// Parse a `0x`-prefixed hex encoding produced by [`FieldElement::to_hex`],
    /// rejecting malformed hex or a value `>= FIELD_MODULUS_LIMBS`.
    pub fn from_hex(s: &str) -> Option<FieldElement> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).ok()?;
        FieldElement::try_from(bytes.as_slice()).ok()
    }
}

impl TryFrom<&[u8]> for FieldElement {
    type Error = CryptoError;

    /// Decode a big-endian byte string of at most 32 bytes into a field
    /// element, rejecting (rather than reducing) any value `>=
    /// FIELD_MODULUS_LIMBS`, per the "inputs outside the field must fail
    /// explicitly" requirement.
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() > 32 {
            return Err(CryptoError::OutOfField);
        }
        let mut buf = [0u8; 32];
        buf[32 - bytes.len()..].copy_from_slice(bytes);

        let mut limbs = ZERO_LIMBS;
        for (i, chunk) in buf.chunks(8).enumerate() {
            let mut limb_bytes = [0u8; 8];
            limb_bytes.copy_from_slice(chunk);
            limbs[3 - i] = u64::from_be_bytes(limb_bytes);
        }

        if limbs_cmp(&limbs, &FIELD_MODULUS_LIMBS) != Ordering::Less {
            return Err(CryptoError::OutOfField);
        }
        Ok(FieldElement(limbs))
    }
}

impl fmt::Display for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modulus_minus_one() -> FieldElement {
        FieldElement(limbs_sub(&FIELD_MODULUS_LIMBS, &[1, 0, 0, 0]))
    }

    #[test]
    fn addition_wraps_around_the_modulus() {
        let a = modulus_minus_one();
        let b = FieldElement::from_u64(2);
        assert_eq!(a.add(b), FieldElement::from_u64(1));
    }

    #[test]
    fn multiplication_is_commutative() {
        let a = FieldElement::from_u64(123456789);
        let b = FieldElement::from_u64(987654321);
        assert_eq!(a.mul(b), b.mul(a));
    }

    #[test]
    fn multiplication_matches_hand_computed_product() {
        let a = FieldElement::from_u64(7);
        let b = FieldElement::from_u64(6);
        assert_eq!(a.mul(b), FieldElement::from_u64(42));
    }

    #[test]
    fn from_bytes_is_deterministic() {
        let a = FieldElement::from_bytes(b"municipal-boundary-kernel");
        let b = FieldElement::from_bytes(b"municipal-boundary-kernel");
        assert_eq!(a, b);
    }

    #[test]
    fn from_bytes_differs_for_different_input() {
        let a = FieldElement::from_bytes(b"alpha");
        let b = FieldElement::from_bytes(b"beta");
        assert_ne!(a, b);
    }

    #[test]
    fn hex_round_trips() {
        let a = FieldElement::from_u64(123456789);
        assert_eq!(FieldElement::from_hex(&a.to_hex()), Some(a));
    }

    #[test]
    fn pow_zero_is_one() {
        let a = FieldElement::from_u64(42);
        assert_eq!(a.pow(0), FieldElement::ONE);
    }

    #[test]
    fn try_from_rejects_a_value_equal_to_the_modulus() {
        let mut encoded = [0u8; 32];
        for i in 0..4 {
            let start = (3 - i) * 8;
            encoded[start..start + 8].copy_from_slice(&FIELD_MODULUS_LIMBS[i].to_be_bytes());
        }
        assert_eq!(FieldElement::try_from(&encoded[..]), Err(CryptoError::OutOfField));
    }

    #[test]
    fn try_from_accepts_modulus_minus_one() {
        let encoded = modulus_minus_one().to_bytes();
        assert_eq!(FieldElement::try_from(&encoded[..]), Ok(modulus_minus_one()));
    }

    #[test]
    fn try_from_rejects_more_than_32_bytes() {
        let too_long = [0u8; 33];
        assert_eq!(FieldElement::try_from(&too_long[..]), Err(CryptoError::OutOfField));
    }
}

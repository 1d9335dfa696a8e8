//! Crypto Primitives: the field arithmetic and pluggable hashing sponge
//! backing Merkle leaf/node commitments.

pub mod field;
pub mod poseidon;

pub use field::{FieldElement, FIELD_MODULUS_DECIMAL, FIELD_MODULUS_LIMBS};
pub use poseidon::{CryptoError, FieldHasher, PoseidonBn254Hasher};

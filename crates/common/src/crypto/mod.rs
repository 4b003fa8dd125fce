//! Cryptographic primitives for hub storage
//!
//! - **Identity**: secp256k1 keypairs. A key's identity is its base58check
//!   address (`HASH160` of the SEC1 public key).
//! - **Encryption**: [`CipherEnvelope`], ECIES with an ephemeral key,
//!   AES-256-CBC and HMAC-SHA256.
//! - **Signatures**: [`SignatureEnvelope`], ECDSA over SHA-256 with the
//!   signer's public key embedded, optionally bound to an expected address.
//!
//! # Write path
//!
//! Encryption always happens before signing. A signed, encrypted file is a
//! `SignatureEnvelope` whose payload is the serialized `CipherEnvelope`, so
//! the signature can be checked without the decryption key.

mod cipher;
mod error;
mod keys;
mod signature;

pub use cipher::{CipherEnvelope, CipherTextEncoding, IV_SIZE};
pub use error::CryptoError;
pub use k256::ecdsa::Signature;
pub use keys::{
    hash160, sha256, Address, KeyError, PublicKey, SecretKey, COMPRESSED_PUBLIC_KEY_SIZE,
    HASH160_SIZE, MAINNET_ADDRESS_VERSION, PRIVATE_KEY_SIZE,
};
pub use signature::SignatureEnvelope;

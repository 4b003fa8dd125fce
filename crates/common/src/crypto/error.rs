use super::keys::KeyError;

/// Errors produced by the envelope codec
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    /// The envelope is missing a field or a field does not decode
    #[error("malformed envelope: {0}")]
    Malformed(String),
    /// The HMAC over iv, ephemeral key and ciphertext did not match.
    /// Wrong recipient key or tampered envelope.
    #[error("envelope MAC mismatch")]
    MacMismatch,
    /// MAC verified but the ciphertext would not decrypt
    #[error("cipher error: {0}")]
    Cipher(String),
    #[error("invalid signature")]
    InvalidSignature,
    /// A valid signature from someone other than the expected identity
    #[error("unexpected signer: expected {expected}, got {actual}")]
    UnexpectedSigner { expected: String, actual: String },
}

use std::fmt;
use std::str::FromStr;

use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Size of a secp256k1 private key in bytes
pub const PRIVATE_KEY_SIZE: usize = 32;
/// Size of a SEC1 compressed public key in bytes
pub const COMPRESSED_PUBLIC_KEY_SIZE: usize = 33;
/// Size of a HASH160 digest in bytes
pub const HASH160_SIZE: usize = 20;
/// Version byte for mainnet pay-to-pubkey-hash addresses
pub const MAINNET_ADDRESS_VERSION: u8 = 0x00;

/// Errors that can occur during key operations
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("key error: {0}")]
    Default(#[from] anyhow::Error),
}

/// `RIPEMD160(SHA256(data))`
pub fn hash160(data: &[u8]) -> [u8; HASH160_SIZE] {
    let sha = Sha256::digest(data);
    let digest = Ripemd160::digest(sha);
    let mut out = [0u8; HASH160_SIZE];
    out.copy_from_slice(&digest);
    out
}

/// SHA-256 of `data`
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Base58check pay-to-pubkey-hash address
///
/// Addresses identify bucket owners and token issuers. Two addresses are
/// considered the same identity when their HASH160 payloads match, so a
/// testnet-encoded issuer still matches the mainnet address of its key.
#[derive(Debug, Clone, Copy, Eq)]
pub struct Address {
    version: u8,
    hash: [u8; HASH160_SIZE],
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl std::hash::Hash for Address {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl Address {
    pub fn new(version: u8, hash: [u8; HASH160_SIZE]) -> Self {
        Self { version, hash }
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn hash(&self) -> &[u8; HASH160_SIZE] {
        &self.hash
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut payload = Vec::with_capacity(1 + HASH160_SIZE);
        payload.push(self.version);
        payload.extend_from_slice(&self.hash);
        write!(f, "{}", bs58::encode(payload).with_check().into_string())
    }
}

impl FromStr for Address {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decoded = bs58::decode(s)
            .with_check(None)
            .into_vec()
            .map_err(|e| anyhow::anyhow!("invalid address {}: {}", s, e))?;
        if decoded.len() != 1 + HASH160_SIZE {
            return Err(anyhow::anyhow!(
                "invalid address payload size, expected {}, got {}",
                1 + HASH160_SIZE,
                decoded.len()
            )
            .into());
        }
        let mut hash = [0u8; HASH160_SIZE];
        hash.copy_from_slice(&decoded[1..]);
        Ok(Self::new(decoded[0], hash))
    }
}

/// secp256k1 public key
///
/// Remembers whether it was parsed from a compressed or uncompressed SEC1
/// encoding, since the derived address depends on the exact bytes hashed.
/// Keys derived locally are always compressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey {
    key: k256::PublicKey,
    compressed: bool,
}

impl From<k256::PublicKey> for PublicKey {
    fn from(key: k256::PublicKey) -> Self {
        Self {
            key,
            compressed: true,
        }
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = KeyError;
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let key = k256::PublicKey::from_sec1_bytes(bytes)
            .map_err(|_| anyhow::anyhow!("invalid SEC1 public key ({} bytes)", bytes.len()))?;
        Ok(Self {
            key,
            compressed: bytes.len() == COMPRESSED_PUBLIC_KEY_SIZE,
        })
    }
}

impl PublicKey {
    /// Parse a public key from a hexadecimal SEC1 string
    ///
    /// Accepts both plain hex and "0x"-prefixed hex strings.
    pub fn from_hex(hex: &str) -> Result<Self, KeyError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let bytes =
            hex::decode(hex).map_err(|_| anyhow::anyhow!("public key hex decode error"))?;
        Self::try_from(bytes.as_slice())
    }

    /// SEC1 bytes, in the encoding this key was created with
    pub fn to_bytes(&self) -> Vec<u8> {
        self.key
            .to_encoded_point(self.compressed)
            .as_bytes()
            .to_vec()
    }

    /// Compressed SEC1 bytes regardless of the original encoding
    pub fn to_compressed_bytes(&self) -> Vec<u8> {
        self.key.to_encoded_point(true).as_bytes().to_vec()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Mainnet address of this key
    pub fn address(&self) -> Address {
        Address::new(MAINNET_ADDRESS_VERSION, hash160(&self.to_bytes()))
    }

    pub(crate) fn inner(&self) -> &k256::PublicKey {
        &self.key
    }

    /// Verify an ECDSA signature over `SHA256(msg)`.
    ///
    /// High-S signatures are normalized before verification since some
    /// signers do not produce canonical signatures.
    pub fn verify(&self, msg: &[u8], signature: &Signature) -> Result<(), KeyError> {
        let signature = signature
            .normalize_s()
            .unwrap_or_else(|| signature.clone());
        VerifyingKey::from(&self.key)
            .verify(msg, &signature)
            .map_err(|_| anyhow::anyhow!("signature verification failed").into())
    }
}

/// secp256k1 private key
///
/// Used as the app key (signs hub tokens and file signatures, decrypts files
/// addressed to the user) and as the short-lived transit key that receives
/// secrets from the identity provider.
#[derive(Clone)]
pub struct SecretKey(k256::SecretKey);

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SecretKey")
            .field(&self.public().address().to_string())
            .finish()
    }
}

impl PartialEq for SecretKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for SecretKey {}

impl TryFrom<&[u8]> for SecretKey {
    type Error = KeyError;
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() != PRIVATE_KEY_SIZE {
            return Err(anyhow::anyhow!(
                "invalid private key size, expected {}, got {}",
                PRIVATE_KEY_SIZE,
                bytes.len()
            )
            .into());
        }
        let key = k256::SecretKey::from_slice(bytes)
            .map_err(|_| anyhow::anyhow!("private key out of range"))?;
        Ok(Self(key))
    }
}

impl SecretKey {
    /// Parse a secret key from a hexadecimal string
    ///
    /// Accepts plain or "0x"-prefixed hex, with or without the trailing
    /// `01` compression marker used by wallet exports.
    pub fn from_hex(hex: &str) -> Result<Self, KeyError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let hex = match hex.len() {
            66 if hex.ends_with("01") => &hex[..64],
            _ => hex,
        };
        let mut buff = [0; PRIVATE_KEY_SIZE];
        hex::decode_to_slice(hex, &mut buff)
            .map_err(|_| anyhow::anyhow!("private key hex decode error"))?;
        Self::try_from(buff.as_slice())
    }

    /// Generate a new random secret key using a cryptographically secure RNG
    pub fn generate() -> Result<Self, KeyError> {
        loop {
            let mut bytes = [0u8; PRIVATE_KEY_SIZE];
            getrandom::getrandom(&mut bytes)
                .map_err(|e| anyhow::anyhow!("failed to generate random bytes: {}", e))?;
            // zero and values >= n are rejected, try again
            if let Ok(key) = k256::SecretKey::from_slice(&bytes) {
                return Ok(Self(key));
            }
        }
    }

    /// Derive the compressed public key from this secret key
    pub fn public(&self) -> PublicKey {
        PublicKey::from(self.0.public_key())
    }

    pub fn to_bytes(&self) -> [u8; PRIVATE_KEY_SIZE] {
        let mut out = [0u8; PRIVATE_KEY_SIZE];
        out.copy_from_slice(&self.0.to_bytes());
        out
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Encode secret key in PEM format for local storage
    pub fn to_pem(&self) -> String {
        let pem = pem::Pem::new("EC PRIVATE KEY", self.to_bytes());
        pem::encode(&pem)
    }

    /// Parse a secret key from PEM format
    pub fn from_pem(pem_str: &str) -> Result<Self, KeyError> {
        let pem = pem::parse(pem_str).map_err(|e| anyhow::anyhow!("failed to parse PEM: {}", e))?;

        if pem.tag() != "EC PRIVATE KEY" {
            return Err(anyhow::anyhow!("invalid PEM tag, expected EC PRIVATE KEY").into());
        }

        Self::try_from(pem.contents())
    }

    /// ECDH shared secret: the x-coordinate of `self * public`
    pub(crate) fn shared_secret(&self, public: &PublicKey) -> [u8; 32] {
        let shared =
            k256::ecdh::diffie_hellman(self.0.to_nonzero_scalar(), public.inner().as_affine());
        let mut out = [0u8; 32];
        out.copy_from_slice(shared.raw_secret_bytes());
        out
    }

    /// ECDSA signature over `SHA256(msg)`, low-S normalized
    pub fn sign(&self, msg: &[u8]) -> Signature {
        let signature: Signature = SigningKey::from(&self.0).sign(msg);
        signature.normalize_s().unwrap_or(signature)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const KEY_ONE: &str = "0000000000000000000000000000000000000000000000000000000000000001";

    #[test]
    fn test_known_address_vectors() {
        let key = SecretKey::from_hex(KEY_ONE).unwrap();
        let public = key.public();
        assert_eq!(
            public.to_hex(),
            "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798"
        );
        assert_eq!(
            public.address().to_string(),
            "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH"
        );

        // same point, uncompressed encoding, different address
        let uncompressed = PublicKey::from_hex(
            "0479be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798\
             483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8",
        )
        .unwrap();
        assert!(!uncompressed.is_compressed());
        assert_eq!(
            uncompressed.address().to_string(),
            "1EHNa6Q4Jz2uvNExL497mE43ikXhwF6kZm"
        );
    }

    #[test]
    fn test_keypair_hex_roundtrip() {
        let private_key = SecretKey::generate().unwrap();
        let recovered = SecretKey::from_hex(&private_key.to_hex()).unwrap();
        assert_eq!(private_key, recovered);

        // wallet style export with compression marker
        let marked = format!("{}01", private_key.to_hex());
        assert_eq!(SecretKey::from_hex(&marked).unwrap(), private_key);

        let public = private_key.public();
        let recovered_public = PublicKey::from_hex(&public.to_hex()).unwrap();
        assert_eq!(public, recovered_public);
    }

    #[test]
    fn test_pem_serialization() {
        let private_key = SecretKey::generate().unwrap();
        let recovered = SecretKey::from_pem(&private_key.to_pem()).unwrap();
        assert_eq!(private_key, recovered);
        assert_eq!(private_key.public(), recovered.public());
    }

    #[test]
    fn test_address_parse_roundtrip() {
        let address = SecretKey::generate().unwrap().public().address();
        let parsed: Address = address.to_string().parse().unwrap();
        assert_eq!(address, parsed);
        assert!("not-an-address".parse::<Address>().is_err());
    }

    #[test]
    fn test_sign_and_verify() {
        let secret_key = SecretKey::generate().unwrap();
        let public_key = secret_key.public();
        let message = b"hello, world!";

        let signature = secret_key.sign(message);
        assert!(public_key.verify(message, &signature).is_ok());

        assert!(public_key.verify(b"hello, world?", &signature).is_err());

        let other_key = SecretKey::generate().unwrap().public();
        assert!(other_key.verify(message, &signature).is_err());
    }

    #[test]
    fn test_shared_secret_agrees() {
        let alice = SecretKey::generate().unwrap();
        let bob = SecretKey::generate().unwrap();
        assert_eq!(
            alice.shared_secret(&bob.public()),
            bob.shared_secret(&alice.public())
        );
    }
}

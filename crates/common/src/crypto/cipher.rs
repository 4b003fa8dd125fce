//! Encryption envelope (ECIES over secp256k1)
//!
//! The envelope is self-describing JSON:
//!
//! ```text
//! { "iv": hex, "ephemeralPK": hex, "cipherText": hex|base64,
//!   "mac": hex, "wasString": bool, "cipherTextEncoding"?: "hex"|"base64" }
//! ```
//!
//! Key agreement uses a fresh ephemeral key per envelope. `SHA512` of the
//! ECDH x-coordinate is split into an AES-256-CBC key (first half) and an
//! HMAC-SHA256 key (second half). The MAC covers `iv || ephemeralPK ||
//! cipherText` and is checked before any plaintext is produced.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};

use super::error::CryptoError;
use super::keys::{PublicKey, SecretKey};
use crate::content::Content;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Size of the AES-CBC initialization vector in bytes
pub const IV_SIZE: usize = 16;
const DERIVED_KEY_SIZE: usize = 32;

/// How `cipherText` is encoded inside the JSON envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CipherTextEncoding {
    Hex,
    Base64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CipherEnvelope {
    pub iv: String,
    #[serde(rename = "ephemeralPK")]
    pub ephemeral_pk: String,
    pub cipher_text: String,
    pub mac: String,
    pub was_string: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cipher_text_encoding: Option<CipherTextEncoding>,
}

impl CipherEnvelope {
    /// Encrypt `content` so that only the holder of `recipient`'s secret key
    /// can read it.
    pub fn encrypt(content: &Content, recipient: &PublicKey) -> Result<Self, CryptoError> {
        let ephemeral = SecretKey::generate()?;
        let (enc_key, mac_key) = derive_keys(&ephemeral.shared_secret(recipient));

        let mut iv = [0u8; IV_SIZE];
        getrandom::getrandom(&mut iv)
            .map_err(|e| CryptoError::Cipher(format!("failed to generate iv: {}", e)))?;

        let cipher_text = Aes256CbcEnc::new_from_slices(&enc_key, &iv)
            .map_err(|e| CryptoError::Cipher(e.to_string()))?
            .encrypt_padded_vec_mut::<Pkcs7>(content.as_bytes());

        let ephemeral_pk = ephemeral.public().to_compressed_bytes();
        let mac = compute_mac(&mac_key, &iv, &ephemeral_pk, &cipher_text)?;

        Ok(Self {
            iv: hex::encode(iv),
            ephemeral_pk: hex::encode(ephemeral_pk),
            cipher_text: hex::encode(cipher_text),
            mac: hex::encode(mac),
            was_string: content.is_text(),
            cipher_text_encoding: None,
        })
    }

    /// Decrypt with the recipient's secret key.
    ///
    /// # Errors
    ///
    /// * `Malformed` - a field does not decode
    /// * `MacMismatch` - wrong key or the envelope was modified
    /// * `Cipher` - the MAC held but the plaintext is unusable
    pub fn decrypt(&self, recipient: &SecretKey) -> Result<Content, CryptoError> {
        let iv = decode_hex("iv", &self.iv)?;
        if iv.len() != IV_SIZE {
            return Err(CryptoError::Malformed(format!(
                "iv must be {} bytes, got {}",
                IV_SIZE,
                iv.len()
            )));
        }
        let ephemeral_bytes = decode_hex("ephemeralPK", &self.ephemeral_pk)?;
        let ephemeral = PublicKey::try_from(ephemeral_bytes.as_slice())
            .map_err(|e| CryptoError::Malformed(format!("ephemeralPK: {}", e)))?;
        let cipher_text = self.cipher_text_bytes()?;
        let mac = decode_hex("mac", &self.mac)?;

        let (enc_key, mac_key) = derive_keys(&recipient.shared_secret(&ephemeral));

        let mut hmac = <HmacSha256 as Mac>::new_from_slice(&mac_key)
            .map_err(|e| CryptoError::Cipher(e.to_string()))?;
        hmac.update(&iv);
        hmac.update(&ephemeral_bytes);
        hmac.update(&cipher_text);
        hmac.verify_slice(&mac)
            .map_err(|_| CryptoError::MacMismatch)?;

        let plaintext = Aes256CbcDec::new_from_slices(&enc_key, &iv)
            .map_err(|e| CryptoError::Cipher(e.to_string()))?
            .decrypt_padded_vec_mut::<Pkcs7>(&cipher_text)
            .map_err(|_| CryptoError::Cipher("invalid padding".to_string()))?;

        if self.was_string {
            String::from_utf8(plaintext)
                .map(Content::Text)
                .map_err(|_| CryptoError::Cipher("plaintext is not valid utf-8".to_string()))
        } else {
            Ok(Content::Binary(plaintext))
        }
    }

    /// Parse an envelope, failing with `Malformed` if any field is absent
    pub fn from_json(json: &str) -> Result<Self, CryptoError> {
        serde_json::from_str(json).map_err(|e| CryptoError::Malformed(e.to_string()))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        serde_json::from_slice(bytes).map_err(|e| CryptoError::Malformed(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, CryptoError> {
        serde_json::to_string(self).map_err(|e| CryptoError::Malformed(e.to_string()))
    }

    fn cipher_text_bytes(&self) -> Result<Vec<u8>, CryptoError> {
        match self.cipher_text_encoding {
            None | Some(CipherTextEncoding::Hex) => decode_hex("cipherText", &self.cipher_text),
            Some(CipherTextEncoding::Base64) => base64::engine::general_purpose::STANDARD
                .decode(&self.cipher_text)
                .map_err(|e| CryptoError::Malformed(format!("cipherText: {}", e))),
        }
    }
}

fn derive_keys(shared_secret: &[u8]) -> ([u8; DERIVED_KEY_SIZE], [u8; DERIVED_KEY_SIZE]) {
    let hashed = Sha512::digest(shared_secret);
    let mut enc_key = [0u8; DERIVED_KEY_SIZE];
    let mut mac_key = [0u8; DERIVED_KEY_SIZE];
    enc_key.copy_from_slice(&hashed[..DERIVED_KEY_SIZE]);
    mac_key.copy_from_slice(&hashed[DERIVED_KEY_SIZE..]);
    (enc_key, mac_key)
}

fn compute_mac(
    mac_key: &[u8],
    iv: &[u8],
    ephemeral_pk: &[u8],
    cipher_text: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let mut hmac = <HmacSha256 as Mac>::new_from_slice(mac_key)
        .map_err(|e| CryptoError::Cipher(e.to_string()))?;
    hmac.update(iv);
    hmac.update(ephemeral_pk);
    hmac.update(cipher_text);
    Ok(hmac.finalize().into_bytes().to_vec())
}

fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>, CryptoError> {
    hex::decode(value).map_err(|e| CryptoError::Malformed(format!("{}: {}", field, e)))
}

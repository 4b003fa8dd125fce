//! Signature envelope
//!
//! A detached ECDSA signature over `SHA256(payload)` together with the
//! signer's public key. When `cipherText` is present the envelope carries its
//! own payload, a serialized [`CipherEnvelope`]; otherwise it is the content
//! of a `.sig` companion file and the payload is the file body.

use k256::ecdsa::Signature;
use serde::{Deserialize, Serialize};

use super::cipher::CipherEnvelope;
use super::error::CryptoError;
use super::keys::{Address, PublicKey, SecretKey};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureEnvelope {
    /// DER encoded signature, hex
    pub signature: String,
    /// SEC1 public key of the signer, hex
    pub public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cipher_text: Option<String>,
}

impl SignatureEnvelope {
    /// Detached signature over `payload`
    pub fn sign(payload: &[u8], signer: &SecretKey) -> Self {
        let signature = signer.sign(payload);
        Self {
            signature: hex::encode(signature.to_der().as_bytes()),
            public_key: signer.public().to_hex(),
            cipher_text: None,
        }
    }

    /// Sign the serialized encryption envelope and carry it as the payload.
    ///
    /// The signature covers the encrypted bytes, so a reader can reject a
    /// forged file before attempting to decrypt it.
    pub fn sign_envelope(envelope: &CipherEnvelope, signer: &SecretKey) -> Result<Self, CryptoError> {
        let payload = envelope.to_json()?;
        let mut signed = Self::sign(payload.as_bytes(), signer);
        signed.cipher_text = Some(payload);
        Ok(signed)
    }

    pub fn signer(&self) -> Result<PublicKey, CryptoError> {
        PublicKey::from_hex(&self.public_key)
            .map_err(|e| CryptoError::Malformed(format!("publicKey: {}", e)))
    }

    /// Verify the signature over an external payload (the `.sig` case).
    ///
    /// When `expected` is given the signer's address must match it, even if
    /// the signature itself is valid.
    pub fn verify_detached(
        &self,
        payload: &[u8],
        expected: Option<&Address>,
    ) -> Result<(), CryptoError> {
        let signer = self.signer()?;
        let signature_bytes = hex::decode(&self.signature)
            .map_err(|e| CryptoError::Malformed(format!("signature: {}", e)))?;
        let signature =
            Signature::from_der(&signature_bytes).map_err(|_| CryptoError::InvalidSignature)?;

        signer
            .verify(payload, &signature)
            .map_err(|_| CryptoError::InvalidSignature)?;

        if let Some(expected) = expected {
            let actual = signer.address();
            if &actual != expected {
                return Err(CryptoError::UnexpectedSigner {
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Verify the embedded payload and return its bytes
    pub fn verify(&self, expected: Option<&Address>) -> Result<&[u8], CryptoError> {
        let payload = self
            .cipher_text
            .as_deref()
            .ok_or_else(|| CryptoError::Malformed("missing cipherText payload".to_string()))?;
        self.verify_detached(payload.as_bytes(), expected)?;
        Ok(payload.as_bytes())
    }

    /// Verify, then parse the embedded payload as an encryption envelope
    pub fn open(&self, expected: Option<&Address>) -> Result<CipherEnvelope, CryptoError> {
        let payload = self.verify(expected)?;
        CipherEnvelope::from_slice(payload)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        serde_json::from_slice(bytes).map_err(|e| CryptoError::Malformed(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, CryptoError> {
        serde_json::to_string(self).map_err(|e| CryptoError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::content::Content;

    #[test]
    fn test_detached_sign_and_verify() {
        let key = SecretKey::generate().unwrap();
        let envelope = SignatureEnvelope::sign(b"file body", &key);
        assert!(envelope.cipher_text.is_none());

        envelope
            .verify_detached(b"file body", Some(&key.public().address()))
            .unwrap();

        assert!(matches!(
            envelope.verify_detached(b"file b0dy", None),
            Err(CryptoError::InvalidSignature)
        ));
    }

    #[test]
    fn test_valid_signature_from_wrong_identity() {
        let alice = SecretKey::generate().unwrap();
        let bob = SecretKey::generate().unwrap();
        let envelope = SignatureEnvelope::sign(b"payload", &alice);

        // the signature is fine on its own
        envelope.verify_detached(b"payload", None).unwrap();

        let result = envelope.verify_detached(b"payload", Some(&bob.public().address()));
        match result {
            Err(CryptoError::UnexpectedSigner { expected, actual }) => {
                assert_eq!(expected, bob.public().address().to_string());
                assert_eq!(actual, alice.public().address().to_string());
            }
            other => panic!("expected UnexpectedSigner, got {:?}", other),
        }
    }

    #[test]
    fn test_swapped_public_key_is_rejected() {
        let alice = SecretKey::generate().unwrap();
        let mallory = SecretKey::generate().unwrap();
        let mut envelope = SignatureEnvelope::sign(b"payload", &alice);
        envelope.public_key = mallory.public().to_hex();
        assert!(matches!(
            envelope.verify_detached(b"payload", None),
            Err(CryptoError::InvalidSignature)
        ));
    }

    #[test]
    fn test_signed_cipher_envelope() {
        let key = SecretKey::generate().unwrap();
        let encrypted = CipherEnvelope::encrypt(&Content::from("hi"), &key.public()).unwrap();
        let signed = SignatureEnvelope::sign_envelope(&encrypted, &key).unwrap();

        let json = signed.to_json().unwrap();
        let parsed = SignatureEnvelope::from_slice(json.as_bytes()).unwrap();
        let opened = parsed.open(Some(&key.public().address())).unwrap();
        assert_eq!(opened, encrypted);
        assert_eq!(opened.decrypt(&key).unwrap(), Content::from("hi"));

        let mut tampered = parsed;
        tampered.cipher_text = Some(tampered.cipher_text.unwrap().replace("\"wasString\":true", "\"wasString\":false"));
        assert!(matches!(tampered.open(None), Err(CryptoError::InvalidSignature)));
    }
}

/**
 * Sign-in token handling.
 *  - Verifying auth responses against the issuer key
 *  - Decrypting the secrets they carry
 *  - Building auth requests
 */
pub mod auth;
/**
 * File content as it moves through the
 *  envelope pipeline, text or binary.
 */
pub mod content;
/**
 * Cryptographic types and operations.
 *  - secp256k1 keys and addresses
 *  - Encryption and signature envelopes
 */
pub mod crypto;
/**
 * Negotiating a bucket config with a hub.
 */
pub mod hub;
/**
 * Finding other users' app buckets.
 */
pub mod resolver;
/**
 * Typed session lifecycle and its
 *  persistence.
 */
pub mod session;
/**
 * Reading, writing, deleting and listing
 *  files on the signed-in user's hub.
 */
pub mod storage;
/**
 * In-process hub and transport doubles
 *  for tests.
 */
pub mod testkit;
/**
 * Request execution against hubs and
 *  lookup services.
 */
pub mod transport;

pub mod prelude {
    pub use crate::auth::{AuthRequest, AuthVerifier, UserData};
    pub use crate::content::Content;
    pub use crate::crypto::{Address, PublicKey, SecretKey};
    pub use crate::hub::HubConfig;
    pub use crate::resolver::{HttpNameResolver, NameResolver};
    pub use crate::session::{FileSessionStore, Session, SessionState, SessionStore};
    pub use crate::storage::{GetFileOptions, PutFileOptions, Storage, StorageError};
    pub use crate::transport::{ReqwestTransport, Transport};
}

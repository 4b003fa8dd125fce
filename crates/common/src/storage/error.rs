use std::fmt;

use http::StatusCode;

use crate::crypto::CryptoError;
use crate::hub::ObjectUrlError;
use crate::resolver::ResolveError;
use crate::session::SessionError;
use crate::transport::TransportError;

/// Why a signature check on read failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureFailure {
    /// The `.sig` companion is absent or could not be fetched
    Missing,
    Invalid,
}

impl fmt::Display for SignatureFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureFailure::Missing => write!(f, "failed to obtain signature"),
            SignatureFailure::Invalid => write!(f, "invalid signature"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("file does not exist: {0}")]
    DoesNotExist(String),
    /// Empty path, or one with an empty, `.` or `..` segment
    #[error("invalid file path: {0:?}")]
    InvalidPath(String),
    #[error("{kind} for file: {path}")]
    SignatureVerification {
        path: String,
        kind: SignatureFailure,
    },
    /// Valid signature, wrong identity
    #[error("signer of {path} is {actual}, expected {expected}")]
    UnexpectedSigner {
        path: String,
        expected: String,
        actual: String,
    },
    #[error("{path} is {size} bytes, hub accepts at most {max}")]
    PayloadTooLarge { path: String, size: u64, max: u64 },
    /// The content is on the hub but its `.sig` companion is not.
    /// [`crate::storage::Storage::put_detached_signature`] repairs this.
    #[error("wrote {path} to {public_url} but failed to write its signature: {source}")]
    SignatureUploadFailed {
        path: String,
        public_url: String,
        source: Box<StorageError>,
    },
    #[error("listing gave up after {0} pages")]
    TooManyPages(usize),
    #[error("malformed hub response: {0}")]
    MalformedHubResponse(String),
    /// A page request failed after `dispatched` entries reached the caller
    #[error("listing failed with status {status} after {dispatched} entries: {body}")]
    List {
        status: StatusCode,
        dispatched: usize,
        body: String,
    },
    /// The per-entry callback failed; earlier entries are not undone
    #[error("listing callback failed after {dispatched} entries: {source}")]
    ListCallback {
        dispatched: usize,
        source: anyhow::Error,
    },
    #[error("reading another user's files needs an app origin")]
    MissingAppOrigin,
    #[error("reading another user's files needs a name resolver")]
    NoResolver,
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    #[error("resolve error: {0}")]
    Resolve(#[from] ResolveError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("{0}")]
    Unknown(String),
}

impl From<ObjectUrlError> for StorageError {
    fn from(e: ObjectUrlError) -> Self {
        match e {
            ObjectUrlError::Parse(e) => StorageError::Url(e),
            ObjectUrlError::InvalidPath(path) => StorageError::InvalidPath(path),
        }
    }
}

impl StorageError {
    /// Whether this is a failed trust check, as opposed to an I/O or hub
    /// failure
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            StorageError::SignatureVerification { .. }
                | StorageError::UnexpectedSigner { .. }
                | StorageError::Crypto(CryptoError::MacMismatch)
                | StorageError::Crypto(CryptoError::InvalidSignature)
        )
    }
}

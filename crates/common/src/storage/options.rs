use crate::crypto::PublicKey;

/// Defaults to decrypting without a signature check
#[derive(Debug, Clone)]
pub struct GetFileOptions {
    pub decrypt: bool,
    pub verify: bool,
    /// Read this user's public bucket instead of our own
    pub username: Option<String>,
    /// App whose bucket to read when `username` is set, defaults to the
    /// storage's own origin
    pub app_origin: Option<String>,
}

impl Default for GetFileOptions {
    fn default() -> Self {
        Self {
            decrypt: true,
            verify: false,
            username: None,
            app_origin: None,
        }
    }
}

impl GetFileOptions {
    pub fn decrypt(mut self, decrypt: bool) -> Self {
        self.decrypt = decrypt;
        self
    }

    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn app_origin(mut self, app_origin: impl Into<String>) -> Self {
        self.app_origin = Some(app_origin.into());
        self
    }
}

/// Defaults to encrypting to our own key, unsigned
#[derive(Debug, Clone)]
pub struct PutFileOptions {
    pub encrypt: bool,
    /// Encrypt to this key instead of our own
    pub encryption_key: Option<PublicKey>,
    pub sign: bool,
    pub content_type: Option<String>,
}

impl Default for PutFileOptions {
    fn default() -> Self {
        Self {
            encrypt: true,
            encryption_key: None,
            sign: false,
            content_type: None,
        }
    }
}

impl PutFileOptions {
    pub fn encrypt(mut self, encrypt: bool) -> Self {
        self.encrypt = encrypt;
        self
    }

    pub fn encryption_key(mut self, key: PublicKey) -> Self {
        self.encrypt = true;
        self.encryption_key = Some(key);
        self
    }

    pub fn sign(mut self, sign: bool) -> Self {
        self.sign = sign;
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

//! Authentication token held by the node.
//!
//! The token is issued by the server during provisioning and stored in the
//! `auth` NVS namespace.  The core treats it as an opaque credential: it
//! only cares whether one is currently held, and hands the bytes to the
//! transport unchanged.

use core::fmt;

use log::{info, warn};

use crate::app::ports::{StoragePort, TokenSource};
use crate::error::{Error, Result, StorageError};

/// Maximum token length in bytes.
pub const MAX_TOKEN_LEN: usize = 64;

/// NVS namespace holding credentials.  Erased by a factory reset.
pub const AUTH_NAMESPACE: &str = "auth";
/// Key of the server token inside [`AUTH_NAMESPACE`].
pub const TOKEN_KEY: &str = "token";

/// Opaque server credential.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken {
    bytes: heapless::Vec<u8, MAX_TOKEN_LEN>,
}

impl AuthToken {
    /// Build a token from raw bytes.  Empty or oversized payloads are rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::Config("empty auth token"));
        }
        let bytes = heapless::Vec::from_slice(bytes)
            .map_err(|()| Error::Config("auth token too long"))?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Token as text, if it is valid UTF-8 (it is for server-issued tokens).
    pub fn as_str(&self) -> Option<&str> {
        core::str::from_utf8(&self.bytes).ok()
    }
}

// Never print the credential itself.
impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthToken(<{} bytes>)", self.bytes.len())
    }
}

/// Token cache backed by persistent storage.
///
/// Loaded once at boot.  Provisioning writes the key out of band; a
/// factory reset erases it and the node restarts unauthenticated.
#[derive(Debug, Default)]
pub struct StoredToken {
    token: Option<AuthToken>,
}

impl StoredToken {
    /// Read the token from `storage`.  A missing key leaves the node
    /// unauthenticated; a corrupt blob is logged and ignored.
    pub fn load(storage: &dyn StoragePort) -> Self {
        let mut buf = [0u8; MAX_TOKEN_LEN];
        match storage.read(AUTH_NAMESPACE, TOKEN_KEY, &mut buf) {
            Ok(len) => match AuthToken::from_bytes(&buf[..len]) {
                Ok(token) => {
                    info!("auth: token loaded ({} bytes)", len);
                    Self { token: Some(token) }
                }
                Err(e) => {
                    warn!("auth: stored token rejected ({})", e);
                    Self::default()
                }
            },
            Err(StorageError::NotFound) => {
                info!("auth: no stored token, waiting for provisioning");
                Self::default()
            }
            Err(e) => {
                warn!("auth: token read failed ({})", e);
                Self::default()
            }
        }
    }
}

impl TokenSource for StoredToken {
    fn token(&self) -> Option<&AuthToken> {
        self.token.as_ref()
    }
}

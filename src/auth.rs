use std::{fmt, str::FromStr};

use log::error;
use uuid::Uuid;

use crate::profiledb::Error;
use crate::time::Timestamp;

const DIGEST_HEX_LEN: usize = 64;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha256,
}

impl FromStr for DigestAlgorithm {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match &*name.to_ascii_lowercase() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            _ => {
                error!("unsupported password digest \"{name}\"");
                Err(Error::HashingUnsupported)
            }
        }
    }
}

impl DigestAlgorithm {
    /// Hex digest of `plaintext`'s UTF-8 bytes, zero-padded on the left to 64 characters.
    ///
    /// Unsalted: the same password always hashes to the same value.
    pub fn hash_password(self, plaintext: &str) -> PasswordHash {
        let hex = match self {
            Self::Sha256 => sha256::digest(plaintext),
        };

        PasswordHash(format!("{:0>width$}", hex, width = DIGEST_HEX_LEN))
    }
}

/// A password digest, either freshly computed or as read back from storage.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub fn from_stored(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// keep hashes out of log lines
impl fmt::Debug for PasswordHash {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "PasswordHash(..)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", self.0)
    }
}

/// A successful login. Lives only as long as the caller keeps it.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    username: String,
    logged_in_at: Timestamp,
}

impl Session {
    pub fn start(username: &str) -> Self {
        Self {
            id: SessionId::new(),
            username: username.into(),
            logged_in_at: Timestamp::now(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn logged_in_at(&self) -> Timestamp {
        self.logged_in_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    NotFound,
    Exists,
    /// Storage couldn't be opened, read or written.
    Unavailable,
    /// The username can't be used as a storage key.
    InvalidKey,
    /// A stored record couldn't be decoded.
    Corrupt,
}

#[cfg(feature = "backend-sql")]
mod backend_sql;
#[cfg(feature = "backend-sql")]
pub use backend_sql::*;

#[cfg(not(feature = "backend-sql"))]
mod backend_file;
#[cfg(not(feature = "backend-sql"))]
pub use backend_file::*;

use tempfile::TempDir;

use crate::auth::DigestAlgorithm;
use crate::backend::Backend;
use crate::profiledb::ProfileDb;

/// A fresh, empty database in its own directory. Keep the `TempDir` alive
/// for as long as the database is used.
pub async fn create_profiledb() -> (TempDir, ProfileDb) {
    let dir = tempfile::tempdir().unwrap();
    let backend = Backend::new(dir.path()).await.unwrap();

    (dir, ProfileDb::new(backend, DigestAlgorithm::Sha256))
}

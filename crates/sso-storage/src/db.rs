//! Embedded `SurrealDB` connection.
//!
//! Mirrors `astrid-storage::Database`'s connection-string conventions:
//! `surrealkv://path` for an on-disk embedded store, `mem://` for tests.

use crate::error::{StorageError, StorageErrorKind, StorageResult};

/// Thin wrapper around a `SurrealDB` client bound to the `sso`/`main`
/// namespace/database pair.
pub struct Database {
    inner: surrealdb::Surreal<surrealdb::engine::any::Any>,
}

impl Database {
    /// Connect to an embedded, on-disk `SurrealKV` store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageErrorKind::Connection`] if the connection fails.
    pub async fn connect_embedded(path: &str) -> StorageResult<Self> {
        let endpoint = format!("surrealkv://{path}");
        Self::connect(&endpoint).await
    }

    /// Connect to an in-memory store, for tests and transient (id = 0)
    /// sessions that never touch disk.
    ///
    /// # Errors
    ///
    /// Returns [`StorageErrorKind::Connection`] if the connection fails.
    pub async fn connect_memory() -> StorageResult<Self> {
        Self::connect("mem://").await
    }

    async fn connect(endpoint: &str) -> StorageResult<Self> {
        let db: surrealdb::Surreal<surrealdb::engine::any::Any> = surrealdb::Surreal::init();
        db.connect(endpoint).await.map_err(|e| {
            StorageError::new(StorageErrorKind::Connection, e.to_string())
        })?;
        db.use_ns("sso").use_db("credentials").await.map_err(|e| {
            StorageError::new(StorageErrorKind::Connection, e.to_string())
        })?;
        Ok(Self { inner: db })
    }

    /// Borrow the underlying client for direct `SurrealQL` queries.
    #[must_use]
    pub fn client(&self) -> &surrealdb::Surreal<surrealdb::engine::any::Any> {
        &self.inner
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

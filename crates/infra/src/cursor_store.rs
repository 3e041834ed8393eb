//! Daemon cursor persistence.
//!
//! A cursor is the storage id of the last event-log record a daemon has fully
//! processed. Persisting it lets a restarted daemon resume where it stopped
//! instead of replaying the whole log; re-processing a few records after a
//! crash is harmless because every retry decision is guarded by run tags.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use sqlx::{PgPool, Row};
use thiserror::Error;
use tokio::runtime::Handle;

/// Cursor store operation error.
#[derive(Debug, Error)]
pub enum CursorStoreError {
    #[error("cursor storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("cursor value out of range for {name}: {value}")]
    OutOfRange { name: String, value: i64 },
}

/// Per-daemon cursor store.
pub trait DaemonCursorStore: Send + Sync {
    fn get_cursor(&self, daemon_name: &str) -> Result<Option<u64>, CursorStoreError>;

    fn set_cursor(&self, daemon_name: &str, cursor: u64) -> Result<(), CursorStoreError>;

    /// Forget the cursor; the next start re-initialises it.
    fn clear_cursor(&self, daemon_name: &str) -> Result<(), CursorStoreError>;
}

impl<S> DaemonCursorStore for Arc<S>
where
    S: DaemonCursorStore + ?Sized,
{
    fn get_cursor(&self, daemon_name: &str) -> Result<Option<u64>, CursorStoreError> {
        (**self).get_cursor(daemon_name)
    }

    fn set_cursor(&self, daemon_name: &str, cursor: u64) -> Result<(), CursorStoreError> {
        (**self).set_cursor(daemon_name, cursor)
    }

    fn clear_cursor(&self, daemon_name: &str) -> Result<(), CursorStoreError> {
        (**self).clear_cursor(daemon_name)
    }
}

/// In-memory cursor store (tests/dev).
#[derive(Debug, Default)]
pub struct InMemoryCursorStore {
    cursors: RwLock<HashMap<String, u64>>,
}

impl InMemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DaemonCursorStore for InMemoryCursorStore {
    fn get_cursor(&self, daemon_name: &str) -> Result<Option<u64>, CursorStoreError> {
        let cursors = self
            .cursors
            .read()
            .map_err(|_| CursorStoreError::Storage("lock poisoned".to_string()))?;
        Ok(cursors.get(daemon_name).copied())
    }

    fn set_cursor(&self, daemon_name: &str, cursor: u64) -> Result<(), CursorStoreError> {
        let mut cursors = self
            .cursors
            .write()
            .map_err(|_| CursorStoreError::Storage("lock poisoned".to_string()))?;
        cursors.insert(daemon_name.to_string(), cursor);
        Ok(())
    }

    fn clear_cursor(&self, daemon_name: &str) -> Result<(), CursorStoreError> {
        let mut cursors = self
            .cursors
            .write()
            .map_err(|_| CursorStoreError::Storage("lock poisoned".to_string()))?;
        cursors.remove(daemon_name);
        Ok(())
    }
}

/// Postgres-backed cursor store.
///
/// Table:
///
/// ```sql
/// CREATE TABLE daemon_cursors (
///     name TEXT PRIMARY KEY,
///     cursor BIGINT NOT NULL,
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// The daemon loop is synchronous, so queries are driven with `block_on` on the
/// given runtime handle. Call it from a plain thread, never from inside the runtime.
pub struct PostgresCursorStore {
    pool: Arc<PgPool>,
    handle: Handle,
}

impl PostgresCursorStore {
    pub fn new(pool: PgPool, handle: Handle) -> Self {
        Self {
            pool: Arc::new(pool),
            handle,
        }
    }

    /// Create the cursor table if it does not exist.
    pub fn ensure_schema(&self) -> Result<(), CursorStoreError> {
        let pool = self.pool.clone();
        self.handle.block_on(async move {
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS daemon_cursors (
                    name TEXT PRIMARY KEY,
                    cursor BIGINT NOT NULL,
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )
                "#,
            )
            .execute(&*pool)
            .await?;
            Ok::<(), CursorStoreError>(())
        })
    }
}

async fn fetch_cursor(pool: &PgPool, name: String) -> Result<Option<u64>, CursorStoreError> {
    let row = sqlx::query(
        r#"
        SELECT cursor
        FROM daemon_cursors
        WHERE name = $1
        "#,
    )
    .bind(&name)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let value: i64 = row.try_get("cursor")?;
    u64::try_from(value)
        .map(Some)
        .map_err(|_| CursorStoreError::OutOfRange { name, value })
}

impl DaemonCursorStore for PostgresCursorStore {
    fn get_cursor(&self, daemon_name: &str) -> Result<Option<u64>, CursorStoreError> {
        self.handle
            .block_on(fetch_cursor(&self.pool, daemon_name.to_string()))
    }

    fn set_cursor(&self, daemon_name: &str, cursor: u64) -> Result<(), CursorStoreError> {
        let value = i64::try_from(cursor).map_err(|_| {
            CursorStoreError::Storage(format!("cursor {cursor} does not fit in BIGINT"))
        })?;
        let pool = self.pool.clone();
        let name = daemon_name.to_string();

        self.handle.block_on(async move {
            sqlx::query(
                r#"
                INSERT INTO daemon_cursors (name, cursor)
                VALUES ($1, $2)
                ON CONFLICT (name)
                DO UPDATE SET
                    cursor = EXCLUDED.cursor,
                    updated_at = NOW()
                "#,
            )
            .bind(&name)
            .bind(value)
            .execute(&*pool)
            .await?;
            Ok::<(), CursorStoreError>(())
        })
    }

    fn clear_cursor(&self, daemon_name: &str) -> Result<(), CursorStoreError> {
        let pool = self.pool.clone();
        let name = daemon_name.to_string();

        self.handle.block_on(async move {
            sqlx::query("DELETE FROM daemon_cursors WHERE name = $1")
                .bind(&name)
                .execute(&*pool)
                .await?;
            Ok::<(), CursorStoreError>(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursors_are_tracked_per_daemon() {
        let store = InMemoryCursorStore::new();
        assert_eq!(store.get_cursor("a").unwrap(), None);

        store.set_cursor("a", 10).unwrap();
        store.set_cursor("b", 3).unwrap();
        store.set_cursor("a", 12).unwrap();

        assert_eq!(store.get_cursor("a").unwrap(), Some(12));
        assert_eq!(store.get_cursor("b").unwrap(), Some(3));

        store.clear_cursor("a").unwrap();
        assert_eq!(store.get_cursor("a").unwrap(), None);
        assert_eq!(store.get_cursor("b").unwrap(), Some(3));
    }
}

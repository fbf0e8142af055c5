//! The SQLite database behind [`Repository`](crate::Repository).
//!
//! One signed-in user drives the store at a time, so the pool stays small.
//! Multi-row changes run in transactions, and the restricting foreign key from
//! images to folders is what keeps a folder from being deleted before its
//! images. Connecting refuses a database where that key isn't enforced or is
//! already violated.

use exn::ResultExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

use crate::error::{ErrorKind, Result};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
/// A reader next to the writer.
const POOL_SIZE: u32 = 2;
const BUSY_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the record database at `path`, apply
    /// migrations and check its integrity.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let options = Self::options()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        Self::open(options, POOL_SIZE).await
    }

    /// A private in-memory database. Not test-gated so dependent crates can
    /// use it in their own tests.
    pub async fn connect_in_memory() -> Result<Self> {
        // Every connection to ":memory:" gets its own database.
        Self::open(Self::options().filename(":memory:"), 1).await
    }

    fn options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .foreign_keys(true)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT)
            // Connect options are applied to every pooled connection.
            .pragma("temp_store", "MEMORY")
    }

    async fn open(options: SqliteConnectOptions, connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(connections)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let db = Self { pool };
        db.migrate().await?;
        db.verify().await?;
        Ok(db)
    }

    #[instrument(name = "migrate", skip_all)]
    async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.or_raise(|| ErrorKind::Migration)
    }

    /// Folder deletes rely on the images foreign key, so it must be enforced
    /// and currently hold.
    async fn verify(&self) -> Result<()> {
        let (enforced,): (i64,) =
            sqlx::query_as("PRAGMA foreign_keys").fetch_one(&self.pool).await.or_raise(|| ErrorKind::Database)?;
        if enforced == 0 {
            exn::bail!(ErrorKind::Integrity("foreign keys are not enforced"));
        }
        let (dangling,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pragma_foreign_key_check('images')")
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if dangling > 0 {
            tracing::error!(dangling, "images reference folders that don't exist");
            exn::bail!(ErrorKind::Integrity("images reference missing folders"));
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Wait for pooled connections to come back, then close them.
    pub async fn close(&self) {
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_in_memory() {
        let db = Database::connect_in_memory().await.unwrap();
        assert!(!db.pool().is_closed());
        db.close().await;
        assert!(db.pool().is_closed());
    }

    #[tokio::test]
    async fn test_reopening_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.sqlite");
        let db = Database::connect(&path).await.unwrap();
        assert!(path.exists());
        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode").fetch_one(db.pool()).await.unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        db.close().await;
        // Already-applied migrations are skipped
        let db = Database::connect(&path).await.unwrap();
        db.close().await;
    }

    #[tokio::test]
    async fn test_foreign_keys_enforced() {
        let db = Database::connect_in_memory().await.unwrap();
        let err = sqlx::query(
            "INSERT INTO images (id, user_id, folder_id, url, created_at) VALUES ('i', 'u', 'nope', 'https://x', 0)",
        )
        .execute(db.pool())
        .await
        .unwrap_err();
        assert!(matches!(&err, sqlx::Error::Database(e) if e.is_foreign_key_violation()));
        db.close().await;
    }

    #[tokio::test]
    async fn test_refuses_dangling_images() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.sqlite");
        let db = Database::connect(&path).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        sqlx::query("PRAGMA foreign_keys = OFF").execute(&mut *conn).await.unwrap();
        sqlx::query(
            "INSERT INTO images (id, user_id, folder_id, url, created_at) VALUES ('i', 'u', 'gone', 'https://x', 0)",
        )
        .execute(&mut *conn)
        .await
        .unwrap();
        drop(conn);
        db.close().await;

        let err = Database::connect(&path).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Integrity(_)));
    }
}

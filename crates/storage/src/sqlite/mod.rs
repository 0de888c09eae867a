use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use std::time::{SystemTime, UNIX_EPOCH};

use livechat_core::PersistedSession;
use snafu::ResultExt;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use super::error::{
    CreateSqliteDirectorySnafu, DecodeRecordSnafu, EncodeRecordSnafu, SqliteConnectOptionsSnafu,
    SqliteConnectSnafu, SqliteMigrateSnafu, SqlitePragmaSnafu, SqliteQuerySnafu, StorageResult,
};
use super::{BoxFuture, SESSION_RECORD_KEY, SessionRecordStore};

/// Key/value record store backed by a single sqlite file.
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub async fn open(database_location: &str) -> StorageResult<Self> {
        ensure_database_directory(database_location)?;

        let database_url = normalize_database_url(database_location);
        let connect_options = SqliteConnectOptions::from_str(&database_url)
            .context(SqliteConnectOptionsSnafu {
                stage: "sqlite-open-parse-url",
                database_url: database_url.clone(),
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(5_000));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options)
            .await
            .context(SqliteConnectSnafu {
                stage: "sqlite-open-connect",
                database_url: database_url.clone(),
            })?;

        // Explicit PRAGMA write keeps bootstrap behavior deterministic across sqlite builds.
        let _: String = sqlx::query_scalar("PRAGMA journal_mode = WAL;")
            .fetch_one(&pool)
            .await
            .context(SqlitePragmaSnafu {
                stage: "sqlite-open-pragma-journal-mode",
                pragma: "journal_mode",
            })?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context(SqliteMigrateSnafu {
                stage: "sqlite-open-migrate",
            })?;

        tracing::debug!("opened session record store at {}", database_url);
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn read_record(&self, key: &'static str) -> StorageResult<Option<String>> {
        sqlx::query_scalar::<_, String>("SELECT payload_json FROM records WHERE key = ? LIMIT 1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .context(SqliteQuerySnafu {
                stage: "record-read-query",
            })
    }

    async fn write_record(&self, key: &'static str, payload_json: String) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO records (key, payload_json, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET payload_json = excluded.payload_json, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(payload_json)
        .bind(unix_timestamp_seconds())
        .execute(&self.pool)
        .await
        .context(SqliteQuerySnafu {
            stage: "record-write-upsert",
        })?;

        Ok(())
    }

    async fn delete_record(&self, key: &'static str) -> StorageResult<()> {
        sqlx::query("DELETE FROM records WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .context(SqliteQuerySnafu {
                stage: "record-delete",
            })?;

        Ok(())
    }
}

impl SessionRecordStore for SqliteStorage {
    fn load(&self) -> BoxFuture<'_, StorageResult<Option<PersistedSession>>> {
        Box::pin(async move {
            let Some(payload_json) = self.read_record(SESSION_RECORD_KEY).await? else {
                return Ok(None);
            };

            let record = serde_json::from_str::<PersistedSession>(&payload_json).context(
                DecodeRecordSnafu {
                    stage: "session-record-decode",
                    key: SESSION_RECORD_KEY,
                },
            )?;
            Ok(Some(record))
        })
    }

    fn save(&self, record: PersistedSession) -> BoxFuture<'_, StorageResult<()>> {
        Box::pin(async move {
            let payload_json = serde_json::to_string(&record).context(EncodeRecordSnafu {
                stage: "session-record-encode",
                key: SESSION_RECORD_KEY,
            })?;
            self.write_record(SESSION_RECORD_KEY, payload_json).await
        })
    }

    fn clear(&self) -> BoxFuture<'_, StorageResult<()>> {
        Box::pin(async move { self.delete_record(SESSION_RECORD_KEY).await })
    }
}

fn unix_timestamp_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0_i64, |duration| duration.as_secs() as i64)
}

fn ensure_database_directory(database_location: &str) -> StorageResult<()> {
    if database_location.starts_with("sqlite:") || database_location == ":memory:" {
        return Ok(());
    }

    let path = Path::new(database_location);
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context(CreateSqliteDirectorySnafu {
            stage: "sqlite-open-create-directory",
            path: parent.display().to_string(),
        })?;
    }

    Ok(())
}

fn normalize_database_url(database_location: &str) -> String {
    if database_location.starts_with("sqlite:") {
        return database_location.to_string();
    }

    if database_location == ":memory:" {
        return "sqlite::memory:".to_string();
    }

    format!("sqlite://{database_location}")
}

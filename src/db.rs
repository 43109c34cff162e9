use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;

use crate::constants::EXPECTED_DB_VERSION;
use crate::queries::{ddl, metadata};

type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Open a file-based database pool for production use
/// Creates the file if missing, enables WAL mode and foreign keys
pub async fn open_database_connection(db_path: &Path) -> Result<SqlitePool, DynError> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Create every table and index if they do not exist yet
pub async fn init_database_schema(pool: &SqlitePool) -> Result<(), DynError> {
    sqlx::query(&ddl::create_metadata_table()).execute(pool).await?;
    sqlx::query(&ddl::create_segments_table()).execute(pool).await?;
    sqlx::query(&ddl::create_transforms_table()).execute(pool).await?;
    sqlx::query(&ddl::create_segments_owner_index())
        .execute(pool)
        .await?;
    sqlx::query(&ddl::create_transforms_segment_id_index())
        .execute(pool)
        .await?;
    sqlx::query(&ddl::create_transforms_show_on_main_index())
        .execute(pool)
        .await?;
    Ok(())
}

/// Query a metadata value by key
pub async fn query_metadata(pool: &SqlitePool, key: &str) -> Result<Option<String>, DynError> {
    let value: Option<String> = sqlx::query_scalar(&metadata::select_by_key(key))
        .fetch_optional(pool)
        .await?;
    Ok(value)
}

/// Stamp a fresh database with the current schema version, or refuse one written by another version
pub async fn ensure_schema_version(pool: &SqlitePool) -> Result<(), DynError> {
    match query_metadata(pool, "version").await? {
        None => {
            sqlx::query(&metadata::insert("version", EXPECTED_DB_VERSION))
                .execute(pool)
                .await?;
            Ok(())
        }
        Some(version) if version == EXPECTED_DB_VERSION => Ok(()),
        Some(version) => Err(format!(
            "Unsupported database version: '{}'. This application only supports version '{}'",
            version, EXPECTED_DB_VERSION
        )
        .into()),
    }
}

/// Open, create and version-check the database in one go
pub async fn prepare_database(db_path: &Path) -> Result<SqlitePool, DynError> {
    let pool = open_database_connection(db_path).await?;
    init_database_schema(&pool).await?;
    ensure_schema_version(&pool).await?;
    Ok(pool)
}

/// Create a database in a temporary directory for testing
/// Keep the returned guard alive for as long as the pool is used
pub async fn create_test_connection_in_temporary_file(
) -> Result<(SqlitePool, tempfile::TempDir), DynError> {
    let guard = tempfile::tempdir()?;
    let db_path = guard.path().join("test.sqlite");
    let pool = open_database_connection(&db_path).await?;
    Ok((pool, guard))
}

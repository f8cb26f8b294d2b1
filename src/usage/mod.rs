use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::RunQueryDsl;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use serde::Serialize;

use crate::error::{LearningOsError, Result};

mod schema;
use schema::api_usage;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
const USAGE_UP_SQL: &str = include_str!("../../migrations/20260809_create_api_usage/up.sql");

type SqliteAsyncConn = SyncConnectionWrapper<SqliteConnection>;
type SqlitePool = Pool<SqliteAsyncConn>;
type SqlitePooledConn<'a> = PooledConnection<'a, SqliteAsyncConn>;

#[derive(Debug, Clone, Serialize)]
pub struct UsageItem {
    pub id: i32,
    pub endpoint_type: String,
    pub tokens_used: i32,
    pub success: bool,
    pub created_at: i64,
}

#[derive(Queryable)]
struct UsageRow {
    id: i32,
    endpoint_type: String,
    tokens_used: i32,
    success: bool,
    created_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = api_usage)]
struct NewUsage<'a> {
    endpoint_type: &'a str,
    tokens_used: i32,
    success: bool,
    created_at: i64,
}

/// Append-only request accounting. Doubles as the source of truth for the
/// rolling-minute rate check.
pub struct UsageStore {
    pool: SqlitePool,
}

impl UsageStore {
    pub async fn new(sqlite_path: impl AsRef<str>) -> Result<Self> {
        let sqlite_path = sqlite_path.as_ref();
        ensure_parent_dir(sqlite_path)?;
        run_migrations(sqlite_path).await?;
        ensure_usage_table(sqlite_path).await?;

        let manager = AsyncDieselConnectionManager::<SqliteAsyncConn>::new(sqlite_path);
        let pool: SqlitePool = Pool::builder()
            .build(manager)
            .await
            .map_err(|e| LearningOsError::Runtime(e.to_string()))?;
        Ok(Self { pool })
    }

    pub async fn record(&self, endpoint_type: &str, success: bool, tokens: usize) -> Result<()> {
        let new = NewUsage {
            endpoint_type,
            tokens_used: tokens.min(i32::MAX as usize) as i32,
            success,
            created_at: now_ts(),
        };

        let mut conn = self.conn().await?;
        diesel::insert_into(api_usage::table)
            .values(&new)
            .execute(&mut conn)
            .await
            .map_err(|e| LearningOsError::Runtime(e.to_string()))?;
        Ok(())
    }

    pub async fn count_since(&self, since_ts: i64) -> Result<usize> {
        let mut conn = self.conn().await?;
        let count: i64 = api_usage::table
            .filter(api_usage::created_at.ge(since_ts))
            .count()
            .get_result(&mut conn)
            .await
            .map_err(|e| LearningOsError::Runtime(e.to_string()))?;
        Ok(count.max(0) as usize)
    }

    pub async fn recent(&self, limit: usize) -> Result<Vec<UsageItem>> {
        let mut conn = self.conn().await?;
        let rows: Vec<UsageRow> = api_usage::table
            .order(api_usage::created_at.desc())
            .limit(limit as i64)
            .load(&mut conn)
            .await
            .map_err(|e| LearningOsError::Runtime(e.to_string()))?;
        Ok(rows.into_iter().map(map_row).collect())
    }

    async fn conn(&self) -> Result<SqlitePooledConn<'_>> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| LearningOsError::Runtime(e.to_string()))?;
        crate::db::tune_connection_async(&mut conn).await?;
        Ok(conn)
    }
}

fn ensure_parent_dir(path: &str) -> Result<()> {
    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| LearningOsError::Runtime(e.to_string()))?;
    }
    Ok(())
}

async fn run_migrations(database_url: &str) -> Result<()> {
    let database_url = database_url.to_string();
    tokio::task::spawn_blocking(move || {
        let mut conn = crate::db::open_connection_sync(&database_url)?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| LearningOsError::Runtime(e.to_string()))?;
        Ok::<_, LearningOsError>(())
    })
    .await
    .map_err(|e| LearningOsError::Runtime(e.to_string()))??;
    Ok(())
}

async fn ensure_usage_table(database_url: &str) -> Result<()> {
    let database_url = database_url.to_string();
    tokio::task::spawn_blocking(move || {
        let mut conn = crate::db::open_connection_sync(&database_url)?;

        let check = diesel::connection::SimpleConnection::batch_execute(
            &mut conn,
            "SELECT 1 FROM api_usage LIMIT 1",
        );
        if let Err(err) = check {
            let message = err.to_string();
            if message.contains("no such table") {
                conn.run_pending_migrations(MIGRATIONS)
                    .map_err(|e| LearningOsError::Runtime(e.to_string()))?;
                diesel::connection::SimpleConnection::batch_execute(&mut conn, USAGE_UP_SQL)
                    .map_err(|e| LearningOsError::Runtime(e.to_string()))?;
            } else {
                return Err(LearningOsError::Runtime(message));
            }
        }

        Ok::<_, LearningOsError>(())
    })
    .await
    .map_err(|e| LearningOsError::Runtime(e.to_string()))??;
    Ok(())
}

fn map_row(row: UsageRow) -> UsageItem {
    UsageItem {
        id: row.id,
        endpoint_type: row.endpoint_type,
        tokens_used: row.tokens_used,
        success: row.success,
        created_at: row.created_at,
    }
}

pub(crate) fn now_ts() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

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
use schema::saved_explanations;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
const EXPLANATIONS_UP_SQL: &str =
    include_str!("../../migrations/20260808_create_saved_explanations/up.sql");

type SqliteAsyncConn = SyncConnectionWrapper<SqliteConnection>;
type SqlitePool = Pool<SqliteAsyncConn>;
type SqlitePooledConn<'a> = PooledConnection<'a, SqliteAsyncConn>;

#[derive(Debug, Clone, Serialize)]
pub struct ExplanationItem {
    pub id: i32,
    pub user_id: String,
    pub query: String,
    pub explanation: String,
    pub tags: String,
    pub difficulty: String,
    pub created_at: i64,
}

#[derive(Queryable)]
struct ExplanationRow {
    id: i32,
    user_id: String,
    query: String,
    explanation: String,
    tags: String,
    difficulty: String,
    created_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = saved_explanations)]
struct NewExplanation<'a> {
    user_id: &'a str,
    query: &'a str,
    explanation: &'a str,
    tags: &'a str,
    difficulty: &'a str,
    created_at: i64,
}

pub struct ExplanationStore {
    pool: SqlitePool,
}

impl ExplanationStore {
    pub async fn new(sqlite_path: impl AsRef<str>) -> Result<Self> {
        let sqlite_path = sqlite_path.as_ref();
        ensure_parent_dir(sqlite_path)?;
        run_migrations(sqlite_path).await?;
        ensure_explanations_table(sqlite_path).await?;

        let manager = AsyncDieselConnectionManager::<SqliteAsyncConn>::new(sqlite_path);
        let pool: SqlitePool = Pool::builder()
            .build(manager)
            .await
            .map_err(|e| LearningOsError::Runtime(e.to_string()))?;
        Ok(Self { pool })
    }

    pub async fn save(
        &self,
        user_id: &str,
        query: &str,
        explanation: &str,
        tags: &str,
        difficulty: &str,
    ) -> Result<ExplanationItem> {
        let now = now_ts();
        let new = NewExplanation {
            user_id,
            query,
            explanation,
            tags,
            difficulty,
            created_at: now,
        };

        let mut conn = self.conn().await?;
        diesel::insert_into(saved_explanations::table)
            .values(&new)
            .execute(&mut conn)
            .await
            .map_err(|e| LearningOsError::Runtime(e.to_string()))?;

        let row: ExplanationRow = saved_explanations::table
            .filter(saved_explanations::user_id.eq(user_id))
            .order(saved_explanations::id.desc())
            .first(&mut conn)
            .await
            .map_err(|e| LearningOsError::Runtime(e.to_string()))?;
        Ok(map_row(row))
    }

    pub async fn list(&self, user_id: &str, limit: usize) -> Result<Vec<ExplanationItem>> {
        let mut conn = self.conn().await?;
        let rows: Vec<ExplanationRow> = saved_explanations::table
            .filter(saved_explanations::user_id.eq(user_id))
            .order(saved_explanations::created_at.desc())
            .limit(limit as i64)
            .load(&mut conn)
            .await
            .map_err(|e| LearningOsError::Runtime(e.to_string()))?;
        Ok(rows.into_iter().map(map_row).collect())
    }

    pub async fn delete(&self, id: i32) -> Result<bool> {
        let mut conn = self.conn().await?;
        let count =
            diesel::delete(saved_explanations::table.filter(saved_explanations::id.eq(id)))
                .execute(&mut conn)
                .await
                .map_err(|e| LearningOsError::Runtime(e.to_string()))?;
        Ok(count > 0)
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

async fn ensure_explanations_table(database_url: &str) -> Result<()> {
    let database_url = database_url.to_string();
    tokio::task::spawn_blocking(move || {
        let mut conn = crate::db::open_connection_sync(&database_url)?;

        let check = diesel::connection::SimpleConnection::batch_execute(
            &mut conn,
            "SELECT 1 FROM saved_explanations LIMIT 1",
        );
        if let Err(err) = check {
            let message = err.to_string();
            if message.contains("no such table") {
                conn.run_pending_migrations(MIGRATIONS)
                    .map_err(|e| LearningOsError::Runtime(e.to_string()))?;
                diesel::connection::SimpleConnection::batch_execute(
                    &mut conn,
                    EXPLANATIONS_UP_SQL,
                )
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

fn map_row(row: ExplanationRow) -> ExplanationItem {
    ExplanationItem {
        id: row.id,
        user_id: row.user_id,
        query: row.query,
        explanation: row.explanation,
        tags: row.tags,
        difficulty: row.difficulty,
        created_at: row.created_at,
    }
}

fn now_ts() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

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
use schema::knowledge_items;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
const KNOWLEDGE_UP_SQL: &str =
    include_str!("../../migrations/20260807_create_knowledge_items/up.sql");

type SqliteAsyncConn = SyncConnectionWrapper<SqliteConnection>;
type SqlitePool = Pool<SqliteAsyncConn>;
type SqlitePooledConn<'a> = PooledConnection<'a, SqliteAsyncConn>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Concept,
    Vocabulary,
    Grammar,
    Equation,
    Code,
    Table,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Concept => "concept",
            Self::Vocabulary => "vocabulary",
            Self::Grammar => "grammar",
            Self::Equation => "equation",
            Self::Code => "code",
            Self::Table => "table",
        }
    }

    pub fn from_option(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("vocabulary") => Self::Vocabulary,
            Some("grammar") => Self::Grammar,
            Some("equation") => Self::Equation,
            Some("code") => Self::Code,
            Some("table") => Self::Table,
            _ => Self::Concept,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeItem {
    pub id: i32,
    pub user_id: String,
    pub plan_id: Option<i32>,
    pub item_type: ItemType,
    pub term: String,
    pub definition: String,
    pub created_at: i64,
}

#[derive(Queryable)]
struct KnowledgeRow {
    id: i32,
    user_id: String,
    plan_id: Option<i32>,
    item_type: String,
    term: String,
    definition: String,
    created_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = knowledge_items)]
struct NewKnowledgeItem<'a> {
    user_id: &'a str,
    plan_id: Option<i32>,
    item_type: &'a str,
    term: &'a str,
    definition: &'a str,
    created_at: i64,
}

pub struct KnowledgeStore {
    pool: SqlitePool,
}

impl KnowledgeStore {
    pub async fn new(sqlite_path: impl AsRef<str>) -> Result<Self> {
        let sqlite_path = sqlite_path.as_ref();
        ensure_parent_dir(sqlite_path)?;
        run_migrations(sqlite_path).await?;
        ensure_knowledge_table(sqlite_path).await?;

        let manager = AsyncDieselConnectionManager::<SqliteAsyncConn>::new(sqlite_path);
        let pool: SqlitePool = Pool::builder()
            .build(manager)
            .await
            .map_err(|e| LearningOsError::Runtime(e.to_string()))?;
        Ok(Self { pool })
    }

    pub async fn add_item(
        &self,
        user_id: &str,
        plan_id: Option<i32>,
        item_type: ItemType,
        term: &str,
        definition: &str,
    ) -> Result<KnowledgeItem> {
        let now = now_ts();
        let new = NewKnowledgeItem {
            user_id,
            plan_id,
            item_type: item_type.as_str(),
            term,
            definition,
            created_at: now,
        };

        let mut conn = self.conn().await?;
        diesel::insert_into(knowledge_items::table)
            .values(&new)
            .execute(&mut conn)
            .await
            .map_err(|e| LearningOsError::Runtime(e.to_string()))?;

        let row: KnowledgeRow = knowledge_items::table
            .filter(knowledge_items::user_id.eq(user_id))
            .order(knowledge_items::id.desc())
            .first(&mut conn)
            .await
            .map_err(|e| LearningOsError::Runtime(e.to_string()))?;
        Ok(map_row(row))
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<KnowledgeItem>> {
        let mut conn = self.conn().await?;
        let rows: Vec<KnowledgeRow> = knowledge_items::table
            .filter(knowledge_items::user_id.eq(user_id))
            .order(knowledge_items::created_at.desc())
            .load(&mut conn)
            .await
            .map_err(|e| LearningOsError::Runtime(e.to_string()))?;
        Ok(rows.into_iter().map(map_row).collect())
    }

    pub async fn list_for_plan(&self, user_id: &str, plan_id: i32) -> Result<Vec<KnowledgeItem>> {
        let mut conn = self.conn().await?;
        let rows: Vec<KnowledgeRow> = knowledge_items::table
            .filter(knowledge_items::user_id.eq(user_id))
            .filter(knowledge_items::plan_id.eq(plan_id))
            .order(knowledge_items::created_at.desc())
            .load(&mut conn)
            .await
            .map_err(|e| LearningOsError::Runtime(e.to_string()))?;
        Ok(rows.into_iter().map(map_row).collect())
    }

    pub async fn delete_item(&self, id: i32) -> Result<bool> {
        let mut conn = self.conn().await?;
        let count = diesel::delete(knowledge_items::table.filter(knowledge_items::id.eq(id)))
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

async fn ensure_knowledge_table(database_url: &str) -> Result<()> {
    let database_url = database_url.to_string();
    tokio::task::spawn_blocking(move || {
        let mut conn = crate::db::open_connection_sync(&database_url)?;

        let check = diesel::connection::SimpleConnection::batch_execute(
            &mut conn,
            "SELECT 1 FROM knowledge_items LIMIT 1",
        );
        if let Err(err) = check {
            let message = err.to_string();
            if message.contains("no such table") {
                conn.run_pending_migrations(MIGRATIONS)
                    .map_err(|e| LearningOsError::Runtime(e.to_string()))?;
                diesel::connection::SimpleConnection::batch_execute(&mut conn, KNOWLEDGE_UP_SQL)
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

fn map_row(row: KnowledgeRow) -> KnowledgeItem {
    KnowledgeItem {
        id: row.id,
        user_id: row.user_id,
        plan_id: row.plan_id,
        item_type: ItemType::from_option(Some(&row.item_type)),
        term: row.term,
        definition: row.definition,
        created_at: row.created_at,
    }
}

fn now_ts() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_type_round_trips_and_defaults() {
        assert_eq!(ItemType::from_option(Some("code")), ItemType::Code);
        assert_eq!(ItemType::from_option(Some("Vocabulary")), ItemType::Vocabulary);
        assert_eq!(ItemType::from_option(Some("unknown")), ItemType::Concept);
        assert_eq!(ItemType::from_option(None), ItemType::Concept);
    }
}

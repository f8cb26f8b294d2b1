use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::{AsyncConnection, RunQueryDsl};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use serde::Serialize;

use crate::error::{LearningOsError, Result};

mod schema;
use schema::{daily_missions, plans};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
const PLANS_UP_SQL: &str = include_str!("../../migrations/20260805_create_plans/up.sql");
const MISSIONS_UP_SQL: &str =
    include_str!("../../migrations/20260806_create_daily_missions/up.sql");

type SqliteAsyncConn = SyncConnectionWrapper<SqliteConnection>;
type SqlitePool = Pool<SqliteAsyncConn>;
type SqlitePooledConn<'a> = PooledConnection<'a, SqliteAsyncConn>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MissionStatus {
    Pending,
    Current,
    Completed,
}

impl MissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Current => "current",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "current" => Self::Current,
            "completed" | "done" => Self::Completed,
            _ => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanItem {
    pub id: i32,
    pub user_id: String,
    pub learning_target: String,
    pub total_days: i32,
    pub difficulty: String,
    pub hours_per_day: i32,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MissionItem {
    pub id: i32,
    pub plan_id: i32,
    pub day_number: i32,
    pub title: String,
    pub description: String,
    pub detailed_content: String,
    pub status: MissionStatus,
    pub estimated_minutes: i32,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Parser output, not yet persisted. `status` is honored when present
/// (plan adjustments round-trip it); otherwise the store seeds statuses so
/// exactly one mission is current.
#[derive(Debug, Clone)]
pub struct MissionDraft {
    pub day_number: i32,
    pub title: String,
    pub description: String,
    pub detailed_content: String,
    pub status: Option<MissionStatus>,
}

#[derive(Queryable)]
struct PlanRow {
    id: i32,
    user_id: String,
    learning_target: String,
    total_days: i32,
    difficulty: String,
    hours_per_day: i32,
    created_at: i64,
    updated_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = plans)]
struct NewPlan<'a> {
    user_id: &'a str,
    learning_target: &'a str,
    total_days: i32,
    difficulty: &'a str,
    hours_per_day: i32,
    created_at: i64,
    updated_at: i64,
}

#[derive(Queryable)]
struct MissionRow {
    id: i32,
    plan_id: i32,
    day_number: i32,
    title: String,
    description: String,
    detailed_content: String,
    status: String,
    estimated_minutes: i32,
    created_at: i64,
    updated_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = daily_missions)]
struct NewMission<'a> {
    plan_id: i32,
    day_number: i32,
    title: &'a str,
    description: &'a str,
    detailed_content: &'a str,
    status: &'a str,
    estimated_minutes: i32,
    created_at: i64,
    updated_at: i64,
}

pub struct PlanStore {
    pool: SqlitePool,
}

impl PlanStore {
    pub async fn new(sqlite_path: impl AsRef<str>) -> Result<Self> {
        let sqlite_path = sqlite_path.as_ref();
        ensure_parent_dir(sqlite_path)?;
        run_migrations(sqlite_path).await?;
        ensure_plan_tables(sqlite_path).await?;

        let manager = AsyncDieselConnectionManager::<SqliteAsyncConn>::new(sqlite_path);
        let pool: SqlitePool = Pool::builder()
            .build(manager)
            .await
            .map_err(|e| LearningOsError::Runtime(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Persists a plan row and its mission batch in one transaction. Nothing
    /// is written until generation and parsing have already succeeded, and a
    /// mission-insert failure rolls the plan row back too, so a failed
    /// creation never leaves a partial plan behind.
    pub async fn create_plan(
        &self,
        user_id: &str,
        learning_target: &str,
        total_days: i32,
        difficulty: &str,
        hours_per_day: i32,
        missions: &[MissionDraft],
    ) -> Result<PlanItem> {
        let now = now_ts();
        let new = NewPlan {
            user_id,
            learning_target,
            total_days,
            difficulty,
            hours_per_day,
            created_at: now,
            updated_at: now,
        };

        let mut conn = self.conn().await?;
        let row = conn
            .transaction::<PlanRow, LearningOsError, _>(|conn| {
                async move {
                    diesel::insert_into(plans::table)
                        .values(&new)
                        .execute(conn)
                        .await?;

                    let row: PlanRow = plans::table
                        .filter(plans::user_id.eq(user_id))
                        .order(plans::id.desc())
                        .first(conn)
                        .await?;

                    insert_mission_batch(conn, row.id, missions, hours_per_day).await?;
                    Ok(row)
                }
                .scope_boxed()
            })
            .await?;
        Ok(map_plan_row(row))
    }

    pub async fn list_plans(&self, user_id: &str) -> Result<Vec<PlanItem>> {
        let mut conn = self.conn().await?;
        let rows: Vec<PlanRow> = plans::table
            .filter(plans::user_id.eq(user_id))
            .order(plans::created_at.desc())
            .load(&mut conn)
            .await
            .map_err(|e| LearningOsError::Runtime(e.to_string()))?;
        Ok(rows.into_iter().map(map_plan_row).collect())
    }

    pub async fn get_plan(&self, id: i32) -> Result<PlanItem> {
        let mut conn = self.conn().await?;
        let row: PlanRow = plans::table
            .filter(plans::id.eq(id))
            .first(&mut conn)
            .await
            .map_err(|e| LearningOsError::Runtime(e.to_string()))?;
        Ok(map_plan_row(row))
    }

    /// Deletes the plan, its missions, and any knowledge items saved under
    /// it. Missions are never deleted independently of their plan.
    pub async fn delete_plan(&self, id: i32) -> Result<bool> {
        let mut conn = self.conn().await?;
        let count = conn
            .transaction::<usize, LearningOsError, _>(|conn| {
                async move {
                    diesel::delete(
                        daily_missions::table.filter(daily_missions::plan_id.eq(id)),
                    )
                    .execute(conn)
                    .await?;
                    diesel::sql_query("DELETE FROM knowledge_items WHERE plan_id = ?")
                        .bind::<diesel::sql_types::Integer, _>(id)
                        .execute(conn)
                        .await?;
                    let count = diesel::delete(plans::table.filter(plans::id.eq(id)))
                        .execute(conn)
                        .await?;
                    Ok(count)
                }
                .scope_boxed()
            })
            .await?;
        Ok(count > 0)
    }

    pub async fn list_missions(&self, plan_id: i32) -> Result<Vec<MissionItem>> {
        let mut conn = self.conn().await?;
        let rows: Vec<MissionRow> = daily_missions::table
            .filter(daily_missions::plan_id.eq(plan_id))
            .order(daily_missions::day_number.asc())
            .load(&mut conn)
            .await
            .map_err(|e| LearningOsError::Runtime(e.to_string()))?;
        Ok(rows.into_iter().map(map_mission_row).collect())
    }

    pub async fn get_mission(&self, id: i32) -> Result<MissionItem> {
        let mut conn = self.conn().await?;
        let row: MissionRow = daily_missions::table
            .filter(daily_missions::id.eq(id))
            .first(&mut conn)
            .await
            .map_err(|e| LearningOsError::Runtime(e.to_string()))?;
        Ok(map_mission_row(row))
    }

    pub async fn set_mission_status(
        &self,
        id: i32,
        status: MissionStatus,
    ) -> Result<MissionItem> {
        let now = now_ts();
        let mut conn = self.conn().await?;
        diesel::update(daily_missions::table.filter(daily_missions::id.eq(id)))
            .set((
                daily_missions::status.eq(status.as_str()),
                daily_missions::updated_at.eq(now),
            ))
            .execute(&mut conn)
            .await
            .map_err(|e| LearningOsError::Runtime(e.to_string()))?;

        let row: MissionRow = daily_missions::table
            .filter(daily_missions::id.eq(id))
            .first(&mut conn)
            .await
            .map_err(|e| LearningOsError::Runtime(e.to_string()))?;
        Ok(map_mission_row(row))
    }

    /// Completes the current mission and promotes the next pending day.
    /// Returns the newly current mission, or None once the plan is finished.
    pub async fn advance(&self, plan_id: i32) -> Result<Option<MissionItem>> {
        let now = now_ts();
        let missions = self.list_missions(plan_id).await?;

        let mut conn = self.conn().await?;
        if let Some(current) = missions
            .iter()
            .find(|m| m.status == MissionStatus::Current)
        {
            diesel::update(daily_missions::table.filter(daily_missions::id.eq(current.id)))
                .set((
                    daily_missions::status.eq(MissionStatus::Completed.as_str()),
                    daily_missions::updated_at.eq(now),
                ))
                .execute(&mut conn)
                .await
                .map_err(|e| LearningOsError::Runtime(e.to_string()))?;
        }

        let next = missions.iter().find(|m| {
            m.status == MissionStatus::Pending
                && missions
                    .iter()
                    .filter(|c| c.status == MissionStatus::Current)
                    .all(|c| m.day_number > c.day_number)
        });

        let Some(next) = next else {
            return Ok(None);
        };

        diesel::update(daily_missions::table.filter(daily_missions::id.eq(next.id)))
            .set((
                daily_missions::status.eq(MissionStatus::Current.as_str()),
                daily_missions::updated_at.eq(now),
            ))
            .execute(&mut conn)
            .await
            .map_err(|e| LearningOsError::Runtime(e.to_string()))?;
        drop(conn);

        Ok(Some(self.get_mission(next.id).await?))
    }

    /// Swaps the plan's mission set for an adjusted one, atomically: a
    /// failure anywhere in the delete-and-reinsert rolls back to the prior
    /// mission set. Provided statuses are kept; the exactly-one-current
    /// invariant is re-established if the replacement lost it.
    pub async fn replace_missions(
        &self,
        plan_id: i32,
        missions: &[MissionDraft],
    ) -> Result<Vec<MissionItem>> {
        let now = now_ts();
        let plan = self.get_plan(plan_id).await?;

        let mut conn = self.conn().await?;
        conn.transaction::<(), LearningOsError, _>(|conn| {
            async move {
                diesel::delete(
                    daily_missions::table.filter(daily_missions::plan_id.eq(plan_id)),
                )
                .execute(conn)
                .await?;
                insert_mission_batch(conn, plan_id, missions, plan.hours_per_day).await?;
                diesel::update(plans::table.filter(plans::id.eq(plan_id)))
                    .set(plans::updated_at.eq(now))
                    .execute(conn)
                    .await?;
                Ok(())
            }
            .scope_boxed()
        })
        .await?;
        drop(conn);

        self.list_missions(plan_id).await
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

/// Seeds statuses so exactly one mission is current: explicit drafts win,
/// otherwise the lowest pending day is promoted.
fn seed_statuses(missions: &[MissionDraft]) -> Vec<MissionStatus> {
    let mut statuses: Vec<MissionStatus> = missions
        .iter()
        .map(|m| m.status.unwrap_or(MissionStatus::Pending))
        .collect();

    if statuses.iter().any(|s| *s == MissionStatus::Current) {
        return statuses;
    }

    let promote = missions
        .iter()
        .enumerate()
        .filter(|(idx, _)| statuses[*idx] == MissionStatus::Pending)
        .min_by_key(|(_, m)| m.day_number)
        .map(|(idx, _)| idx);
    if let Some(idx) = promote {
        statuses[idx] = MissionStatus::Current;
    }
    statuses
}

async fn insert_mission_batch(
    conn: &mut SqlitePooledConn<'_>,
    plan_id: i32,
    missions: &[MissionDraft],
    hours_per_day: i32,
) -> Result<()> {
    let now = now_ts();
    let statuses = seed_statuses(missions);
    let estimated_minutes = (hours_per_day.max(1)) * 60;

    for (draft, status) in missions.iter().zip(statuses.iter()) {
        let new = NewMission {
            plan_id,
            day_number: draft.day_number,
            title: &draft.title,
            description: draft.description.trim(),
            detailed_content: draft.detailed_content.trim(),
            status: status.as_str(),
            estimated_minutes,
            created_at: now,
            updated_at: now,
        };
        diesel::insert_into(daily_missions::table)
            .values(&new)
            .execute(conn)
            .await
            .map_err(|e| LearningOsError::Runtime(e.to_string()))?;
    }
    Ok(())
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

async fn ensure_plan_tables(database_url: &str) -> Result<()> {
    let database_url = database_url.to_string();
    tokio::task::spawn_blocking(move || {
        let mut conn = crate::db::open_connection_sync(&database_url)?;

        for (probe, up_sql) in [
            ("SELECT 1 FROM plans LIMIT 1", PLANS_UP_SQL),
            ("SELECT 1 FROM daily_missions LIMIT 1", MISSIONS_UP_SQL),
        ] {
            let check = diesel::connection::SimpleConnection::batch_execute(&mut conn, probe);
            if let Err(err) = check {
                let message = err.to_string();
                if message.contains("no such table") {
                    conn.run_pending_migrations(MIGRATIONS)
                        .map_err(|e| LearningOsError::Runtime(e.to_string()))?;
                    diesel::connection::SimpleConnection::batch_execute(&mut conn, up_sql)
                        .map_err(|e| LearningOsError::Runtime(e.to_string()))?;
                } else {
                    return Err(LearningOsError::Runtime(message));
                }
            }
        }

        Ok::<_, LearningOsError>(())
    })
    .await
    .map_err(|e| LearningOsError::Runtime(e.to_string()))??;
    Ok(())
}

fn map_plan_row(row: PlanRow) -> PlanItem {
    PlanItem {
        id: row.id,
        user_id: row.user_id,
        learning_target: row.learning_target,
        total_days: row.total_days,
        difficulty: row.difficulty,
        hours_per_day: row.hours_per_day,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

fn map_mission_row(row: MissionRow) -> MissionItem {
    MissionItem {
        id: row.id,
        plan_id: row.plan_id,
        day_number: row.day_number,
        title: row.title,
        description: row.description,
        detailed_content: row.detailed_content,
        status: MissionStatus::parse(&row.status),
        estimated_minutes: row.estimated_minutes,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

fn now_ts() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::SimpleAsyncConnection;

use crate::error::{LearningOsError, Result};

const CONNECTION_PRAGMAS: &str = "PRAGMA busy_timeout = 5000; PRAGMA foreign_keys = ON;";

pub fn open_connection_sync(database_url: &str) -> Result<SqliteConnection> {
    let mut conn = SqliteConnection::establish(database_url)
        .map_err(|e| LearningOsError::Runtime(e.to_string()))?;
    tune_connection_sync(&mut conn)?;
    Ok(conn)
}

pub fn tune_connection_sync(conn: &mut SqliteConnection) -> Result<()> {
    conn.batch_execute(CONNECTION_PRAGMAS)
        .map_err(|e| LearningOsError::Runtime(e.to_string()))
}

pub async fn tune_connection_async(
    conn: &mut SyncConnectionWrapper<SqliteConnection>,
) -> Result<()> {
    conn.batch_execute(CONNECTION_PRAGMAS)
        .await
        .map_err(|e| LearningOsError::Runtime(e.to_string()))
}

use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use super::Repository;
use crate::core::models::{Channel, User};
use crate::errors::BotError;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id              TEXT PRIMARY KEY,
        username        TEXT NOT NULL UNIQUE,
        access_token    TEXT NOT NULL,
        refresh_token   TEXT NOT NULL,
        token_expiry    TEXT NOT NULL,
        created_at      TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS channels (
        id              TEXT PRIMARY KEY,
        name            TEXT NOT NULL,
        owner_user_id   TEXT NOT NULL,
        broadcaster_id  TEXT NOT NULL,
        created_at      TEXT NOT NULL,
        UNIQUE(owner_user_id, name)
    );

    CREATE INDEX IF NOT EXISTS idx_channels_owner ON channels(owner_user_id);
";

const USER_COLUMNS: &str = "id, username, access_token, refresh_token, token_expiry, created_at";
const CHANNEL_COLUMNS: &str = "id, name, owner_user_id, broadcaster_id, created_at";

pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the schema cannot be
    /// created.
    pub fn open(path: &Path) -> Result<Self, BotError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let repo = Self::with_connection(conn)?;
        info!("Database opened at {}", path.display());
        Ok(repo)
    }

    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self, BotError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, BotError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T, BotError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| BotError::DatabaseError(format!("DB lock poisoned: {e}")))?;
        Ok(f(&conn)?)
    }
}

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        access_token: row.get(2)?,
        refresh_token: row.get(3)?,
        token_expiry: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn channel_from_row(row: &Row<'_>) -> rusqlite::Result<Channel> {
    let raw_id: String = row.get(0)?;
    Ok(Channel {
        id: Uuid::parse_str(&raw_id).map_err(|e| conversion_error(0, e))?,
        name: row.get(1)?,
        owner_user_id: row.get(2)?,
        broadcaster_id: row.get(3)?,
        created_at: row.get(4)?,
    })
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn get_users(&self) -> Result<Vec<User>, BotError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users ORDER BY created_at"
            ))?;
            let users = stmt.query_map([], user_from_row)?;
            users.collect()
        })
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, BotError> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                [id],
                user_from_row,
            )
            .optional()
        })
    }

    async fn save_user(&self, user: &User) -> Result<(), BotError> {
        self.with_conn(|conn| {
            conn.execute(
                &format!("INSERT INTO users ({USER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
                params![
                    user.id,
                    user.username,
                    user.access_token,
                    user.refresh_token,
                    user.token_expiry,
                    user.created_at
                ],
            )?;
            Ok(())
        })
    }

    async fn update_user(&self, user: &User) -> Result<(), BotError> {
        let updated = self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET username = ?2, access_token = ?3, refresh_token = ?4, token_expiry = ?5 WHERE id = ?1",
                params![
                    user.id,
                    user.username,
                    user.access_token,
                    user.refresh_token,
                    user.token_expiry
                ],
            )
        })?;
        if updated == 0 {
            return Err(BotError::NotFound(format!("user {}", user.id)));
        }
        Ok(())
    }

    async fn delete_user(&self, id: &str) -> Result<(), BotError> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    async fn get_channels_by_user(&self, user_id: &str) -> Result<Vec<Channel>, BotError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CHANNEL_COLUMNS} FROM channels WHERE owner_user_id = ?1 ORDER BY name"
            ))?;
            let channels = stmt.query_map([user_id], channel_from_row)?;
            channels.collect()
        })
    }

    async fn save_channel(&self, channel: &Channel) -> Result<(), BotError> {
        self.with_conn(|conn| {
            conn.execute(
                &format!("INSERT INTO channels ({CHANNEL_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"),
                params![
                    channel.id.to_string(),
                    channel.name,
                    channel.owner_user_id,
                    channel.broadcaster_id,
                    channel.created_at
                ],
            )?;
            Ok(())
        })
    }

    async fn get_channel(&self, id: Uuid) -> Result<Option<Channel>, BotError> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE id = ?1"),
                [id.to_string()],
                channel_from_row,
            )
            .optional()
        })
    }

    async fn delete_channel(&self, id: Uuid) -> Result<(), BotError> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM channels WHERE id = ?1", [id.to_string()])?;
            Ok(())
        })
    }
}

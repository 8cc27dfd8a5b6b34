use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Row, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::models::{Message, Role, Thread, DEFAULT_TITLE};

// Schema is applied with CREATE TABLE IF NOT EXISTS so startup is idempotent.
// Timestamps are Unix milliseconds.
const MIGRATIONS_SQL: &str = "
-- Threads Table
CREATE TABLE IF NOT EXISTS threads (
    id TEXT PRIMARY KEY NOT NULL, -- UUID
    owner_id TEXT NOT NULL,
    title TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    last_updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_threads_owner_id ON threads(owner_id);
CREATE INDEX IF NOT EXISTS idx_threads_last_updated_at ON threads(last_updated_at);

-- Messages Table
CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY NOT NULL, -- UUID
    thread_id TEXT NOT NULL,
    role TEXT NOT NULL, -- 'user' or 'assistant'
    content TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    FOREIGN KEY (thread_id) REFERENCES threads(id)
);
CREATE INDEX IF NOT EXISTS idx_messages_thread_id ON messages(thread_id);
CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp);

-- Application Settings Table (Key-Value)
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);
";

#[derive(Debug)]
pub struct StorageManager {
    pool: SqlitePool,
}

impl StorageManager {
    /// Opens (creating if necessary) the database at `db_path` and runs
    /// migrations.
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create database directory")?;
            }
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.to_string_lossy());
        Self::connect(&db_url).await
    }

    /// Connects to an explicit SQLite URL and runs migrations. In-memory
    /// databases are pinned to a single connection so every query sees the
    /// same instance.
    pub async fn connect(db_url: &str) -> Result<Self> {
        log::info!("Connecting to database: {}", db_url);

        if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
            log::info!("Database not found, creating...");
            Sqlite::create_database(db_url)
                .await
                .context("Failed to create database")?;
        }

        let max_connections = if db_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(db_url)
            .await
            .context("Failed to connect to SQLite database")?;

        Self::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<()> {
        log::info!("Running database migrations...");
        sqlx::query(MIGRATIONS_SQL)
            .execute(pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    /// Creates a new thread for `owner_id`. Falls back to the unnamed
    /// sentinel when no title is given.
    pub async fn create_thread(&self, owner_id: &str, title: Option<&str>) -> Result<Thread> {
        let now = Utc::now();
        let thread = Thread {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            title: title.unwrap_or(DEFAULT_TITLE).to_string(),
            created_at: now,
            last_updated_at: now,
        };

        sqlx::query(
            "INSERT INTO threads (id, owner_id, title, created_at, last_updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(thread.id.to_string())
        .bind(&thread.owner_id)
        .bind(&thread.title)
        .bind(thread.created_at.timestamp_millis())
        .bind(thread.last_updated_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to insert new thread into database")?;

        log::info!("Created thread {} for owner {}", thread.id, owner_id);
        Ok(thread)
    }

    /// Fetches all threads for an owner, most recently updated first.
    pub async fn get_threads(&self, owner_id: &str) -> Result<Vec<Thread>> {
        let rows = sqlx::query(
            "SELECT id, owner_id, title, created_at, last_updated_at
             FROM threads
             WHERE owner_id = ?
             ORDER BY last_updated_at DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch threads from database")?;

        rows.iter().map(thread_from_row).collect()
    }

    /// Fetches a single thread by its ID.
    pub async fn get_thread(&self, thread_id: Uuid) -> Result<Option<Thread>> {
        let row = sqlx::query(
            "SELECT id, owner_id, title, created_at, last_updated_at
             FROM threads
             WHERE id = ?",
        )
        .bind(thread_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch thread from database")?;

        row.as_ref().map(thread_from_row).transpose()
    }

    /// Fetches all messages for a thread, oldest first. Insertion order
    /// breaks ties between equal timestamps.
    pub async fn get_messages(&self, thread_id: Uuid) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT id, thread_id, role, content, timestamp
             FROM messages
             WHERE thread_id = ?
             ORDER BY timestamp ASC, rowid ASC",
        )
        .bind(thread_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch messages from database")?;

        rows.iter().map(message_from_row).collect()
    }

    /// Appends a message to its thread and bumps the thread's
    /// last-updated timestamp.
    pub async fn append_message(&self, message: &Message) -> Result<()> {
        sqlx::query(
            "INSERT INTO messages (id, thread_id, role, content, timestamp)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(message.id.to_string())
        .bind(message.thread_id.to_string())
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(message.timestamp.timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to insert message into database")?;

        sqlx::query("UPDATE threads SET last_updated_at = ? WHERE id = ?")
            .bind(Utc::now().timestamp_millis())
            .bind(message.thread_id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to update thread last_updated_at timestamp")?;

        log::debug!("Saved message {} to thread {}", message.id, message.thread_id);
        Ok(())
    }

    /// Renames a thread and bumps its last-updated timestamp. Errors when
    /// the thread does not exist.
    pub async fn rename_thread(&self, thread_id: Uuid, new_title: &str) -> Result<()> {
        let result = sqlx::query("UPDATE threads SET title = ?, last_updated_at = ? WHERE id = ?")
            .bind(new_title)
            .bind(Utc::now().timestamp_millis())
            .bind(thread_id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to update thread title in database")?;

        if result.rows_affected() == 0 {
            log::warn!("Attempted to rename non-existent thread: {}", thread_id);
            return Err(anyhow::anyhow!("Thread not found for renaming."));
        }

        log::info!("Renamed thread {} to: {}", thread_id, new_title);
        Ok(())
    }

    /// Deletes a thread and all of its messages in one transaction so a
    /// caller never observes a partially deleted thread. Deleting an absent
    /// thread is not an error.
    pub async fn delete_thread(&self, thread_id: Uuid) -> Result<()> {
        let thread_id_text = thread_id.to_string();
        log::warn!("Deleting thread with ID: {}", thread_id_text);

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin delete transaction")?;

        sqlx::query("DELETE FROM messages WHERE thread_id = ?")
            .bind(&thread_id_text)
            .execute(&mut *tx)
            .await
            .context("Failed to delete thread messages from database")?;

        let result = sqlx::query("DELETE FROM threads WHERE id = ?")
            .bind(&thread_id_text)
            .execute(&mut *tx)
            .await
            .context("Failed to delete thread from database")?;

        tx.commit()
            .await
            .context("Failed to commit delete transaction")?;

        if result.rows_affected() == 0 {
            log::warn!("Attempted to delete non-existent thread: {}", thread_id);
        }
        Ok(())
    }

    // --- Settings (Key-Value) ---
    //
    // Small JSON documents live here under fixed keys; the title cache and
    // the custom API key store are built on top of these three calls.

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to read setting from database")?;

        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .context("Failed to write setting to database")?;
        Ok(())
    }

    pub async fn delete_setting(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .context("Failed to delete setting from database")?;
        Ok(())
    }
}

fn thread_from_row(row: &SqliteRow) -> Result<Thread> {
    Ok(Thread {
        id: Uuid::parse_str(row.get("id")).context("Failed to parse thread ID")?,
        owner_id: row.get("owner_id"),
        title: row.get("title"),
        created_at: millis_to_datetime(row.get("created_at"))?,
        last_updated_at: millis_to_datetime(row.get("last_updated_at"))?,
    })
}

fn message_from_row(row: &SqliteRow) -> Result<Message> {
    Ok(Message {
        id: Uuid::parse_str(row.get("id")).context("Failed to parse message ID")?,
        thread_id: Uuid::parse_str(row.get("thread_id"))
            .context("Failed to parse thread ID for message")?,
        role: Role::parse(row.get("role"))?,
        content: row.get("content"),
        timestamp: millis_to_datetime(row.get("timestamp"))?,
    })
}

fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).context("Invalid timestamp")
}

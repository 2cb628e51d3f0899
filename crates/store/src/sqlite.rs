//! SQLite clinical store.
//!
//! One database file with four tables (`profiles`, `conversations`,
//! `messages`, `knowledge`). Timestamps are stored as fixed-width RFC 3339
//! UTC strings (microsecond precision, `Z` suffix) so lexical order matches
//! chronological order. List columns (allergies, tags) are JSON arrays.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use medctx_core::clinical::{
    ChatMessage, ClinicalStore, ConversationRecord, KnowledgeEntry, MessageRole, PatientProfile,
};
use medctx_core::error::StoreError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

use crate::seed::Seed;

/// A SQLite-backed clinical store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a SQLite database.
    ///
    /// Tables and indexes are created automatically. `":memory:"` gives an
    /// ephemeral single-connection database.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let in_memory = path.contains(":memory:");
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(if in_memory {
                SqliteJournalMode::Memory
            } else {
                SqliteJournalMode::Wal
            })
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 4 })
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite clinical store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        let statements = [
            (
                "profiles table",
                r#"
                CREATE TABLE IF NOT EXISTS profiles (
                    id         TEXT PRIMARY KEY,
                    name       TEXT NOT NULL DEFAULT '',
                    allergies  TEXT NOT NULL DEFAULT '[]'
                )
                "#,
            ),
            (
                "conversations table",
                r#"
                CREATE TABLE IF NOT EXISTS conversations (
                    id             TEXT PRIMARY KEY,
                    subject_id     TEXT NOT NULL,
                    topic          TEXT NOT NULL DEFAULT 'General',
                    created_at     TEXT NOT NULL,
                    message_count  INTEGER NOT NULL DEFAULT 0
                )
                "#,
            ),
            (
                "messages table",
                r#"
                CREATE TABLE IF NOT EXISTS messages (
                    id               TEXT PRIMARY KEY,
                    conversation_id  TEXT NOT NULL,
                    role             TEXT NOT NULL,
                    content          TEXT NOT NULL,
                    timestamp        TEXT NOT NULL
                )
                "#,
            ),
            (
                "knowledge table",
                r#"
                CREATE TABLE IF NOT EXISTS knowledge (
                    id          TEXT PRIMARY KEY,
                    title       TEXT NOT NULL,
                    content     TEXT NOT NULL,
                    specialty   TEXT NOT NULL,
                    tags        TEXT NOT NULL DEFAULT '[]',
                    created_at  TEXT NOT NULL
                )
                "#,
            ),
            (
                "conversations index",
                "CREATE INDEX IF NOT EXISTS idx_conversations_subject ON conversations(subject_id, created_at DESC)",
            ),
            (
                "messages index",
                "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, timestamp DESC)",
            ),
            (
                "knowledge index",
                "CREATE INDEX IF NOT EXISTS idx_knowledge_specialty ON knowledge(specialty)",
            ),
        ];

        for (label, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("{label}: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Import seed data in one transaction, replacing rows with the same id.
    pub async fn import(&self, seed: Seed) -> Result<(), StoreError> {
        seed.validate()?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("BEGIN failed: {e}")))?;

        for p in &seed.profiles {
            let allergies = to_json(&p.allergies)?;
            sqlx::query("INSERT OR REPLACE INTO profiles (id, name, allergies) VALUES (?1, ?2, ?3)")
                .bind(&p.id)
                .bind(&p.name)
                .bind(&allergies)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::Storage(format!("profile insert: {e}")))?;
        }

        for c in &seed.conversations {
            sqlx::query(
                "INSERT OR REPLACE INTO conversations (id, subject_id, topic, created_at, message_count) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(&c.id)
            .bind(&c.subject_id)
            .bind(&c.topic)
            .bind(timestamp(&c.created_at))
            .bind(i64::from(c.message_count))
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("conversation insert: {e}")))?;
        }

        for m in &seed.messages {
            sqlx::query(
                "INSERT OR REPLACE INTO messages (id, conversation_id, role, content, timestamp) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(&m.id)
            .bind(&m.conversation_id)
            .bind(m.role.as_str())
            .bind(&m.content)
            .bind(timestamp(&m.timestamp))
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("message insert: {e}")))?;
        }

        for k in &seed.knowledge {
            let tags = to_json(&k.tags)?;
            sqlx::query(
                "INSERT OR REPLACE INTO knowledge (id, title, content, specialty, tags, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(&k.id)
            .bind(&k.title)
            .bind(&k.content)
            .bind(&k.specialty)
            .bind(&tags)
            .bind(timestamp(&k.created_at))
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("knowledge insert: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("COMMIT failed: {e}")))?;
        info!(
            profiles = seed.profiles.len(),
            conversations = seed.conversations.len(),
            messages = seed.messages.len(),
            knowledge = seed.knowledge.len(),
            "Seed imported into SQLite"
        );
        Ok(())
    }

    fn row_to_conversation(row: &sqlx::sqlite::SqliteRow) -> Result<ConversationRecord, StoreError> {
        let count: i64 = get(row, "message_count")?;
        Ok(ConversationRecord {
            id: get(row, "id")?,
            subject_id: get(row, "subject_id")?,
            topic: get(row, "topic")?,
            created_at: parse_timestamp(&get::<String>(row, "created_at")?)?,
            message_count: u32::try_from(count).unwrap_or(0),
        })
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<ChatMessage, StoreError> {
        Ok(ChatMessage {
            id: get(row, "id")?,
            conversation_id: get(row, "conversation_id")?,
            role: get::<String>(row, "role")?.parse()?,
            content: get(row, "content")?,
            timestamp: parse_timestamp(&get::<String>(row, "timestamp")?)?,
        })
    }

    fn row_to_knowledge(row: &sqlx::sqlite::SqliteRow) -> Result<KnowledgeEntry, StoreError> {
        Ok(KnowledgeEntry {
            id: get(row, "id")?,
            title: get(row, "title")?,
            content: get(row, "content")?,
            specialty: get(row, "specialty")?,
            tags: serde_json::from_str(&get::<String>(row, "tags")?).unwrap_or_default(),
            created_at: parse_timestamp(&get::<String>(row, "created_at")?)?,
        })
    }
}

fn get<'r, T>(row: &'r sqlx::sqlite::SqliteRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(column)
        .map_err(|e| StoreError::QueryFailed(format!("{column} column: {e}")))
}

fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::QueryFailed(format!("bad timestamp '{raw}': {e}")))
}

fn to_json(list: &[String]) -> Result<String, StoreError> {
    serde_json::to_string(list).map_err(|e| StoreError::Storage(format!("JSON encode: {e}")))
}

/// Escape LIKE wildcards so user terms match literally.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[async_trait]
impl ClinicalStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn recent_conversations(
        &self,
        subject_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM conversations WHERE subject_id = ?1 ORDER BY created_at DESC LIMIT ?2",
        )
        .bind(subject_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("recent conversations: {e}")))?;

        rows.iter().map(Self::row_to_conversation).collect()
    }

    async fn messages_in(
        &self,
        conversation_ids: &[String],
        limit: usize,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        if conversation_ids.is_empty() {
            return Ok(vec![]);
        }
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM messages WHERE conversation_id IN (");
        let mut separated = qb.separated(", ");
        for id in conversation_ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(") ORDER BY timestamp DESC LIMIT ");
        qb.push_bind(limit as i64);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("messages in conversations: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn patient_profile(&self, subject_id: &str) -> Result<Option<PatientProfile>, StoreError> {
        let row = sqlx::query("SELECT * FROM profiles WHERE id = ?1")
            .bind(subject_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("profile lookup: {e}")))?;

        match row {
            Some(row) => Ok(Some(PatientProfile {
                id: get(&row, "id")?,
                name: get(&row, "name")?,
                allergies: serde_json::from_str(&get::<String>(&row, "allergies")?)
                    .unwrap_or_default(),
            })),
            None => Ok(None),
        }
    }

    async fn knowledge_for(
        &self,
        specialties: &[&str],
        limit: usize,
    ) -> Result<Vec<KnowledgeEntry>, StoreError> {
        if specialties.is_empty() {
            return Ok(vec![]);
        }
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM knowledge WHERE specialty IN (");
        let mut separated = qb.separated(", ");
        for specialty in specialties {
            separated.push_bind(*specialty);
        }
        separated.push_unseparated(") ORDER BY rowid LIMIT ");
        qb.push_bind(limit as i64);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("knowledge lookup: {e}")))?;

        rows.iter().map(Self::row_to_knowledge).collect()
    }

    async fn messages_mentioning(
        &self,
        term: &str,
        since: Option<DateTime<Utc>>,
        role: Option<MessageRole>,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        if term.trim().is_empty() {
            return Ok(vec![]);
        }
        let rows = sqlx::query(
            r#"
            SELECT * FROM messages
            WHERE LOWER(content) LIKE ?1 ESCAPE '\'
              AND (?2 IS NULL OR timestamp >= ?2)
              AND (?3 IS NULL OR role = ?3)
            ORDER BY timestamp DESC
            LIMIT ?4
            "#,
        )
        .bind(like_pattern(term))
        .bind(since.as_ref().map(timestamp))
        .bind(role.map(|r| r.as_str()))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("mention search: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("ping failed: {e}")))?;
        Ok(())
    }
}

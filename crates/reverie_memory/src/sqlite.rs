use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reverie_core::emotion::EmotionVector;
use reverie_core::record::{clamp_importance, kinds};
use reverie_core::{
    Counts, EmotionSnapshot, EmotionStore, MemoryLog, MemoryRecord, NewRecord, TimeMarker,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use std::str::FromStr;

const RECORD_COLUMNS: &str =
    "id, timestamp, kind, content, emotion, thread_id, importance, metadata";

/// Fixed-width RFC 3339 so lexical order equals chronological order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("Invalid timestamp in database: {}", s))
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[derive(Clone)]
pub struct SqliteMemory {
    pool: Pool<Sqlite>,
}

impl SqliteMemory {
    /// Open (creating if missing) the database at `db_path`. `":memory:"` gives a
    /// private in-memory database.
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref().display().to_string();
        let in_memory = path == ":memory:";

        let options = if in_memory {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .context("Failed to build in-memory database options")?
        } else {
            SqliteConnectOptions::new().filename(db_path.as_ref())
        }
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

        let mut pool_options = SqlitePoolOptions::new().after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA synchronous = NORMAL").execute(conn).await?;
                Ok(())
            })
        });
        if in_memory {
            // One long-lived connection so the in-memory database outlives idle periods.
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        let memory = Self { pool };
        memory.migrate().await?;
        tracing::debug!("Memory log opened at {}", path);
        Ok(memory)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS memories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                kind TEXT NOT NULL,
                content TEXT NOT NULL,
                emotion TEXT,
                thread_id TEXT,
                importance REAL NOT NULL DEFAULT 0.5,
                metadata TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create memories table")?;

        for (name, column) in [
            ("idx_memories_kind", "kind"),
            ("idx_memories_timestamp", "timestamp"),
            ("idx_memories_thread", "thread_id"),
            ("idx_memories_importance", "importance"),
        ] {
            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS {} ON memories({})",
                name, column
            ))
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to create index {}", name))?;
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS emotional_state (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                curiosity REAL NOT NULL,
                satisfaction REAL NOT NULL,
                frustration REAL NOT NULL,
                excitement REAL NOT NULL,
                focus REAL NOT NULL,
                empathy REAL NOT NULL,
                confidence REAL NOT NULL,
                trigger TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create emotional_state table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS time_markers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event TEXT NOT NULL,
                notes TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create time_markers table")?;

        Ok(())
    }

    fn row_to_record(row: &SqliteRow) -> Result<MemoryRecord> {
        let ts: String = row.try_get("timestamp")?;
        let emotion: Option<String> = row.try_get("emotion")?;
        let metadata: Option<String> = row.try_get("metadata")?;
        let importance: f64 = row.try_get("importance")?;

        let emotion = emotion.and_then(|s| match serde_json::from_str::<EmotionVector>(&s) {
            Ok(mut v) => {
                v.clamp();
                Some(v)
            }
            Err(e) => {
                tracing::debug!("Skipping unreadable emotion column: {}", e);
                None
            }
        });
        let metadata = metadata.and_then(|s| match serde_json::from_str(&s) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::debug!("Skipping unreadable metadata column: {}", e);
                None
            }
        });

        Ok(MemoryRecord {
            id: row.try_get("id")?,
            timestamp: parse_timestamp(&ts)?,
            kind: row.try_get("kind")?,
            content: row.try_get("content")?,
            emotion,
            thread_id: row.try_get("thread_id")?,
            importance: clamp_importance(importance as f32),
            metadata,
        })
    }

    fn rows_to_records(rows: &[SqliteRow]) -> Result<Vec<MemoryRecord>> {
        rows.iter().map(Self::row_to_record).collect()
    }

    /// Most recent lifecycle markers, newest first.
    pub async fn recent_markers(&self, limit: usize) -> Result<Vec<TimeMarker>> {
        let rows = sqlx::query(
            "SELECT id, timestamp, event, notes FROM time_markers ORDER BY timestamp DESC, id DESC LIMIT ?",
        )
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await
        .context("Failed to load time markers")?;

        rows.iter()
            .map(|row| -> Result<TimeMarker> {
                let ts: String = row.try_get("timestamp")?;
                Ok(TimeMarker {
                    id: row.try_get("id")?,
                    timestamp: parse_timestamp(&ts)?,
                    event: row.try_get("event")?,
                    notes: row.try_get("notes")?,
                })
            })
            .collect()
    }

    /// Most recent emotion snapshots, oldest first.
    pub async fn emotion_history(&self, limit: usize) -> Result<Vec<EmotionSnapshot>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM (
                SELECT id, timestamp, curiosity, satisfaction, frustration, excitement,
                       focus, empathy, confidence, trigger
                FROM emotional_state ORDER BY timestamp DESC, id DESC LIMIT ?
            ) ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await
        .context("Failed to load emotion history")?;

        rows.iter().map(row_to_snapshot).collect()
    }
}

fn row_to_snapshot(row: &SqliteRow) -> Result<EmotionSnapshot> {
    let ts: String = row.try_get("timestamp")?;
    let get = |col: &str| -> Result<f32> { Ok(row.try_get::<f64, _>(col)? as f32) };
    let mut emotion = EmotionVector {
        curiosity: get("curiosity")?,
        satisfaction: get("satisfaction")?,
        frustration: get("frustration")?,
        excitement: get("excitement")?,
        focus: get("focus")?,
        empathy: get("empathy")?,
        confidence: get("confidence")?,
    };
    emotion.clamp();
    Ok(EmotionSnapshot {
        timestamp: parse_timestamp(&ts)?,
        emotion,
        trigger: row.try_get("trigger")?,
    })
}

#[async_trait]
impl MemoryLog for SqliteMemory {
    async fn append(&self, record: NewRecord) -> Result<i64> {
        let now = format_timestamp(&Utc::now());
        let emotion = record
            .emotion
            .map(|e| serde_json::to_string(&e))
            .transpose()
            .context("Failed to serialize emotion snapshot")?;
        let metadata = record
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to serialize metadata")?;

        let id = sqlx::query(
            r#"
            INSERT INTO memories (timestamp, kind, content, emotion, thread_id, importance, metadata)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&now)
        .bind(&record.kind)
        .bind(&record.content)
        .bind(&emotion)
        .bind(&record.thread_id)
        .bind(clamp_importance(record.importance) as f64)
        .bind(&metadata)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to append {} record", record.kind))?
        .last_insert_rowid();

        tracing::trace!("Appended {} record #{}", record.kind, id);
        Ok(id)
    }

    async fn recent(&self, kind: Option<&str>, limit: usize) -> Result<Vec<MemoryRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let rows = match kind {
            Some(kind) => {
                sqlx::query(&format!(
                    "SELECT {} FROM memories WHERE kind = ? ORDER BY timestamp DESC, id DESC LIMIT ?",
                    RECORD_COLUMNS
                ))
                .bind(kind)
                .bind(sql_limit(limit))
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM memories ORDER BY timestamp DESC, id DESC LIMIT ?",
                    RECORD_COLUMNS
                ))
                .bind(sql_limit(limit))
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("Failed to load recent memories")?;

        Self::rows_to_records(&rows)
    }

    async fn by_thread(&self, thread_id: &str, limit: usize) -> Result<Vec<MemoryRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&format!(
            "SELECT {} FROM memories WHERE thread_id = ? ORDER BY timestamp DESC, id DESC LIMIT ?",
            RECORD_COLUMNS
        ))
        .bind(thread_id)
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await
        .context("Failed to load thread history")?;

        let mut records = Self::rows_to_records(&rows)?;
        records.reverse();
        Ok(records)
    }

    /// Case folding is ASCII-only on both sides; other characters match exactly.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<MemoryRecord>> {
        let tokens: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_ascii_lowercase())
            .collect();
        if tokens.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let conditions = vec!["instr(lower(content), ?) > 0"; tokens.len()].join(" AND ");
        let sql = format!(
            "SELECT {} FROM memories WHERE {} ORDER BY importance DESC, timestamp DESC, id DESC LIMIT ?",
            RECORD_COLUMNS, conditions
        );

        let mut q = sqlx::query(&sql);
        for token in &tokens {
            q = q.bind(token);
        }
        let rows = q
            .bind(sql_limit(limit))
            .fetch_all(&self.pool)
            .await
            .context("Failed to search memories")?;

        Self::rows_to_records(&rows)
    }

    async fn counts(&self) -> Result<Counts> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, COALESCE(SUM(CASE WHEN kind = ? THEN 1 ELSE 0 END), 0) AS thoughts FROM memories",
        )
        .bind(kinds::THOUGHT)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count memories")?;

        let total: i64 = row.try_get("total")?;
        let thoughts: i64 = row.try_get("thoughts")?;
        Ok(Counts {
            total: total.max(0) as u64,
            thoughts: thoughts.max(0) as u64,
        })
    }

    async fn first_record(&self) -> Result<Option<MemoryRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM memories ORDER BY timestamp ASC, id ASC LIMIT 1",
            RECORD_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load first memory")?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn last_interaction(&self) -> Result<Option<MemoryRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM memories WHERE kind IN (?, ?) ORDER BY timestamp DESC, id DESC LIMIT 1",
            RECORD_COLUMNS
        ))
        .bind(kinds::USER_MESSAGE)
        .bind(kinds::RESPONSE)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load last interaction")?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn mark_time(&self, event: &str, note: Option<&str>) -> Result<()> {
        sqlx::query("INSERT INTO time_markers (timestamp, event, notes) VALUES (?, ?, ?)")
            .bind(format_timestamp(&Utc::now()))
            .bind(event)
            .bind(note)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to write time marker {}", event))?;
        tracing::debug!("Time marker: {}", event);
        Ok(())
    }
}

#[async_trait]
impl EmotionStore for SqliteMemory {
    async fn record_emotion(&self, snapshot: &EmotionSnapshot) -> Result<()> {
        let e = &snapshot.emotion;
        sqlx::query(
            r#"
            INSERT INTO emotional_state
                (timestamp, curiosity, satisfaction, frustration, excitement, focus, empathy, confidence, trigger)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(format_timestamp(&snapshot.timestamp))
        .bind(e.curiosity as f64)
        .bind(e.satisfaction as f64)
        .bind(e.frustration as f64)
        .bind(e.excitement as f64)
        .bind(e.focus as f64)
        .bind(e.empathy as f64)
        .bind(e.confidence as f64)
        .bind(&snapshot.trigger)
        .execute(&self.pool)
        .await
        .context("Failed to record emotion snapshot")?;

        tracing::trace!("Emotion snapshot recorded (trigger={:?})", snapshot.trigger);
        Ok(())
    }

    async fn latest_emotion(&self) -> Result<Option<EmotionSnapshot>> {
        let row = sqlx::query(
            r#"
            SELECT id, timestamp, curiosity, satisfaction, frustration, excitement,
                   focus, empathy, confidence, trigger
            FROM emotional_state ORDER BY timestamp DESC, id DESC LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load latest emotion snapshot")?;

        row.as_ref().map(row_to_snapshot).transpose()
    }
}

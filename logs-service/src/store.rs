//! Append-only audit store.
//!
//! `append` is the only mutation; nothing ever updates or deletes a record.
//! `store_id` is assigned here, once, monotonically increasing in write order;
//! `stored_at` is stamped at successful write time and is distinct from the
//! producer-owned `occurred_at`. Redelivered messages are appended again on
//! purpose: two records with different `store_id`s for one logical event is
//! the accepted at-least-once trade-off.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common_events::AuditEvent;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;

/// Persisted form of an audit event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub store_id: i64,
    pub message: String,
    pub category: String,
    pub operation: String,
    pub occurred_at: DateTime<Utc>,
    pub stored_at: DateTime<Utc>,
}

/// One page of records, newest stored first, plus total-count metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub records: Vec<AuditRecord>,
    pub page: i64,
    pub size: i64,
    pub total: i64,
}

/// Transient persistence failure. The consumer reacts by requeueing the
/// message, never by dropping it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("audit store unavailable")]
    Unavailable,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Appends one record and returns its `store_id`.
    async fn append(&self, event: &AuditEvent) -> Result<i64, StoreError>;

    /// Page `page` (zero-based) of `size` records ordered by `stored_at`
    /// descending, `store_id` descending as the tie-break.
    async fn query(&self, page: i64, size: i64) -> Result<Page, StoreError>;
}

pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the `logs` table and its read index if they do not exist.
    /// Safe to run on every startup.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS logs (
                store_id BIGSERIAL PRIMARY KEY,
                message TEXT NOT NULL,
                category TEXT NOT NULL,
                operation TEXT NOT NULL,
                occurred_at TIMESTAMPTZ NOT NULL,
                stored_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )"#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_logs_stored_at ON logs (stored_at DESC, store_id DESC)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn append(&self, event: &AuditEvent) -> Result<i64, StoreError> {
        let store_id: i64 = sqlx::query_scalar(
            r#"INSERT INTO logs (message, category, operation, occurred_at)
               VALUES ($1, $2, $3, $4)
               RETURNING store_id"#,
        )
        .bind(&event.message)
        .bind(event.category.as_str())
        .bind(event.operation.as_str())
        .bind(event.occurred_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(store_id)
    }

    async fn query(&self, page: i64, size: i64) -> Result<Page, StoreError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM logs")
            .fetch_one(&self.pool)
            .await?;
        // An offset past i64 range is just a page past the end of the data.
        let Some(offset) = page.checked_mul(size) else {
            return Ok(Page { records: Vec::new(), page, size, total });
        };
        let records = sqlx::query_as::<_, AuditRecord>(
            r#"SELECT store_id, message, category, operation, occurred_at, stored_at
               FROM logs
               ORDER BY stored_at DESC, store_id DESC
               LIMIT $1 OFFSET $2"#,
        )
        .bind(size)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(Page { records, page, size, total })
    }
}

/// In-memory store with the same contract, for tests and local development.
#[derive(Default)]
pub struct MemoryAuditStore {
    inner: Mutex<MemoryInner>,
    unavailable: AtomicBool,
}

#[derive(Default)]
struct MemoryInner {
    records: Vec<AuditRecord>,
    next_id: i64,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates a down store: every call fails with `Unavailable` until
    /// flipped back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable);
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, event: &AuditEvent) -> Result<i64, StoreError> {
        self.check_available()?;
        let mut inner = self.lock();
        inner.next_id += 1;
        let store_id = inner.next_id;
        inner.records.push(AuditRecord {
            store_id,
            message: event.message.clone(),
            category: event.category.as_str().to_string(),
            operation: event.operation.as_str().to_string(),
            occurred_at: event.occurred_at,
            stored_at: Utc::now(),
        });
        Ok(store_id)
    }

    async fn query(&self, page: i64, size: i64) -> Result<Page, StoreError> {
        self.check_available()?;
        let inner = self.lock();
        let total = inner.records.len() as i64;
        // An offset past i64 range is just a page past the end of the data.
        let Some(offset) = page.checked_mul(size) else {
            return Ok(Page { records: Vec::new(), page, size, total });
        };
        // Append order is (stored_at, store_id) ascending, so newest-first is
        // a reverse walk.
        let records: Vec<AuditRecord> = inner
            .records
            .iter()
            .rev()
            .skip(offset as usize)
            .take(size as usize)
            .cloned()
            .collect();
        Ok(Page { records, page, size, total })
    }
}
